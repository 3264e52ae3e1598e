//! Request/response hooks tying the compaction pieces together.
//!
//! - `inlet` runs before a request is sent to the model and swaps the
//!   transcript for its compacted view.
//! - `outlet` runs after a response is complete and schedules background
//!   summarization.
//!
//! Neither hook can fail the request: every internal problem degrades to the
//! unmodified transcript.

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::compaction::{
    SummarizationWorker, SummaryJob, SummaryTask, ThresholdResolver, TokenEstimator, ViewBuilder,
    ViewStats,
};
use crate::config::{CompactionSettings, CondenserToml, ModelCatalog};
use crate::identity::{PassthroughUserDirectory, UserDirectory};
use crate::llm::CompletionClient;
use crate::request::{ChatRequest, RequestMetadata, TurnIds};
use crate::store::SummaryStore;

/// Result of [`CompactionEngine::inlet`].
#[derive(Debug, Clone)]
pub struct InletOutcome {
    /// The request to forward, with `messages` replaced by the view.
    pub request: ChatRequest,
    pub ids: Option<TurnIds>,
    /// `None` when the request was passed through untouched.
    pub stats: Option<ViewStats>,
}

impl InletOutcome {
    pub fn is_passthrough(&self) -> bool {
        self.stats.is_none()
    }
}

pub struct CompactionEngine {
    settings: CompactionSettings,
    thresholds: Arc<ThresholdResolver>,
    catalog: ModelCatalog,
    estimator: TokenEstimator,
    store: Arc<dyn SummaryStore>,
    worker: Arc<SummarizationWorker>,
}

impl CompactionEngine {
    pub fn builder(config: &CondenserToml) -> EngineBuilder {
        EngineBuilder {
            settings: config.compaction_settings(),
            thresholds: Arc::new(ThresholdResolver::from_config(config)),
            catalog: config.model_catalog(),
            estimator: config.token_estimator().unwrap_or_else(|e| {
                warn!(error = %e, "Tokenizer unavailable, using character heuristic");
                TokenEstimator::heuristic()
            }),
            store: None,
            llm: None,
            users: Arc::new(PassthroughUserDirectory),
        }
    }

    pub fn thresholds(&self) -> &ThresholdResolver {
        &self.thresholds
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    /// Replace the transcript with its compacted view.
    pub async fn inlet(&self, mut request: ChatRequest, external: Option<&RequestMetadata>) -> InletOutcome {
        let Some(ids) = TurnIds::resolve(&request, external) else {
            warn!(model = %request.model, "Request has no conversation id, passing through");
            return InletOutcome {
                request,
                ids: None,
                stats: None,
            };
        };

        let summary = match self.store.load(&ids.conversation_id).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    conversation_id = %ids.conversation_id,
                    error = %e,
                    "Failed to load summary, using full transcript"
                );
                None
            }
        };

        let thresholds = self.thresholds.resolve(&request.model);
        let system_prompt = self.catalog.system_prompt(&request.model).map(String::from);
        let settings = self.settings.clone();
        let estimator = self.estimator.clone();
        let transcript = request.messages.clone();

        let built = tokio::task::spawn_blocking(move || {
            ViewBuilder::new(&settings, &estimator).build(
                &transcript,
                summary.as_ref(),
                thresholds,
                system_prompt.as_deref(),
            )
        })
        .await;

        match built {
            Ok(view) => {
                if view.stats.enforcement.is_some() || view.stats.compacted_through.is_some() {
                    info!(
                        conversation_id = %ids.conversation_id,
                        original = view.stats.original_messages,
                        view = view.stats.view_messages,
                        tokens = view.stats.tokens,
                        hard_cap = view.stats.hard_cap,
                        "Compacted request"
                    );
                } else {
                    debug!(
                        conversation_id = %ids.conversation_id,
                        tokens = view.stats.tokens,
                        "Request fits without compaction"
                    );
                }
                request.messages = view.messages;
                InletOutcome {
                    request,
                    ids: Some(ids),
                    stats: Some(view.stats),
                }
            }
            Err(e) => {
                warn!(
                    conversation_id = %ids.conversation_id,
                    error = %e,
                    "View building failed, passing through"
                );
                InletOutcome {
                    request,
                    ids: Some(ids),
                    stats: None,
                }
            }
        }
    }

    /// Schedule background summarization for a completed turn.
    ///
    /// `request.messages` must be the full transcript including the response.
    /// Must be called from within a tokio runtime. Returns `None` when the
    /// request carries no conversation id.
    pub fn outlet(&self, request: &ChatRequest, external: Option<&RequestMetadata>) -> Option<SummaryTask> {
        let Some(ids) = TurnIds::resolve(request, external) else {
            debug!(model = %request.model, "Response has no conversation id, not summarizing");
            return None;
        };

        Some(self.worker.spawn(SummaryJob {
            conversation_id: ids.conversation_id,
            model_id: request.model.clone(),
            owner_id: ids.owner_id,
            transcript: request.messages.clone(),
        }))
    }
}

/// Wires collaborators into a [`CompactionEngine`].
pub struct EngineBuilder {
    settings: CompactionSettings,
    thresholds: Arc<ThresholdResolver>,
    catalog: ModelCatalog,
    estimator: TokenEstimator,
    store: Option<Arc<dyn SummaryStore>>,
    llm: Option<Arc<dyn CompletionClient>>,
    users: Arc<dyn UserDirectory>,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn SummaryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn CompletionClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    pub fn estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn build(self) -> Result<CompactionEngine> {
        let Some(store) = self.store else {
            bail!("Compaction engine requires a summary store");
        };
        let Some(llm) = self.llm else {
            bail!("Compaction engine requires a completion client");
        };

        debug!(tokenizer = self.estimator.tokenizer_name(), "Building compaction engine");
        let worker = Arc::new(SummarizationWorker::new(
            self.settings.clone(),
            Arc::clone(&self.thresholds),
            self.estimator.clone(),
            Arc::clone(&store),
            llm,
            self.users,
        ));

        Ok(CompactionEngine {
            settings: self.settings,
            thresholds: self.thresholds,
            catalog: self.catalog,
            estimator: self.estimator,
            store,
            worker,
        })
    }
}
