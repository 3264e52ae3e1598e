use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "condenser")]
#[command(version, about = "Conversation context-window compaction engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .condenser directory with a default config and summary store
    Init,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show the resolved compression threshold and hard cap for a model
    Thresholds {
        /// Model id
        model: String,
    },
    /// Build the compacted view of a transcript, as the inlet would
    View {
        /// JSON file: a message array or a request object with `messages`
        #[arg(short, long)]
        transcript: PathBuf,

        /// Model the request targets
        #[arg(short, long)]
        model: String,

        /// Conversation id (without it the transcript passes through)
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Run background summarization for a transcript and wait for it
    Summarize {
        /// JSON file: a message array or a request object with `messages`
        #[arg(short, long)]
        transcript: PathBuf,

        /// Model that served the conversation
        #[arg(short, long)]
        model: String,

        /// Conversation id
        #[arg(short, long)]
        conversation: String,

        /// Conversation owner, forwarded to the summarizer
        #[arg(long)]
        owner: Option<String>,
    },
    /// Inspect stored summaries
    Summary {
        #[command(subcommand)]
        command: SummaryCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default condenser.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum SummaryCommands {
    /// Print the stored summary for a conversation
    Show { conversation: String },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            "condenser=debug".into()
        } else {
            "condenser=info".into()
        }
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Thresholds { model } => cmd::cmd_thresholds(&project_dir, model)?,
        Commands::View {
            transcript,
            model,
            conversation,
        } => {
            cmd::cmd_view(&project_dir, transcript, model, conversation.as_deref()).await?;
        }
        Commands::Summarize {
            transcript,
            model,
            conversation,
            owner,
        } => {
            cmd::cmd_summarize(
                &project_dir,
                transcript,
                model,
                conversation,
                owner.as_deref(),
            )
            .await?;
        }
        Commands::Summary { command } => match command {
            SummaryCommands::Show { conversation } => {
                cmd::cmd_summary_show(&project_dir, conversation).await?
            }
        },
    }

    Ok(())
}
