pub mod compaction;
pub mod config;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod llm;
pub mod request;
pub mod store;

pub use engine::{CompactionEngine, EngineBuilder, InletOutcome};
