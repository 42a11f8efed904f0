//! Batch upload analysis: decode, color sampling, classification and
//! category mapping per file, then handoff to persistence.

pub mod config;
pub mod decode;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod state_machine;
pub mod store;

pub use config::PipelineConfig;
pub use errors::PipelineError;
pub use orchestrator::{BatchOutcome, CancelToken, UploadPipeline};
pub use session::UploadSession;
pub use state_machine::FileStateMachine;
pub use store::{DirectoryStore, DraftStore, MemoryStore, WardrobeRecord};
