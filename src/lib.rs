pub mod config;
pub mod daemon;
pub mod error;
pub mod hook_protocol;
pub mod ledger;
pub mod orchestrator;
pub mod patterns;
pub mod protocol_envelope;
pub mod store;
pub mod types;

pub use error::{Result, SwarmError};
pub use hook_protocol::{DispatchOutcome, HookInput, HookResponse};
pub use orchestrator::{PatternInit, PatternOrchestrator};
pub use store::{FilePatternStore, PatternStore};
