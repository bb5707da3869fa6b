//! Mood-to-wallpaper generation: credential lifecycle, request orchestration
//! against the image API, and the session state machine the surfaces drive.

pub mod config;
pub mod credentials;
pub mod download;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod session;
pub mod validator;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use credentials::{Credential, CredentialStore};
pub use error::{DownloadError, GenerationError, StorageError};
pub use orchestrator::Orchestrator;
pub use providers::{ImageProvider, ProviderRegistry};
pub use session::{Phase, SaveOutcome, Session, SessionState, SubmitOutcome, ValidationStatus};
pub use validator::CredentialValidator;
