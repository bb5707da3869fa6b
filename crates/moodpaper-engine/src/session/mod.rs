mod driver;
mod state;

pub use driver::{SaveOutcome, Session, SubmitOutcome};
pub use state::{transition, Command, Phase, SessionEvent, SessionState, ValidationStatus};
