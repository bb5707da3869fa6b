use std::sync::Arc;

use tracing::{debug, info};

use crate::credentials::Credential;
use crate::providers::{truncate_text, ImageProvider};

/// Round-trips a credential against the provider's cheapest endpoint.
///
/// Every failure, transient or not, reports `false`; callers cannot tell a
/// network blip from a rejected key.
pub struct CredentialValidator {
    provider: Arc<dyn ImageProvider>,
}

impl CredentialValidator {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self { provider }
    }

    pub fn validate(&self, credential: &Credential) -> bool {
        if credential.is_empty() {
            return false;
        }
        match self.provider.check_credential(credential) {
            Ok(()) => {
                debug!(provider = self.provider.name(), "credential accepted");
                true
            }
            Err(err) => {
                info!(
                    provider = self.provider.name(),
                    error = %truncate_text(&format!("{err:#}"), 256),
                    "credential check failed"
                );
                false
            }
        }
    }
}
