//! Persistence of the single user-supplied API key.
//!
//! The key is stored obfuscated, not encrypted: `mp1:` followed by the
//! standard base64 of its UTF-8 bytes. Anyone who can read the storage file
//! can recover the key. The format is kept as-is so existing stores stay
//! readable.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use moodpaper_contracts::storage::KeyValueStore;
use tracing::{debug, warn};

use crate::error::StorageError;

pub const CREDENTIAL_KEY: &str = "moodpaper.api_key";
const OBFUSCATION_MARKER: &str = "mp1:";

/// The user's API secret. `Debug` and `Display` only ever show a masked form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        let count = self.0.chars().count();
        if count == 0 {
            return String::new();
        }
        if count <= 8 {
            return "•".repeat(count);
        }
        let head: String = self.0.chars().take(4).collect();
        let tail: String = self.0.chars().skip(count - 4).collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Returns the stored credential. Unreadable or undecodable values are
    /// discarded and reported as absent.
    pub fn load(&self) -> Option<Credential> {
        let stored = match self.storage.get(CREDENTIAL_KEY) {
            Ok(value) => value?,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "credential storage read failed");
                return None;
            }
        };
        match decode(&stored) {
            Some(credential) => Some(credential),
            None => {
                warn!("stored credential is corrupt; discarding it");
                if let Err(err) = self.storage.remove(CREDENTIAL_KEY) {
                    warn!(error = %format!("{err:#}"), "failed to discard corrupt credential");
                }
                None
            }
        }
    }

    /// Persists `credential`; an empty credential clears the store instead.
    pub fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        if credential.is_empty() {
            return self.clear();
        }
        self.storage
            .set(CREDENTIAL_KEY, &encode(credential))
            .map_err(|err| StorageError::Write(format!("{err:#}")))?;
        debug!(credential = %credential, "credential saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage
            .remove(CREDENTIAL_KEY)
            .map_err(|err| StorageError::Write(format!("{err:#}")))?;
        debug!("credential cleared");
        Ok(())
    }
}

fn encode(credential: &Credential) -> String {
    format!(
        "{OBFUSCATION_MARKER}{}",
        BASE64.encode(credential.expose().as_bytes())
    )
}

fn decode(stored: &str) -> Option<Credential> {
    let encoded = stored.strip_prefix(OBFUSCATION_MARKER)?;
    let bytes = BASE64.decode(encoded.as_bytes()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let credential = Credential::new(text);
    if credential.is_empty() {
        return None;
    }
    Some(credential)
}
