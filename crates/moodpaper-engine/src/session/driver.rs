use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use moodpaper_contracts::events::{EventPayload, EventWriter};
use moodpaper_contracts::storage::{JsonFileStore, KeyValueStore};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::state::{Command, SessionEvent, SessionState, ValidationStatus};
use crate::config::EngineConfig;
use crate::credentials::{Credential, CredentialStore};
use crate::download::save_image;
use crate::error::{DownloadError, StorageError};
use crate::orchestrator::Orchestrator;
use crate::providers::{default_provider_registry, ImageProvider};
use crate::validator::CredentialValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank prompt, unknown image, or a request already in flight.
    Ignored,
    /// No credential stored; the settings panel was opened instead.
    NeedsCredential,
    Generated(usize),
    Failed { message: String, authorization: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Cleared,
    Rejected,
}

/// Owns the session state and runs the commands its transitions request.
pub struct Session {
    state: SessionState,
    credentials: CredentialStore,
    orchestrator: Orchestrator,
    validator: CredentialValidator,
    events: EventWriter,
    validated: Option<Credential>,
}

impl Session {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        storage: Arc<dyn KeyValueStore>,
        events: EventWriter,
    ) -> Self {
        Self {
            state: SessionState::default(),
            credentials: CredentialStore::new(storage),
            orchestrator: Orchestrator::new(provider.clone()),
            validator: CredentialValidator::new(provider),
            events,
            validated: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = default_provider_registry(config);
        let provider = registry.get(&config.provider).ok_or_else(|| {
            anyhow!(
                "unknown provider '{}' (available: {})",
                config.provider,
                registry.names().join(", ")
            )
        })?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = match config.events_path.as_ref() {
            Some(path) => EventWriter::new(path, session_id),
            None => EventWriter::discard(session_id),
        };
        let storage = Arc::new(JsonFileStore::new(&config.store_path));
        let session = Self::new(provider, storage, events);
        session.record(
            "session_started",
            json!({
                "provider": session.provider_name(),
                "store": config.store_path.to_string_lossy(),
            }),
        );
        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn provider_name(&self) -> &str {
        self.orchestrator.provider_name()
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.credentials.load()
    }

    pub fn submit(&mut self, prompt: &str) -> SubmitOutcome {
        let credential = self.credentials.load();
        let event = SessionEvent::Submit {
            prompt: prompt.to_string(),
            has_credential: credential.is_some(),
        };
        self.dispatch(event, credential)
    }

    pub fn remix(&mut self, image_id: &str) -> SubmitOutcome {
        let Some(image) = self.state.find_image(image_id).cloned() else {
            return SubmitOutcome::Ignored;
        };
        let credential = self.credentials.load();
        let event = SessionEvent::Remix {
            image,
            has_credential: credential.is_some(),
        };
        self.dispatch(event, credential)
    }

    fn dispatch(&mut self, event: SessionEvent, credential: Option<Credential>) -> SubmitOutcome {
        let prompt_given = match &event {
            SessionEvent::Submit { prompt, .. } => !prompt.trim().is_empty(),
            SessionEvent::Remix { image, .. } => !image.prompt.trim().is_empty(),
            _ => false,
        };
        let actionable = prompt_given && !self.state.is_loading();
        let Some(Command::Generate { prompt }) = self.state.apply(event) else {
            if actionable && credential.is_none() {
                self.record("credential_required", json!({}));
                return SubmitOutcome::NeedsCredential;
            }
            return SubmitOutcome::Ignored;
        };

        self.record(
            "generation_started",
            json!({
                "prompt": prompt,
                "provider": self.provider_name(),
            }),
        );
        match self.orchestrator.generate(credential.as_ref(), &prompt) {
            Ok(batch) => {
                let count = batch.len();
                let ids: Vec<Value> = batch
                    .iter()
                    .map(|image| Value::String(image.id.clone()))
                    .collect();
                self.state.apply(SessionEvent::Succeeded(batch));
                self.record(
                    "generation_finished",
                    json!({
                        "prompt": prompt,
                        "count": count,
                        "image_ids": ids,
                    }),
                );
                SubmitOutcome::Generated(count)
            }
            Err(err) => {
                let message = err.to_string();
                let authorization = err.is_authorization();
                self.state.apply(SessionEvent::Failed {
                    message: message.clone(),
                    authorization,
                });
                self.record(
                    "generation_failed",
                    json!({
                        "prompt": prompt,
                        "error": message,
                        "authorization": authorization,
                    }),
                );
                SubmitOutcome::Failed {
                    message,
                    authorization,
                }
            }
        }
    }

    pub fn select(&mut self, image_id: &str) -> bool {
        self.state.apply(SessionEvent::Select(image_id.to_string()));
        self.state.selected.as_deref() == Some(image_id)
    }

    pub fn deselect(&mut self) {
        self.state.apply(SessionEvent::Deselect);
    }

    pub fn open_settings(&mut self) {
        self.state.apply(SessionEvent::OpenSettings);
    }

    pub fn close_settings(&mut self) {
        self.state.apply(SessionEvent::CloseSettings);
    }

    pub fn credential_edited(&mut self) {
        self.validated = None;
        self.state.apply(SessionEvent::CredentialEdited);
    }

    /// Runs the validator on `input` and records the status. Blank input is
    /// ignored and reports `false`.
    pub fn test_credential(&mut self, input: &str) -> bool {
        let credential = Credential::new(input);
        if credential.is_empty() {
            return false;
        }
        self.state.apply(SessionEvent::ValidationStarted);
        let valid = self.validator.validate(&credential);
        self.state.apply(SessionEvent::ValidationFinished(valid));
        self.validated = valid.then_some(credential);
        self.record("credential_validated", json!({ "valid": valid }));
        valid
    }

    /// Save action of the settings panel.
    ///
    /// An already-validated key is saved as-is; an empty key clears storage;
    /// anything else is validated exactly once and saved only if accepted.
    /// Saving or clearing closes the panel, a rejection leaves it open.
    pub fn save_credential(&mut self, input: &str) -> Result<SaveOutcome, StorageError> {
        let credential = Credential::new(input);
        if credential.is_empty() {
            self.clear_credential()?;
            self.state.apply(SessionEvent::CloseSettings);
            return Ok(SaveOutcome::Cleared);
        }

        let already_valid = self.state.validation == ValidationStatus::Valid
            && self.validated.as_ref() == Some(&credential);
        if !already_valid && !self.test_credential(input) {
            return Ok(SaveOutcome::Rejected);
        }

        self.credentials.save(&credential)?;
        info!(credential = %credential, "credential saved");
        self.record("credential_saved", json!({ "masked": credential.masked() }));
        self.state.apply(SessionEvent::CloseSettings);
        Ok(SaveOutcome::Saved)
    }

    pub fn clear_credential(&mut self) -> Result<(), StorageError> {
        self.credentials.clear()?;
        self.validated = None;
        self.record("credential_cleared", json!({}));
        Ok(())
    }

    pub fn download(&self, image_id: &str, dir: &Path) -> Result<PathBuf, DownloadError> {
        let image = self
            .state
            .find_image(image_id)
            .ok_or_else(|| DownloadError::UnknownImage(image_id.to_string()))?;
        let path = save_image(image, dir)?;
        self.record(
            "image_downloaded",
            json!({
                "image_id": image.id,
                "path": path.to_string_lossy(),
            }),
        );
        Ok(path)
    }

    fn record(&self, event_type: &str, payload: Value) {
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = self.events.emit(event_type, payload) {
            warn!(event = event_type, error = %format!("{err:#}"), "failed to write session event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use moodpaper_contracts::events::EventWriter;
    use moodpaper_contracts::storage::{KeyValueStore, MemoryStore};
    use serde_json::Value;

    use super::{SaveOutcome, Session, SubmitOutcome};
    use crate::credentials::{Credential, CredentialStore, CREDENTIAL_KEY};
    use crate::session::{Phase, ValidationStatus};
    use crate::testing::{FakeProvider, FakeResponse};

    struct Harness {
        provider: Arc<FakeProvider>,
        storage: Arc<MemoryStore>,
        session: Session,
    }

    fn harness_with(provider: FakeProvider, key: Option<&str>) -> anyhow::Result<Harness> {
        let provider = Arc::new(provider);
        let storage = Arc::new(MemoryStore::new());
        if let Some(key) = key {
            CredentialStore::new(storage.clone()).save(&Credential::new(key))?;
        }
        let session = Session::new(provider.clone(), storage.clone(), EventWriter::discard("test"));
        Ok(Harness {
            provider,
            storage,
            session,
        })
    }

    fn harness(key: Option<&str>) -> anyhow::Result<Harness> {
        harness_with(FakeProvider::default(), key)
    }

    #[test]
    fn rainy_cityscape_scenario() -> anyhow::Result<()> {
        let mut h = harness(Some("valid-key"))?;
        assert_eq!(h.session.state().phase, Phase::Idle);

        let outcome = h.session.submit("rainy lyrical cityscape");
        assert_eq!(outcome, SubmitOutcome::Generated(4));
        let state = h.session.state();
        assert_eq!(state.phase, Phase::Loaded);
        assert_eq!(state.images.len(), 4);
        assert!(state
            .images
            .iter()
            .all(|image| image.prompt == "rainy lyrical cityscape"));
        assert!(!state.is_loading());
        Ok(())
    }

    #[test]
    fn absent_credential_scenario() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        assert_eq!(h.session.submit("x"), SubmitOutcome::NeedsCredential);
        assert_eq!(h.session.state().phase, Phase::Idle);
        assert!(h.session.state().settings_open);
        assert!(h.provider.requests().is_empty());
        Ok(())
    }

    #[test]
    fn zero_images_scenario_keeps_prior_batch() -> anyhow::Result<()> {
        let mut h = harness(Some("valid-key"))?;
        h.session.submit("first");
        let prior = h.session.state().images.clone();

        h.provider.set_response(FakeResponse::Empty);
        let outcome = h.session.submit("second");
        assert_eq!(
            outcome,
            SubmitOutcome::Failed {
                message: "image generation failed: no images generated".to_string(),
                authorization: false,
            }
        );
        assert_eq!(h.session.state().phase, Phase::Error);
        assert_eq!(h.session.state().images, prior);
        assert!(!h.session.state().settings_open);
        Ok(())
    }

    #[test]
    fn authorization_failure_reopens_settings() -> anyhow::Result<()> {
        let mut h = harness(Some("revoked-key"))?;
        h.provider.set_response(FakeResponse::Fail(
            "Imagen request failed (400): API key not valid".to_string(),
        ));
        let outcome = h.session.submit("x");
        assert!(matches!(
            outcome,
            SubmitOutcome::Failed {
                authorization: true,
                ..
            }
        ));
        assert!(h.session.state().settings_open);
        Ok(())
    }

    #[test]
    fn blank_prompt_is_ignored_without_call() -> anyhow::Result<()> {
        let mut h = harness(Some("valid-key"))?;
        assert_eq!(h.session.submit("   "), SubmitOutcome::Ignored);
        assert!(h.provider.requests().is_empty());
        assert!(!h.session.state().settings_open);
        Ok(())
    }

    #[test]
    fn remix_sends_the_same_request_as_generate() -> anyhow::Result<()> {
        let mut h = harness(Some("valid-key"))?;
        h.session.submit("watercolor spring flower field");
        let target = h.session.state().images[1].id.clone();
        assert!(h.session.select(&target));

        assert_eq!(h.session.remix(&target), SubmitOutcome::Generated(4));
        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(h.session.state().selected, None);
        assert!(h
            .session
            .state()
            .images
            .iter()
            .all(|image| image.prompt == "watercolor spring flower field" && image.id != target));
        Ok(())
    }

    #[test]
    fn remix_of_unknown_image_is_ignored() -> anyhow::Result<()> {
        let mut h = harness(Some("valid-key"))?;
        assert_eq!(h.session.remix("gen-0-0"), SubmitOutcome::Ignored);
        assert!(h.provider.requests().is_empty());
        Ok(())
    }

    #[test]
    fn save_validated_key_skips_second_check() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        h.session.open_settings();
        assert!(h.session.test_credential(" fresh-key "));
        assert_eq!(h.session.state().validation, ValidationStatus::Valid);
        assert_eq!(h.session.save_credential("fresh-key")?, SaveOutcome::Saved);
        assert_eq!(h.provider.checks(), vec!["fresh-key".to_string()]);
        assert!(!h.session.state().settings_open);
        assert_eq!(h.session.current_credential(), Some(Credential::new("fresh-key")));
        Ok(())
    }

    #[test]
    fn chat_test_then_save_checks_the_key_once() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        h.session.open_settings();
        assert!(h.session.test_credential("k"));
        h.session.open_settings();
        assert_eq!(h.session.state().validation, ValidationStatus::Valid);
        assert_eq!(h.session.save_credential("k")?, SaveOutcome::Saved);
        assert_eq!(h.provider.checks(), vec!["k".to_string()]);
        Ok(())
    }

    #[test]
    fn save_without_test_validates_exactly_once() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        h.session.open_settings();
        assert_eq!(h.session.save_credential("untested")?, SaveOutcome::Saved);
        assert_eq!(h.provider.checks().len(), 1);
        Ok(())
    }

    #[test]
    fn save_after_editing_revalidates() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        assert!(h.session.test_credential("first"));
        h.session.credential_edited();
        assert_eq!(h.session.save_credential("second")?, SaveOutcome::Saved);
        assert_eq!(
            h.provider.checks(),
            vec!["first".to_string(), "second".to_string()]
        );
        Ok(())
    }

    #[test]
    fn rejected_key_is_not_saved_and_panel_stays_open() -> anyhow::Result<()> {
        let mut h = harness_with(FakeProvider::default().rejecting_credentials(), None)?;
        h.session.open_settings();
        assert_eq!(h.session.save_credential("bad-key")?, SaveOutcome::Rejected);
        assert_eq!(h.provider.checks().len(), 1);
        assert_eq!(h.session.state().validation, ValidationStatus::Invalid);
        assert!(h.session.state().settings_open);
        assert_eq!(h.storage.get(CREDENTIAL_KEY)?, None);
        Ok(())
    }

    #[test]
    fn save_empty_clears_and_closes() -> anyhow::Result<()> {
        let mut h = harness(Some("old-key"))?;
        h.session.open_settings();
        assert_eq!(h.session.save_credential("  ")?, SaveOutcome::Cleared);
        assert!(h.provider.checks().is_empty());
        assert_eq!(h.session.current_credential(), None);
        assert!(!h.session.state().settings_open);
        Ok(())
    }

    #[test]
    fn blank_test_input_leaves_status_alone() -> anyhow::Result<()> {
        let mut h = harness(None)?;
        assert!(!h.session.test_credential(""));
        assert_eq!(h.session.state().validation, ValidationStatus::Unset);
        assert!(h.provider.checks().is_empty());
        Ok(())
    }

    #[test]
    fn download_writes_selected_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut h = harness(Some("valid-key"))?;
        h.session.submit("clouds");
        let image = h.session.state().images[0].clone();
        let path = h.session.download(&image.id, temp.path())?;
        assert_eq!(path, temp.path().join(format!("wallpaper-{}.jpg", image.id)));
        assert_eq!(std::fs::read(&path)?, b"payload-0");
        assert!(h.session.download("gen-0-0", temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn events_are_written_without_the_secret() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let provider = Arc::new(FakeProvider::default());
        let storage = Arc::new(MemoryStore::new());
        let mut session = Session::new(
            provider,
            storage,
            EventWriter::new(&events_path, "session-1"),
        );
        assert_eq!(session.save_credential("AIzaSySuperSecret")?, SaveOutcome::Saved);
        session.submit("rainy lyrical cityscape");

        let raw = std::fs::read_to_string(&events_path)?;
        assert!(!raw.contains("AIzaSySuperSecret"));
        let types: Vec<String> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "credential_validated",
                "credential_saved",
                "generation_started",
                "generation_finished"
            ]
        );
        Ok(())
    }
}
