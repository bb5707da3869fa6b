use moodpaper_contracts::wallpapers::GeneratedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationStatus {
    #[default]
    Unset,
    Testing,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Submit { prompt: String, has_credential: bool },
    Remix { image: GeneratedImage, has_credential: bool },
    Succeeded(Vec<GeneratedImage>),
    Failed { message: String, authorization: bool },
    Select(String),
    Deselect,
    OpenSettings,
    CloseSettings,
    CredentialEdited,
    ValidationStarted,
    ValidationFinished(bool),
}

/// Side effect requested by a transition; the caller performs it and feeds
/// the result back as `Succeeded` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate { prompt: String },
}

/// Everything the surface renders. Process-local.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub images: Vec<GeneratedImage>,
    pub selected: Option<String>,
    pub settings_open: bool,
    pub validation: ValidationStatus,
    pub last_error: Option<String>,
    pub in_flight_prompt: Option<String>,
}

/// Pure form of [`SessionState::apply`].
pub fn transition(state: &SessionState, event: SessionEvent) -> (SessionState, Option<Command>) {
    let mut next = state.clone();
    let command = next.apply(event);
    (next, command)
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn selected_image(&self) -> Option<&GeneratedImage> {
        let id = self.selected.as_deref()?;
        self.find_image(id)
    }

    pub fn find_image(&self, id: &str) -> Option<&GeneratedImage> {
        self.images.iter().find(|image| image.id == id)
    }

    /// 1-based lookup, matching how images are numbered for the user.
    pub fn image_at(&self, position: usize) -> Option<&GeneratedImage> {
        position
            .checked_sub(1)
            .and_then(|idx| self.images.get(idx))
    }

    pub fn apply(&mut self, event: SessionEvent) -> Option<Command> {
        match event {
            SessionEvent::Submit {
                prompt,
                has_credential,
            } => self.submit(prompt, has_credential),
            SessionEvent::Remix {
                image,
                has_credential,
            } => self.submit(image.prompt, has_credential),
            SessionEvent::Succeeded(batch) => {
                if self.is_loading() {
                    self.phase = Phase::Loaded;
                    self.images = batch;
                    self.selected = None;
                    self.last_error = None;
                    self.in_flight_prompt = None;
                }
                None
            }
            SessionEvent::Failed {
                message,
                authorization,
            } => {
                if self.is_loading() {
                    self.phase = Phase::Error;
                    self.last_error = Some(message);
                    self.in_flight_prompt = None;
                    if authorization {
                        self.open_settings();
                    }
                }
                None
            }
            SessionEvent::Select(id) => {
                if !self.is_loading() && self.find_image(&id).is_some() {
                    self.selected = Some(id);
                }
                None
            }
            SessionEvent::Deselect => {
                self.selected = None;
                None
            }
            SessionEvent::OpenSettings => {
                self.open_settings();
                None
            }
            SessionEvent::CloseSettings => {
                self.settings_open = false;
                self.validation = ValidationStatus::Unset;
                None
            }
            SessionEvent::CredentialEdited => {
                self.validation = ValidationStatus::Unset;
                None
            }
            SessionEvent::ValidationStarted => {
                self.validation = ValidationStatus::Testing;
                None
            }
            SessionEvent::ValidationFinished(valid) => {
                self.validation = if valid {
                    ValidationStatus::Valid
                } else {
                    ValidationStatus::Invalid
                };
                None
            }
        }
    }

    fn submit(&mut self, prompt: String, has_credential: bool) -> Option<Command> {
        if prompt.trim().is_empty() || self.is_loading() {
            return None;
        }
        if !has_credential {
            self.open_settings();
            return None;
        }
        self.selected = None;
        self.phase = Phase::Loading;
        self.in_flight_prompt = Some(prompt.clone());
        Some(Command::Generate { prompt })
    }

    /// Status resets only when the panel goes from closed to open.
    fn open_settings(&mut self) {
        if !self.settings_open {
            self.validation = ValidationStatus::Unset;
        }
        self.settings_open = true;
    }
}
