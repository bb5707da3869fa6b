use thiserror::Error;

/// Failure of a generate (or remix) request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No credential was configured; no request was sent.
    #[error("no API key configured")]
    MissingCredential,
    /// The provider call failed or returned nothing usable.
    #[error("image generation failed: {0}")]
    GenerationFailed(String),
}

const AUTHORIZATION_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "permission_denied",
    "permission denied",
    "unauthenticated",
    "unauthorized",
    "(401)",
    "(403)",
];

impl GenerationError {
    /// Whether the failure points at the credential rather than the request.
    pub fn is_authorization(&self) -> bool {
        match self {
            Self::MissingCredential => true,
            Self::GenerationFailed(message) => looks_like_authorization(message),
        }
    }
}

pub(crate) fn looks_like_authorization(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    AUTHORIZATION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write credential to storage: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no image with id {0} in the current batch")]
    UnknownImage(String),
    #[error("image {0} is not an inline base64 image")]
    NotInline(String),
    #[error("image payload is not valid base64")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write wallpaper file")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::GenerationError;

    #[test]
    fn authorization_classification() {
        assert!(GenerationError::MissingCredential.is_authorization());
        assert!(GenerationError::GenerationFailed(
            "Imagen request failed (400): API key not valid. Please pass a valid API key.".to_string()
        )
        .is_authorization());
        assert!(GenerationError::GenerationFailed(
            "Imagen request failed (403): {\"status\": \"PERMISSION_DENIED\"}".to_string()
        )
        .is_authorization());
        assert!(!GenerationError::GenerationFailed("no images generated".to_string())
            .is_authorization());
        assert!(!GenerationError::GenerationFailed(
            "Imagen request failed (429): RESOURCE_EXHAUSTED".to_string()
        )
        .is_authorization());
    }
}
