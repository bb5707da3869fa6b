use std::sync::Mutex;

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::credentials::Credential;
use crate::providers::{GenerationRequest, GenerationResponse, ImagePayload, ImageProvider};

#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    /// As many images as requested.
    Batch,
    NoCollection,
    Empty,
    Fail(String),
}

/// Base64 of `payload-{idx}`.
pub(crate) fn fake_payload(idx: u32) -> String {
    BASE64.encode(format!("payload-{idx}"))
}

/// Provider double that records every call.
pub(crate) struct FakeProvider {
    response: Mutex<FakeResponse>,
    reject_credentials: bool,
    requests: Mutex<Vec<GenerationRequest>>,
    checks: Mutex<Vec<String>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            response: Mutex::new(FakeResponse::Batch),
            reject_credentials: false,
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
        }
    }
}

impl FakeProvider {
    pub(crate) fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub(crate) fn set_response(&self, response: FakeResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn checks(&self) -> Vec<String> {
        self.checks.lock().unwrap().clone()
    }
}

impl ImageProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn generate(
        &self,
        _credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.response.lock().unwrap().clone();
        match response {
            FakeResponse::Batch => Ok(GenerationResponse {
                images: Some(
                    (0..request.number_of_images)
                        .map(|idx| ImagePayload {
                            bytes_base64: fake_payload(idx),
                            mime_type: None,
                        })
                        .collect(),
                ),
            }),
            FakeResponse::NoCollection => Ok(GenerationResponse { images: None }),
            FakeResponse::Empty => Ok(GenerationResponse {
                images: Some(Vec::new()),
            }),
            FakeResponse::Fail(message) => bail!(message),
        }
    }

    fn check_credential(&self, credential: &Credential) -> Result<()> {
        self.checks
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        if self.reject_credentials {
            bail!("Gemini request failed (400): API key not valid");
        }
        Ok(())
    }
}
