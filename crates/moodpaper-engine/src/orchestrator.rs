use std::sync::Arc;

use moodpaper_contracts::wallpapers::{data_url, image_id, GeneratedImage};
use tracing::{info, warn};

use crate::credentials::Credential;
use crate::error::GenerationError;
use crate::providers::{GenerationRequest, ImageProvider};

pub const BATCH_SIZE: u32 = 4;
pub const TARGET_ASPECT_RATIO: &str = "9:16";
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";
const PROMPT_QUALIFIERS: &str =
    "high quality phone wallpaper, 8k resolution, aesthetic, highly detailed, vertical 9:16 aspect ratio";

pub fn enhance_prompt(user_prompt: &str) -> String {
    format!("{user_prompt}, {PROMPT_QUALIFIERS}")
}

pub fn wallpaper_request(user_prompt: &str) -> GenerationRequest {
    GenerationRequest {
        prompt: enhance_prompt(user_prompt),
        number_of_images: BATCH_SIZE,
        aspect_ratio: TARGET_ASPECT_RATIO.to_string(),
        output_mime_type: OUTPUT_MIME_TYPE.to_string(),
    }
}

/// Turns a user prompt into a batch of display-ready wallpapers.
pub struct Orchestrator {
    provider: Arc<dyn ImageProvider>,
    last_stamp: i64,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            provider,
            last_stamp: 0,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn generate(
        &mut self,
        credential: Option<&Credential>,
        user_prompt: &str,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let Some(credential) = credential.filter(|credential| !credential.is_empty()) else {
            return Err(GenerationError::MissingCredential);
        };

        let request = wallpaper_request(user_prompt);
        let response = self
            .provider
            .generate(credential, &request)
            .map_err(|err| {
                let message = error_chain_text(&err);
                warn!(provider = self.provider.name(), error = %message, "generation failed");
                GenerationError::GenerationFailed(message)
            })?;
        let payloads = response
            .images
            .filter(|images| !images.is_empty())
            .ok_or_else(|| GenerationError::GenerationFailed("no images generated".to_string()))?;

        let stamp = self.next_stamp();
        let batch: Vec<GeneratedImage> = payloads
            .into_iter()
            .enumerate()
            .map(|(idx, payload)| GeneratedImage {
                id: image_id(stamp, idx),
                url: data_url(
                    payload
                        .mime_type
                        .as_deref()
                        .filter(|mime| !mime.trim().is_empty())
                        .unwrap_or(request.output_mime_type.as_str()),
                    &payload.bytes_base64,
                ),
                prompt: user_prompt.to_string(),
                created_at: stamp,
            })
            .collect();
        info!(provider = self.provider.name(), count = batch.len(), "generated wallpapers");
        Ok(batch)
    }

    /// Regenerates from an earlier image's original prompt.
    pub fn remix(
        &mut self,
        credential: Option<&Credential>,
        image: &GeneratedImage,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        self.generate(credential, &image.prompt)
    }

    /// Wall-clock millis, bumped past the previous batch when the clock has
    /// not advanced so ids stay unique for the session.
    fn next_stamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let stamp = if now > self.last_stamp {
            now
        } else {
            self.last_stamp + 1
        };
        self.last_stamp = stamp;
        stamp
    }
}

fn error_chain_text(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return err.to_string();
    }
    parts.join(" | caused by: ")
}
