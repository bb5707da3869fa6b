use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::EngineConfig;
use crate::credentials::Credential;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Outbound image-generation request, already carrying the enhanced prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub number_of_images: u32,
    pub aspect_ratio: String,
    pub output_mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes_base64: String,
    pub mime_type: Option<String>,
}

/// `images` is `None` when the response carried no image collection at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationResponse {
    pub images: Option<Vec<ImagePayload>>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse>;
    /// Cheapest round trip that proves the credential is accepted.
    fn check_credential(&self, credential: &Credential) -> Result<()>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &EngineConfig) -> ProviderRegistry {
    let mut providers = ProviderRegistry::new();
    providers.register(ImagenProvider::new(config));
    providers.register(DryrunProvider);
    providers
}

pub struct ImagenProvider {
    api_base: String,
    model: String,
    check_model: String,
    http: HttpClient,
}

impl ImagenProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            model: config.image_model.clone(),
            check_model: config.check_model.clone(),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    fn predict_payload(request: &GenerationRequest) -> Value {
        json!({
            "instances": [{
                "prompt": request.prompt,
            }],
            "parameters": {
                "sampleCount": request.number_of_images,
                "aspectRatio": request.aspect_ratio,
                "outputOptions": {
                    "mimeType": request.output_mime_type,
                },
            },
        })
    }

    /// One-word prompt capped at a single output token.
    fn check_payload() -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": "ping" }],
            }],
            "generationConfig": {
                "maxOutputTokens": 1,
            },
        })
    }

    fn extract_predictions(response_payload: &Value) -> Option<Vec<ImagePayload>> {
        let predictions = response_payload.get("predictions")?.as_array()?;
        let mut out = Vec::new();
        for row in predictions {
            let Some(obj) = row.as_object() else {
                continue;
            };
            if let Some(encoded) = obj
                .get("bytesBase64Encoded")
                .or_else(|| obj.get("bytes_base64_encoded"))
                .and_then(Value::as_str)
            {
                out.push(ImagePayload {
                    bytes_base64: encoded.to_string(),
                    mime_type: obj
                        .get("mimeType")
                        .or_else(|| obj.get("mime_type"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
                continue;
            }

            let nested = obj
                .get("image")
                .and_then(Value::as_object)
                .or_else(|| obj.get("generatedImage").and_then(Value::as_object));
            if let Some(nested) = nested {
                if let Some(encoded) = nested
                    .get("imageBytes")
                    .or_else(|| nested.get("bytesBase64Encoded"))
                    .and_then(Value::as_str)
                {
                    out.push(ImagePayload {
                        bytes_base64: encoded.to_string(),
                        mime_type: nested
                            .get("mimeType")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    });
                }
            }
        }
        Some(out)
    }
}

impl ImageProvider for ImagenProvider {
    fn name(&self) -> &str {
        "imagen"
    }

    fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse> {
        let endpoint = self.endpoint(&self.model, "predict");
        let payload = Self::predict_payload(request);
        debug!(%endpoint, images = request.number_of_images, "sending Imagen request");
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, credential.expose())
            .json(&payload)
            .send()
            .with_context(|| format!("Imagen request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Imagen", response)?;
        Ok(GenerationResponse {
            images: Self::extract_predictions(&response_payload),
        })
    }

    fn check_credential(&self, credential: &Credential) -> Result<()> {
        let endpoint = self.endpoint(&self.check_model, "generateContent");
        let payload = Self::check_payload();
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, credential.expose())
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini credential check failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)?;
        Ok(())
    }
}

/// Offline provider: solid-colour images whose colour is derived from the
/// prompt and position.
pub struct DryrunProvider;

const DRYRUN_WIDTH: u32 = 90;
const DRYRUN_HEIGHT: u32 = 160;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse> {
        if credential.is_empty() {
            bail!("dryrun: API key missing");
        }
        let (format, mime) = if request.output_mime_type.contains("png") {
            (ImageFormat::Png, "image/png")
        } else {
            (ImageFormat::Jpeg, "image/jpeg")
        };
        let mut images = Vec::new();
        for idx in 0..request.number_of_images {
            let bytes = render_dryrun_image(&request.prompt, idx, format)?;
            images.push(ImagePayload {
                bytes_base64: BASE64.encode(bytes),
                mime_type: Some(mime.to_string()),
            });
        }
        Ok(GenerationResponse {
            images: Some(images),
        })
    }

    fn check_credential(&self, credential: &Credential) -> Result<()> {
        if credential.is_empty() {
            bail!("dryrun: API key missing");
        }
        Ok(())
    }
}

fn render_dryrun_image(prompt: &str, idx: u32, format: ImageFormat) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt, idx);
    let mut image = RgbImage::new(DRYRUN_WIDTH, DRYRUN_HEIGHT);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .context("failed to encode dryrun image")?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str, idx: u32) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
