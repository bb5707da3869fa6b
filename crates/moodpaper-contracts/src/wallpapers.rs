use serde::{Deserialize, Serialize};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// One generated wallpaper.
///
/// `url` is a self-contained `data:` URL, never a remote link. `prompt` is the
/// text the user typed, before any quality qualifiers were appended for the
/// outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub url: String,
    pub prompt: String,
    pub created_at: i64,
}

impl GeneratedImage {
    pub fn mime_type(&self) -> Option<&str> {
        parse_data_url(&self.url).map(|(mime, _)| mime)
    }

    pub fn download_file_name(&self) -> String {
        let ext = self
            .mime_type()
            .map(extension_for_mime)
            .unwrap_or("jpg");
        format!("wallpaper-{}.{}", self.id, ext)
    }
}

pub fn image_id(stamp: i64, index: usize) -> String {
    format!("gen-{stamp}-{index}")
}

pub fn data_url(mime_type: &str, payload_base64: &str) -> String {
    format!("{DATA_URL_PREFIX}{mime_type}{BASE64_MARKER}{payload_base64}")
}

/// Splits a base64 `data:` URL into its mime type and payload.
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix(DATA_URL_PREFIX)?;
    let (mime, payload) = rest.split_once(BASE64_MARKER)?;
    if mime.trim().is_empty() {
        return None;
    }
    Some((mime, payload))
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    if lowered.contains("png") {
        return "png";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "jpg"
}
