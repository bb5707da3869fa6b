use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_CHECK_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_PROVIDER: &str = "imagen";

/// Runtime settings, resolved from `MOODPAPER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_base: String,
    pub image_model: String,
    pub check_model: String,
    pub provider: String,
    pub store_path: PathBuf,
    pub events_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup("MOODPAPER_API_BASE")
            .or_else(|| lookup("GEMINI_API_BASE"))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            api_base,
            image_model: lookup("MOODPAPER_IMAGE_MODEL")
                .map(|value| resolve_model_name(&value))
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            check_model: lookup("MOODPAPER_CHECK_MODEL")
                .map(|value| resolve_model_name(&value))
                .unwrap_or_else(|| DEFAULT_CHECK_MODEL.to_string()),
            provider: lookup("MOODPAPER_PROVIDER")
                .map(|value| value.trim().to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            store_path: lookup("MOODPAPER_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_path),
            events_path: lookup("MOODPAPER_EVENTS").map(PathBuf::from),
        }
    }
}

pub fn default_store_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moodpaper")
        .join("storage.json")
}

fn resolve_model_name(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches("models/").to_string();
    match trimmed.to_ascii_lowercase().as_str() {
        "imagen-4" | "imagen-4.0" => DEFAULT_IMAGE_MODEL.to_string(),
        "imagen-4-ultra" | "imagen-4.0-ultra" => "imagen-4.0-ultra-generate-001".to_string(),
        _ => trimmed,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.check_model, DEFAULT_CHECK_MODEL);
        assert_eq!(config.provider, "imagen");
        assert!(config.store_path.ends_with("moodpaper/storage.json"));
        assert_eq!(config.events_path, None);
    }

    #[test]
    fn overrides_and_normalization() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
            ("MOODPAPER_IMAGE_MODEL", "models/imagen-4"),
            ("MOODPAPER_PROVIDER", " DryRun "),
            ("MOODPAPER_STORE", "/tmp/store.json"),
            ("MOODPAPER_EVENTS", "/tmp/events.jsonl"),
        ]));
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.image_model, "imagen-4.0-generate-001");
        assert_eq!(config.provider, "dryrun");
        assert_eq!(config.store_path, PathBuf::from("/tmp/store.json"));
        assert_eq!(config.events_path, Some(PathBuf::from("/tmp/events.jsonl")));
    }

    #[test]
    fn moodpaper_api_base_wins_over_gemini() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("MOODPAPER_API_BASE", "http://a"),
            ("GEMINI_API_BASE", "http://b"),
        ]));
        assert_eq!(config.api_base, "http://a");
    }
}
