use std::env;
use std::str::FromStr;

use crate::error::AutodidactError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database (optional: falls back to an in-process store)
    pub database_url: Option<String>,

    // AI providers
    pub perplexity_api_key: Option<String>,
    pub perplexity_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    // Link validation / extraction backends
    pub wayback_base_url: String,
    pub youtube_oembed_url: String,
    pub wikipedia_base_url: String,

    // Pipeline tuning
    pub validation_concurrency: usize,
    pub link_timeout_secs: u64,
    pub max_alternatives: usize,
    pub snippet_max_chars: usize,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AutodidactError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AutodidactError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            database_url: get("DATABASE_URL"),
            perplexity_api_key: get("PERPLEXITY_API_KEY"),
            perplexity_model: get("PERPLEXITY_MODEL").unwrap_or_else(|| "sonar".to_string()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            wayback_base_url: get("WAYBACK_BASE_URL")
                .unwrap_or_else(|| "https://archive.org".to_string()),
            youtube_oembed_url: get("YOUTUBE_OEMBED_URL")
                .unwrap_or_else(|| "https://www.youtube.com/oembed".to_string()),
            wikipedia_base_url: get("WIKIPEDIA_BASE_URL")
                .unwrap_or_else(|| "https://en.wikipedia.org".to_string()),
            validation_concurrency: parse_or(&get, "VALIDATION_CONCURRENCY", 8)?,
            link_timeout_secs: parse_or(&get, "LINK_TIMEOUT_SECS", 8)?,
            max_alternatives: parse_or(&get, "MAX_ALTERNATIVES", 6)?,
            snippet_max_chars: parse_or(&get, "SNIPPET_MAX_CHARS", 1200)?,
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: parse_or(&get, "API_PORT", 3000)?,
        };

        if config.perplexity_api_key.is_none() && config.gemini_api_key.is_none() {
            return Err(AutodidactError::Config(
                "at least one of PERPLEXITY_API_KEY or GEMINI_API_KEY is required".to_string(),
            ));
        }
        if config.validation_concurrency == 0 {
            return Err(AutodidactError::Config(
                "VALIDATION_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AutodidactError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AutodidactError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, AutodidactError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("GEMINI_API_KEY", "g")]).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.perplexity_api_key.is_none());
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.perplexity_model, "sonar");
        assert_eq!(config.validation_concurrency, 8);
        assert_eq!(config.max_alternatives, 6);
        assert_eq!(config.api_port, 3000);
        assert_eq!(config.wayback_base_url, "https://archive.org");
    }

    #[test]
    fn requires_an_ai_key() {
        let err = load(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert!(matches!(err, AutodidactError::Config(_)));
    }

    #[test]
    fn blank_values_are_unset() {
        let err = load(&[("PERPLEXITY_API_KEY", "  "), ("GEMINI_API_KEY", "")]).unwrap_err();
        assert!(matches!(err, AutodidactError::Config(_)));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = load(&[("PERPLEXITY_API_KEY", "p"), ("API_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err =
            load(&[("PERPLEXITY_API_KEY", "p"), ("VALIDATION_CONCURRENCY", "0")]).unwrap_err();
        assert!(err.to_string().contains("VALIDATION_CONCURRENCY"));
    }

    #[test]
    fn overrides_apply() {
        let config = load(&[
            ("PERPLEXITY_API_KEY", "p"),
            ("PERPLEXITY_MODEL", "sonar-pro"),
            ("MAX_ALTERNATIVES", "3"),
            ("WIKIPEDIA_BASE_URL", "https://de.wikipedia.org"),
        ])
        .unwrap();
        assert_eq!(config.perplexity_model, "sonar-pro");
        assert_eq!(config.max_alternatives, 3);
        assert_eq!(config.wikipedia_base_url, "https://de.wikipedia.org");
    }
}
