use std::fmt;

use anyhow::{Context, Result};

const DEFAULT_MODELS: &str = "gpt-4-turbo-preview,gpt-3.5-turbo";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Server-side fallback credential. A key supplied with the request wins.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Models offered in the UI. The first entry is the default.
    pub models: Vec<String>,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub max_upload_bytes: usize,
    pub llm_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let models: Vec<String> = var("DOCAI_MODELS")
            .unwrap_or_else(|| DEFAULT_MODELS.to_string())
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            anyhow::bail!("DOCAI_MODELS must list at least one model");
        }

        let default_temperature = parse_or(var("DOCAI_DEFAULT_TEMPERATURE"), 0.3_f32)
            .context("DOCAI_DEFAULT_TEMPERATURE must be a number")?;
        if !(0.0..=2.0).contains(&default_temperature) {
            anyhow::bail!("DOCAI_DEFAULT_TEMPERATURE must be between 0 and 2");
        }

        let default_max_tokens = parse_or(var("DOCAI_DEFAULT_MAX_TOKENS"), 1500_u32)
            .context("DOCAI_DEFAULT_MAX_TOKENS must be a positive integer")?;
        if default_max_tokens == 0 {
            anyhow::bail!("DOCAI_DEFAULT_MAX_TOKENS must be a positive integer");
        }

        Ok(Config {
            port: parse_or(var("PORT"), 8080_u16).context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            models,
            default_temperature,
            default_max_tokens,
            max_upload_bytes: parse_or(var("MAX_UPLOAD_BYTES"), 20 * 1024 * 1024_usize)
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            llm_timeout_secs: parse_or(var("LLM_TIMEOUT_SECS"), 120_u64)
                .context("LLM_TIMEOUT_SECS must be a number of seconds")?,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.models[0]
    }
}

// Hand-written so the API key never reaches a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("models", &self.models)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .finish()
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse::<T>()?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(config.default_model(), "gpt-4-turbo-preview");
        assert_eq!(config.models.len(), 2);
        assert!((config.default_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.default_max_tokens, 1500);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:1234/v1/"),
            ("DOCAI_MODELS", " gpt-4o , gpt-4o-mini ,"),
            ("DOCAI_DEFAULT_TEMPERATURE", "0.7"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.openai_base_url, "http://localhost:1234/v1");
        assert_eq!(config.models, vec!["gpt-4o", "gpt-4o-mini"]);
        assert!((config.default_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_blank_api_key_is_treated_as_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("DOCAI_DEFAULT_TEMPERATURE", "3.5")]).is_err());
        assert!(config_from(&[("DOCAI_DEFAULT_MAX_TOKENS", "0")]).is_err());
        assert!(config_from(&[("DOCAI_MODELS", " , ")]).is_err());
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-very-secret")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
