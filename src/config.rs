//! Configuration module for loading environment variables and settings.

use crate::error::ConfigError;

/// Default listen port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// NovelAI API key (required)
    pub api_key: String,
    /// HTTP server port
    pub port: u16,
    /// Forward proxy URL from HTTPS_PROXY/HTTP_PROXY, if configured
    pub proxy: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if NOVELAI_API_KEY is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_key = std::env::var("NOVELAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("NOVELAI_API_KEY".to_string()))?;

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::invalid_value("PORT", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let proxy = std::env::var("HTTPS_PROXY")
            .or_else(|_| std::env::var("HTTP_PROXY"))
            .ok()
            .filter(|p| !p.is_empty());

        Ok(Self {
            api_key,
            port,
            proxy,
        })
    }
}
