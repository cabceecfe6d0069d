// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Integration credentials are optional: an integration without credentials
//! stays offline and its endpoints answer 503.

use chrono_tz::Tz;
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Server port
    pub port: u16,
    /// SQLite connection string
    pub database_url: String,
    /// Frontend URL for OAuth redirects and CORS
    pub frontend_url: String,
    /// Public base URL of this API (OAuth callback host)
    pub api_url: String,
    /// Timezone used for all date windowing
    pub campus_timezone: Tz,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for signing OAuth state parameters
    pub oauth_state_key: Vec<u8>,

    // --- OpenAI ---
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_chat_model: String,
    pub openai_embedding_model: String,

    // --- Pinecone ---
    pub pinecone_api_key: Option<String>,
    /// Data-plane host of the syllabus index, e.g. `revos-syllabus-xxxx.svc.pinecone.io`
    pub pinecone_index_host: Option<String>,

    // --- Google Calendar ---
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,

    // --- Plaid ---
    pub plaid_client_id: Option<String>,
    pub plaid_secret: Option<String>,
    /// `sandbox`, `development` or `production`
    pub plaid_env: String,

    // --- Canvas ---
    /// Allow calendar feeds on loopback and private-network hosts
    pub canvas_allow_private_hosts: bool,
}

impl Config {
    /// Default config for testing only. All integrations are offline.
    pub fn test_default() -> Self {
        Self {
            port: 5000,
            database_url: "sqlite::memory:".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:5000".to_string(),
            campus_timezone: chrono_tz::America::Chicago,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_chat_model: DEFAULT_CHAT_MODEL.to_string(),
            openai_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            pinecone_api_key: None,
            pinecone_index_host: None,
            google_client_id: None,
            google_client_secret: None,
            plaid_client_id: None,
            plaid_secret: None,
            plaid_env: "sandbox".to_string(),
            canvas_allow_private_hosts: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_signing_key = env::var("JWT_SECRET_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("JWT_SECRET_KEY"))?
            .into_bytes();

        let oauth_state_key = optional("OAUTH_STATE_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|| jwt_signing_key.clone());

        let campus_timezone = match optional("CAMPUS_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::Invalid("CAMPUS_TIMEZONE", name.clone()))?,
            None => chrono_tz::America::Chicago,
        };

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw.clone()))?,
            None => 5000,
        };

        let plaid_env = optional("PLAID_ENV").unwrap_or_else(|| "sandbox".to_string());
        if !matches!(plaid_env.as_str(), "sandbox" | "development" | "production") {
            return Err(ConfigError::Invalid("PLAID_ENV", plaid_env));
        }

        let canvas_allow_private_hosts = match optional("CANVAS_ALLOW_PRIVATE_HOSTS") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(ConfigError::Invalid("CANVAS_ALLOW_PRIVATE_HOSTS", raw)),
            },
            None => false,
        };

        Ok(Self {
            port,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://revos.db".to_string()),
            frontend_url: optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            api_url: optional("API_URL").unwrap_or_else(|| format!("http://localhost:{}", port)),
            campus_timezone,
            jwt_signing_key,
            oauth_state_key,
            openai_api_key: optional("OPENAI_API_KEY"),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_chat_model: optional("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            openai_embedding_model: optional("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            pinecone_api_key: optional("PINECONE_API_KEY"),
            pinecone_index_host: optional("PINECONE_INDEX_HOST"),
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            google_client_secret: optional("GOOGLE_CLIENT_SECRET"),
            plaid_client_id: optional("PLAID_CLIENT_ID"),
            plaid_secret: optional("PLAID_SECRET"),
            plaid_env,
            canvas_allow_private_hosts,
        })
    }

    pub fn openai_configured(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn pinecone_configured(&self) -> bool {
        self.pinecone_api_key.is_some() && self.pinecone_index_host.is_some()
    }

    pub fn google_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }

    pub fn plaid_configured(&self) -> bool {
        self.plaid_client_id.is_some() && self.plaid_secret.is_some()
    }

    /// Base URL of the Plaid API for the configured environment.
    pub fn plaid_base_url(&self) -> String {
        format!("https://{}.plaid.com", self.plaid_env)
    }

    /// Redirect URI registered with Google for the calendar OAuth flow.
    pub fn google_redirect_uri(&self) -> String {
        format!(
            "{}/api/calendar/callback",
            self.api_url.trim_end_matches('/')
        )
    }
}

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Read an optional variable, treating empty values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SECRET_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("CAMPUS_TIMEZONE", "America/Chicago");
        env::remove_var("OAUTH_STATE_KEY");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
        assert_eq!(config.oauth_state_key, config.jwt_signing_key);
        assert_eq!(config.campus_timezone, chrono_tz::America::Chicago);
    }

    #[test]
    fn test_integration_flags() {
        let mut config = Config::test_default();
        assert!(!config.openai_configured());
        assert!(!config.pinecone_configured());

        config.pinecone_api_key = Some("key".to_string());
        assert!(!config.pinecone_configured());
        config.pinecone_index_host = Some("index.svc.pinecone.io".to_string());
        assert!(config.pinecone_configured());

        assert_eq!(config.plaid_base_url(), "https://sandbox.plaid.com");
        assert_eq!(
            config.google_redirect_uri(),
            "http://localhost:5000/api/calendar/callback"
        );
    }
}
