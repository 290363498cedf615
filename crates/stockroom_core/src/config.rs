//! Client configuration loaded from environment variables.
//!
//! Everything except the API URL is optional by design: a missing sync URL
//! or credential leaves real-time sync inactive without an error, and the
//! rest of the client keeps working against the HTTP API.

use std::env;

/// Default HTTP API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API base URL (STOCKROOM_API_URL, default: http://localhost:8080)
    pub api_url: String,
    /// Sync server base URL (STOCKROOM_SYNC_URL); unset disables live sync
    pub sync_url: Option<String>,
    /// Bearer token (STOCKROOM_TOKEN)
    pub token: Option<String>,
    /// Organization id (STOCKROOM_ORG_ID)
    pub org_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let api_url = env::var("STOCKROOM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let sync_url = env::var("STOCKROOM_SYNC_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let token = env::var("STOCKROOM_TOKEN").ok().filter(|v| !v.is_empty());
        let org_id = env::var("STOCKROOM_ORG_ID").ok().filter(|v| !v.is_empty());

        Config {
            api_url,
            sync_url,
            token,
            org_id,
        }
    }

    /// Check if live sync can run: it needs a sync URL, a token and an org.
    pub fn is_sync_configured(&self) -> bool {
        self.sync_url.is_some() && self.token.is_some() && self.org_id.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            sync_url: None,
            token: None,
            org_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sync_disabled() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.sync_url.is_none());
        assert!(!config.is_sync_configured());
    }

    #[test]
    fn test_sync_configured_requires_all_three() {
        let mut config = Config {
            sync_url: Some("wss://sync.example.com".to_string()),
            ..Config::default()
        };
        assert!(!config.is_sync_configured());
        config.token = Some("t".to_string());
        assert!(!config.is_sync_configured());
        config.org_id = Some("o".to_string());
        assert!(config.is_sync_configured());
    }
}
