//! Secret resolution for charday-bot
//!
//! Provides two-tier resolution with ENV → TOML priority for API keys and
//! tokens that should not have to live in the config file.

use charday_common::config::AppConfig;
use tracing::{info, warn};

/// Environment variable for the image search API key
pub const WEB_SEARCH_KEY_ENV_VAR: &str = "CHARDAY_WEB_SEARCH_API_KEY";
/// Environment variable for the content recognition API key
pub const VISION_KEY_ENV_VAR: &str = "CHARDAY_VISION_API_KEY";
/// Environment variable for the posting service token
pub const PUBLISHER_TOKEN_ENV_VAR: &str = "CHARDAY_PUBLISHER_TOKEN";

/// Resolved secrets; `None` means the dependent feature stays off
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub web_search_api_key: Option<String>,
    pub vision_api_key: Option<String>,
    pub publisher_token: Option<String>,
}

impl Secrets {
    pub fn resolve(config: &AppConfig) -> Self {
        Self {
            web_search_api_key: resolve_secret(
                "image search API key",
                WEB_SEARCH_KEY_ENV_VAR,
                config.images.web_search.api_key.as_deref(),
            ),
            vision_api_key: resolve_secret(
                "vision API key",
                VISION_KEY_ENV_VAR,
                config.images.vision.api_key.as_deref(),
            ),
            publisher_token: resolve_secret(
                "publisher token",
                PUBLISHER_TOKEN_ENV_VAR,
                config.publisher.token.as_deref(),
            ),
        }
    }
}

/// Resolve one secret
///
/// **Priority:** ENV → TOML
pub fn resolve_secret(label: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in environment and TOML config. Using environment ({}).",
            label, env_var
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", label);
        return Some(value);
    }

    toml_value.map(|value| {
        info!("{} loaded from TOML config", label);
        value.to_string()
    })
}

/// Valid keys are non-empty and not only whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TEST_VAR: &str = "CHARDAY_TEST_SECRET";

    #[test]
    #[serial]
    fn test_env_wins_over_toml() {
        std::env::set_var(TEST_VAR, "from-env");
        let value = resolve_secret("test secret", TEST_VAR, Some("from-toml"));
        std::env::remove_var(TEST_VAR);
        assert_eq!(value.as_deref(), Some("from-env"));
    }

    #[test]
    #[serial]
    fn test_toml_used_when_env_missing() {
        std::env::remove_var(TEST_VAR);
        let value = resolve_secret("test secret", TEST_VAR, Some("from-toml"));
        assert_eq!(value.as_deref(), Some("from-toml"));
    }

    #[test]
    #[serial]
    fn test_blank_values_ignored() {
        std::env::set_var(TEST_VAR, "   ");
        let value = resolve_secret("test secret", TEST_VAR, Some(""));
        std::env::remove_var(TEST_VAR);
        assert_eq!(value, None);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(" \t"));
    }
}
