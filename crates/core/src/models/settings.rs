use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Environment variable overriding [`ClientSettings::api_url`].
pub const ENV_API_URL: &str = "BUDGET_API_URL";
/// Environment variable overriding [`ClientSettings::request_timeout_secs`].
pub const ENV_TIMEOUT_SECS: &str = "BUDGET_API_TIMEOUT_SECS";

/// Client configuration, usually read from a small JSON file shipped with
/// the app and optionally overridden from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the budgeting API, without a trailing slash
    /// (e.g., "https://budget.example.com/api").
    pub api_url: String,

    /// Per-request timeout. Expiry surfaces as a network failure.
    pub request_timeout_secs: u64,

    /// Where the encrypted credential vault lives. `None` keeps the
    /// session in memory only.
    pub vault_path: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            request_timeout_secs: 30,
            vault_path: None,
        }
    }
}

impl ClientSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Deserialization(format!("Invalid settings: {e}")))?;
        settings.validated()
    }

    /// Apply `BUDGET_API_URL` / `BUDGET_API_TIMEOUT_SECS` when set.
    pub fn with_env_overrides(self) -> Result<Self, CoreError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::with_env_overrides`] with an injectable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("{ENV_TIMEOUT_SECS} is not a number: {raw}"))
            })?;
        }
        self.validated()
    }

    fn validated(mut self) -> Result<Self, CoreError> {
        let trimmed = self.api_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(CoreError::Validation("api_url must not be empty".into()));
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "api_url must start with http:// or https://, got {trimmed}"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        self.api_url = trimmed.to_string();
        Ok(self)
    }
}
