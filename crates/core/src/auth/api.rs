use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::credential::Credential;
use super::store::TokenProvider;
use crate::errors::CoreError;
use crate::gateway::http::{build_client, classify_status};
use crate::models::settings::ClientSettings;

#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

/// The signed-in user as reported by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub message: Option<String>,
}

/// User ids arrive as strings from some deployments and numbers from others.
pub(super) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Login / registration against `/auth/*`. Successful calls hand the
/// credential to the [`TokenProvider`].
pub struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(settings: &ClientSettings) -> Result<Self, CoreError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Log in and store the credential. A response without a token is
    /// rejected as malformed.
    pub async fn login(
        &self,
        tokens: &dyn TokenProvider,
        email: &str,
        password: &str,
    ) -> Result<Credential, CoreError> {
        require_field("email", email)?;
        require_field("password", password)?;

        let response = self
            .post("/auth/login", &LoginRequest { email, password })
            .await?;
        let credential = credential_from(&response)
            .ok_or_else(|| CoreError::Malformed("login response carried no token".into()))?;

        tokens.store(credential.clone(), Some(email.to_string())).await?;
        info!(user = ?credential.user_id(), "logged in");
        Ok(credential)
    }

    /// Register a new account. Some deployments require e-mail
    /// verification first and answer without a token; then `Ok(None)`.
    pub async fn register(
        &self,
        tokens: &dyn TokenProvider,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Option<Credential>, CoreError> {
        require_field("email", email)?;
        require_field("password", password)?;

        let body = RegisterRequest {
            email,
            password,
            display_name: display_name.map(str::trim).filter(|d| !d.is_empty()),
        };
        let response = self.post("/auth/register", &body).await?;
        let credential = credential_from(&response);
        if let Some(credential) = &credential {
            tokens.store(credential.clone(), Some(email.to_string())).await?;
        }
        Ok(credential)
    }

    pub async fn logout(&self, tokens: &dyn TokenProvider) -> Result<(), CoreError> {
        tokens.clear().await?;
        info!("logged out");
        Ok(())
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<AuthResponse, CoreError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text, path));
        }
        serde_json::from_str(&text).map_err(|e| CoreError::Malformed(format!("{path}: {e}")))
    }
}

fn require_field(name: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{name} is required")));
    }
    Ok(())
}

fn credential_from(response: &AuthResponse) -> Option<Credential> {
    let token = response.token.as_deref().filter(|t| !t.trim().is_empty())?;
    let credential = Credential::from_token(token);
    // The response body wins over the token claims when both name a user.
    Some(match &response.user {
        Some(user) => credential.with_user(user.id.clone()),
        None => credential,
    })
}
