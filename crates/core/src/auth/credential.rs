use serde::{Deserialize, Serialize};
use tracing::debug;

use super::claims::decode_claims;

/// Bearer credential for the budgeting API, plus the user it was issued to.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
    user_id: Option<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: None,
        }
    }

    /// Credential for `token` with the user id read from its claims.
    /// Tokens whose payload cannot be decoded are kept without a user.
    pub fn from_token(token: impl Into<String>) -> Self {
        let credential = Self::new(token);
        match decode_claims(&credential.token) {
            Ok(claims) => credential.with_user(claims.id),
            Err(e) => {
                debug!("token carries no readable claims: {e}");
                credential
            }
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn is_empty(&self) -> bool {
        self.token.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
