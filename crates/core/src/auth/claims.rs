use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use super::api::string_or_number;
use crate::errors::CoreError;

/// Identity claims carried in the payload segment of the API's JWT.
///
/// The signature is not checked; the server does that on every call.
/// These claims only tell the client who it is talking as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(alias = "sub", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "display_name")]
    pub display_name: Option<String>,
}

/// Decode the claims of a `header.payload.signature` token.
pub fn decode_claims(token: &str) -> Result<TokenClaims, CoreError> {
    let payload = token
        .trim()
        .split('.')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CoreError::Malformed("token has no payload segment".into()))?;
    // Some issuers keep the padding.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| CoreError::Malformed(format!("token payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::Malformed(format!("token claims: {e}")))
}
