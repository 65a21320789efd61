//! JWT payload decoding.
//!
//! The signature is NOT verified; the backend is the authority. This is only
//! used to decide which commands to offer (e.g. admin-only sync).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a `header.payload.signature` token
pub fn decode_claims(token: &str) -> Option<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        debug!("Invalid JWT format");
        return None;
    }

    let payload = parts[1].trim_end_matches('=');
    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Error decoding JWT payload: {}", e);
            return None;
        }
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| debug!("Error parsing JWT claims: {}", e))
        .ok()
}

/// Role claim of the token, if it can be decoded
pub fn role(token: &str) -> Option<String> {
    decode_claims(token).and_then(|c| c.role)
}

pub fn is_admin(token: &str) -> bool {
    role(token).as_deref() == Some("ADMIN")
}
