//! CLI commands implementation

pub mod admin;
pub mod auth;
pub mod chat;
pub mod init;
pub mod sources;

pub use admin::*;
pub use auth::*;
pub use chat::*;
pub use init::*;
pub use sources::*;

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::jwt;

/// The stored session token, or [`Error::NotLoggedIn`]
pub fn require_login(api: &ApiClient) -> Result<String> {
    api.tokens().get().ok_or(Error::NotLoggedIn)
}

/// Like [`require_login`], but the token must also carry the admin role
pub fn require_admin(api: &ApiClient) -> Result<String> {
    let token = require_login(api)?;
    if !jwt::is_admin(&token) {
        return Err(Error::Validation(
            "This command requires an administrator account".to_string(),
        ));
    }
    Ok(token)
}
