//! Token endpoint response of the Spotify Accounts service.
//!
//! Both the `authorization_code` and the `refresh_token` grants answer with
//! the same shape:
//!
//! ```json
//! {
//!     "access_token": "secret_token",
//!     "token_type": "Bearer",
//!     "scope": "streaming user-read-email",
//!     "expires_in": 3600,
//!     "refresh_token": "secret_refresh_token"
//! }
//! ```
//!
//! `refresh_token` is always present after a code exchange. A refresh may
//! omit it, in which case the previous refresh token stays valid.

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// `grant_type` when exchanging an authorization code.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// `grant_type` when refreshing an access token.
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Redact)]
pub struct TokenResponse {
    #[redact]
    pub access_token: String,

    #[serde(default)]
    #[redact]
    pub refresh_token: Option<String>,

    /// Lifetime of the access token as reported by the provider.
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,

    #[serde(default)]
    pub scope: Option<String>,
}
