use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use veil::Redact;

use crate::{error::Result, protocol::auth::TokenResponse};

/// OAuth credentials as persisted between runs.
///
/// Serialized as `{"access_token", "refresh_token", "expires_at"}` with
/// `expires_at` in milliseconds since the Unix epoch.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Redact)]
pub struct Credentials {
    #[redact]
    pub access_token: String,

    #[redact]
    pub refresh_token: String,

    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub expires_at: SystemTime,
}

impl Credentials {
    /// Subtracted from the provider's token lifetime so the token is
    /// refreshed before requests start failing.
    pub const SAFETY_MARGIN: Duration = Duration::from_secs(15);

    /// Builds credentials from a code exchange response received at `now`.
    ///
    /// A missing refresh token is stored empty, which forces a new login once
    /// the access token expires.
    #[must_use]
    pub fn from_response(response: TokenResponse, now: SystemTime) -> Self {
        Self {
            expires_at: Self::expiry(response.expires_in, now),
            access_token: response.access_token,
            refresh_token: response.refresh_token.unwrap_or_default(),
        }
    }

    /// Applies a refresh response received at `now`.
    ///
    /// The refresh token is replaced only when the provider rotated it.
    pub fn refresh(&mut self, response: TokenResponse, now: SystemTime) {
        self.expires_at = Self::expiry(response.expires_in, now);
        self.access_token = response.access_token;
        if let Some(refresh_token) = response.refresh_token.filter(|token| !token.is_empty()) {
            self.refresh_token = refresh_token;
        }
    }

    fn expiry(expires_in: Duration, now: SystemTime) -> SystemTime {
        let lifetime = expires_in.saturating_sub(Self::SAFETY_MARGIN);
        now.checked_add(lifetime).unwrap_or(now)
    }

    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }
}
