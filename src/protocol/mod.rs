//! Wire types for the Spotify services mazetune talks to.
//!
//! # Submodules
//!
//! * [`auth`] - Accounts service token endpoint responses
//! * [`web_api`] - Web API playlist, device and playback payloads

pub mod auth;
pub mod web_api;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs a JSON response body.
///
/// Successfully parsed responses are logged at trace level. When parsing
/// fails, the raw body is logged too so protocol changes can be diagnosed.
///
/// # Errors
///
/// Returns error if `body` is not valid JSON or does not match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
