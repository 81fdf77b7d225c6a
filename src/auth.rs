//! Credential manager for the Spotify Accounts service.
//!
//! Produces a currently valid bearer token using the Authorization Code flow
//! with PKCE. First login, the code exchange after the redirect, caching and
//! refreshing are all handled by [`CredentialManager::ensure_token`]:
//!
//! ```text
//! location has ?code=  ──> exchange_code ──> persist ─┐
//!                                                      v
//! persisted record ──> unexpired? ──yes──> access token
//!                          │no
//!                          v
//!                       refresh ──ok──> persist ──> access token
//!                          │failed
//!                          v
//!                        login ──> navigate away (None)
//! ```
//!
//! The credential record is read and written without coordinating with
//! other processes sharing the same state directory. Two processes that
//! find the record expired at the same time will both refresh it; the last
//! write wins.

use std::{sync::Arc, time::SystemTime};

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    location::{self, Location},
    pkce,
    protocol::{
        self,
        auth::{TokenResponse, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN},
    },
    storage::Storage,
    tokens::Credentials,
};

/// Failures of the authorization flow itself.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("authorization code exchange failed with status {0}")]
    Exchange(StatusCode),

    #[error("no code verifier stored for this login attempt")]
    MissingVerifier,
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Exchange(_) => Self::unauthenticated(e),
            AuthError::MissingVerifier => Self::failed_precondition(e),
        }
    }
}

/// Owns the credential record and the PKCE login flow.
///
/// Tokens are refreshed on demand. A login is only started through
/// [`CredentialManager::ensure_token`].
pub struct CredentialManager {
    http_client: Arc<HttpClient>,

    client_id: String,
    redirect_uri: Url,
    scope: String,
    accounts_url: Url,

    /// Holds the credential record across runs.
    durable: Box<dyn Storage>,

    /// Holds the verifier of the pending login attempt.
    session: Box<dyn Storage>,
}

impl CredentialManager {
    /// Durable storage key of the credential record.
    pub const CREDENTIALS_KEY: &'static str = "spotify_tokens";

    /// Session storage key of the PKCE verifier.
    pub const VERIFIER_KEY: &'static str = "pkce_verifier";

    /// One-time parameters the authorization server appends to the redirect.
    const REDIRECT_PARAMETERS: [&'static str; 2] = ["code", "state"];

    pub fn new(
        config: &Config,
        http_client: Arc<HttpClient>,
        durable: Box<dyn Storage>,
        session: Box<dyn Storage>,
    ) -> Self {
        Self {
            http_client,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope(),
            accounts_url: config.accounts_url.clone(),
            durable,
            session,
        }
    }

    /// Returns a valid access token, or `None` when the user was sent away
    /// to log in.
    ///
    /// An authorization code in the current location is exchanged first and
    /// then removed from it, so the same code is never exchanged twice.
    ///
    /// # Errors
    ///
    /// Returns error if the code exchange fails, storage cannot be accessed
    /// or the token endpoint cannot be reached.
    pub async fn ensure_token(&mut self, location: &mut dyn Location) -> Result<Option<String>> {
        let mut url = location.href();

        if let Some(code) = location::query_value(&url, "code") {
            self.exchange_code(&code).await?;
            location::strip_query(&mut url, &Self::REDIRECT_PARAMETERS);
            location.replace(url);
        } else if let Some(reason) = location::query_value(&url, "error") {
            warn!("authorization was not granted: {reason}");
            location::strip_query(&mut url, &["error", "state"]);
            location.replace(url);
        }

        if let Some(token) = self.access_token().await? {
            return Ok(Some(token));
        }

        let scope = self.scope.clone();
        self.login(location, &scope)?;
        Ok(None)
    }

    /// Starts a login attempt by navigating to the authorize endpoint.
    ///
    /// A fresh verifier is stored in session storage for the exchange that
    /// follows the redirect back.
    pub fn login(&mut self, location: &mut dyn Location, scope: &str) -> Result<()> {
        let verifier = pkce::verifier(pkce::DEFAULT_VERIFIER_LENGTH);
        let challenge = pkce::challenge(&verifier);
        self.session.set(Self::VERIFIER_KEY, &verifier)?;

        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", scope)
            .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD)
            .append_pair("code_challenge", &challenge);

        debug!("redirecting to {}", self.accounts_url);
        location.assign(url)
    }

    /// Exchanges an authorization code for credentials and persists them.
    ///
    /// The stored verifier is consumed whether or not the exchange succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingVerifier`] without contacting the token
    /// endpoint when no login attempt is pending, and
    /// [`AuthError::Exchange`] when the endpoint rejects the code.
    pub async fn exchange_code(&mut self, code: &str) -> Result<String> {
        let verifier = self
            .session
            .take(Self::VERIFIER_KEY)?
            .ok_or(AuthError::MissingVerifier)?;

        let request = self.http_client.post_form(
            self.endpoint("api/token")?,
            [
                ("client_id", self.client_id.as_str()),
                ("grant_type", GRANT_AUTHORIZATION_CODE),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier.as_str()),
            ],
        );

        let (status, body) = self.http_client.text(request).await?;
        if !status.is_success() {
            debug!("token endpoint answered: {body}");
            return Err(AuthError::Exchange(status).into());
        }

        let response: TokenResponse = protocol::json(&body, "token exchange")?;
        let credentials = Credentials::from_response(response, SystemTime::now());
        self.persist(&credentials)?;

        info!(
            "logged in; token valid for {}s",
            credentials.time_to_live().as_secs()
        );
        Ok(credentials.access_token)
    }

    /// Returns the persisted access token, refreshing it when expired.
    ///
    /// Returns `None` when there is no usable record or it could not be
    /// refreshed; the caller must then log in.
    pub async fn access_token(&mut self) -> Result<Option<String>> {
        let Some(json) = self.durable.get(Self::CREDENTIALS_KEY)? else {
            debug!("no stored credentials");
            return Ok(None);
        };

        let credentials = match Credentials::from_json(&json) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("ignoring unreadable stored credentials: {e}");
                return Ok(None);
            }
        };

        if !credentials.is_expired() {
            trace!(
                "access token valid for {}s",
                credentials.time_to_live().as_secs()
            );
            return Ok(Some(credentials.access_token));
        }

        self.refresh(credentials).await
    }

    /// Refreshes `credentials` and persists the result.
    ///
    /// # Errors
    ///
    /// A rejected refresh is not an error: it returns `None`. Errors are
    /// returned only when the endpoint cannot be reached or storage fails.
    pub async fn refresh(&mut self, mut credentials: Credentials) -> Result<Option<String>> {
        if credentials.refresh_token.is_empty() {
            debug!("no refresh token stored");
            return Ok(None);
        }

        debug!("refreshing access token");
        let request = self.http_client.post_form(
            self.endpoint("api/token")?,
            [
                ("client_id", self.client_id.as_str()),
                ("grant_type", GRANT_REFRESH_TOKEN),
                ("refresh_token", credentials.refresh_token.as_str()),
            ],
        );

        let (status, body) = self.http_client.text(request).await?;
        if !status.is_success() {
            warn!("token refresh failed with status {status}; logging in again");
            debug!("token endpoint answered: {body}");
            return Ok(None);
        }

        let response: TokenResponse = protocol::json(&body, "token refresh")?;
        credentials.refresh(response, SystemTime::now());
        self.persist(&credentials)?;

        debug!(
            "access token refreshed; valid for {}s",
            credentials.time_to_live().as_secs()
        );
        Ok(Some(credentials.access_token))
    }

    /// The persisted credential record, if any.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        self.durable
            .get(Self::CREDENTIALS_KEY)?
            .map(|json| Credentials::from_json(&json))
            .transpose()
    }

    fn persist(&mut self, credentials: &Credentials) -> Result<()> {
        self.durable
            .set(Self::CREDENTIALS_KEY, &credentials.to_json()?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.accounts_url.as_str().trim_end_matches('/');
        format!("{base}/{path}").parse::<Url>().map_err(Into::into)
    }
}
