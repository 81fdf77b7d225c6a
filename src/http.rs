//! Rate-limited HTTP client for the Spotify Accounts and Web APIs.
//!
//! Wraps `reqwest::Client` with:
//! * a request quota so bursts of checkpoint events cannot trip Spotify's
//!   rolling rate limit
//! * keep-alive and read timeouts
//! * helpers to build bearer-authenticated, JSON and form-encoded requests
//!
//! # Example
//!
//! ```no_run
//! use mazetune::{config::Config, error::Result, http::Client};
//!
//! async fn devices(config: &Config, token: &str) -> Result<String> {
//!     let client = Client::new(config)?;
//!     let url = config.api_url.join("me/player/devices")?;
//!     let request = client.get(url, token)?;
//!     let (_status, body) = client.text(request).await?;
//!     Ok(body)
//! }
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Body, Method, StatusCode, Url,
};
use serde::Serialize;

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Underlying client, bypassing the rate limiter.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Spotify computes its rate limit over a rolling 30 second window.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(30);

    /// Calls allowed per interval. Spotify does not publish its limit; this
    /// stays well below what a single user session would ever need.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 90;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    const FORM_CONTENT: HeaderValue = HeaderValue::from_static("application/x-www-form-urlencoded");

    const JSON_CONTENT: HeaderValue = HeaderValue::from_static("application/json");

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, Self::JSON_CONTENT);

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        *request.body_mut() = Some(body.into());
        request
    }

    /// Builds a bearer-authenticated GET request.
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot be used as a header value.
    pub fn get<U>(&self, url: U, token: &str) -> Result<reqwest::Request>
    where
        U: Into<Url>,
    {
        let mut request = reqwest::Request::new(Method::GET, url.into());
        Self::authorize(&mut request, token)?;
        Ok(request)
    }

    /// Builds a bearer-authenticated PUT request without a body, for
    /// endpoints that take all their arguments in the query.
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot be used as a header value.
    pub fn put<U>(&self, url: U, token: &str) -> Result<reqwest::Request>
    where
        U: Into<Url>,
    {
        let mut request = self.request(Method::PUT, url, Body::from(""));
        Self::authorize(&mut request, token)?;
        Ok(request)
    }

    /// Builds a bearer-authenticated PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be serialized or the token cannot be
    /// used as a header value.
    pub fn put_json<U, T>(&self, url: U, token: &str, body: &T) -> Result<reqwest::Request>
    where
        U: Into<Url>,
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body)?;
        let mut request = self.request(Method::PUT, url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::JSON_CONTENT);
        Self::authorize(&mut request, token)?;
        Ok(request)
    }

    /// Builds a form-encoded POST request, as OAuth token endpoints expect.
    pub fn post_form<'a, U, I>(&self, url: U, fields: I) -> reqwest::Request
    where
        U: Into<Url>,
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        let mut request = self.request(Method::POST, url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::FORM_CONTENT);
        request
    }

    fn authorize(request: &mut reqwest::Request, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or no response arrives.
    /// Error statuses are not errors here; callers decide what they mean.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        trace!("{} {}", request.method(), request.url().path());
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }

    /// Executes a request and returns its status and body text.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body cannot be read.
    pub async fn text(&self, request: reqwest::Request) -> Result<(StatusCode, String)> {
        let response = self.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}
