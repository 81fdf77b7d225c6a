//! Playback runtimes: whatever owns the output device Spotify streams to.
//!
//! A runtime is loaded once, then connected with a [`TokenProvider`] it calls
//! whenever it needs a bearer token. It reports its lifecycle as
//! [`RuntimeEvent`]s on a channel; the first
//! [`Ready`](RuntimeEvent::Ready) event carries the device id that playback
//! commands must target.
//!
//! [`ConnectRuntime`] waits for a Spotify Connect device with a known name to
//! come online, such as a web player tab or a `librespot` instance.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use url::Url;

use crate::{
    error::Result,
    http::Client as HttpClient,
    protocol::{self, web_api::Devices},
};

/// Opaque handle of an output device.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle notifications of a runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The device is online and accepts playback commands.
    Ready { device_id: DeviceId },

    /// The device went offline.
    NotReady { device_id: DeviceId },

    /// The runtime could not start.
    InitializationError(String),

    /// The bearer token was rejected.
    AuthenticationError(String),

    /// The account may not stream, typically for lack of Premium.
    AccountError(String),
}

/// Supplies bearer tokens on demand.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> String;
}

/// A token that can be swapped while runtimes hold on to it.
#[derive(Debug, Default)]
pub struct SharedToken(RwLock<String>);

impl SharedToken {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(RwLock::new(token))
    }

    pub async fn set(&self, token: String) {
        *self.0.write().await = token;
    }
}

#[async_trait]
impl TokenProvider for SharedToken {
    async fn token(&self) -> String {
        self.0.read().await.clone()
    }
}

#[async_trait]
pub trait Runtime: Send {
    fn is_loaded(&self) -> bool;

    /// Makes the runtime available. Called once, before the first connect.
    async fn load(&mut self) -> Result<()>;

    /// Starts a session, reporting its lifecycle on `events`.
    ///
    /// Returns as soon as the session is underway; readiness is signalled
    /// through `events` only.
    async fn connect(
        &mut self,
        tokens: Arc<dyn TokenProvider>,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> Result<()>;
}

/// Runtime backed by a Spotify Connect device found by name.
pub struct ConnectRuntime {
    http_client: Arc<HttpClient>,
    api_url: Url,
    device_name: String,
    poll_interval: Duration,

    loaded: bool,
    poller: Option<JoinHandle<()>>,
}

impl ConnectRuntime {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(http_client: Arc<HttpClient>, api_url: Url, device_name: &str) -> Self {
        Self {
            http_client,
            api_url,
            device_name: device_name.to_owned(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            loaded: false,
            poller: None,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn devices_url(&self) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}/me/player/devices")
            .parse::<Url>()
            .map_err(Into::into)
    }
}

impl Drop for ConnectRuntime {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

#[async_trait]
impl Runtime for ConnectRuntime {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    async fn load(&mut self) -> Result<()> {
        // Validate the endpoint up front so a bad `api_url` fails here and
        // not silently inside the poller.
        let url = self.devices_url()?;
        debug!("watching {url} for device \"{}\"", self.device_name);
        self.loaded = true;
        Ok(())
    }

    async fn connect(
        &mut self,
        tokens: Arc<dyn TokenProvider>,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> Result<()> {
        if let Some(previous) = self.poller.take() {
            previous.abort();
        }

        let poller = Poller {
            http_client: Arc::clone(&self.http_client),
            url: self.devices_url()?,
            device_name: self.device_name.clone(),
            interval: self.poll_interval,
            tokens,
            events,
        };

        self.poller = Some(tokio::spawn(poller.run()));
        Ok(())
    }
}

struct Poller {
    http_client: Arc<HttpClient>,
    url: Url,
    device_name: String,
    interval: Duration,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

impl Poller {
    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut current: Option<DeviceId> = None;
        loop {
            interval.tick().await;
            if self.events.is_closed() {
                break;
            }

            let event = match self.poll().await {
                Ok(found) => match (current.take(), found) {
                    (None, Some(device_id)) => {
                        current = Some(device_id.clone());
                        Some(RuntimeEvent::Ready { device_id })
                    }
                    (Some(device_id), None) => Some(RuntimeEvent::NotReady { device_id }),
                    (Some(old), Some(new)) if old != new => {
                        // Device restarted under a new id.
                        current = Some(new.clone());
                        Some(RuntimeEvent::Ready { device_id: new })
                    }
                    (unchanged, _) => {
                        current = unchanged;
                        None
                    }
                },
                Err(event) => Some(event),
            };

            if let Some(event) = event {
                if self.events.send(event).is_err() {
                    break;
                }
            }
        }

        trace!("device poller stopped");
    }

    async fn poll(&self) -> std::result::Result<Option<DeviceId>, RuntimeEvent> {
        let token = self.tokens.token().await;
        let request = self
            .http_client
            .get(self.url.clone(), &token)
            .map_err(|e| RuntimeEvent::InitializationError(e.to_string()))?;

        let (status, body) = self
            .http_client
            .text(request)
            .await
            .map_err(|e| RuntimeEvent::InitializationError(e.to_string()))?;

        match status {
            StatusCode::UNAUTHORIZED => Err(RuntimeEvent::AuthenticationError(body)),
            StatusCode::FORBIDDEN => Err(RuntimeEvent::AccountError(body)),
            status if !status.is_success() => Err(RuntimeEvent::InitializationError(format!(
                "listing devices failed with status {status}"
            ))),
            _ => {
                let devices: Devices = protocol::json(&body, "devices")
                    .map_err(|e| RuntimeEvent::InitializationError(e.to_string()))?;
                Ok(devices
                    .find(&self.device_name)
                    .map(|id| DeviceId(id.to_owned())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::config::Config;

    fn runtime(server: &Server) -> ConnectRuntime {
        let http_client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        ConnectRuntime::new(
            http_client,
            Url::parse(&server.url()).unwrap(),
            "MazeRunner Web Player",
        )
        .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn reports_ready_when_device_appears() {
        let mut server = Server::new_async().await;
        let _devices = server
            .mock("GET", "/me/player/devices")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(
                r#"{"devices":[{"id":"dev-1","name":"MazeRunner Web Player","type":"Computer"}]}"#,
            )
            .create_async()
            .await;

        let mut runtime = runtime(&server);
        assert!(!runtime.is_loaded());
        runtime.load().await.unwrap();
        assert!(runtime.is_loaded());

        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .connect(Arc::new(SharedToken::new("token".to_owned())), tx)
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(RuntimeEvent::Ready {
                device_id: DeviceId("dev-1".to_owned())
            })
        );
    }

    #[tokio::test]
    async fn rejected_token_is_an_authentication_error() {
        let mut server = Server::new_async().await;
        let _devices = server
            .mock("GET", "/me/player/devices")
            .with_status(401)
            .with_body(r#"{"error":{"status":401,"message":"The access token expired"}}"#)
            .create_async()
            .await;

        let mut runtime = runtime(&server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .connect(Arc::new(SharedToken::new("token".to_owned())), tx)
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(RuntimeEvent::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn free_account_is_an_account_error() {
        let mut server = Server::new_async().await;
        let _devices = server
            .mock("GET", "/me/player/devices")
            .with_status(403)
            .create_async()
            .await;

        let mut runtime = runtime(&server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .connect(Arc::new(SharedToken::new("token".to_owned())), tx)
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(RuntimeEvent::AccountError(_))));
    }

    #[tokio::test]
    async fn swapped_token_is_used_by_later_polls() {
        let mut server = Server::new_async().await;
        let _old = server
            .mock("GET", "/me/player/devices")
            .match_header("authorization", "Bearer old")
            .with_status(200)
            .with_body(r#"{"devices":[]}"#)
            .create_async()
            .await;
        let _new = server
            .mock("GET", "/me/player/devices")
            .match_header("authorization", Matcher::Exact("Bearer new".to_owned()))
            .with_status(200)
            .with_body(r#"{"devices":[{"id":"dev-2","name":"MazeRunner Web Player"}]}"#)
            .create_async()
            .await;

        let tokens = Arc::new(SharedToken::new("old".to_owned()));
        let mut runtime = runtime(&server);
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime.connect(tokens.clone(), tx).await.unwrap();

        tokens.set("new".to_owned()).await;
        assert_eq!(
            rx.recv().await,
            Some(RuntimeEvent::Ready {
                device_id: DeviceId("dev-2".to_owned())
            })
        );
    }
}
