//! Playback controller: one session, one device, one playlist.
//!
//! The controller moves through
//! `Uninitialized → LoadingSdk → AwaitingDevice → Ready`
//! while [`Player::init_session`] runs. Only a `Ready` controller accepts
//! [`Player::play`]; [`Player::pick_random_track`] merely needs a token.

use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{
        self,
        web_api::{Play, PlaylistItems, Track, PLAYLIST_PAGE_LIMIT},
    },
    runtime::{DeviceId, Runtime, RuntimeEvent, SharedToken, TokenProvider},
};

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no tracks available: {0}")]
    NoTracks(String),

    #[error("playback device not ready")]
    DeviceNotReady,

    #[error("play command failed with status {0}")]
    Command(StatusCode),

    #[error("playback device not ready after {0:?}")]
    ReadyTimeout(Duration),

    #[error("playback runtime stopped before the device became ready")]
    RuntimeClosed,
}

impl From<PlaybackError> for Error {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::NoTracks(_) => Self::not_found(e),
            PlaybackError::DeviceNotReady => Self::failed_precondition(e),
            PlaybackError::Command(_) => Self::unavailable(e),
            PlaybackError::ReadyTimeout(_) => Self::deadline_exceeded(e),
            PlaybackError::RuntimeClosed => Self::aborted(e),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Uninitialized,
    LoadingSdk,
    AwaitingDevice,
    Ready {
        device_id: DeviceId,
    },
}

/// Spotify Web API client for one playback device.
pub struct Player<R> {
    http_client: Arc<HttpClient>,
    api_url: Url,
    playlist_id: String,
    volume: u8,
    ready_timeout: Option<Duration>,

    runtime: R,
    state: State,
    token: Option<Arc<SharedToken>>,
    events: Option<mpsc::UnboundedReceiver<RuntimeEvent>>,
}

impl<R> Player<R>
where
    R: Runtime,
{
    pub fn new(config: &Config, http_client: Arc<HttpClient>, runtime: R) -> Self {
        Self {
            http_client,
            api_url: config.api_url.clone(),
            playlist_id: config.playlist_id.clone(),
            volume: config.volume,
            ready_timeout: config.ready_timeout(),

            runtime,
            state: State::default(),
            token: None,
            events: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match &self.state {
            State::Ready { device_id } => Some(device_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Starts a playback session and waits until its device is ready.
    ///
    /// Error events reported by the runtime while waiting are logged and
    /// otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime cannot be loaded or connected, stops
    /// reporting, or does not become ready within the configured timeout.
    pub async fn init_session(&mut self, token: String) -> Result<DeviceId> {
        self.set_token(token).await;
        let tokens = self.tokens()?;

        self.state = State::LoadingSdk;
        if self.runtime.is_loaded() {
            trace!("playback runtime already loaded");
        } else {
            self.runtime.load().await?;
        }

        self.state = State::AwaitingDevice;
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = None;
        self.runtime.connect(tokens, tx).await?;
        let mut events = rx;

        let device_id = match self.ready_timeout {
            Some(timeout) => tokio::time::timeout(timeout, Self::await_ready(&mut events))
                .await
                .map_err(|_| PlaybackError::ReadyTimeout(timeout))??,
            None => Self::await_ready(&mut events).await?,
        };

        info!("playback device {device_id} ready");
        self.state = State::Ready {
            device_id: device_id.clone(),
        };
        self.events = Some(events);

        if let Err(e) = self.set_volume(self.volume).await {
            warn!("could not set volume: {e}");
        }

        Ok(device_id)
    }

    async fn await_ready(
        events: &mut mpsc::UnboundedReceiver<RuntimeEvent>,
    ) -> std::result::Result<DeviceId, PlaybackError> {
        while let Some(event) = events.recv().await {
            match event {
                RuntimeEvent::Ready { device_id } => return Ok(device_id),
                RuntimeEvent::NotReady { device_id } => {
                    debug!("playback device {device_id} not ready");
                }
                other => log_runtime_error(&other),
            }
        }

        Err(PlaybackError::RuntimeClosed)
    }

    /// Applies runtime events that arrived since the last call.
    fn sync_state(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };

        while let Ok(event) = events.try_recv() {
            match event {
                RuntimeEvent::Ready { device_id } => {
                    info!("playback device {device_id} ready");
                    self.state = State::Ready { device_id };
                }
                RuntimeEvent::NotReady { device_id } => {
                    warn!("playback device {device_id} went away");
                    self.state = State::AwaitingDevice;
                }
                other => log_runtime_error(&other),
            }
        }
    }

    /// Replaces the bearer token used for requests and by the runtime.
    pub async fn set_token(&mut self, token: String) {
        match &self.token {
            Some(shared) => shared.set(token).await,
            None => self.token = Some(Arc::new(SharedToken::new(token))),
        }
    }

    fn tokens(&self) -> Result<Arc<SharedToken>> {
        self.token
            .clone()
            .ok_or_else(|| Error::unauthenticated("no access token for playback"))
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens()?.token().await)
    }

    fn api(&self, path: &str) -> Result<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}/{path}").parse::<Url>().map_err(Into::into)
    }

    /// Picks a track uniformly from the first page of the playlist.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NoTracks`] if the playlist cannot be fetched
    /// or holds no playable track.
    pub async fn pick_random_track(&self) -> Result<Track> {
        let token = self.bearer().await?;
        let mut url = self.api(&format!("playlists/{}/tracks", self.playlist_id))?;
        url.query_pairs_mut()
            .append_pair("limit", &PLAYLIST_PAGE_LIMIT.to_string());

        let request = self.http_client.get(url, &token)?;
        let (status, body) = self
            .http_client
            .text(request)
            .await
            .map_err(|e| PlaybackError::NoTracks(format!("failed to fetch playlist: {e}")))?;
        if !status.is_success() {
            return Err(PlaybackError::NoTracks(format!(
                "failed to fetch playlist: status {status}"
            ))
            .into());
        }

        let items: PlaylistItems = protocol::json(&body, "playlist tracks")
            .map_err(|e| PlaybackError::NoTracks(format!("unreadable playlist: {e}")))?;
        let mut tracks = items.into_tracks();
        if tracks.is_empty() {
            return Err(PlaybackError::NoTracks(format!(
                "playlist {} holds no playable tracks",
                self.playlist_id
            ))
            .into());
        }

        let track = tracks.swap_remove(fastrand::usize(..tracks.len()));
        debug!("picked {} out of {} tracks", track.uri, tracks.len() + 1);
        Ok(track)
    }

    /// Plays a single track on the session's device.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::DeviceNotReady`] without any request when no
    /// device is ready, and [`PlaybackError::Command`] when Spotify refuses
    /// the command.
    pub async fn play(&mut self, uri: &str) -> Result<()> {
        self.sync_state();
        let device_id = self
            .device_id()
            .cloned()
            .ok_or(PlaybackError::DeviceNotReady)?;

        let mut url = self.api("me/player/play")?;
        url.query_pairs_mut().append_pair("device_id", &device_id.0);

        let token = self.bearer().await?;
        let request = self
            .http_client
            .put_json(url, &token, &Play { uris: [uri] })?;
        let (status, body) = self.http_client.text(request).await?;
        if !status.is_success() {
            debug!("play command answered: {body}");
            return Err(PlaybackError::Command(status).into());
        }

        info!("playing {uri}");
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<()> {
        let device_id = self
            .device_id()
            .cloned()
            .ok_or(PlaybackError::DeviceNotReady)?;

        let mut url = self.api("me/player/volume")?;
        url.query_pairs_mut()
            .append_pair("volume_percent", &volume.to_string())
            .append_pair("device_id", &device_id.0);

        let token = self.bearer().await?;
        let request = self.http_client.put(url, &token)?;
        let (status, _) = self.http_client.text(request).await?;
        if !status.is_success() {
            return Err(PlaybackError::Command(status).into());
        }

        debug!("volume set to {volume}%");
        Ok(())
    }
}

fn log_runtime_error(event: &RuntimeEvent) {
    match event {
        RuntimeEvent::InitializationError(message) => {
            error!("playback runtime failed to initialize: {message}");
        }
        RuntimeEvent::AuthenticationError(message) => {
            error!("playback runtime rejected the token: {message}");
        }
        RuntimeEvent::AccountError(message) => {
            error!("account cannot stream: {message}");
        }
        RuntimeEvent::Ready { .. } | RuntimeEvent::NotReady { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockito::{Matcher, Server};

    use super::*;
    use crate::error::ErrorKind;

    /// Runtime replaying a fixed script of events.
    #[derive(Default)]
    struct ScriptedRuntime {
        loaded: bool,
        loads: usize,
        script: Vec<RuntimeEvent>,
        /// Keeps the channel open after the script ran out.
        hold: Option<mpsc::UnboundedSender<RuntimeEvent>>,
        keep_open: bool,
    }

    #[async_trait]
    impl Runtime for ScriptedRuntime {
        fn is_loaded(&self) -> bool {
            self.loaded
        }

        async fn load(&mut self) -> Result<()> {
            self.loaded = true;
            self.loads += 1;
            Ok(())
        }

        async fn connect(
            &mut self,
            tokens: Arc<dyn TokenProvider>,
            events: mpsc::UnboundedSender<RuntimeEvent>,
        ) -> Result<()> {
            assert_eq!(tokens.token().await, "token");
            for event in self.script.drain(..) {
                let _ = events.send(event);
            }
            if self.keep_open {
                self.hold = Some(events);
            }
            Ok(())
        }
    }

    fn ready(id: &str) -> RuntimeEvent {
        RuntimeEvent::Ready {
            device_id: DeviceId(id.to_owned()),
        }
    }

    fn player(server: &Server, runtime: ScriptedRuntime) -> Player<ScriptedRuntime> {
        let config = Config {
            api_url: Url::parse(&server.url()).unwrap(),
            playlist_id: "list".to_owned(),
            ready_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let http_client = Arc::new(HttpClient::new(&config).unwrap());
        Player::new(&config, http_client, runtime)
    }

    async fn volume_mock(server: &mut Server) -> mockito::Mock {
        server
            .mock("PUT", "/me/player/volume")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn init_session_ignores_errors_until_ready() {
        let mut server = Server::new_async().await;
        let volume = server
            .mock("PUT", "/me/player/volume")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("volume_percent".into(), "70".into()),
                Matcher::UrlEncoded("device_id".into(), "dev-1".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        let runtime = ScriptedRuntime {
            script: vec![
                RuntimeEvent::InitializationError("warming up".to_owned()),
                RuntimeEvent::AccountError("premium required".to_owned()),
                ready("dev-1"),
            ],
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);
        assert_eq!(player.state(), &State::Uninitialized);

        let device_id = player.init_session("token".to_owned()).await.unwrap();

        assert_eq!(device_id, DeviceId("dev-1".to_owned()));
        assert_eq!(player.device_id(), Some(&device_id));
        assert_eq!(player.runtime().loads, 1);
        volume.assert_async().await;
    }

    #[tokio::test]
    async fn runtime_is_loaded_only_once() {
        let mut server = Server::new_async().await;
        let _volume = volume_mock(&mut server).await;

        let runtime = ScriptedRuntime {
            loaded: true,
            script: vec![ready("dev-1")],
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);
        player.init_session("token".to_owned()).await.unwrap();

        assert_eq!(player.runtime().loads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn init_session_times_out() {
        let server = Server::new_async().await;
        let runtime = ScriptedRuntime {
            keep_open: true,
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);

        let err = player.init_session("token".to_owned()).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert_eq!(player.state(), &State::AwaitingDevice);
    }

    #[tokio::test]
    async fn closed_runtime_aborts_init() {
        let server = Server::new_async().await;
        let mut player = player(&server, ScriptedRuntime::default());

        let err = player.init_session("token".to_owned()).await.unwrap_err();
        assert!(matches!(
            err.downcast::<PlaybackError>(),
            Some(PlaybackError::RuntimeClosed)
        ));
    }

    #[tokio::test]
    async fn play_before_ready_makes_no_request() {
        let mut server = Server::new_async().await;
        let play = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut player = player(&server, ScriptedRuntime::default());
        player.set_token("token".to_owned()).await;
        let err = player.play("spotify:track:a").await.unwrap_err();

        assert!(matches!(
            err.downcast::<PlaybackError>(),
            Some(PlaybackError::DeviceNotReady)
        ));
        play.assert_async().await;
    }

    #[tokio::test]
    async fn play_targets_ready_device() {
        let mut server = Server::new_async().await;
        let _volume = volume_mock(&mut server).await;
        let play = server
            .mock("PUT", "/me/player/play")
            .match_query(Matcher::UrlEncoded("device_id".into(), "dev-1".into()))
            .match_header("authorization", "Bearer token")
            .match_body(Matcher::Json(
                serde_json::json!({ "uris": ["spotify:track:a"] }),
            ))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let runtime = ScriptedRuntime {
            script: vec![ready("dev-1")],
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);
        player.init_session("token".to_owned()).await.unwrap();
        player.play("spotify:track:a").await.unwrap();

        play.assert_async().await;
    }

    #[tokio::test]
    async fn refused_play_command_is_reported() {
        let mut server = Server::new_async().await;
        let _volume = volume_mock(&mut server).await;
        let _play = server
            .mock("PUT", "/me/player/play")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let runtime = ScriptedRuntime {
            script: vec![ready("dev-1")],
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);
        player.init_session("token".to_owned()).await.unwrap();
        let err = player.play("spotify:track:a").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert!(matches!(
            err.downcast::<PlaybackError>(),
            Some(PlaybackError::Command(status)) if *status == StatusCode::BAD_GATEWAY
        ));
    }

    #[tokio::test]
    async fn device_going_away_blocks_play() {
        let mut server = Server::new_async().await;
        let _volume = volume_mock(&mut server).await;
        let play = server
            .mock("PUT", "/me/player/play")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let runtime = ScriptedRuntime {
            script: vec![
                ready("dev-1"),
                RuntimeEvent::NotReady {
                    device_id: DeviceId("dev-1".to_owned()),
                },
            ],
            ..ScriptedRuntime::default()
        };
        let mut player = player(&server, runtime);
        player.init_session("token".to_owned()).await.unwrap();

        let err = player.play("spotify:track:a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert_eq!(player.state(), &State::AwaitingDevice);
        play.assert_async().await;
    }

    #[tokio::test]
    async fn random_track_skips_unplayable_entries() {
        let mut server = Server::new_async().await;
        let _tracks = server
            .mock("GET", "/playlists/list/tracks")
            .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"track":null},
                    {"track":{"uri":"spotify:track:only","artists":[{"id":"artistX","name":"X"}]}},
                    {"track":{"uri":null,"artists":[]}}
                ]}"#,
            )
            .create_async()
            .await;

        let mut player = player(&server, ScriptedRuntime::default());
        player.set_token("token".to_owned()).await;

        for _ in 0..10 {
            let track = player.pick_random_track().await.unwrap();
            assert_eq!(track.uri, "spotify:track:only");
        }
    }

    #[tokio::test]
    async fn random_track_is_drawn_from_whole_page() {
        let mut server = Server::new_async().await;
        let _tracks = server
            .mock("GET", "/playlists/list/tracks")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items":[
                    {"track":{"uri":"spotify:track:a","artists":[]}},
                    {"track":{"uri":"spotify:track:b","artists":[]}}
                ]}"#,
            )
            .create_async()
            .await;

        let mut player = player(&server, ScriptedRuntime::default());
        player.set_token("token".to_owned()).await;

        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            seen.insert(player.pick_random_track().await.unwrap().uri);
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn empty_playlist_has_no_tracks() {
        let mut server = Server::new_async().await;
        let _tracks = server
            .mock("GET", "/playlists/list/tracks")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[{"track":null}]}"#)
            .create_async()
            .await;

        let mut player = player(&server, ScriptedRuntime::default());
        player.set_token("token".to_owned()).await;
        let err = player.pick_random_track().await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(matches!(
            err.downcast::<PlaybackError>(),
            Some(PlaybackError::NoTracks(_))
        ));
    }

    #[tokio::test]
    async fn failed_playlist_request_has_no_tracks() {
        let mut server = Server::new_async().await;
        let _tracks = server
            .mock("GET", "/playlists/list/tracks")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let mut player = player(&server, ScriptedRuntime::default());
        player.set_token("token".to_owned()).await;
        let err = player.pick_random_track().await.unwrap_err();

        assert!(matches!(
            err.downcast::<PlaybackError>(),
            Some(PlaybackError::NoTracks(_))
        ));
    }

    #[tokio::test]
    async fn picking_without_token_is_unauthenticated() {
        let server = Server::new_async().await;
        let player = player(&server, ScriptedRuntime::default());

        let err = player.pick_random_track().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
    }
}
