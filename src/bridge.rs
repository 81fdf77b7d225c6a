//! Glue between the game and Spotify.
//!
//! A run starts with a token, a ready playback device, and the first
//! track and sprite. After that the game is started. Every checkpoint the
//! game reports picks a new track and a sprite to match its artist.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    auth::CredentialManager,
    config::Config,
    error::{Error, Result},
    events::Event,
    game::GameHooks,
    http::Client as HttpClient,
    location::Location,
    manifest::{Manifest, ManifestSource},
    player::Player,
    runtime::Runtime,
};

/// Drives a run: session setup, then a track change per checkpoint.
pub struct Bridge<R, L, H> {
    credentials: CredentialManager,
    location: L,
    player: Player<R>,
    hooks: H,

    http_client: Arc<HttpClient>,
    manifest_source: ManifestSource,
    default_sprite: String,

    /// Loaded on first use, then kept for the rest of the run.
    manifest: Option<Manifest>,

    /// Set once a refresh failed mid-run, so the warning is logged once.
    token_lost: bool,
}

impl<R, L, H> Bridge<R, L, H>
where
    R: Runtime,
    L: Location,
    H: GameHooks,
{
    pub fn new(
        config: &Config,
        http_client: Arc<HttpClient>,
        credentials: CredentialManager,
        location: L,
        player: Player<R>,
        hooks: H,
    ) -> Self {
        Self {
            credentials,
            location,
            player,
            hooks,
            http_client,
            manifest_source: config.manifest.clone(),
            default_sprite: config.default_sprite.clone(),
            manifest: None,
            token_lost: false,
        }
    }

    #[must_use]
    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn location_mut(&mut self) -> &mut L {
        &mut self.location
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    #[must_use]
    pub fn player(&self) -> &Player<R> {
        &self.player
    }

    /// Starts playback and the game.
    ///
    /// # Errors
    ///
    /// Returns an unauthenticated error when the user must log in first. In
    /// that case the location was pointed at the login page. Session,
    /// track, and hook failures are returned as they are.
    pub async fn start_run(&mut self) -> Result<()> {
        let token = self
            .credentials
            .ensure_token(&mut self.location)
            .await?
            .ok_or_else(|| Error::unauthenticated("login required"))?;

        self.player.init_session(token).await?;
        self.next_track_and_image().await?;
        self.hooks.start_game()?;

        info!("run started");
        Ok(())
    }

    /// Moves on to a new track and sprite.
    ///
    /// The game keeps running whatever happens here, so failures are only
    /// logged.
    pub async fn on_checkpoint(&mut self, speed_level: u32) {
        debug!("checkpoint reached at speed level {speed_level}");
        if let Err(e) = self.checkpoint().await {
            warn!("could not change track at checkpoint: {e}");
        }
    }

    /// Refreshes the token if needed, then changes track.
    ///
    /// No login is started here: nobody can complete one while the game
    /// runs. Without a usable token the current one is kept.
    async fn checkpoint(&mut self) -> Result<()> {
        match self.credentials.access_token().await? {
            Some(token) => {
                self.token_lost = false;
                self.player.set_token(token).await;
            }
            None if !self.token_lost => {
                self.token_lost = true;
                warn!("access token could not be refreshed; restart to log in again");
            }
            None => trace!("still no fresh access token"),
        }

        self.next_track_and_image().await
    }

    /// Picks a track, shows a sprite for its artist, then plays it.
    ///
    /// # Errors
    ///
    /// Returns error if no track can be picked, the manifest cannot be
    /// loaded, the sprite hook fails, or playback is refused.
    pub async fn next_track_and_image(&mut self) -> Result<()> {
        let track = self.player.pick_random_track().await?;
        let artist_id = track.first_artist_id();

        if self.manifest.is_none() {
            let manifest = Manifest::load(&self.manifest_source, &self.http_client).await?;
            self.manifest = Some(manifest);
        }

        let sprite = self
            .manifest
            .as_ref()
            .map_or(self.default_sprite.as_str(), |manifest| {
                manifest.sprite_for(artist_id, &self.default_sprite)
            });
        debug!(
            "artist {} gets sprite {sprite}",
            artist_id.unwrap_or("(unknown)")
        );
        self.hooks.set_enemy_sprite(sprite)?;

        self.player.play(&track.uri).await
    }

    /// Handles game events until the game quits or stops sending.
    ///
    /// Checkpoints that queued up while the previous one was handled are
    /// collapsed into the newest.
    pub async fn run(&mut self, events: &mut mpsc::UnboundedReceiver<Event>) {
        while let Some(mut event) = events.recv().await {
            let mut skipped = 0;
            while matches!(event, Event::Checkpoint { .. }) {
                match events.try_recv() {
                    Ok(next) => {
                        event = next;
                        skipped += 1;
                    }
                    Err(_) => break,
                }
            }

            if skipped > 0 {
                debug!("skipped {skipped} stale events");
            }

            match event {
                Event::Checkpoint { speed_level } => self.on_checkpoint(speed_level).await,
                Event::Quit => {
                    info!("game quit");
                    break;
                }
            }
        }
    }
}
