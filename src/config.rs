//! Settings read from a TOML file.
//!
//! Missing fields fall back to their defaults, except `client_id` which
//! must be set. The device name can also be given on the command line.

use std::{fs, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::{
    error::{Error, Result},
    manifest::ManifestSource,
};

/// Application configuration.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,

    pub playlist_id: String,
    pub device_name: String,
    pub volume: u8,

    /// How long to wait for the playback device; zero waits forever.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ready_timeout: Duration,

    pub manifest: ManifestSource,
    pub default_sprite: String,

    /// Directory holding the persisted credential record.
    pub state_dir: PathBuf,

    pub accounts_url: Url,
    pub api_url: Url,

    #[serde(skip)]
    pub user_agent: String,
}

impl Config {
    /// Configuration files are small; anything larger is refused unread.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Reads a TOML configuration file.
    ///
    /// Fields missing from the file keep their defaults, except `client_id`
    /// which must be set.
    pub fn from_file(path: &str) -> Result<Self> {
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{path} is too large ({file_size} bytes)"
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        trace!("configuration: {config:#?}");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.user_agent = Self::build_user_agent();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::invalid_argument("client_id must be set"));
        }

        if self.playlist_id.trim().is_empty() {
            return Err(Error::invalid_argument("playlist_id must be set"));
        }

        if self.volume > 100 {
            return Err(Error::invalid_argument(format!(
                "volume must be a percentage but is {}",
                self.volume
            )));
        }

        Ok(())
    }

    /// Space separated scopes as the authorize endpoint expects them.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Option<Duration> {
        (!self.ready_timeout.is_zero()).then_some(self.ready_timeout)
    }

    fn build_user_agent() -> String {
        let app_name = env!("CARGO_PKG_NAME");
        let app_version = env!("CARGO_PKG_VERSION");

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.contains(|chr| chr == '/' || chr == ';'))
            .unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");
        user_agent
    }
}

impl Default for Config {
    fn default() -> Self {
        let scopes = [
            "streaming",
            "user-read-email",
            "user-modify-playback-state",
            "user-read-playback-state",
            "playlist-read-private",
        ];

        Self {
            client_id: String::new(),
            redirect_uri: Url::parse("http://127.0.0.1:8888/callback")
                .expect("invalid default redirect uri"),
            scopes: scopes.iter().map(ToString::to_string).collect(),

            playlist_id: "3uuQ3HbcZagjXAlBMzpKVg".to_owned(),
            device_name: "MazeRunner Web Player".to_owned(),
            volume: 70,
            ready_timeout: Duration::from_secs(30),

            manifest: ManifestSource::File(PathBuf::from("assets/manifest.json")),
            default_sprite: "/assets/default.png".to_owned(),

            state_dir: PathBuf::from(".mazetune"),

            accounts_url: Url::parse("https://accounts.spotify.com")
                .expect("invalid default accounts url"),
            api_url: Url::parse("https://api.spotify.com/v1").expect("invalid default api url"),

            user_agent: Self::build_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = Config::from_toml(r#"client_id = "abc123""#).unwrap();

        assert_eq!(config.client_id, "abc123");
        assert_eq!(config.playlist_id, "3uuQ3HbcZagjXAlBMzpKVg");
        assert_eq!(config.device_name, "MazeRunner Web Player");
        assert_eq!(config.ready_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.scope(),
            "streaming user-read-email user-modify-playback-state user-read-playback-state playlist-read-private"
        );
        assert!(config.user_agent.starts_with("mazetune/"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_toml(
            r#"
            client_id = "abc123"
            redirect_uri = "https://game.example.com/"
            playlist_id = "xyz"
            ready_timeout = 0
            manifest = "https://game.example.com/assets/manifest.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.redirect_uri.as_str(), "https://game.example.com/");
        assert_eq!(config.playlist_id, "xyz");
        assert_eq!(config.ready_timeout(), None);
        assert!(matches!(config.manifest, ManifestSource::Remote(_)));
    }

    #[test]
    fn missing_client_id_is_rejected() {
        let err = Config::from_toml(r#"playlist_id = "xyz""#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn volume_above_hundred_is_rejected() {
        let err = Config::from_toml("client_id = \"a\"\nvolume = 150").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
