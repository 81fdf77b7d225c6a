//! Enemy sprite manifest: which images may stand in for which artist.
//!
//! The manifest is a JSON object mapping Spotify artist ids to image URLs:
//!
//! ```json
//! {
//!     "0OdUWJ0sBjDrqHygGUXeCF": ["/assets/band-of-horses-1.png"],
//!     "4Z8W4fKeB5YxbusRsdQVPb": ["/assets/radiohead-1.png", "/assets/radiohead-2.png"]
//! }
//! ```

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::{
    error::{Error, Result},
    http::Client as HttpClient,
    protocol,
};

/// Where the manifest is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestSource {
    File(PathBuf),
    Remote(Url),
}

impl FromStr for ManifestSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::invalid_argument("manifest location is empty"));
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::Remote(s.parse()?));
        }

        Ok(Self::File(PathBuf::from(s)))
    }
}

impl<'de> Deserialize<'de> for ManifestSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Manifest(HashMap<String, Vec<String>>);

impl Manifest {
    const MAX_FILE_SIZE: u64 = 1024 * 1024;

    /// Reads and parses the manifest.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest cannot be read, the server answers with
    /// a failure status, or the contents are not a manifest.
    pub async fn load(source: &ManifestSource, http_client: &HttpClient) -> Result<Self> {
        let body = match source {
            ManifestSource::File(path) => {
                let file_size = tokio::fs::metadata(path).await?.len();
                if file_size > Self::MAX_FILE_SIZE {
                    return Err(Error::resource_exhausted(format!(
                        "{} is too large ({file_size} bytes)",
                        path.display()
                    )));
                }
                tokio::fs::read_to_string(path).await?
            }
            ManifestSource::Remote(url) => {
                let request = reqwest::Request::new(reqwest::Method::GET, url.clone());
                let (status, body) = http_client.text(request).await?;
                if !status.is_success() {
                    return Err(Error::unavailable(format!(
                        "manifest request failed with status {status}"
                    )));
                }
                body
            }
        };

        let manifest: Self = protocol::json(&body, "manifest")?;
        debug!(
            "loaded manifest from {source} with {} artists",
            manifest.0.len()
        );
        Ok(manifest)
    }

    /// Picks one of the artist's sprites, or `default` if it has none.
    #[must_use]
    pub fn sprite_for<'a>(&'a self, artist_id: Option<&str>, default: &'a str) -> &'a str {
        artist_id
            .and_then(|id| self.0.get(id))
            .and_then(|sprites| fastrand::choice(sprites))
            .map_or(default, String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for Manifest {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
