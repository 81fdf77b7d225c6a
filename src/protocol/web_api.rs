//! Spotify Web API payloads used for playback.
//!
//! # Wire Format
//!
//! Playlist items (`GET /playlists/{id}/tracks`):
//! ```json
//! {
//!     "items": [
//!         { "track": { "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
//!                      "artists": [{ "id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley" }] } },
//!         { "track": null }
//!     ]
//! }
//! ```
//!
//! Devices (`GET /me/player/devices`):
//! ```json
//! {
//!     "devices": [
//!         { "id": "5fbb3ba6", "is_active": false, "name": "MazeRunner Web Player",
//!           "type": "Computer", "volume_percent": 70 }
//!     ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Most items a single playlist page returns.
pub const PLAYLIST_PAGE_LIMIT: usize = 100;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PlaylistItems {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

/// One playlist entry. Removed or region-locked tracks come back as `null`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<TrackObject>,
}

/// A track as listed in a playlist, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Artist {
    /// Absent for local files.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// A playable track reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Track {
    pub uri: String,
    pub artists: Vec<Artist>,
}

impl Track {
    /// Id of the first credited artist, if it has one.
    #[must_use]
    pub fn first_artist_id(&self) -> Option<&str> {
        self.artists.first().and_then(|artist| artist.id.as_deref())
    }
}

impl PlaylistItems {
    /// Consumes the page, keeping only entries with a playable track.
    #[must_use]
    pub fn into_tracks(self) -> Vec<Track> {
        self.items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| match track.uri {
                Some(uri) if !uri.is_empty() => Some(Track {
                    uri,
                    artists: track.artists,
                }),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Device {
    /// Restricted devices may not expose an id.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl Devices {
    /// Id of the first device called `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&str> {
        self.devices
            .iter()
            .filter(|device| device.name == name)
            .find_map(|device| device.id.as_deref())
    }
}

/// Body of `PUT /me/player/play`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Play<'a> {
    pub uris: [&'a str; 1],
}
