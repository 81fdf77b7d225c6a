//! Where the user agent currently is in the login flow.
//!
//! The authorization server talks to mazetune through redirects. A
//! [`Location`] is the current URL together with the two ways of changing
//! it: replacing it in place after its one-time parameters are used, or
//! navigating the user away to log in.

use url::Url;

use crate::error::Result;

pub trait Location {
    /// The current URL.
    fn href(&self) -> Url;

    /// Changes the current URL without navigating.
    fn replace(&mut self, url: Url);

    /// Navigates away to `url`. Nothing more happens at the current location
    /// until the user comes back through the redirect URI.
    fn assign(&mut self, url: Url) -> Result<()>;
}

/// Location of a headless process.
///
/// Navigation is delegated to the user: the URL to open is logged and kept
/// as pending until the redirected URL is handed back via
/// [`replace`](Location::replace).
#[derive(Clone, Debug)]
pub struct ConsoleLocation {
    current: Url,
    pending: Option<Url>,
}

impl ConsoleLocation {
    #[must_use]
    pub fn new(current: Url) -> Self {
        Self {
            current,
            pending: None,
        }
    }

    /// URL the user still needs to open, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&Url> {
        self.pending.as_ref()
    }
}

impl Location for ConsoleLocation {
    fn href(&self) -> Url {
        self.current.clone()
    }

    fn replace(&mut self, url: Url) {
        self.current = url;
        self.pending = None;
    }

    fn assign(&mut self, url: Url) -> Result<()> {
        info!("open this URL in a browser to log in to Spotify:");
        info!("{url}");
        self.pending = Some(url);
        Ok(())
    }
}

/// Removes the named query parameters from `url`, returning whether any
/// were present.
pub fn strip_query(url: &mut Url, names: &[&str]) -> bool {
    let before = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !names.contains(&&**name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.len() == before {
        return false;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    true
}

/// First value of the named query parameter.
#[must_use]
pub fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
