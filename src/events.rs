//! Events the game reports to the bridge.
//!
//! Events arrive as text lines:
//!
//! ```text
//! checkpoint 3
//! checkpoint
//! quit
//! ```
//!
//! # Example
//!
//! ```rust
//! use mazetune::events::Event;
//!
//! let event: Event = "checkpoint 3".parse().unwrap();
//! assert_eq!(event, Event::Checkpoint { speed_level: 3 });
//! ```

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The player reached a checkpoint. Triggers a new track and sprite.
    ///
    /// The speed level is informational only.
    Checkpoint { speed_level: u32 },

    /// The game is over.
    Quit,
}

impl Event {
    /// Parses one line, returning `None` for blank lines.
    ///
    /// # Errors
    ///
    /// Returns error if the line holds anything but a known event.
    pub fn from_line(line: &str) -> Result<Option<Self>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        line.parse().map(Some)
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let event = match (words.next(), words.next()) {
            (Some("checkpoint"), None) => Self::Checkpoint { speed_level: 0 },
            (Some("checkpoint"), Some(level)) => Self::Checkpoint {
                speed_level: level.parse().map_err(|_| {
                    Error::invalid_argument(format!("invalid speed level \"{level}\""))
                })?,
            },
            (Some("quit"), None) => Self::Quit,
            _ => return Err(Error::invalid_argument(format!("unknown event \"{s}\""))),
        };

        if words.next().is_some() {
            return Err(Error::invalid_argument(format!(
                "trailing input in event \"{s}\""
            )));
        }

        Ok(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkpoint { speed_level } => write!(f, "checkpoint {speed_level}"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_checkpoints() {
        assert_eq!(
            "checkpoint 3".parse::<Event>().unwrap(),
            Event::Checkpoint { speed_level: 3 }
        );
        assert_eq!(
            "  checkpoint  ".parse::<Event>().unwrap(),
            Event::Checkpoint { speed_level: 0 }
        );
    }

    #[test]
    fn parses_quit() {
        assert_eq!("quit".parse::<Event>().unwrap(), Event::Quit);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(Event::from_line("").unwrap(), None);
        assert_eq!(Event::from_line(" \t").unwrap(), None);
        assert_eq!(Event::from_line("quit").unwrap(), Some(Event::Quit));
    }

    #[test]
    fn rejects_unknown_input() {
        for line in ["jump", "checkpoint fast", "quit now", "checkpoint 1 2"] {
            let err = line.parse::<Event>().unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "{line}");
        }
    }
}
