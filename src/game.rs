//! Calls into the game.
//!
//! The game exposes two hooks: one that starts it, and one that swaps the
//! image of the enemy chasing the player.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;

pub trait GameHooks {
    fn start_game(&mut self) -> Result<()>;
    fn set_enemy_sprite(&mut self, url: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
enum Hook<'a> {
    StartGame,
    SetEnemySprite { url: &'a str },
}

/// Hooks written as one JSON object per line, for a game reading them from a
/// pipe.
#[derive(Debug)]
pub struct JsonLinesHooks<W> {
    writer: W,
}

impl<W: Write> JsonLinesHooks<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn call(&mut self, hook: &Hook<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, hook)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        trace!("called hook {hook:?}");
        Ok(())
    }
}

impl<W: Write> GameHooks for JsonLinesHooks<W> {
    fn start_game(&mut self) -> Result<()> {
        self.call(&Hook::StartGame)
    }

    fn set_enemy_sprite(&mut self, url: &str) -> Result<()> {
        self.call(&Hook::SetEnemySprite { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_object_per_hook() {
        let mut hooks = JsonLinesHooks::new(Vec::new());
        hooks.start_game().unwrap();
        hooks.set_enemy_sprite("/assets/x \"1\".png").unwrap();

        let output = String::from_utf8(hooks.into_inner()).unwrap();
        assert_eq!(
            output,
            "{\"hook\":\"start_game\"}\n\
             {\"hook\":\"set_enemy_sprite\",\"url\":\"/assets/x \\\"1\\\".png\"}\n"
        );
    }
}
