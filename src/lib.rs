//! Spotify soundtrack for a maze game.
//!
//! Logs in with OAuth 2.0 Authorization Code + PKCE, plays random tracks
//! from one playlist on one Spotify Connect device, and tells the game which
//! enemy sprite fits the artist of each track. A new track is picked at
//! every checkpoint the game reports.
//!
//! # Modules
//!
//! * [`auth`], [`tokens`], [`pkce`], [`storage`], [`location`] - credentials
//! * [`player`], [`runtime`] - playback
//! * [`bridge`], [`manifest`], [`game`], [`events`] - the game side
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod http;
pub mod location;
pub mod manifest;
pub mod pkce;
pub mod player;
pub mod protocol;
pub mod runtime;
pub mod signal;
pub mod storage;
pub mod tokens;
