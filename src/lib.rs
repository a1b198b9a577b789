//! Mirror the track playing on Yandex Music into a Telegram profile.
//!
//! Every cycle, ynison-bio:
//!
//! 1. asks the Ynison session service what the user is playing
//!    ([`ynison`])
//! 2. looks the track up in the catalog ([`catalog`])
//! 3. renders a status that fits the profile ([`status`])
//! 4. writes it to the profile, or gives the profile back to the user when
//!    the music stops ([`engine`], [`profile`], [`memory`])
//!
//! [`sync::Syncer`] runs a cycle; the binary runs it in a loop.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod alert;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod memory;
pub mod playback;
pub mod profile;
pub mod protocol;
pub mod retry;
pub mod signal;
pub mod status;
pub mod sync;
pub mod telegram;
pub mod token;
pub mod ynison;
