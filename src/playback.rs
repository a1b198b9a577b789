//! What the user is listening to.
//!
//! A [`Playback`] is assembled once per sync cycle from the Ynison session
//! state and the catalog metadata of the current track. It is the only input
//! to the status formatter and decides whether the profile shows a status or
//! the user's own text.

use std::fmt;

use crate::error::Error;

/// Player state of a Ynison session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlayerState {
    /// A track is selected and not paused.
    pub is_playing: bool,

    /// Catalog id of the selected track, if any.
    pub track_id: Option<String>,

    pub progress_ms: u64,
    pub duration_ms: u64,

    /// Position in the play queue; negative when nothing is selected.
    pub queue_index: i64,
}

/// Catalog metadata of a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Credited artists in catalog order. May be empty.
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Zero when the catalog does not know.
    pub duration_ms: u64,
}

impl Track {
    pub const UNKNOWN_ARTIST: &'static str = "Unknown Artist";
    pub const UNKNOWN_ALBUM: &'static str = "Unknown Album";

    /// Artists joined by `", "`, or [`Self::UNKNOWN_ARTIST`].
    #[must_use]
    pub fn artists(&self) -> String {
        if self.artists.is_empty() {
            Self::UNKNOWN_ARTIST.to_owned()
        } else {
            self.artists.join(", ")
        }
    }

    /// Album title, or [`Self::UNKNOWN_ALBUM`].
    #[must_use]
    pub fn album(&self) -> &str {
        self.album.as_deref().unwrap_or(Self::UNKNOWN_ALBUM)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artists(), self.title, self.album())
    }
}

/// Outcome of looking up the current playback.
#[derive(Debug)]
pub enum Playback {
    /// A track is playing.
    ///
    /// `state.duration_ms` is the best known duration: the catalog's, or
    /// the session's when the catalog reports none.
    Playing { track: Track, state: PlayerState },

    /// Nothing is playing: empty queue, nothing selected or paused.
    Idle,

    /// Playback could not be determined this cycle.
    Unavailable(Error),
}

impl Playback {
    /// Combines session state with catalog metadata.
    #[must_use]
    pub fn playing(track: Track, mut state: PlayerState) -> Self {
        if track.duration_ms > 0 {
            state.duration_ms = track.duration_ms;
        }
        Self::Playing { track, state }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing { .. })
    }
}

impl fmt::Display for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing { track, .. } => write!(f, "playing {track}"),
            Self::Idle => write!(f, "idle"),
            Self::Unavailable(e) => write!(f, "unavailable ({e})"),
        }
    }
}
