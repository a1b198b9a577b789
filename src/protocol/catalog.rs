//! Yandex Music catalog responses.
//!
//! `GET /tracks/{id}` wraps its result like every other catalog endpoint:
//!
//! ```json
//! {
//!     "invocationInfo": {"req-id": "...", "hostname": "..."},
//!     "result": [{"id": "9982", "title": "...", "artists": [...], "albums": [...], "durationMs": 185000}]
//! }
//! ```

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::playback;

/// Envelope of catalog responses.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Response<T> {
    pub result: T,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Artist {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Album {
    #[serde(default)]
    pub title: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(default)]
    pub albums: Vec<Album>,

    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub duration_ms: u64,

    #[serde(default)]
    pub available: Option<bool>,
}

impl Track {
    /// Converts into track metadata for `id`.
    ///
    /// Nameless artists are dropped. Returns `None` when the track has no
    /// title.
    #[must_use]
    pub fn into_track(self, id: &str) -> Option<playback::Track> {
        let title = self.title.filter(|title| !title.is_empty())?;
        let artists = self
            .artists
            .into_iter()
            .filter_map(|artist| artist.name)
            .filter(|name| !name.is_empty())
            .collect();
        let album = self
            .albums
            .into_iter()
            .find_map(|album| album.title)
            .filter(|title| !title.is_empty());

        Some(playback::Track {
            id: id.to_owned(),
            title,
            artists,
            album,
            duration_ms: self.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_track_metadata() {
        let json = r#"{"result": [{
            "id": 9982,
            "title": "Kalinka",
            "artists": [{"name": "Ensemble"}, {"id": 3}, {"name": "Choir"}],
            "albums": [{"title": "Folk"}],
            "durationMs": 185000
        }]}"#;
        let response: Response<Vec<Track>> = serde_json::from_str(json).unwrap();
        let track = response
            .result
            .into_iter()
            .next()
            .and_then(|track| track.into_track("9982"))
            .unwrap();

        assert_eq!(track.id, "9982");
        assert_eq!(track.title, "Kalinka");
        assert_eq!(track.artists, ["Ensemble", "Choir"]);
        assert_eq!(track.album.as_deref(), Some("Folk"));
        assert_eq!(track.duration_ms, 185_000);
    }

    #[test]
    fn untitled_track_is_dropped() {
        let track = Track {
            title: Some(String::new()),
            ..Track::default()
        };
        assert_eq!(track.into_track("1"), None);
    }
}
