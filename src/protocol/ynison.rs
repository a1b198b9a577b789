//! Ynison wire types.
//!
//! Ynison is the session service behind Yandex Music's "play on another
//! device". Finding out what a user is listening to takes two websocket
//! round trips:
//!
//! 1. The redirector answers a device descriptor with the host that serves
//!    the user's session, and a ticket for it ([`Redirect`]).
//! 2. That host accepts a full player state ([`PutState`]) and answers with
//!    the state of the whole session ([`Document`]).
//!
//! Both requests carry the device descriptor ([`Descriptor`]) JSON-encoded
//! inside the `Sec-WebSocket-Protocol` header:
//!
//! ```text
//! Sec-WebSocket-Protocol: Bearer, v2, {"Ynison-Device-Id":"qkzv...","Ynison-Device-Info":"{\"app_name\":\"Chrome\",\"type\":1}"}
//! ```
//!
//! # Numbers
//!
//! The service speaks protobuf-flavoured JSON, where 64-bit integers may be
//! encoded as strings. Such fields accept both forms.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{json::JsonString, serde_as, DisplayFromStr, PickFirst};
use uuid::Uuid;
use veil::Redact;

use crate::playback::PlayerState;

/// Identity of this process as a Ynison device.
///
/// Generated once per run. The session service lists it among the user's
/// devices, so it is registered as a shadow device that never becomes
/// active.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Device {
    /// Opaque random identifier.
    pub id: String,
    /// Application name reported in the device info.
    pub app_name: String,
    /// Human readable device title.
    pub title: String,
}

impl Device {
    /// Length of a generated device identifier.
    pub const ID_LENGTH: usize = 16;

    /// Creates a device with a random identifier of lowercase ASCII letters.
    #[must_use]
    pub fn random() -> Self {
        let id = (0..Self::ID_LENGTH).map(|_| fastrand::lowercase()).collect();
        Self {
            id,
            app_name: "Chrome".to_owned(),
            title: "Chrome Browser".to_owned(),
        }
    }

    /// The descriptor to send to the redirector.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor<'_> {
        Descriptor {
            device_id: &self.id,
            device_info: DescriptorInfo {
                app_name: &self.app_name,
                typ: DescriptorInfo::TYPE_WEB,
            },
            redirect_ticket: None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.title)
    }
}

/// Device descriptor sent in the `Sec-WebSocket-Protocol` header.
#[serde_as]
#[derive(Clone, Serialize, Redact)]
pub struct Descriptor<'a> {
    #[serde(rename = "Ynison-Device-Id")]
    pub device_id: &'a str,

    /// Nested JSON document, sent as a string.
    #[serde(rename = "Ynison-Device-Info")]
    #[serde_as(as = "JsonString")]
    pub device_info: DescriptorInfo<'a>,

    /// Ticket from the redirector; only sent to the state service.
    #[serde(
        rename = "Ynison-Redirect-Ticket",
        skip_serializing_if = "Option::is_none"
    )]
    #[redact]
    pub redirect_ticket: Option<&'a str>,
}

impl<'a> Descriptor<'a> {
    /// Adds the ticket obtained from the redirector.
    #[must_use]
    pub fn with_ticket(mut self, ticket: &'a str) -> Self {
        self.redirect_ticket = Some(ticket);
        self
    }

    /// The value of the `Sec-WebSocket-Protocol` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be serialized.
    pub fn protocol_header(&self) -> serde_json::Result<String> {
        serde_json::to_string(self).map(|json| format!("Bearer, v2, {json}"))
    }
}

#[derive(Copy, Clone, Debug, Serialize)]
pub struct DescriptorInfo<'a> {
    pub app_name: &'a str,
    #[serde(rename = "type")]
    pub typ: u8,
}

impl DescriptorInfo<'_> {
    const TYPE_WEB: u8 = 1;
}

/// Reply of the redirector.
#[derive(Clone, Deserialize, Redact)]
pub struct Redirect {
    /// Host (and optional port) that serves the session.
    pub host: String,

    /// Ticket to present to `host`.
    #[redact]
    pub redirect_ticket: String,
}

/// Version stamp of a piece of player state.
///
/// The service drops updates that carry an older version than it has seen
/// for a device.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Version {
    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub version: u64,

    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub timestamp_ms: u64,
}

/// Entry of a play queue.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Playable {
    pub playable_id: String,

    /// `TRACK`, `LOCAL_TRACK`, `VIDEO_CLIP`, ...
    #[serde(default)]
    pub playable_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id_optional: Option<String>,

    #[serde(default)]
    pub from: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct QueueOptions {
    #[serde(default)]
    pub repeat_mode: String,
}

/// Play queue of a session.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Queue {
    /// Index into `playable_list`; `-1` when nothing is selected.
    ///
    /// Omitted by the service when zero.
    #[serde(default)]
    pub current_playable_index: i64,

    #[serde(default)]
    pub entity_id: String,

    #[serde(default)]
    pub entity_type: String,

    #[serde(default)]
    pub playable_list: Vec<Playable>,

    #[serde(default)]
    pub options: QueueOptions,

    #[serde(default)]
    pub entity_context: String,

    #[serde(default)]
    pub version: Option<Version>,

    #[serde(default)]
    pub from_optional: String,
}

impl Queue {
    /// The playable that `current_playable_index` points at, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Playable> {
        usize::try_from(self.current_playable_index)
            .ok()
            .and_then(|index| self.playable_list.get(index))
    }
}

/// Playback status of a session.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Status {
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub duration_ms: u64,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub playback_speed: f64,

    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub progress_ms: u64,

    #[serde(default)]
    pub version: Option<Version>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PlayerStateWire {
    pub player_queue: Queue,
    pub status: Status,
}

#[derive(Copy, Clone, Debug, Serialize)]
pub struct Capabilities {
    pub can_be_player: bool,
    pub can_be_remote_controller: bool,
    pub volume_granularity: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(rename = "type")]
    pub typ: &'static str,
    pub title: String,
    pub app_name: String,
}

#[derive(Copy, Clone, Debug, Serialize)]
pub struct VolumeInfo {
    pub volume: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeviceState {
    pub capabilities: Capabilities,
    pub info: DeviceInfo,
    pub volume_info: VolumeInfo,
    pub is_shadow: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateFullState {
    pub player_state: PlayerStateWire,
    pub device: DeviceState,
    pub is_currently_active: bool,
}

/// Request for `PutYnisonState`.
///
/// Puts an empty, paused queue for our shadow device. The service answers
/// with the state of the session, which is all we are after: we never push
/// playback state of our own.
#[derive(Clone, Debug, Serialize)]
pub struct PutState {
    pub update_full_state: UpdateFullState,
    pub rid: Uuid,
    pub player_action_timestamp_ms: u64,
    pub activity_interception_type: &'static str,
}

impl PutState {
    /// Builds a read-only state query.
    ///
    /// `queue_version` and `status_version` tag the two halves of the
    /// player state.
    #[must_use]
    pub fn query(device: &Device, queue_version: Version, status_version: Version) -> Self {
        let player_queue = Queue {
            current_playable_index: -1,
            entity_id: String::new(),
            entity_type: "VARIOUS".to_owned(),
            playable_list: Vec::new(),
            options: QueueOptions {
                repeat_mode: "NONE".to_owned(),
            },
            entity_context: "BASED_ON_ENTITY_BY_DEFAULT".to_owned(),
            version: Some(queue_version),
            from_optional: String::new(),
        };

        let status = Status {
            duration_ms: 0,
            paused: true,
            playback_speed: 1.0,
            progress_ms: 0,
            version: Some(status_version),
        };

        let device = DeviceState {
            capabilities: Capabilities {
                can_be_player: true,
                can_be_remote_controller: false,
                volume_granularity: 16,
            },
            info: DeviceInfo {
                device_id: device.id.clone(),
                typ: "WEB",
                title: device.title.clone(),
                app_name: device.app_name.clone(),
            },
            volume_info: VolumeInfo { volume: 0.0 },
            is_shadow: true,
        };

        Self {
            update_full_state: UpdateFullState {
                player_state: PlayerStateWire {
                    player_queue,
                    status,
                },
                device,
                is_currently_active: false,
            },
            rid: Uuid::new_v4(),
            player_action_timestamp_ms: 0,
            activity_interception_type: "DO_NOT_INTERCEPT_BY_DEFAULT",
        }
    }
}

/// State of a Ynison session, as answered by `PutYnisonState`.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Document {
    pub player_state: PlayerStateWire,

    #[serde(default)]
    pub active_device_id_optional: Option<String>,

    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub timestamp_ms: u64,
}

impl Document {
    /// Highest version number carried by the queue or status.
    #[must_use]
    pub fn highest_version(&self) -> u64 {
        let state = &self.player_state;
        [&state.player_queue.version, &state.status.version]
            .into_iter()
            .flatten()
            .map(|version| version.version)
            .max()
            .unwrap_or_default()
    }

    /// Extracts the player state of the session.
    ///
    /// The session counts as playing only when a queue entry is selected and
    /// the status is not paused.
    #[must_use]
    pub fn player_state(&self) -> PlayerState {
        let queue = &self.player_state.player_queue;
        let status = &self.player_state.status;

        let track_id = queue.current().map(|playable| playable.playable_id.clone());
        let is_playing = track_id.is_some() && !status.paused;

        PlayerState {
            is_playing,
            track_id,
            progress_ms: status.progress_ms,
            duration_ms: status.duration_ms,
            queue_index: queue.current_playable_index,
        }
    }
}
