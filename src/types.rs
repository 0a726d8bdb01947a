//! Core data types shared between Players and the message pipeline
//!
//! # Main Types
//!
//! - [`Subscription`] - A panel's interest in a topic, optionally scoped to fields
//! - [`MessageEvent`] - A single message received on a topic
//! - [`PlayerState`] - The snapshot a Player emits on every frame
//! - [`ActiveData`] - Messages, topics and timing of the currently loaded source
//!
//! # Change detection
//!
//! The pipeline detects new data by `Arc` identity, not by deep equality. A
//! Player must hand out a new `Arc` for [`ActiveData::messages`],
//! [`ActiveData::topics`] and [`ActiveData::datatypes`] whenever their content
//! changes, and must keep handing out the *same* `Arc` while it does not.
//! Re-emitting an old `messages` Arc means "no new messages this frame".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::player::capabilities::PlayerCapabilities;

/// Opaque per-panel identifier
pub type SubscriberId = String;

/// Parameter values are schemaless
pub type ParameterValue = serde_json::Value;

/// Schema definitions keyed by schema name
pub type Datatypes = HashMap<String, MessageDefinition>;

/// Timestamp with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

impl Time {
    pub const ZERO: Time = Time { sec: 0, nsec: 0 };

    pub const MAX: Time = Time {
        sec: u32::MAX,
        nsec: 999_999_999,
    };

    /// Normalize so that nsec < 1e9, saturating at [`Time::MAX`]
    pub fn new(sec: u32, nsec: u32) -> Self {
        match sec.checked_add(nsec / 1_000_000_000) {
            Some(sec) => Self {
                sec,
                nsec: nsec % 1_000_000_000,
            },
            None => Self::MAX,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::from_duration(Duration::from_millis(ms))
    }

    /// Durations past `u32::MAX` seconds saturate to [`Time::MAX`]
    pub fn from_duration(d: Duration) -> Self {
        match u32::try_from(d.as_secs()) {
            Ok(sec) => Self {
                sec,
                nsec: d.subsec_nanos(),
            },
            Err(_) => Self::MAX,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::new(self.sec as u64, self.nsec)
    }

    /// Add a duration, saturating at the representable maximum
    pub fn saturating_add(&self, d: Duration) -> Self {
        Self::from_duration(self.as_duration().saturating_add(d))
    }

    /// Duration since `earlier`, or zero if `earlier` is later
    pub fn saturating_sub(&self, earlier: Time) -> Duration {
        self.as_duration().saturating_sub(earlier.as_duration())
    }
}

/// A named data channel advertised by the Player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub schema_name: Option<String>,
}

impl Topic {
    pub fn new(name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: Some(schema_name.into()),
        }
    }
}

/// A single field in a message definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinitionField {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_complex: bool,
}

/// Schema of a datatype
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub name: Option<String>,
    pub definitions: Vec<MessageDefinitionField>,
}

/// A message received on a topic
///
/// Cheap to clone: the decoded payload is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub topic: String,
    pub schema_name: String,
    pub receive_time: Time,
    pub message: Arc<serde_json::Value>,
    /// Approximate size of the encoded message
    pub size_in_bytes: usize,
}

impl MessageEvent {
    pub fn new(
        topic: impl Into<String>,
        schema_name: impl Into<String>,
        receive_time: Time,
        message: serde_json::Value,
    ) -> Self {
        let size_in_bytes = message.to_string().len();
        Self {
            topic: topic.into(),
            schema_name: schema_name.into(),
            receive_time,
            message: Arc::new(message),
            size_in_bytes,
        }
    }
}

/// Preload strategy requested by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadType {
    /// Backfill the whole source into memory
    Full,
    /// Continuous streaming around the playhead
    Partial,
}

/// A panel's declared interest in a topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: String,
    /// `None` behaves as [`PreloadType::Partial`]
    #[serde(default)]
    pub preload_type: Option<PreloadType>,
    /// `None` means all fields
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            preload_type: None,
            fields: None,
        }
    }

    pub fn with_preload(mut self, preload_type: PreloadType) -> Self {
        self.preload_type = Some(preload_type);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Effective preload type (unset means partial)
    pub fn preload(&self) -> PreloadType {
        self.preload_type.unwrap_or(PreloadType::Partial)
    }
}

/// A topic a panel wants to publish on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiseOptions {
    pub topic: String,
    pub schema_name: String,
    #[serde(default)]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AdvertiseOptions {
    pub fn new(topic: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            schema_name: schema_name.into(),
            options: None,
        }
    }
}

/// A message a panel publishes through the Player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub msg: serde_json::Value,
}

/// Source-level metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

/// Asset bytes returned by a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    pub uri: String,
    pub data: Vec<u8>,
    pub media_type: Option<String>,
}

/// Lifecycle of the Player's data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerPresence {
    /// No Player is attached
    #[default]
    NotPresent,
    Initializing,
    Present,
    Reconnecting,
    Buffering,
    Error,
}

impl PlayerPresence {
    /// Display name for the presence
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerPresence::NotPresent => "Not present",
            PlayerPresence::Initializing => "Initializing",
            PlayerPresence::Present => "Present",
            PlayerPresence::Reconnecting => "Reconnecting",
            PlayerPresence::Buffering => "Buffering",
            PlayerPresence::Error => "Error",
        }
    }
}

/// Fractional range of the source, 0.0 to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionRange {
    pub start: f64,
    pub end: f64,
}

/// Loading progress of the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub fully_loaded_fraction_ranges: Option<Vec<FractionRange>>,
    /// Bytes held in the Player's message cache
    pub cache_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemSeverity {
    Error,
    Warn,
    Info,
}

/// A problem reported by the Player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProblem {
    pub severity: ProblemSeverity,
    pub message: String,
    pub error: Option<String>,
    pub tip: Option<String>,
}

/// Data of the currently loaded source
///
/// See the module docs for the `Arc` identity contract.
#[derive(Debug, Clone)]
pub struct ActiveData {
    /// Messages received since the previous frame, in delivery order
    pub messages: Arc<[MessageEvent]>,
    pub topics: Arc<[Topic]>,
    pub datatypes: Arc<Datatypes>,
    pub current_time: Time,
    pub start_time: Time,
    pub end_time: Time,
    pub is_playing: bool,
    pub speed: f64,
    /// Bumped by the Player on every seek
    pub last_seek_time: u64,
    pub total_bytes_received: u64,
    pub published_topics: Option<HashMap<String, Vec<String>>>,
    pub subscribed_topics: Option<HashMap<String, Vec<String>>>,
    pub services: Option<HashMap<String, Vec<String>>>,
    pub parameters: Option<HashMap<String, ParameterValue>>,
}

impl Default for ActiveData {
    fn default() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            topics: Arc::from(Vec::new()),
            datatypes: Arc::new(Datatypes::new()),
            current_time: Time::ZERO,
            start_time: Time::ZERO,
            end_time: Time::ZERO,
            is_playing: false,
            speed: 1.0,
            last_seek_time: 0,
            total_bytes_received: 0,
            published_topics: None,
            subscribed_topics: None,
            services: None,
            parameters: None,
        }
    }
}

/// Snapshot emitted by a Player on every frame
///
/// Treated as immutable by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub presence: PlayerPresence,
    pub progress: Progress,
    pub capabilities: PlayerCapabilities,
    pub profile: Option<String>,
    pub player_id: String,
    pub name: Option<String>,
    pub problems: Vec<PlayerProblem>,
    pub active_data: Option<ActiveData>,
}

impl PlayerState {
    /// Messages of this frame, if the source is active
    pub fn messages(&self) -> Option<&Arc<[MessageEvent]>> {
        self.active_data.as_ref().map(|d| &d.messages)
    }

    pub fn topics(&self) -> Option<&Arc<[Topic]>> {
        self.active_data.as_ref().map(|d| &d.topics)
    }

    pub fn datatypes(&self) -> Option<&Arc<Datatypes>> {
        self.active_data.as_ref().map(|d| &d.datatypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_time_normalization() {
        let t = Time::new(1, 1_500_000_000);
        assert_eq!(t, Time { sec: 2, nsec: 500_000_000 });
        assert!(Time::new(1, 0) < Time::new(1, 1));
        assert_eq!(Time::from_millis(1_250).as_duration(), Duration::from_millis(1_250));
    }

    #[test]
    fn test_time_saturates() {
        assert_eq!(Time::new(u32::MAX, 1_000_000_000), Time::MAX);
        assert_eq!(Time::new(u32::MAX, 999_999_999), Time::MAX);
        assert_eq!(Time::from_duration(Duration::from_secs(u64::from(u32::MAX) + 1)), Time::MAX);
        assert_eq!(Time::MAX.saturating_add(Duration::from_secs(10)), Time::MAX);
    }

    #[test]
    fn test_time_saturating_sub() {
        let a = Time::from_millis(100);
        let b = Time::from_millis(300);
        assert_eq!(b.saturating_sub(a), Duration::from_millis(200));
        assert_eq!(a.saturating_sub(b), Duration::ZERO);
    }

    #[test]
    fn test_subscription_builder() {
        let sub = Subscription::new("/odom")
            .with_preload(PreloadType::Full)
            .with_fields(["pose", "twist"]);
        assert_eq!(sub.preload(), PreloadType::Full);
        assert_eq!(sub.fields.as_deref(), Some(&["pose".to_string(), "twist".to_string()][..]));
        assert_eq!(Subscription::new("/odom").preload(), PreloadType::Partial);
    }

    #[test]
    fn test_subscription_deserialize_defaults() {
        let sub: Subscription = serde_json::from_value(json!({ "topic": "/a" })).unwrap();
        assert_eq!(sub, Subscription::new("/a"));

        let sub: Subscription =
            serde_json::from_value(json!({ "topic": "/a", "preload_type": "full" })).unwrap();
        assert_eq!(sub.preload_type, Some(PreloadType::Full));
    }

    #[test]
    fn test_default_player_state_is_not_present() {
        let state = PlayerState::default();
        assert_eq!(state.presence, PlayerPresence::NotPresent);
        assert!(state.capabilities.is_empty());
        assert!(state.messages().is_none());
    }
}
