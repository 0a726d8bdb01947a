//! In-memory Player over a pre-recorded list of messages
//!
//! Plays back a [`RecordedSource`] at a configurable speed. Each frame emits
//! the messages whose receive time falls between the previous and the current
//! playback time, filtered to the active subscriptions. After a seek the next
//! frame backfills the latest message per subscribed topic at or before the
//! seek target.
//!
//! Frames are produced by [`RecordedPlayer::emit_frame`], which awaits the
//! listener before returning, or by [`RecordedPlayer::run`] which calls it on a
//! fixed tick until the player is closed.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::capabilities::{Capability, PlayerCapabilities};
use super::{Player, PlayerListener};
use crate::error::{PipelineError, Result};
use crate::types::{
    ActiveData, AdvertiseOptions, Datatypes, MessageEvent, Metadata, ParameterValue,
    PlayerPresence, PlayerState, PublishPayload, Subscription, Time, Topic,
};

/// Minimum playback speed multiplier
pub const MIN_PLAYBACK_SPEED: f64 = 0.1;
/// Maximum playback speed multiplier
pub const MAX_PLAYBACK_SPEED: f64 = 10.0;

/// Recorded messages plus the topic/schema information describing them
#[derive(Debug, Clone, Default)]
pub struct RecordedSource {
    pub name: String,
    pub topics: Vec<Topic>,
    pub datatypes: Datatypes,
    /// Sorted by receive time on construction
    pub messages: Vec<MessageEvent>,
    pub metadata: Vec<Metadata>,
}

impl RecordedSource {
    pub fn new(name: impl Into<String>, mut messages: Vec<MessageEvent>) -> Self {
        messages.sort_by_key(|m| m.receive_time);

        // Derive topics from the messages, first schema wins
        let mut seen = HashSet::new();
        let topics = messages
            .iter()
            .filter(|m| seen.insert(m.topic.clone()))
            .map(|m| Topic::new(m.topic.clone(), m.schema_name.clone()))
            .collect();

        Self {
            name: name.into(),
            topics,
            datatypes: Datatypes::new(),
            messages,
            metadata: Vec::new(),
        }
    }

    pub fn with_datatypes(mut self, datatypes: Datatypes) -> Self {
        self.datatypes = datatypes;
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn start_time(&self) -> Time {
        self.messages.first().map(|m| m.receive_time).unwrap_or_default()
    }

    pub fn end_time(&self) -> Time {
        self.messages.last().map(|m| m.receive_time).unwrap_or_default()
    }
}

#[derive(Default)]
struct PlaybackState {
    listener: Option<PlayerListener>,
    subscriptions: Vec<Subscription>,
    publishers: Vec<AdvertiseOptions>,
    parameters: HashMap<String, ParameterValue>,
    published: Vec<PublishPayload>,
    current_time: Time,
    /// Messages with an index below this have already been emitted
    cursor: usize,
    playing: bool,
    speed: f64,
    play_until: Option<Time>,
    /// Bumped on every seek
    last_seek_time: u64,
    backfill_pending: bool,
    last_messages: Option<Arc<[MessageEvent]>>,
    closed: bool,
}

/// Player for playing back a recorded source
pub struct RecordedPlayer {
    id: String,
    source: RecordedSource,
    topics: Arc<[Topic]>,
    datatypes: Arc<Datatypes>,
    capabilities: PlayerCapabilities,
    state: Mutex<PlaybackState>,
}

impl RecordedPlayer {
    /// Create a new player positioned at the start of the source
    pub fn new(source: RecordedSource) -> Arc<Self> {
        let topics: Arc<[Topic]> = Arc::from(source.topics.clone());
        let datatypes = Arc::new(source.datatypes.clone());
        let capabilities = PlayerCapabilities::from([
            Capability::PlaybackControl,
            Capability::SetSpeed,
            Capability::Advertise,
            Capability::SetParameters,
        ]);
        let start = source.start_time();
        let state = PlaybackState {
            current_time: start,
            cursor: source.messages.partition_point(|m| m.receive_time <= start),
            speed: 1.0,
            backfill_pending: true,
            ..Default::default()
        };

        Arc::new(Self {
            id: format!("recorded:{}", source.name),
            source,
            topics,
            datatypes,
            capabilities,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        // A poisoned lock only means a listener panicked mid-frame
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn current_time(&self) -> Time {
        self.lock().current_time
    }

    pub fn playback_speed(&self) -> f64 {
        self.lock().speed
    }

    /// Merged subscriptions last sent by the pipeline
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    /// Publishers last sent by the pipeline
    pub fn publishers(&self) -> Vec<AdvertiseOptions> {
        self.lock().publishers.clone()
    }

    /// Messages published through this player
    pub fn published(&self) -> Vec<PublishPayload> {
        self.lock().published.clone()
    }

    pub fn parameter(&self, key: &str) -> Option<ParameterValue> {
        self.lock().parameters.get(key).cloned()
    }

    /// Advance playback by `elapsed` wall time and emit one frame
    ///
    /// Resolves once the listener has consumed the frame. Returns `false`
    /// if the player is closed or has no listener.
    pub async fn emit_frame(&self, elapsed: Duration) -> bool {
        let (listener, player_state) = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            let Some(listener) = state.listener.clone() else {
                return false;
            };
            let player_state = self.next_frame(&mut state, elapsed);
            (listener, player_state)
        };

        listener(player_state).await;
        true
    }

    /// Emit frames on a fixed tick until the player is closed
    pub async fn run(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.is_closed() {
                break;
            }
            // No listener yet: keep waiting
            self.emit_frame(tick).await;
        }

        tracing::debug!("Recorded player {} stopped", self.id);
    }

    fn next_frame(&self, state: &mut PlaybackState, elapsed: Duration) -> PlayerState {
        let subscribed: HashSet<&str> = state
            .subscriptions
            .iter()
            .map(|s| s.topic.as_str())
            .collect();

        let mut frame = Vec::new();

        if state.backfill_pending {
            // Latest message per subscribed topic at or before the playhead
            let mut latest: HashMap<&str, &MessageEvent> = HashMap::new();
            for msg in &self.source.messages[..state.cursor] {
                if subscribed.contains(msg.topic.as_str()) {
                    latest.insert(msg.topic.as_str(), msg);
                }
            }
            let mut backfill: Vec<&MessageEvent> = latest.into_values().collect();
            backfill.sort_by_key(|m| m.receive_time);
            frame.extend(backfill.into_iter().cloned());
            state.backfill_pending = false;
        }

        if state.playing {
            let mut target = state
                .current_time
                .saturating_add(elapsed.mul_f64(state.speed));
            let end = self.source.end_time();
            if let Some(until) = state.play_until {
                if target >= until {
                    target = until;
                    state.playing = false;
                    state.play_until = None;
                }
            }
            if target >= end {
                target = end;
                state.playing = false;
            }

            while let Some(msg) = self.source.messages.get(state.cursor) {
                if msg.receive_time > target {
                    break;
                }
                if subscribed.contains(msg.topic.as_str()) {
                    frame.push(msg.clone());
                }
                state.cursor += 1;
            }
            state.current_time = target;
        }

        // Same Arc when nothing new arrived
        let messages = match (&state.last_messages, frame.is_empty()) {
            (Some(last), true) => last.clone(),
            _ => {
                let fresh: Arc<[MessageEvent]> = Arc::from(frame);
                state.last_messages = Some(fresh.clone());
                fresh
            }
        };

        PlayerState {
            presence: PlayerPresence::Present,
            capabilities: self.capabilities.clone(),
            player_id: self.id.clone(),
            name: Some(self.source.name.clone()),
            active_data: Some(ActiveData {
                messages,
                topics: self.topics.clone(),
                datatypes: self.datatypes.clone(),
                current_time: state.current_time,
                start_time: self.source.start_time(),
                end_time: self.source.end_time(),
                is_playing: state.playing,
                speed: state.speed,
                last_seek_time: state.last_seek_time,
                parameters: Some(state.parameters.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Player for RecordedPlayer {
    fn set_listener(&self, listener: PlayerListener) {
        self.lock().listener = Some(listener);
    }

    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.playing = false;
        state.listener = None;
    }

    fn set_subscriptions(&self, subscriptions: &[Subscription]) {
        let mut state = self.lock();
        let previous: HashSet<String> =
            state.subscriptions.iter().map(|s| s.topic.clone()).collect();
        if subscriptions.iter().any(|s| !previous.contains(&s.topic)) {
            // Newly subscribed topics get the latest message on the next frame
            state.backfill_pending = true;
        }
        state.subscriptions = subscriptions.to_vec();
    }

    fn set_publishers(&self, publishers: &[AdvertiseOptions]) {
        self.lock().publishers = publishers.to_vec();
    }

    fn set_parameter(&self, key: &str, value: ParameterValue) {
        self.lock().parameters.insert(key.to_string(), value);
    }

    fn publish(&self, payload: PublishPayload) {
        let mut state = self.lock();
        if !state.publishers.iter().any(|p| p.topic == payload.topic) {
            tracing::warn!("Dropping publish on unadvertised topic {}", payload.topic);
            return;
        }
        state.published.push(payload);
    }

    async fn call_service(
        &self,
        service: &str,
        _request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Err(PipelineError::Player(format!(
            "Service {} is not available in a recorded source",
            service
        )))
    }

    fn start_playback(&self) {
        let mut state = self.lock();
        if !state.closed && state.current_time < self.source.end_time() {
            state.playing = true;
        }
    }

    fn pause_playback(&self) {
        let mut state = self.lock();
        state.playing = false;
        state.play_until = None;
    }

    fn seek_playback(&self, time: Time) {
        let mut state = self.lock();
        let time = time.clamp(self.source.start_time(), self.source.end_time());
        state.current_time = time;
        state.cursor = self
            .source
            .messages
            .partition_point(|m| m.receive_time <= time);
        state.last_seek_time += 1;
        state.backfill_pending = true;
    }

    fn play_until(&self, time: Time) {
        let mut state = self.lock();
        if time > state.current_time {
            state.play_until = Some(time);
            state.playing = true;
        }
    }

    fn set_playback_speed(&self, speed: f64) {
        self.lock().speed = speed.clamp(MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED);
    }

    fn get_metadata(&self) -> Vec<Metadata> {
        self.source.metadata.clone()
    }
}
