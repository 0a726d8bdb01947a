//! The read model panels consume
//!
//! A [`MessagePipelineContext`] is an immutable snapshot. The store publishes a
//! new `Arc` after every dispatch that changes anything; fields that did not
//! change keep their previous `Arc`, so panels can detect changes with
//! `Arc::ptr_eq` instead of comparing contents.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::player::{Player, PlayerCapabilities};
use crate::types::{Datatypes, MessageEvent, PlayerState, SubscriberId, Subscription, Time, Topic};

pub type PlaybackFn = Arc<dyn Fn() + Send + Sync>;
pub type SeekFn = Arc<dyn Fn(Time) + Send + Sync>;
pub type SpeedFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Messages delivered to each subscriber in one Player cycle
pub type MessageEventsBySubscriberId = HashMap<SubscriberId, Arc<[MessageEvent]>>;

/// Playback controls bound to the current Player
///
/// Each function is `None` unless the Player advertises the capability that
/// gates it. The store only rebinds when the capability set changes, so the
/// same `Arc` is handed out for as long as the capabilities stay the same.
#[derive(Clone, Default)]
pub struct PlaybackApi {
    pub start_playback: Option<PlaybackFn>,
    pub play_until: Option<SeekFn>,
    pub pause_playback: Option<PlaybackFn>,
    pub seek_playback: Option<SeekFn>,
    pub set_playback_speed: Option<SpeedFn>,
}

impl PlaybackApi {
    /// Bind the Player's playback methods allowed by `capabilities`
    pub fn bind(player: Option<&Arc<dyn Player>>, capabilities: &PlayerCapabilities) -> Self {
        let Some(player) = player else {
            return Self::default();
        };

        let mut api = Self::default();
        if capabilities.can_play() {
            let p = player.clone();
            api.start_playback = Some(Arc::new(move || p.start_playback()));
            let p = player.clone();
            api.play_until = Some(Arc::new(move |time| p.play_until(time)));
            let p = player.clone();
            api.pause_playback = Some(Arc::new(move || p.pause_playback()));
            let p = player.clone();
            api.seek_playback = Some(Arc::new(move |time| p.seek_playback(time)));
        }
        if capabilities.can_set_speed() {
            let p = player.clone();
            api.set_playback_speed = Some(Arc::new(move |speed| p.set_playback_speed(speed)));
        }
        api
    }
}

impl fmt::Debug for PlaybackApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackApi")
            .field("start_playback", &self.start_playback.is_some())
            .field("play_until", &self.play_until.is_some())
            .field("pause_playback", &self.pause_playback.is_some())
            .field("seek_playback", &self.seek_playback.is_some())
            .field("set_playback_speed", &self.set_playback_speed.is_some())
            .finish()
    }
}

/// Signal from the UI layer that the frame has been committed to screen
///
/// Signalling more than once is a no-op.
#[derive(Debug, Clone)]
pub struct RenderDone {
    tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl RenderDone {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub fn signal(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }
}

/// Snapshot of the pipeline state exposed to panels
#[derive(Debug, Clone)]
pub struct MessagePipelineContext {
    pub player_state: PlayerState,
    /// Player topics sorted by name
    pub sorted_topics: Arc<[Topic]>,
    pub datatypes: Arc<Datatypes>,
    /// Merged subscriptions currently sent to the Player
    pub subscriptions: Arc<[Subscription]>,
    /// New messages per subscriber for the latest Player cycle only
    pub message_events_by_subscriber_id: Arc<MessageEventsBySubscriberId>,
    pub playback: PlaybackApi,
    pub render_done: Option<RenderDone>,
}

impl Default for MessagePipelineContext {
    fn default() -> Self {
        Self {
            player_state: PlayerState::default(),
            sorted_topics: Arc::from(Vec::new()),
            datatypes: Arc::new(Datatypes::new()),
            subscriptions: Arc::from(Vec::new()),
            message_events_by_subscriber_id: Arc::new(HashMap::new()),
            playback: PlaybackApi::default(),
            render_done: None,
        }
    }
}

impl MessagePipelineContext {
    /// This cycle's messages for one subscriber
    pub fn messages_for(&self, subscriber_id: &str) -> Option<&Arc<[MessageEvent]>> {
        self.message_events_by_subscriber_id.get(subscriber_id)
    }

    pub fn capabilities(&self) -> &PlayerCapabilities {
        &self.player_state.capabilities
    }
}
