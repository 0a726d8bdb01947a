//! Player trait for pluggable data sources
//!
//! A Player streams [`PlayerState`] snapshots into the pipeline through a
//! registered listener and accepts subscription, publishing and playback
//! commands. Concrete Players (log file readers, live connections) live
//! outside this crate; [`recorded::RecordedPlayer`] is an in-memory
//! implementation used for demos and tests.
//!
//! # Backpressure
//!
//! The listener returns a future. A Player must not emit the next frame
//! until that future resolves: the pipeline resolves it only after the UI
//! has rendered the frame and every paused panel has resumed (or the pause
//! timed out).
//!
//! Commands such as `set_subscriptions` are invoked while the pipeline holds
//! its store lock. Implementations must not call back into the pipeline from
//! inside them.

pub mod capabilities;
pub mod recorded;

pub use capabilities::{Capability, PlayerCapabilities};
pub use recorded::{RecordedPlayer, RecordedSource};

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::types::{
    AdvertiseOptions, AssetData, Metadata, ParameterValue, PlayerState, PublishPayload,
    Subscription, Time,
};

/// Callback a Player invokes with every new state
///
/// The returned future resolves once the frame has been fully consumed.
pub type PlayerListener = Arc<dyn Fn(PlayerState) -> BoxFuture<'static, ()> + Send + Sync>;

/// Unified interface for data sources
///
/// Optional operations have default implementations that refuse the call.
/// The pipeline only invokes them when the matching [`Capability`] is
/// advertised in the current state.
#[async_trait]
pub trait Player: Send + Sync {
    /// Register the state listener, replacing any previous one
    fn set_listener(&self, listener: PlayerListener);

    /// Release the source; no further states may be emitted
    fn close(&self);

    /// Replace the set of merged subscriptions
    fn set_subscriptions(&self, subscriptions: &[Subscription]);

    /// Replace the set of advertised publishers
    fn set_publishers(&self, publishers: &[AdvertiseOptions]);

    fn set_parameter(&self, key: &str, value: ParameterValue);

    fn publish(&self, payload: PublishPayload);

    async fn call_service(&self, service: &str, request: serde_json::Value)
        -> Result<serde_json::Value>;

    /// Requires [`Capability::PlaybackControl`]
    fn start_playback(&self) {
        tracing::warn!("start_playback called on a player without playback control");
    }

    /// Requires [`Capability::PlaybackControl`]
    fn pause_playback(&self) {
        tracing::warn!("pause_playback called on a player without playback control");
    }

    /// Requires [`Capability::PlaybackControl`]
    fn seek_playback(&self, _time: Time) {
        tracing::warn!("seek_playback called on a player without playback control");
    }

    /// Requires [`Capability::PlaybackControl`]
    fn play_until(&self, _time: Time) {
        tracing::warn!("play_until called on a player without playback control");
    }

    /// Requires [`Capability::SetSpeed`]
    fn set_playback_speed(&self, _speed: f64) {
        tracing::warn!("set_playback_speed called on a player without speed control");
    }

    /// Fetch a `package://` asset through the Player's own source
    async fn fetch_asset(&self, _uri: &str) -> Result<AssetData> {
        Err(PipelineError::Unsupported("fetch_asset"))
    }

    fn get_metadata(&self) -> Vec<Metadata> {
        Vec::new()
    }
}
