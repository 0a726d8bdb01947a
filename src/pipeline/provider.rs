//! Player lifecycle and frame pacing
//!
//! [`MessagePipelineProvider`] owns the store and the current Player. It
//! installs a listener on the Player and runs one cycle per emitted state:
//!
//! 1. Reduce the state into a new context and publish it
//! 2. Wait until the UI reports the frame as rendered
//! 3. Wait for panels that paused the frame, bounded by the configured timeout
//! 4. Resolve the listener future, letting the Player emit the next state
//!
//! Cycles never overlap. Panels talk to the pipeline through the cloneable
//! [`MessagePipeline`] handle.

use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;

use super::context::{MessagePipelineContext, RenderDone};
use super::store::{PipelineAction, PipelineStore};
use crate::assets::{AssetResolver, FetchAssetOptions, HttpFetch, ReqwestFetcher};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::notify::Notifier;
use crate::pause_frame::{pause_frame_for_promises, FramePauseController, ResumeFrame};
use crate::player::{Player, PlayerListener};
use crate::types::{
    AdvertiseOptions, AssetData, Metadata, ParameterValue, PlayerState, PublishPayload,
    SubscriberId, Subscription, Time,
};

/// Services the pipeline depends on, injected by the host application
#[derive(Clone)]
pub struct PipelineEnvironment {
    pub notifier: Arc<dyn Notifier>,
    pub http: Arc<dyn HttpFetch>,
    /// Allow fetching `package://` URIs directly when the Player can't
    pub builtin_fetch: bool,
}

impl PipelineEnvironment {
    pub fn new(notifier: Arc<dyn Notifier>, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            notifier,
            http,
            builtin_fetch: true,
        }
    }

    /// Production environment with a `reqwest` transport
    pub fn from_config(config: &PipelineConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let http = ReqwestFetcher::new(&config.http).context("Failed to build asset HTTP client")?;
        Ok(Self {
            notifier,
            http: Arc::new(http),
            builtin_fetch: config.builtin_fetch,
        })
    }
}

struct Shared {
    store: Mutex<PipelineStore>,
    context_tx: watch::Sender<Arc<MessagePipelineContext>>,
    frame_pause: FramePauseController,
    notifier: Arc<dyn Notifier>,
    assets: AssetResolver,
    frame_pause_timeout: Duration,
    /// Bumped on every Player swap; listener calls from older Players are dropped
    generation: AtomicU64,
    /// Serializes Player cycles
    frame_gate: tokio::sync::Mutex<()>,
}

impl Shared {
    fn lock_store(&self) -> MutexGuard<'_, PipelineStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Dispatch and publish under one lock so contexts go out in order
    fn dispatch(&self, store: &mut PipelineStore, action: PipelineAction) -> Arc<MessagePipelineContext> {
        store.dispatch(action);
        let context = store.context();
        self.context_tx.send_replace(context.clone());
        context
    }

    fn player(&self) -> Option<Arc<dyn Player>> {
        self.lock_store().player().cloned()
    }

    async fn on_player_state(&self, generation: u64, player_state: PlayerState) {
        let _frame = self.frame_gate.lock().await;
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::trace!("Ignoring state from a replaced player");
            return;
        }

        let (render_done, rendered) = RenderDone::new();
        {
            let mut store = self.lock_store();
            self.dispatch(
                &mut store,
                PipelineAction::UpdatePlayerState {
                    player_state,
                    render_done: Some(render_done),
                },
            );
        }

        // A dropped signal means nobody is rendering; carry on
        let _ = rendered.await;

        let promises = self.frame_pause.drain();
        let paused = promises.len();
        let outcome =
            pause_frame_for_promises(promises, self.frame_pause_timeout, self.notifier.as_ref())
                .await;

        tracing::trace!(
            paused,
            failed = outcome.failed.len(),
            timed_out = outcome.timed_out.len(),
            "Frame complete"
        );
    }
}

fn install_listener(shared: &Arc<Shared>, player: &Arc<dyn Player>, generation: u64) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let listener: PlayerListener = Arc::new(move |player_state: PlayerState| {
        let weak = weak.clone();
        async move {
            if let Some(shared) = weak.upgrade() {
                shared.on_player_state(generation, player_state).await;
            }
        }
        .boxed()
    });
    player.set_listener(listener);
}

/// Owns the pipeline store and the attached Player
pub struct MessagePipelineProvider {
    shared: Arc<Shared>,
}

impl MessagePipelineProvider {
    pub fn new(
        player: Option<Arc<dyn Player>>,
        env: PipelineEnvironment,
        config: &PipelineConfig,
    ) -> Self {
        let store = PipelineStore::new(None);
        let (context_tx, _rx) = watch::channel(store.context());

        let shared = Arc::new(Shared {
            store: Mutex::new(store),
            context_tx,
            frame_pause: FramePauseController::new(),
            notifier: env.notifier,
            assets: AssetResolver::new(env.http, env.builtin_fetch),
            frame_pause_timeout: config.frame_pause_timeout(),
            generation: AtomicU64::new(0),
            frame_gate: tokio::sync::Mutex::new(()),
        });

        let provider = Self { shared };
        provider.set_player(player);
        provider
    }

    /// Handle for panels
    pub fn pipeline(&self) -> MessagePipeline {
        MessagePipeline {
            shared: self.shared.clone(),
        }
    }

    /// Replace the Player, carrying subscriptions and publishers over
    ///
    /// The old Player is closed. Caches, memoized subscriptions and pending
    /// catch-ups are discarded with the old store.
    pub fn set_player(&self, player: Option<Arc<dyn Player>>) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut store = self.shared.lock_store();

        if let Some(old) = store.player() {
            tracing::debug!("Closing previous player");
            old.close();
        }
        // Unblock a cycle still waiting on the old frame
        if let Some(done) = store.take_render_done() {
            done.signal();
        }

        let mut fresh = PipelineStore::new(player.clone());
        for (id, subscriptions) in store.subscriptions_by_id() {
            fresh.dispatch(PipelineAction::UpdateSubscriber {
                id: id.clone(),
                payloads: subscriptions.iter().map(|s| (**s).clone()).collect(),
            });
        }
        for (id, publishers) in store.publishers_by_id() {
            fresh.dispatch(PipelineAction::SetPublishers {
                id: id.clone(),
                payloads: publishers.to_vec(),
            });
        }
        *store = fresh;

        let context = store.context();
        self.shared.context_tx.send_replace(context.clone());

        if let Some(player) = player.as_ref() {
            install_listener(&self.shared, player, generation);
            player.set_subscriptions(&context.subscriptions);
            player.set_publishers(store.all_publishers());
        }
    }

    /// Close the current Player; subscriptions are kept for a later `set_player`
    pub fn shutdown(&self) {
        self.set_player(None);
    }
}

impl Drop for MessagePipelineProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable handle panels use to read state and issue actions
#[derive(Clone)]
pub struct MessagePipeline {
    shared: Arc<Shared>,
}

impl MessagePipeline {
    /// Latest context snapshot
    pub fn context(&self) -> Arc<MessagePipelineContext> {
        self.shared.context_tx.borrow().clone()
    }

    /// Receiver notified on every new context
    pub fn subscribe(&self) -> watch::Receiver<Arc<MessagePipelineContext>> {
        self.shared.context_tx.subscribe()
    }

    /// Project the latest context
    pub fn select<T>(&self, selector: impl FnOnce(&MessagePipelineContext) -> T) -> T {
        selector(&self.context())
    }

    /// Replace a panel's subscriptions; an empty list unsubscribes it
    pub fn set_subscriptions(&self, id: impl Into<SubscriberId>, payloads: Vec<Subscription>) {
        let mut store = self.shared.lock_store();
        let context = self.shared.dispatch(
            &mut store,
            PipelineAction::UpdateSubscriber {
                id: id.into(),
                payloads,
            },
        );
        if let Some(player) = store.player() {
            player.set_subscriptions(&context.subscriptions);
        }
    }

    /// Replace the topics a panel publishes on
    pub fn set_publishers(&self, id: impl Into<SubscriberId>, payloads: Vec<AdvertiseOptions>) {
        let mut store = self.shared.lock_store();
        self.shared.dispatch(
            &mut store,
            PipelineAction::SetPublishers {
                id: id.into(),
                payloads,
            },
        );
        if let Some(player) = store.player() {
            player.set_publishers(store.all_publishers());
        }
    }

    pub fn set_parameter(&self, key: &str, value: ParameterValue) {
        match self.shared.player() {
            Some(player) => player.set_parameter(key, value),
            None => tracing::warn!("set_parameter({}) without a player", key),
        }
    }

    pub fn publish(&self, payload: PublishPayload) {
        match self.shared.player() {
            Some(player) => player.publish(payload),
            None => tracing::warn!("publish on {} without a player", payload.topic),
        }
    }

    /// Call a service through the Player
    ///
    /// Fails with [`PipelineError::NoPlayer`] when no Player is attached.
    pub async fn call_service(
        &self,
        service: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let player = self.shared.player().ok_or(PipelineError::NoPlayer)?;
        player.call_service(service, request).await
    }

    pub async fn fetch_asset(&self, uri: &str, options: FetchAssetOptions) -> Result<AssetData> {
        let player = self.shared.player();
        self.shared.assets.fetch(uri, &options, player.as_ref()).await
    }

    pub fn get_metadata(&self) -> Vec<Metadata> {
        self.shared
            .player()
            .map(|player| player.get_metadata())
            .unwrap_or_default()
    }

    /// Hold the next frame until the returned guard is resumed or dropped
    pub fn pause_frame(&self, name: impl Into<String>) -> ResumeFrame {
        self.shared.frame_pause.pause_frame(name)
    }

    /// Report that the latest context has been rendered
    pub fn render_committed(&self) {
        let done = self.shared.lock_store().take_render_done();
        if let Some(done) = done {
            done.signal();
        }
    }

    /// Returns `false` when the Player can't start playback
    pub fn start_playback(&self) -> bool {
        match &self.context().playback.start_playback {
            Some(start) => {
                start();
                true
            }
            None => false,
        }
    }

    pub fn pause_playback(&self) -> bool {
        match &self.context().playback.pause_playback {
            Some(pause) => {
                pause();
                true
            }
            None => false,
        }
    }

    pub fn seek_playback(&self, time: Time) -> bool {
        match &self.context().playback.seek_playback {
            Some(seek) => {
                seek(time);
                true
            }
            None => false,
        }
    }

    pub fn play_until(&self, time: Time) -> bool {
        match &self.context().playback.play_until {
            Some(play_until) => {
                play_until(time);
                true
            }
            None => false,
        }
    }

    pub fn set_playback_speed(&self, speed: f64) -> bool {
        match &self.context().playback.set_playback_speed {
            Some(set_speed) => {
                set_speed(speed);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MockHttpFetch;
    use crate::notify::ChannelNotifier;
    use crate::player::{RecordedPlayer, RecordedSource};
    use crate::types::{MessageEvent, PreloadType};
    use serde_json::json;

    fn env() -> PipelineEnvironment {
        let (notifier, _rx) = ChannelNotifier::new();
        PipelineEnvironment::new(Arc::new(notifier), Arc::new(MockHttpFetch::new()))
    }

    fn recorded() -> Arc<RecordedPlayer> {
        RecordedPlayer::new(RecordedSource::new(
            "test",
            vec![
                MessageEvent::new("/a", "test/A", Time::from_millis(0), json!(0)),
                MessageEvent::new("/a", "test/A", Time::from_millis(100), json!(1)),
            ],
        ))
    }

    #[tokio::test]
    async fn test_call_service_without_player() {
        let provider = MessagePipelineProvider::new(None, env(), &PipelineConfig::default());
        let err = provider
            .pipeline()
            .call_service("/reset", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoPlayer));
    }

    #[test]
    fn test_no_player_actions_are_noops() {
        let provider = MessagePipelineProvider::new(None, env(), &PipelineConfig::default());
        let pipeline = provider.pipeline();
        assert!(!pipeline.start_playback());
        assert!(!pipeline.seek_playback(Time::ZERO));
        assert!(pipeline.get_metadata().is_empty());
        pipeline.publish(PublishPayload {
            topic: "/cmd".to_string(),
            msg: json!({}),
        });
    }

    #[test]
    fn test_subscriptions_reach_player_merged() {
        let player = recorded();
        let provider = MessagePipelineProvider::new(
            Some(player.clone()),
            env(),
            &PipelineConfig::default(),
        );
        let pipeline = provider.pipeline();

        pipeline.set_subscriptions("p1", vec![Subscription::new("/a").with_fields(["x"])]);
        pipeline.set_subscriptions(
            "p2",
            vec![Subscription::new("/a").with_preload(PreloadType::Full)],
        );

        let sent = player.subscriptions();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent, pipeline.context().subscriptions.to_vec());
    }

    #[test]
    fn test_publishers_reach_player() {
        let player = recorded();
        let provider = MessagePipelineProvider::new(
            Some(player.clone()),
            env(),
            &PipelineConfig::default(),
        );
        provider
            .pipeline()
            .set_publishers("p", vec![AdvertiseOptions::new("/cmd", "test/Cmd")]);
        assert_eq!(player.publishers().len(), 1);
    }

    #[test]
    fn test_set_player_replays_and_closes_old() {
        let first = recorded();
        let provider =
            MessagePipelineProvider::new(Some(first.clone()), env(), &PipelineConfig::default());
        let pipeline = provider.pipeline();
        pipeline.set_subscriptions("p", vec![Subscription::new("/a")]);
        pipeline.set_publishers("p", vec![AdvertiseOptions::new("/cmd", "test/Cmd")]);

        let second = recorded();
        provider.set_player(Some(second.clone()));

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(second.subscriptions(), pipeline.context().subscriptions.to_vec());
        assert_eq!(second.publishers().len(), 1);
    }

    #[test]
    fn test_drop_closes_player() {
        let player = recorded();
        let provider =
            MessagePipelineProvider::new(Some(player.clone()), env(), &PipelineConfig::default());
        drop(provider);
        assert!(player.is_closed());
    }

    #[tokio::test]
    async fn test_cycle_waits_for_render() {
        let player = recorded();
        let provider =
            MessagePipelineProvider::new(Some(player.clone()), env(), &PipelineConfig::default());
        let pipeline = provider.pipeline();
        pipeline.set_subscriptions("p", vec![Subscription::new("/a")]);

        let mut rx = pipeline.subscribe();
        let frame = player.emit_frame(Duration::ZERO);
        let render = async {
            rx.changed().await.unwrap();
            let context = rx.borrow_and_update().clone();
            pipeline.render_committed();
            context
        };
        let (emitted, context) = tokio::join!(frame, render);

        assert!(emitted);
        let delivered = context.messages_for("p").unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].receive_time, Time::from_millis(0));
        assert!(pipeline.start_playback());
        assert!(player.is_playing());
    }
}
