//! The pipeline reducer
//!
//! `PipelineStore` owns every registry the pipeline needs (subscriptions and
//! publishers per subscriber, the topic index, the last-message cache) and
//! turns [`PipelineAction`]s into new [`MessagePipelineContext`] snapshots.
//! Every transition is synchronous and total: there are no error paths.
//!
//! # Message fan-out
//!
//! When the Player hands over a new `messages` Arc, each message is appended
//! to the bucket of every subscriber interested in its topic, preserving the
//! Player's order. Only subscribers with new messages get a bucket, so a panel
//! can tell "nothing new" from the absence of its entry.
//!
//! # Catch-up
//!
//! The latest message of every topic is cached. A subscriber that adds a
//! topic receives the cached message at the front of its bucket on the next
//! Player cycle, unless the Player delivers fresh data for that topic in the
//! same cycle. Cache entries are dropped as soon as a topic loses its last
//! subscriber, so a later subscriber never sees a message from before a seek.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::context::{
    MessageEventsBySubscriberId, MessagePipelineContext, PlaybackApi, RenderDone,
};
use crate::player::{Player, PlayerCapabilities};
use crate::subscriptions::{merge_subscriptions, SubscriptionMemoizer};
use crate::types::{
    AdvertiseOptions, MessageEvent, PlayerState, SubscriberId, Subscription, Topic,
};

/// Transitions accepted by the store
#[derive(Debug)]
pub enum PipelineAction {
    /// Replace a subscriber's subscriptions; empty payloads remove it
    UpdateSubscriber {
        id: SubscriberId,
        payloads: Vec<Subscription>,
    },
    /// Replace a subscriber's advertised publishers
    SetPublishers {
        id: SubscriberId,
        payloads: Vec<AdvertiseOptions>,
    },
    /// A new frame from the Player
    UpdatePlayerState {
        player_state: PlayerState,
        render_done: Option<RenderDone>,
    },
}

/// Reactive state container for one Player's lifetime
pub struct PipelineStore {
    player: Option<Arc<dyn Player>>,
    memoizer: SubscriptionMemoizer,
    /// Insertion-ordered so topic index iteration is deterministic
    subscriptions_by_id: Vec<(SubscriberId, Vec<Arc<Subscription>>)>,
    subscriber_ids_by_topic: HashMap<String, Vec<SubscriberId>>,
    /// Topics each subscriber added since the last Player cycle
    new_topics_by_subscriber_id: HashMap<SubscriberId, HashSet<String>>,
    last_message_event_by_topic: HashMap<String, MessageEvent>,
    publishers_by_id: Vec<(SubscriberId, Vec<AdvertiseOptions>)>,
    all_publishers: Vec<AdvertiseOptions>,
    last_capabilities: PlayerCapabilities,
    render_done: Option<RenderDone>,
    public: Arc<MessagePipelineContext>,
}

impl PipelineStore {
    pub fn new(player: Option<Arc<dyn Player>>) -> Self {
        Self {
            player,
            memoizer: SubscriptionMemoizer::new(),
            subscriptions_by_id: Vec::new(),
            subscriber_ids_by_topic: HashMap::new(),
            new_topics_by_subscriber_id: HashMap::new(),
            last_message_event_by_topic: HashMap::new(),
            publishers_by_id: Vec::new(),
            all_publishers: Vec::new(),
            last_capabilities: PlayerCapabilities::new(),
            render_done: None,
            public: Arc::new(MessagePipelineContext::default()),
        }
    }

    /// Latest published snapshot
    pub fn context(&self) -> Arc<MessagePipelineContext> {
        self.public.clone()
    }

    pub fn player(&self) -> Option<&Arc<dyn Player>> {
        self.player.as_ref()
    }

    /// Flattened publishers of every subscriber
    pub fn all_publishers(&self) -> &[AdvertiseOptions] {
        &self.all_publishers
    }

    /// Current subscriptions per subscriber, in registration order
    pub fn subscriptions_by_id(
        &self,
    ) -> impl Iterator<Item = (&SubscriberId, &[Arc<Subscription>])> + '_ {
        self.subscriptions_by_id
            .iter()
            .map(|(id, subs)| (id, subs.as_slice()))
    }

    pub fn publishers_by_id(&self) -> impl Iterator<Item = (&SubscriberId, &[AdvertiseOptions])> + '_ {
        self.publishers_by_id
            .iter()
            .map(|(id, pubs)| (id, pubs.as_slice()))
    }

    /// Subscriber ids interested in `topic`
    pub fn subscriber_ids(&self, topic: &str) -> &[SubscriberId] {
        self.subscriber_ids_by_topic
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_cached_message(&self, topic: &str) -> bool {
        self.last_message_event_by_topic.contains_key(topic)
    }

    /// Number of distinct subscriptions the memoizer has seen
    pub fn memoized_subscriptions(&self) -> usize {
        self.memoizer.len()
    }

    /// Take the render signal of the current cycle
    pub fn take_render_done(&mut self) -> Option<RenderDone> {
        self.render_done.take()
    }

    pub fn dispatch(&mut self, action: PipelineAction) {
        match action {
            PipelineAction::UpdateSubscriber { id, payloads } => {
                self.update_subscriber(id, payloads)
            }
            PipelineAction::SetPublishers { id, payloads } => self.set_publishers(id, payloads),
            PipelineAction::UpdatePlayerState {
                player_state,
                render_done,
            } => self.update_player_state(player_state, render_done),
        }
    }

    fn update_subscriber(&mut self, id: SubscriberId, payloads: Vec<Subscription>) {
        let payloads: Vec<Arc<Subscription>> = payloads
            .into_iter()
            .map(|p| self.memoizer.memoize(p))
            .collect();

        let position = self.subscriptions_by_id.iter().position(|(sid, _)| *sid == id);
        let previous_topics: HashSet<String> = position
            .map(|i| {
                self.subscriptions_by_id[i]
                    .1
                    .iter()
                    .map(|s| s.topic.clone())
                    .collect()
            })
            .unwrap_or_default();
        let added_topics: HashSet<String> = payloads
            .iter()
            .map(|s| s.topic.clone())
            .filter(|t| !previous_topics.contains(t))
            .collect();

        match (position, payloads.is_empty()) {
            (Some(i), true) => {
                self.subscriptions_by_id.remove(i);
            }
            (Some(i), false) => self.subscriptions_by_id[i].1 = payloads,
            (None, true) => {}
            (None, false) => self.subscriptions_by_id.push((id.clone(), payloads)),
        }

        self.rebuild_topic_index();

        // Pending catch-up only covers topics the subscriber still listens to
        let current_topics: HashSet<&str> = self
            .subscriptions_by_id
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, subs)| subs.iter().map(|s| s.topic.as_str()).collect())
            .unwrap_or_default();
        let mut pending = self
            .new_topics_by_subscriber_id
            .remove(&id)
            .unwrap_or_default();
        pending.retain(|topic| current_topics.contains(topic.as_str()));
        pending.extend(added_topics);
        if !pending.is_empty() {
            self.new_topics_by_subscriber_id.insert(id.clone(), pending);
        }

        // Topics nobody listens to anymore must not backfill a later subscriber
        let index = &self.subscriber_ids_by_topic;
        self.last_message_event_by_topic
            .retain(|topic, _| index.contains_key(topic));

        let merged = merge_subscriptions(
            self.subscriptions_by_id
                .iter()
                .flat_map(|(_, subs)| subs.iter().map(|s| s.as_ref())),
        );

        tracing::debug!(
            "Subscriber {} now has {} subscriptions ({} merged)",
            id,
            self.subscriptions_by_id
                .iter()
                .find(|(sid, _)| *sid == id)
                .map_or(0, |(_, subs)| subs.len()),
            merged.len()
        );

        self.public = Arc::new(MessagePipelineContext {
            subscriptions: Arc::from(merged),
            ..(*self.public).clone()
        });
    }

    fn rebuild_topic_index(&mut self) {
        let mut index: HashMap<String, Vec<SubscriberId>> = HashMap::new();
        for (id, subs) in &self.subscriptions_by_id {
            for sub in subs {
                let ids = index.entry(sub.topic.clone()).or_default();
                // Duplicates would deliver the same message twice
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        self.subscriber_ids_by_topic = index;
    }

    fn set_publishers(&mut self, id: SubscriberId, payloads: Vec<AdvertiseOptions>) {
        let position = self.publishers_by_id.iter().position(|(pid, _)| *pid == id);
        match (position, payloads.is_empty()) {
            (Some(i), true) => {
                self.publishers_by_id.remove(i);
            }
            (Some(i), false) => self.publishers_by_id[i].1 = payloads,
            (None, true) => {}
            (None, false) => self.publishers_by_id.push((id, payloads)),
        }

        self.all_publishers = self
            .publishers_by_id
            .iter()
            .flat_map(|(_, pubs)| pubs.iter().cloned())
            .collect();
    }

    fn update_player_state(&mut self, player_state: PlayerState, render_done: Option<RenderDone>) {
        let previous = &self.public.player_state;

        let mut buckets: HashMap<SubscriberId, Vec<MessageEvent>> = HashMap::new();
        let mut seen_topics: HashSet<&str> = HashSet::new();

        if let Some(messages) = player_state.messages() {
            if arc_changed(previous.messages(), Some(messages)) {
                for event in messages.iter() {
                    self.last_message_event_by_topic
                        .insert(event.topic.clone(), event.clone());
                    seen_topics.insert(event.topic.as_str());

                    let Some(ids) = self.subscriber_ids_by_topic.get(&event.topic) else {
                        continue;
                    };
                    for id in ids {
                        buckets.entry(id.clone()).or_default().push(event.clone());
                    }
                }
            }
        }

        let pending = std::mem::take(&mut self.new_topics_by_subscriber_id);
        for (id, topics) in pending {
            let mut catch_up: Vec<MessageEvent> = topics
                .iter()
                .filter(|topic| !seen_topics.contains(topic.as_str()))
                .filter_map(|topic| self.last_message_event_by_topic.get(topic).cloned())
                .collect();
            if catch_up.is_empty() {
                continue;
            }
            catch_up.sort_by_key(|event| event.receive_time);
            tracing::trace!("Catching up {} with {} cached messages", id, catch_up.len());

            let bucket = buckets.entry(id).or_default();
            catch_up.append(bucket);
            *bucket = catch_up;
        }

        let sorted_topics: Arc<[Topic]> = if arc_changed(previous.topics(), player_state.topics()) {
            let mut topics = player_state
                .topics()
                .map(|t| t.to_vec())
                .unwrap_or_default();
            topics.sort_by(|a, b| a.name.cmp(&b.name));
            Arc::from(topics)
        } else {
            self.public.sorted_topics.clone()
        };

        let datatypes = if arc_changed(previous.datatypes(), player_state.datatypes()) {
            player_state.datatypes().cloned().unwrap_or_default()
        } else {
            self.public.datatypes.clone()
        };

        let playback = if player_state.capabilities != self.last_capabilities {
            tracing::debug!(
                "Player capabilities changed to {:?}, rebinding playback controls",
                player_state.capabilities
            );
            self.last_capabilities = player_state.capabilities.clone();
            PlaybackApi::bind(self.player.as_ref(), &self.last_capabilities)
        } else {
            self.public.playback.clone()
        };

        let message_events_by_subscriber_id: MessageEventsBySubscriberId = buckets
            .into_iter()
            .map(|(id, events)| (id, Arc::from(events)))
            .collect();

        self.render_done = render_done.clone();
        self.public = Arc::new(MessagePipelineContext {
            player_state,
            sorted_topics,
            datatypes,
            subscriptions: self.public.subscriptions.clone(),
            message_events_by_subscriber_id: Arc::new(message_events_by_subscriber_id),
            playback,
            render_done,
        });
    }
}

/// Whether the Player handed over a different Arc than last cycle
fn arc_changed<T: ?Sized>(previous: Option<&Arc<T>>, next: Option<&Arc<T>>) -> bool {
    match (previous, next) {
        (None, None) => false,
        (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
        _ => true,
    }
}
