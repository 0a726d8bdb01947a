//! Subscription merging and memoization
//!
//! Many panels subscribe to the same topics with different field selections
//! and preload strategies. Before reaching the Player those requests are
//! collapsed into one entry per (topic, preload type):
//!
//! - A `Full` request on a topic also produces a `Partial` entry, since a
//!   panel that wants the whole source also wants live streaming.
//! - Field lists are unioned. A request without a field list (all fields)
//!   wins over any explicit list.
//!
//! The merged output is sorted by topic, then preload type.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::types::{PreloadType, Subscription};

/// Fields requested for one (topic, preload type) pair
#[derive(Debug)]
enum FieldSelection {
    All,
    Fields(BTreeSet<String>),
}

impl FieldSelection {
    fn from_request(fields: Option<&Vec<String>>) -> Self {
        match fields {
            None => FieldSelection::All,
            Some(fields) => FieldSelection::Fields(fields.iter().cloned().collect()),
        }
    }

    fn merge(&mut self, fields: Option<&Vec<String>>) {
        match (&mut *self, fields) {
            (FieldSelection::All, _) => {}
            (FieldSelection::Fields(_), None) => *self = FieldSelection::All,
            (FieldSelection::Fields(existing), Some(fields)) => {
                existing.extend(fields.iter().cloned());
            }
        }
    }

    fn into_fields(self) -> Option<Vec<String>> {
        match self {
            FieldSelection::All => None,
            FieldSelection::Fields(fields) => Some(fields.into_iter().collect()),
        }
    }
}

/// Merge every panel's subscriptions into the minimal set sent to the Player
pub fn merge_subscriptions<'a, I>(subscriptions: I) -> Vec<Subscription>
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let mut merged: BTreeMap<(&'a str, PreloadType), FieldSelection> = BTreeMap::new();

    let mut add = |topic: &'a str, preload: PreloadType, fields: Option<&Vec<String>>| {
        merged
            .entry((topic, preload))
            .and_modify(|selection| selection.merge(fields))
            .or_insert_with(|| FieldSelection::from_request(fields));
    };

    for sub in subscriptions {
        let preload = sub.preload();
        add(sub.topic.as_str(), preload, sub.fields.as_ref());
        if preload == PreloadType::Full {
            add(sub.topic.as_str(), PreloadType::Partial, sub.fields.as_ref());
        }
    }

    merged
        .into_iter()
        .map(|((topic, preload), selection)| Subscription {
            topic: topic.to_string(),
            preload_type: Some(preload),
            fields: selection.into_fields(),
        })
        .collect()
}

/// Returns the same `Arc` for structurally equal subscriptions
///
/// Entries are never evicted. Scope one memoizer to one pipeline store and
/// drop it with the store.
#[derive(Debug, Default)]
pub struct SubscriptionMemoizer {
    cache: HashMap<Subscription, Arc<Subscription>>,
}

impl SubscriptionMemoizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memoize(&mut self, subscription: Subscription) -> Arc<Subscription> {
        if let Some(existing) = self.cache.get(&subscription) {
            return existing.clone();
        }
        let shared = Arc::new(subscription.clone());
        self.cache.insert(subscription, shared.clone());
        shared
    }

    /// Number of distinct subscriptions seen
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
