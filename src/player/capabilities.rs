//! Player capability flags
//!
//! Every optional Player operation is gated on one of these flags. The
//! pipeline only binds an operation when the current `PlayerState` advertises
//! the matching capability, so all gated code paths go through the predicates
//! below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A Player-advertised feature flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Publishing messages on advertised topics
    Advertise,
    /// Fetching `package://` assets through the Player
    Assets,
    /// Calling services
    CallServices,
    /// Reading parameters
    GetParameters,
    /// Writing parameters
    SetParameters,
    /// Start, pause, seek and play-until
    PlaybackControl,
    /// Changing the playback speed
    SetSpeed,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Advertise,
        Capability::Assets,
        Capability::CallServices,
        Capability::GetParameters,
        Capability::SetParameters,
        Capability::PlaybackControl,
        Capability::SetSpeed,
    ];
}

/// Ordered set of capabilities
///
/// Equality is set equality, which is what the pipeline uses to decide
/// whether playback functions need rebinding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerCapabilities(BTreeSet<Capability>);

impl PlayerCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn can_play(&self) -> bool {
        self.contains(Capability::PlaybackControl)
    }

    pub fn can_set_speed(&self) -> bool {
        self.contains(Capability::SetSpeed)
    }

    pub fn can_publish(&self) -> bool {
        self.contains(Capability::Advertise)
    }

    pub fn can_call_services(&self) -> bool {
        self.contains(Capability::CallServices)
    }

    pub fn can_set_parameters(&self) -> bool {
        self.contains(Capability::SetParameters)
    }

    pub fn can_fetch_assets(&self) -> bool {
        self.contains(Capability::Assets)
    }
}

impl FromIterator<Capability> for PlayerCapabilities {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Capability; N]> for PlayerCapabilities {
    fn from(caps: [Capability; N]) -> Self {
        caps.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_equality_ignores_order() {
        let a = PlayerCapabilities::from([Capability::SetSpeed, Capability::PlaybackControl]);
        let b = PlayerCapabilities::from([Capability::PlaybackControl, Capability::SetSpeed]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_predicates() {
        let caps = PlayerCapabilities::new().with(Capability::PlaybackControl);
        assert!(caps.can_play());
        assert!(!caps.can_set_speed());
        assert!(!caps.can_publish());
    }

    #[test]
    fn test_serde_camel_case() {
        let caps = PlayerCapabilities::from([Capability::PlaybackControl]);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, "[\"playbackControl\"]");
    }
}
