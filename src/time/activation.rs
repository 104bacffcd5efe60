//! Awake/ambient partitioning policies
//!
//! Macro-stepping integrates a bounded "awake" subset of the population
//! exactly and the remaining "ambient" agents coarsely. Which agents are
//! awake is a policy decision behind a trait; the only hard requirement is
//! determinism: the same ids and budget must always produce the same
//! partition. Random sampling here would make runs unreproducible.

use crate::core::types::AgentId;

/// A deterministic partition of the population
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSet {
    /// Exactly integrated this macro step
    pub awake: Vec<AgentId>,
    /// Coarsely integrated with a single sub-interval
    pub ambient: Vec<AgentId>,
}

impl ActivationSet {
    pub fn is_fully_awake(&self) -> bool {
        self.ambient.is_empty()
    }
}

/// Selection policy for the awake subset
///
/// `ids` arrives sorted ascending and deduplicated; implementations must
/// be pure functions of their inputs.
pub trait ActivationPolicy {
    fn partition(&self, ids: &[AgentId], max_awake: usize) -> ActivationSet;
}

/// Default policy: the first `max_awake` ids in sorted order
///
/// Stable across runs and cheap; domain hosts that want attention-driven
/// schedules plug in their own policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedIdPrefix;

impl ActivationPolicy for SortedIdPrefix {
    fn partition(&self, ids: &[AgentId], max_awake: usize) -> ActivationSet {
        let cut = max_awake.min(ids.len());
        ActivationSet {
            awake: ids[..cut].to_vec(),
            ambient: ids[cut..].to_vec(),
        }
    }
}
