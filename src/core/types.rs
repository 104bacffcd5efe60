//! Core type definitions used throughout the kernel

use serde::{Deserialize, Serialize};

/// Simulation tick counter (smallest time unit)
pub type Tick = u64;

/// Simulation day counter; a day is `ticks_per_day` ticks
pub type Day = u64;

/// Monotonic event sequence number, never reused
pub type EventSeq = u64;

/// Unique identifier for agents
///
/// Ids are plain integers so the kernel can order them deterministically.
/// Random identifiers would make the awake/ambient partition depend on
/// allocation order, which must never influence a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl AgentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Handle returned by `EventBus::subscribe`, used to remove the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);
