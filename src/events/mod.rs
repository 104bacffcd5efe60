//! Bounded, ordered, deferred-dispatch event log
//!
//! Producers `publish` immutable events; nothing reaches a subscriber until
//! the host explicitly calls `drain()`. Retention is bounded: when the ring
//! is full the oldest events are evicted and `base_seq` advances so readers
//! of `get_since` can detect the gap. Sequence numbers strictly increase
//! and are never reused.

use std::collections::VecDeque;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::{EvictionPolicy, KernelConfig};
use crate::core::error::{KernelError, Result};
use crate::core::types::{Day, EventSeq, SubscriberId, Tick};

/// Payload key appended when entries were dropped; its value is the number
/// of entries removed
pub const TRUNCATION_MARKER: &str = "__truncated";

/// Immutable record of something that happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: EventSeq,
    pub tick: Tick,
    pub day: Day,
    pub kind: String,
    /// Scope identifiers, e.g. `["ward:3", "org:17"]`
    pub scope: Vec<String>,
    /// Key-sorted, size-bounded payload entries
    pub payload: Vec<(String, Value)>,
    pub tags: Vec<String>,
}

/// Retained tail returned by `get_since`
///
/// If the requested sequence predates `base_seq`, events have been evicted
/// and the caller has a gap to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSlice {
    pub base_seq: EventSeq,
    pub events: Vec<Event>,
}

/// Handler invoked during `drain()` for each matching event
pub type EventHandler = Box<dyn FnMut(&Event) -> Result<()>>;

struct Subscriber {
    id: SubscriberId,
    /// `None` means all kinds
    kinds: Option<AHashSet<String>>,
    handler: EventHandler,
}

impl Subscriber {
    fn matches(&self, kind: &str) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(kind),
            None => true,
        }
    }
}

/// Serializable bus state: everything that must survive a snapshot
///
/// Subscriptions are runtime wiring (boxed closures) and are deliberately
/// absent; hosts re-register handlers after a restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub base_seq: EventSeq,
    pub next_seq: EventSeq,
    pub ring: Vec<Event>,
    pub pending: Vec<Event>,
}

/// Bounded publish/subscribe log with deferred dispatch
pub struct EventBus {
    enabled: bool,
    capacity: usize,
    max_payload_items: usize,
    eviction_policy: EvictionPolicy,

    /// Retained tail served by `get_since`
    ring: VecDeque<Event>,
    /// Sequence of the oldest retained event
    base_seq: EventSeq,
    next_seq: EventSeq,

    /// Published but not yet delivered; unaffected by ring eviction
    pending: VecDeque<Event>,

    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

impl EventBus {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            enabled: config.bus_enabled,
            capacity: config.max_events.max(1),
            max_payload_items: config.max_payload_items.max(1),
            eviction_policy: config.eviction_policy,
            ring: VecDeque::new(),
            base_seq: 0,
            next_seq: 0,
            pending: VecDeque::new(),
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    /// Record an occurrence; delivery happens at the next `drain()`
    ///
    /// Returns `None` when the bus is disabled. The payload is normalized
    /// to at most `max_payload_items` key-sorted entries with a truncation
    /// marker appended if anything was dropped.
    pub fn publish(
        &mut self,
        kind: &str,
        tick: Tick,
        day: Day,
        scope: Vec<String>,
        payload: Vec<(String, Value)>,
        tags: Vec<String>,
    ) -> Option<Event> {
        if !self.enabled {
            return None;
        }

        let event = Event {
            seq: self.next_seq,
            tick,
            day,
            kind: kind.to_string(),
            scope,
            payload: self.normalize_payload(payload),
            tags,
        };
        self.next_seq += 1;

        self.ring.push_back(event.clone());
        while self.ring.len() > self.capacity {
            match self.eviction_policy {
                EvictionPolicy::DropOldest => {
                    self.ring.pop_front();
                    self.base_seq += 1;
                }
            }
        }

        self.pending.push_back(event.clone());
        Some(event)
    }

    /// Register a handler, optionally filtered to specific kinds
    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&Event) -> Result<()> + 'static,
        kinds: Option<&[&str]>,
    ) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push(Subscriber {
            id,
            kinds: kinds.map(|ks| ks.iter().map(|k| k.to_string()).collect()),
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Deliver all pending events in publish order
    ///
    /// The pending queue is taken atomically first, so nothing published by
    /// the host mid-delivery is seen until the next drain, and a drained
    /// event is never redelivered. A handler fault does not retract the
    /// delivery and remaining subscribers still run; after everything has
    /// been attempted the first fault is returned to the host. Returns the
    /// number of successful (event, subscriber) deliveries.
    pub fn drain(&mut self) -> Result<usize> {
        let batch: Vec<Event> = self.pending.drain(..).collect();
        let mut delivered = 0;
        let mut first_fault: Option<KernelError> = None;

        for event in &batch {
            for sub in self.subscribers.iter_mut() {
                if !sub.matches(&event.kind) {
                    continue;
                }
                match (sub.handler)(event) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            "subscriber {} failed on event {} ({}): {e}",
                            sub.id.0,
                            event.seq,
                            event.kind
                        );
                        if first_fault.is_none() {
                            first_fault = Some(KernelError::SubscriberFault {
                                id: sub.id.0,
                                seq: event.seq,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(delivered),
        }
    }

    /// Retained events with sequence >= `seq`, oldest first
    pub fn get_since(&self, seq: EventSeq) -> EventSlice {
        EventSlice {
            base_seq: self.base_seq,
            events: self
                .ring
                .iter()
                .filter(|e| e.seq >= seq)
                .cloned()
                .collect(),
        }
    }

    /// Sequence of the oldest retained event
    pub fn base_seq(&self) -> EventSeq {
        self.base_seq
    }

    /// Sequence the next published event will receive
    pub fn next_seq(&self) -> EventSeq {
        self.next_seq
    }

    /// Sequence of the most recently published event, if any
    pub fn latest_seq(&self) -> Option<EventSeq> {
        self.next_seq.checked_sub(1)
    }

    pub fn retained_len(&self) -> usize {
        self.ring.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn snapshot_state(&self) -> BusSnapshot {
        BusSnapshot {
            base_seq: self.base_seq,
            next_seq: self.next_seq,
            ring: self.ring.iter().cloned().collect(),
            pending: self.pending.iter().cloned().collect(),
        }
    }

    pub(crate) fn restore_state(&mut self, snap: BusSnapshot) {
        self.base_seq = snap.base_seq;
        self.next_seq = snap.next_seq;
        self.ring = snap.ring.into();
        self.pending = snap.pending.into();
    }

    /// Sort entries by key and bound their count, marking truncation
    fn normalize_payload(&self, mut payload: Vec<(String, Value)>) -> Vec<(String, Value)> {
        payload.sort_by(|a, b| a.0.cmp(&b.0));
        if payload.len() > self.max_payload_items {
            let dropped = payload.len() - self.max_payload_items;
            payload.truncate(self.max_payload_items);
            payload.push((TRUNCATION_MARKER.to_string(), Value::from(dropped as u64)));
        }
        payload
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("enabled", &self.enabled)
            .field("retained", &self.ring.len())
            .field("pending", &self.pending.len())
            .field("base_seq", &self.base_seq)
            .field("next_seq", &self.next_seq)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
