//! The kernel facade: one owner for clock, randomness, events, and agents
//!
//! Hosts construct a `SimulationKernel` from a validated config and drive
//! everything through it. The facade stamps published events with the
//! current clock, routes scoped draws to the random source, and hands the
//! time compressor mutable access to all subsystems for the duration of a
//! step. Nothing here owns a thread or a global; two kernels in one
//! process never share state.

use serde::Serialize;
use serde_json::Value;

use crate::agent::{AgentState, AgentStore};
use crate::core::clock::SimulationClock;
use crate::core::config::KernelConfig;
use crate::core::error::Result;
use crate::core::types::{AgentId, Day, EventSeq, SubscriberId, Tick};
use crate::events::{Event, EventBus, EventSlice};
use crate::rng::RandomSource;
use crate::snapshot::{KernelSnapshot, SNAPSHOT_VERSION};
use crate::time::activation::ActivationPolicy;
use crate::time::{DayHook, StepReport, TimeCompressor};

pub struct SimulationKernel {
    config: KernelConfig,
    clock: SimulationClock,
    rng: RandomSource,
    bus: EventBus,
    agents: AgentStore,
    compressor: TimeCompressor,
}

impl SimulationKernel {
    /// Build a kernel from a config, rejecting invalid rates up front
    pub fn new(config: KernelConfig) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();
        tracing::debug!(
            "kernel up: seed {}, {} ticks/day, awake budget {}",
            config.seed,
            config.ticks_per_day,
            config.max_awake_agents
        );
        Ok(Self {
            clock: SimulationClock::new(config.ticks_per_day),
            rng: RandomSource::with_audit_capacity(config.seed, config.audit_capacity),
            bus: EventBus::new(&config),
            agents: AgentStore::new(),
            compressor: TimeCompressor::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick()
    }

    pub fn current_day(&self) -> Day {
        self.clock.current_day()
    }

    // ---- population ----

    /// Add an agent with kernel-default physiology; replaces on id collision
    pub fn spawn_agent(&mut self, id: AgentId) {
        self.agents.insert(AgentState::new(id));
    }

    pub fn insert_agent(&mut self, agent: AgentState) {
        self.agents.insert(agent);
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentState> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    // ---- randomness ----

    /// Pure stream derivation; see [`RandomSource::stream`]
    pub fn stream(
        &self,
        key: &str,
        scope: &(impl Serialize + ?Sized),
    ) -> Result<rand_chacha::ChaCha8Rng> {
        self.rng.stream(key, scope)
    }

    pub fn draw_float(&mut self, key: &str, scope: &(impl Serialize + ?Sized)) -> Result<f64> {
        self.rng.draw_float(key, scope)
    }

    pub fn draw_int(
        &mut self,
        key: &str,
        scope: &(impl Serialize + ?Sized),
        lo: i64,
        hi: i64,
    ) -> Result<i64> {
        self.rng.draw_int(key, scope, lo, hi)
    }

    pub fn draw_choice<'a, T>(
        &mut self,
        key: &str,
        scope: &(impl Serialize + ?Sized),
        items: &'a [T],
    ) -> Result<&'a T> {
        self.rng.draw_choice(key, scope, items)
    }

    /// Digest of all randomness consumed so far
    pub fn rng_signature(&self) -> String {
        self.rng.signature()
    }

    pub fn rng_audit(&self) -> Vec<(String, u64)> {
        self.rng.audit_summary()
    }

    // ---- events ----

    /// Publish an event stamped with the current clock
    pub fn publish(
        &mut self,
        kind: &str,
        scope: Vec<String>,
        payload: Vec<(String, Value)>,
        tags: Vec<String>,
    ) -> Option<Event> {
        self.bus.publish(
            kind,
            self.clock.current_tick(),
            self.clock.current_day(),
            scope,
            payload,
            tags,
        )
    }

    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&Event) -> Result<()> + 'static,
        kinds: Option<&[&str]>,
    ) -> SubscriberId {
        self.bus.subscribe(handler, kinds)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Deliver everything published since the last drain
    pub fn drain(&mut self) -> Result<usize> {
        self.bus.drain()
    }

    pub fn get_since(&self, seq: EventSeq) -> EventSlice {
        self.bus.get_since(seq)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ---- time ----

    pub fn register_day_hook(&mut self, hook: Box<dyn DayHook>) {
        self.compressor.register_hook(hook);
    }

    pub fn set_activation_policy(&mut self, policy: Box<dyn ActivationPolicy>) {
        self.compressor.set_policy(policy);
    }

    /// Exact advancement, one integration per agent per tick
    pub fn step_ticks(&mut self, ticks: u64) -> Result<StepReport> {
        self.compressor.step_ticks(
            ticks,
            &mut self.clock,
            &mut self.agents,
            &mut self.rng,
            &mut self.bus,
            &self.config,
        )
    }

    /// Macro-step advancement by whole days
    pub fn step_day(&mut self, days: u64) -> Result<StepReport> {
        self.compressor.step_day(
            days,
            &mut self.clock,
            &mut self.agents,
            &mut self.rng,
            &mut self.bus,
            &self.config,
        )
    }

    /// Advance to an absolute day; requesting the past is an error
    pub fn step_to_day(&mut self, target: Day) -> Result<StepReport> {
        self.compressor.step_to_day(
            target,
            &mut self.clock,
            &mut self.agents,
            &mut self.rng,
            &mut self.bus,
            &self.config,
        )
    }

    // ---- snapshots ----

    /// Capture all replayable state; subscriptions and hooks excluded
    pub fn snapshot(&self) -> KernelSnapshot {
        KernelSnapshot {
            version: SNAPSHOT_VERSION,
            clock: self.clock.clone(),
            rng: self.rng.snapshot_state(),
            bus: self.bus.snapshot_state(),
            agents: self.agents.clone(),
        }
    }

    /// Overwrite kernel state from a snapshot
    ///
    /// The snapshot's clock wins over the config's `ticks_per_day`; a
    /// restored run must continue on the timeline it was captured from.
    /// Hosts re-register subscribers and day hooks themselves.
    pub fn restore(&mut self, snap: KernelSnapshot) {
        self.clock = snap.clock;
        self.rng.restore_state(snap.rng);
        self.bus.restore_state(snap.bus);
        self.agents = snap.agents;
    }

    /// Serialize the snapshot to its versioned JSON blob form
    pub fn snapshot_json(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Restore from a JSON blob, rejecting unknown versions
    pub fn restore_json(&mut self, raw: &str) -> Result<()> {
        self.restore(KernelSnapshot::from_json(raw)?);
        Ok(())
    }

    /// Digest of the full kernel state, for divergence checks
    pub fn state_signature(&self) -> Result<String> {
        self.snapshot().state_signature()
    }
}

impl std::fmt::Debug for SimulationKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationKernel")
            .field("tick", &self.clock.current_tick())
            .field("day", &self.clock.current_day())
            .field("agents", &self.agents.len())
            .field("bus", &self.bus)
            .finish()
    }
}
