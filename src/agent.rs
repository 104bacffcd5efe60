//! Kernel-owned per-agent physiological scalars
//!
//! Domain subsystems layer richer state on top of these in their own
//! stores; the kernel itself integrates only the continuous fields that
//! macro-stepping must keep numerically faithful. One shared `integrate`
//! updater serves both the exact per-tick path and the macro substep path,
//! so "equivalence" is a statement about step sizes, not about two
//! different pieces of code.

use serde::{Deserialize, Serialize};

use crate::core::config::KernelConfig;
use crate::core::types::AgentId;

/// Continuous per-agent fields, each clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    /// 0.0 = sated, 1.0 = starving; rises linearly
    pub hunger: f64,
    /// 0.0 = rested, 1.0 = exhausted; rises with a recovery term so it
    /// saturates instead of pinning at the clamp
    pub fatigue: f64,
    /// Relaxes toward zero when nothing stokes it
    pub stress: f64,
}

impl AgentState {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            hunger: 0.2,
            fatigue: 0.3,
            stress: 0.1,
        }
    }

    /// Advance the continuous fields by `dt_ticks` ticks of simulated time
    ///
    /// `rate_scale` carries the per-(agent, day) metabolic jitter; 1.0 is
    /// nominal. Explicit Euler on purpose: the macro scheduler controls
    /// accuracy by choosing the step size.
    pub fn integrate(&mut self, dt_ticks: f64, config: &KernelConfig, rate_scale: f64) {
        let dt_days = dt_ticks / config.ticks_per_day as f64;
        self.hunger = clamp01(self.hunger + config.hunger_per_day * rate_scale * dt_days);
        self.fatigue = clamp01(
            self.fatigue
                + (config.fatigue_per_day * rate_scale
                    - config.fatigue_recovery_per_day * self.fatigue)
                    * dt_days,
        );
        self.stress = clamp01(self.stress - config.stress_relax_per_day * self.stress * dt_days);
    }

    /// The exact per-tick updater; macro-stepping must stay within
    /// tolerance of looping this once per tick
    pub fn tick_update(&mut self, config: &KernelConfig, rate_scale: f64) {
        self.integrate(1.0, config, rate_scale);
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Id-sorted store of agent state
///
/// Iteration order is ascending id, always; the awake/ambient partition
/// and every integration loop depend on that being reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStore {
    agents: Vec<AgentState>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) an agent, keeping the store id-sorted
    pub fn insert(&mut self, agent: AgentState) {
        match self.agents.binary_search_by_key(&agent.id, |a| a.id) {
            Ok(i) => self.agents[i] = agent,
            Err(i) => self.agents.insert(i, agent),
        }
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentState> {
        self.agents
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.agents[i])
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut AgentState> {
        self.agents
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &mut self.agents[i])
    }

    /// All ids, ascending
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentState> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AgentState> {
        self.agents.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
