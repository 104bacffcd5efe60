//! Time compression: exact per-tick and approximate macro-step advancement
//!
//! The compressor is the only code allowed to move the clock. `step_ticks`
//! integrates every agent once per tick; `step_day` integrates the awake
//! subset with a few substeps per day and the ambient remainder with one
//! coarse interval, which is the whole point of macro-stepping. Both paths
//! share the same updater and draw the same per-(agent, day) jitter
//! streams, so switching modes never changes what randomness is consumed.
//!
//! Every step is all-or-nothing: agent mutations are staged on a copy and
//! committed together with the clock advance, so a failing day hook leaves
//! the kernel at the last fully committed state.

pub mod activation;

use ahash::AHashSet;
use serde_json::json;

use crate::agent::AgentStore;
use crate::core::clock::SimulationClock;
use crate::core::config::KernelConfig;
use crate::core::error::{KernelError, Result};
use crate::core::types::{AgentId, Day, Tick};
use crate::events::EventBus;
use crate::rng::RandomSource;
use crate::time::activation::{ActivationPolicy, SortedIdPrefix};

/// Stream key for the per-(agent, day) metabolic rate jitter
const JITTER_KEY: &str = "metabolic-jitter";

/// What a day hook may touch: the staged agents, randomness, and the log
pub struct DayContext<'a> {
    pub day: Day,
    /// Absolute tick of the day boundary being processed
    pub tick: Tick,
    pub agents: &'a mut AgentStore,
    pub rng: &'a mut RandomSource,
    pub bus: &'a mut EventBus,
}

/// Once-per-day domain behavior, run at every day boundary crossed
///
/// Hooks run in registration order, never reordered by runtime state, so
/// identical runs execute identical hook sequences.
pub trait DayHook {
    /// Stable name used in logs and failure errors
    fn name(&self) -> &str;
    fn on_day(&mut self, day: Day, ctx: &mut DayContext<'_>) -> Result<()>;
}

struct FnDayHook<F> {
    name: String,
    f: F,
}

impl<F> DayHook for FnDayHook<F>
where
    F: FnMut(Day, &mut DayContext<'_>) -> Result<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_day(&mut self, day: Day, ctx: &mut DayContext<'_>) -> Result<()> {
        (self.f)(day, ctx)
    }
}

/// Wrap a closure as a named day hook
pub fn hook_fn(
    name: &str,
    f: impl FnMut(Day, &mut DayContext<'_>) -> Result<()> + 'static,
) -> Box<dyn DayHook> {
    Box::new(FnDayHook {
        name: name.to_string(),
        f,
    })
}

/// Summary of one completed step call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub days_crossed: u64,
    pub elapsed_ticks: u64,
    pub awake: usize,
    pub ambient: usize,
    pub hook_runs: usize,
}

/// Forward-only scheduler over a partitioned population
pub struct TimeCompressor {
    substeps_per_day: u64,
    max_awake_agents: usize,
    policy: Box<dyn ActivationPolicy>,
    hooks: Vec<Box<dyn DayHook>>,
}

impl TimeCompressor {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            substeps_per_day: config.substeps_per_day.max(1),
            max_awake_agents: config.max_awake_agents,
            policy: Box::new(SortedIdPrefix),
            hooks: Vec::new(),
        }
    }

    /// Replace the awake-selection policy
    pub fn set_policy(&mut self, policy: Box<dyn ActivationPolicy>) {
        self.policy = policy;
    }

    /// Append a hook; registration order is execution order
    pub fn register_hook(&mut self, hook: Box<dyn DayHook>) {
        self.hooks.push(hook);
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Advance by whole days using macro-step integration
    ///
    /// Awake agents get `days * substeps_per_day` sub-intervals; ambient
    /// agents get one coarse interval over the whole window. Day hooks run
    /// once per boundary crossed, after all integration. The clock and the
    /// agent store are committed only if everything succeeds.
    pub fn step_day(
        &mut self,
        days: u64,
        clock: &mut SimulationClock,
        agents: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
        config: &KernelConfig,
    ) -> Result<StepReport> {
        if days == 0 {
            return Ok(StepReport::default());
        }
        // a failed step rewinds everything it touched: rng counters and the
        // event log roll back with agents and clock, so a retry republishes
        // under the same sequence numbers. drain() can never run mid-step,
        // so no delivered event is ever retracted.
        let rng_checkpoint = rng.snapshot_state();
        let bus_checkpoint = bus.snapshot_state();
        match self.step_day_inner(days, clock, agents, rng, bus, config) {
            Ok(report) => Ok(report),
            Err(e) => {
                rng.restore_state(rng_checkpoint);
                bus.restore_state(bus_checkpoint);
                Err(e)
            }
        }
    }

    fn step_day_inner(
        &mut self,
        days: u64,
        clock: &mut SimulationClock,
        agents: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
        config: &KernelConfig,
    ) -> Result<StepReport> {
        let ticks_per_day = clock.ticks_per_day();
        let elapsed_ticks = days * ticks_per_day;
        let start_day = clock.current_day();

        let mut staged = agents.clone();
        let activation = self.policy.partition(&staged.ids(), self.max_awake_agents);
        let awake: AHashSet<AgentId> = activation.awake.iter().copied().collect();
        let ambient: AHashSet<AgentId> = activation.ambient.iter().copied().collect();

        // Awake subset: substep integration, day by day so jitter redraws
        // line up with day boundaries. The substep remainder is absorbed by
        // the final sub-interval of each day.
        let base = ticks_per_day / self.substeps_per_day;
        let remainder = ticks_per_day % self.substeps_per_day;
        for d in 0..days {
            let day = start_day + d;
            for agent in staged.iter_mut() {
                if !awake.contains(&agent.id) {
                    continue;
                }
                let scale = day_rate_scale(rng, config, agent.id, day)?;
                for s in 0..self.substeps_per_day {
                    let dt = if s + 1 == self.substeps_per_day {
                        base + remainder
                    } else {
                        base
                    };
                    agent.integrate(dt as f64, config, scale);
                }
            }
        }

        // Ambient remainder: one coarse interval over the whole window.
        // The awake-equivalence tolerance does not apply here.
        for agent in staged.iter_mut() {
            if !ambient.contains(&agent.id) {
                continue;
            }
            let scale = window_rate_scale(rng, config, agent.id, start_day, days)?;
            agent.integrate(elapsed_ticks as f64, config, scale);
        }

        // Day hooks, once per boundary crossed, in registration order
        let mut hook_runs = 0;
        for d in 1..=days {
            let day = start_day + d;
            let boundary_tick = day * ticks_per_day;
            bus.publish(
                "time.day_rollover",
                boundary_tick,
                day,
                vec![],
                vec![("day".to_string(), json!(day))],
                vec![],
            );
            hook_runs += self.run_hooks_for_day(day, boundary_tick, &mut staged, rng, bus)?;
        }

        // commit
        *agents = staged;
        clock.advance_ticks(elapsed_ticks);

        let report = StepReport {
            days_crossed: days,
            elapsed_ticks,
            awake: activation.awake.len(),
            ambient: activation.ambient.len(),
            hook_runs,
        };
        bus.publish(
            "time.macro_step",
            clock.current_tick(),
            clock.current_day(),
            vec![],
            vec![
                ("ambient".to_string(), json!(report.ambient)),
                ("awake".to_string(), json!(report.awake)),
                ("days".to_string(), json!(days)),
            ],
            vec![],
        );
        tracing::debug!(
            "macro step: {} day(s), {} awake, {} ambient, {} hook runs",
            days,
            report.awake,
            report.ambient,
            hook_runs
        );
        Ok(report)
    }

    /// Advance tick by tick, integrating every agent exactly
    ///
    /// Day hooks and rollover events fire at each boundary crossed, just
    /// like the macro path; the same jitter streams are drawn per
    /// (agent, day), so both modes consume identical randomness.
    pub fn step_ticks(
        &mut self,
        ticks: u64,
        clock: &mut SimulationClock,
        agents: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
        config: &KernelConfig,
    ) -> Result<StepReport> {
        if ticks == 0 {
            return Ok(StepReport::default());
        }
        let rng_checkpoint = rng.snapshot_state();
        let bus_checkpoint = bus.snapshot_state();
        match self.step_ticks_inner(ticks, clock, agents, rng, bus, config) {
            Ok(report) => Ok(report),
            Err(e) => {
                rng.restore_state(rng_checkpoint);
                bus.restore_state(bus_checkpoint);
                Err(e)
            }
        }
    }

    fn step_ticks_inner(
        &mut self,
        ticks: u64,
        clock: &mut SimulationClock,
        agents: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
        config: &KernelConfig,
    ) -> Result<StepReport> {
        let ticks_per_day = clock.ticks_per_day();
        let start_tick = clock.current_tick();

        let mut staged = agents.clone();
        let mut current_day = start_tick / ticks_per_day;
        let mut scales = draw_day_scales(rng, config, &staged, current_day)?;
        let mut hook_runs = 0;

        for step in 1..=ticks {
            let tick = start_tick + step;
            // the tick being integrated belongs to the day it started in
            let tick_day = (tick - 1) / ticks_per_day;
            if tick_day != current_day {
                current_day = tick_day;
                scales = draw_day_scales(rng, config, &staged, current_day)?;
            }
            for (agent, scale) in staged.iter_mut().zip(&scales) {
                agent.tick_update(config, *scale);
            }
            if tick % ticks_per_day == 0 {
                let day = tick / ticks_per_day;
                bus.publish(
                    "time.day_rollover",
                    tick,
                    day,
                    vec![],
                    vec![("day".to_string(), json!(day))],
                    vec![],
                );
                hook_runs += self.run_hooks_for_day(day, tick, &mut staged, rng, bus)?;
            }
        }

        let population = staged.len();
        *agents = staged;
        clock.advance_ticks(ticks);

        Ok(StepReport {
            days_crossed: clock.current_day() - start_tick / ticks_per_day,
            elapsed_ticks: ticks,
            awake: population,
            ambient: 0,
            hook_runs,
        })
    }

    /// Advance to an absolute day; the past is unreachable
    pub fn step_to_day(
        &mut self,
        target: Day,
        clock: &mut SimulationClock,
        agents: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
        config: &KernelConfig,
    ) -> Result<StepReport> {
        let current = clock.current_day();
        if target < current {
            return Err(KernelError::NonMonotonicTime {
                current,
                requested: target,
            });
        }
        self.step_day(target - current, clock, agents, rng, bus, config)
    }

    fn run_hooks_for_day(
        &mut self,
        day: Day,
        boundary_tick: Tick,
        staged: &mut AgentStore,
        rng: &mut RandomSource,
        bus: &mut EventBus,
    ) -> Result<usize> {
        let mut runs = 0;
        for hook in self.hooks.iter_mut() {
            let mut ctx = DayContext {
                day,
                tick: boundary_tick,
                agents: &mut *staged,
                rng: &mut *rng,
                bus: &mut *bus,
            };
            hook.on_day(day, &mut ctx).map_err(|e| {
                tracing::warn!("day hook '{}' failed on day {day}: {e}", hook.name());
                KernelError::HookFailed {
                    hook: hook.name().to_string(),
                    day,
                    message: e.to_string(),
                }
            })?;
            runs += 1;
        }
        Ok(runs)
    }
}

impl std::fmt::Debug for TimeCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeCompressor")
            .field("substeps_per_day", &self.substeps_per_day)
            .field("max_awake_agents", &self.max_awake_agents)
            .field("hooks", &self.hook_names())
            .finish()
    }
}

/// Jitter multiplier for one (agent, day) stream
fn day_rate_scale(
    rng: &mut RandomSource,
    config: &KernelConfig,
    id: AgentId,
    day: Day,
) -> Result<f64> {
    if config.jitter_amplitude == 0.0 {
        return Ok(1.0);
    }
    let u = rng.draw_float(JITTER_KEY, &json!({"agent": id.0, "day": day}))?;
    Ok(1.0 + (u - 0.5) * 2.0 * config.jitter_amplitude)
}

/// Jitter multiplier for an ambient agent over a whole macro window
fn window_rate_scale(
    rng: &mut RandomSource,
    config: &KernelConfig,
    id: AgentId,
    start_day: Day,
    days: u64,
) -> Result<f64> {
    if config.jitter_amplitude == 0.0 {
        return Ok(1.0);
    }
    let u = rng.draw_float(
        JITTER_KEY,
        &json!({"agent": id.0, "days": days, "window_start": start_day}),
    )?;
    Ok(1.0 + (u - 0.5) * 2.0 * config.jitter_amplitude)
}

/// Per-agent scales for one day, aligned with store iteration order
fn draw_day_scales(
    rng: &mut RandomSource,
    config: &KernelConfig,
    agents: &AgentStore,
    day: Day,
) -> Result<Vec<f64>> {
    let mut scales = Vec::with_capacity(agents.len());
    for agent in agents.iter() {
        scales.push(day_rate_scale(rng, config, agent.id, day)?);
    }
    Ok(scales)
}
