//! Simulation clock: tick counter with derived day
//!
//! The day is always derived from the tick, so the two can never disagree.
//! Nothing outside the time compressor may advance the clock.

use serde::{Deserialize, Serialize};

use crate::core::types::{Day, Tick};

/// Forward-only simulation clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationClock {
    tick: Tick,
    ticks_per_day: u64,
}

impl SimulationClock {
    pub fn new(ticks_per_day: u64) -> Self {
        Self {
            tick: 0,
            ticks_per_day: ticks_per_day.max(1),
        }
    }

    /// Advance the clock by a number of ticks (forward-only by construction)
    pub fn advance_ticks(&mut self, ticks: u64) {
        self.tick += ticks;
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn current_day(&self) -> Day {
        self.tick / self.ticks_per_day
    }

    pub fn ticks_per_day(&self) -> u64 {
        self.ticks_per_day
    }
}
