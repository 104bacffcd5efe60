//! Kernel configuration with documented constants
//!
//! All tunables are collected here with explanations of their purpose and
//! how they interact. Invalid values are normalized to safe defaults at
//! construction; values that cannot be defaulted sanely fail fast in
//! `validate()`.

use serde::{Deserialize, Serialize};

use crate::core::error::{KernelError, Result};

/// Eviction policy for the bounded event ring
///
/// Only `DropOldest` exists today; the enum is here because the bus config
/// contract names the policy explicitly and domain hosts select it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the oldest retained event and advance `base_seq`
    #[default]
    DropOldest,
}

/// Configuration for a kernel instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    // === RANDOMNESS ===
    /// Global seed from which every stream is derived
    ///
    /// Two kernels built with the same seed and fed the same calls consume
    /// identical randomness; this is the only reproducibility root.
    pub seed: u64,

    /// Maximum number of distinct keys the RNG audit table retains
    ///
    /// On overflow the lowest-count entries are evicted first, so the
    /// heaviest randomness consumers always stay visible.
    pub audit_capacity: usize,

    // === TIME ===
    /// Ticks in one simulated day
    ///
    /// The cadence most domain hooks run at. Zero is normalized to the
    /// default rather than dividing by zero at every day derivation.
    pub ticks_per_day: u64,

    /// Sub-intervals per day used when integrating awake agents
    ///
    /// More substeps track the per-tick updater more closely at higher
    /// cost. At 4, the Euler error for the default rates stays an order of
    /// magnitude under the 0.02 equivalence tolerance.
    pub substeps_per_day: u64,

    /// Maximum number of agents integrated exactly during a macro step
    ///
    /// The first `max_awake_agents` ids in sorted order form the awake set;
    /// the rest are integrated with one coarse interval. If this is >= the
    /// population, the whole run degrades to exact per-tick equivalence.
    pub max_awake_agents: usize,

    // === EVENT BUS ===
    /// Maximum number of retained events before oldest-first eviction
    pub max_events: usize,

    /// Maximum payload entries per event; extra entries are dropped and a
    /// truncation marker appended
    pub max_payload_items: usize,

    /// Eviction policy when the ring is full
    pub eviction_policy: EvictionPolicy,

    /// Whether publishing is active at all
    ///
    /// A disabled bus turns `publish` into a silent no-op. This is an
    /// explicit configuration state for headless batch runs, not an error.
    pub bus_enabled: bool,

    // === AGENT INTEGRATION (rates are per simulated day) ===
    /// Hunger rise per day (0.0 = sated, 1.0 = starving)
    pub hunger_per_day: f64,

    /// Fatigue rise per day before recovery is applied
    pub fatigue_per_day: f64,

    /// Fatigue recovery rate; the recovery term is `rate * fatigue`, so
    /// fatigue saturates instead of climbing forever
    pub fatigue_recovery_per_day: f64,

    /// Stress relaxation rate toward zero
    pub stress_relax_per_day: f64,

    /// Half-width of the per-(agent, day) metabolic jitter multiplier
    ///
    /// A jitter of 0.01 scales rates by a factor in [0.99, 1.01]. Kept
    /// small so jitter cannot push macro-stepped state outside the
    /// awake-equivalence tolerance.
    pub jitter_amplitude: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            audit_capacity: 64,

            ticks_per_day: 1000,
            substeps_per_day: 4,
            max_awake_agents: 64,

            max_events: 1024,
            max_payload_items: 16,
            eviction_policy: EvictionPolicy::DropOldest,
            bus_enabled: true,

            hunger_per_day: 0.35,
            fatigue_per_day: 0.5,
            fatigue_recovery_per_day: 0.3,
            stress_relax_per_day: 0.2,
            jitter_amplitude: 0.01,
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with recoverable invalid fields replaced by defaults
    ///
    /// Each replacement is logged; callers who want hard failures instead
    /// should call `validate()` first.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        let mut cfg = self.clone();

        if cfg.ticks_per_day == 0 {
            tracing::warn!(
                "ticks_per_day must be positive, using default {}",
                defaults.ticks_per_day
            );
            cfg.ticks_per_day = defaults.ticks_per_day;
        }
        if cfg.substeps_per_day == 0 {
            tracing::warn!(
                "substeps_per_day must be positive, using default {}",
                defaults.substeps_per_day
            );
            cfg.substeps_per_day = defaults.substeps_per_day;
        }
        if cfg.max_events == 0 {
            tracing::warn!(
                "max_events must be positive, using default {}",
                defaults.max_events
            );
            cfg.max_events = defaults.max_events;
        }
        if cfg.max_payload_items == 0 {
            tracing::warn!(
                "max_payload_items must be positive, using default {}",
                defaults.max_payload_items
            );
            cfg.max_payload_items = defaults.max_payload_items;
        }
        if cfg.audit_capacity == 0 {
            tracing::warn!(
                "audit_capacity must be positive, using default {}",
                defaults.audit_capacity
            );
            cfg.audit_capacity = defaults.audit_capacity;
        }
        if !cfg.jitter_amplitude.is_finite() || cfg.jitter_amplitude < 0.0 {
            tracing::warn!(
                "jitter_amplitude must be a small non-negative number, using default {}",
                defaults.jitter_amplitude
            );
            cfg.jitter_amplitude = defaults.jitter_amplitude;
        }

        cfg
    }

    /// Validate fields that cannot be normalized away
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("hunger_per_day", self.hunger_per_day),
            ("fatigue_per_day", self.fatigue_per_day),
            ("fatigue_recovery_per_day", self.fatigue_recovery_per_day),
            ("stress_relax_per_day", self.stress_relax_per_day),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(KernelError::InvalidConfig(format!(
                    "{name} must be a finite non-negative rate, got {rate}"
                )));
            }
        }
        Ok(())
    }

    /// Parse a config from TOML, normalizing recoverable fields
    pub fn parse_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)
            .map_err(|e| KernelError::InvalidConfig(format!("TOML parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg.normalized())
    }

    /// Load a config from a TOML file
    pub fn load_from_toml(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = KernelConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.normalized(), cfg);
    }

    #[test]
    fn test_zero_ticks_per_day_normalized_to_default() {
        let cfg = KernelConfig {
            ticks_per_day: 0,
            ..Default::default()
        };
        assert_eq!(
            cfg.normalized().ticks_per_day,
            KernelConfig::default().ticks_per_day
        );
    }

    #[test]
    fn test_zero_bounds_normalized() {
        let cfg = KernelConfig {
            max_events: 0,
            max_payload_items: 0,
            substeps_per_day: 0,
            audit_capacity: 0,
            ..Default::default()
        };
        let cfg = cfg.normalized();
        assert!(cfg.max_events > 0);
        assert!(cfg.max_payload_items > 0);
        assert!(cfg.substeps_per_day > 0);
        assert!(cfg.audit_capacity > 0);
    }

    #[test]
    fn test_non_finite_rate_fails_validation() {
        let cfg = KernelConfig {
            hunger_per_day: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_toml_partial_overrides() {
        let cfg = KernelConfig::parse_toml(
            r#"
            seed = 42
            ticks_per_day = 144000
            max_awake_agents = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.ticks_per_day, 144_000);
        assert_eq!(cfg.max_awake_agents, 8);
        // untouched fields keep defaults
        assert_eq!(cfg.max_events, KernelConfig::default().max_events);
    }

    #[test]
    fn test_parse_toml_rejects_garbage() {
        assert!(KernelConfig::parse_toml("seed = \"not a number\"").is_err());
    }
}
