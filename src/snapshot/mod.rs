//! Versioned whole-kernel snapshots
//!
//! A snapshot captures everything replay needs: the clock, every RNG
//! stream counter, the retained and pending event queues, and the agent
//! store. Subscriptions are runtime wiring and are not captured; hosts
//! re-register handlers after a restore. The blob is self-describing JSON
//! with an explicit version so stale files fail loudly instead of
//! deserializing into nonsense.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agent::AgentStore;
use crate::core::clock::SimulationClock;
use crate::core::error::{KernelError, Result};
use crate::events::BusSnapshot;
use crate::rng::RngSnapshot;

/// Bumped whenever the serialized layout changes incompatibly
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete serializable kernel state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSnapshot {
    pub version: u32,
    pub clock: SimulationClock,
    pub rng: RngSnapshot,
    pub bus: BusSnapshot,
    pub agents: AgentStore,
}

impl KernelSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting unknown versions
    pub fn from_json(raw: &str) -> Result<Self> {
        let snap: KernelSnapshot = serde_json::from_str(raw)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(KernelError::SnapshotFormat(format!(
                "unsupported snapshot version {} (expected {})",
                snap.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snap)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        tracing::debug!("snapshot saved to {}", path.display());
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Order-insensitive digest of the captured state
    ///
    /// Struct field order and the sorted collections inside make the
    /// serialization deterministic, so hashing the bytes is enough. Two
    /// kernels with equal signatures hold identical state.
    pub fn state_signature(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}
