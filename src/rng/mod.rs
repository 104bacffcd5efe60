//! Scoped, auditable random streams
//!
//! Every reproducibility-sensitive decision in the simulation draws its
//! randomness through a named stream: a (key, scope) pair such as
//! `("labor-strike-roll", {ward_id, org_id, day})`. The value of a draw is
//! a pure function of (global seed, key, canonical scope, draw index), so
//! two runs with the same seed and the same calls produce identical
//! results regardless of what else happened in between. There is no shared
//! mutable generator anywhere.

pub mod scope;

use std::collections::BTreeMap;

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::error::{KernelError, Result};
use crate::rng::scope::encode_scope;

/// Identity of a stream: key plus the digest of its canonical scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub key: String,
    /// Hex SHA-256 of the canonical scope encoding
    pub scope: String,
}

/// Serializable RNG state: everything that must survive a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngSnapshot {
    pub seed: u64,
    pub counters: Vec<(StreamId, u64)>,
    pub audit: Vec<(String, u64)>,
}

/// Scoped random-number service
pub struct RandomSource {
    seed: u64,
    /// Per-stream draw counters; ordered so signatures are stable
    counters: BTreeMap<StreamId, u64>,
    audit: AuditTable,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self::with_audit_capacity(seed, 64)
    }

    pub fn with_audit_capacity(seed: u64, audit_capacity: usize) -> Self {
        Self {
            seed,
            counters: BTreeMap::new(),
            audit: AuditTable::new(audit_capacity.max(1)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derive a whole reproducible stream for a (key, scope) identity
    ///
    /// This is a pure derivation: it touches no counters and returns the
    /// same generator every time for the same identity. Use it when a
    /// subsystem wants to make many draws itself; use `draw_*` when the
    /// kernel should track draw indices.
    pub fn stream(&self, key: &str, scope: &(impl Serialize + ?Sized)) -> Result<ChaCha8Rng> {
        let scope_bytes = encode_scope(scope)?;
        Ok(ChaCha8Rng::from_seed(derive_seed(
            self.seed,
            key,
            &scope_bytes,
            None,
        )))
    }

    /// Uniform float in [0, 1)
    pub fn draw_float(&mut self, key: &str, scope: &(impl Serialize + ?Sized)) -> Result<f64> {
        let mut rng = self.sub_rng(key, scope)?;
        Ok(rng.gen::<f64>())
    }

    /// Uniform integer in [lo, hi] inclusive
    pub fn draw_int(
        &mut self,
        key: &str,
        scope: &(impl Serialize + ?Sized),
        lo: i64,
        hi: i64,
    ) -> Result<i64> {
        if lo > hi {
            return Err(KernelError::EmptySequence {
                key: key.to_string(),
            });
        }
        let mut rng = self.sub_rng(key, scope)?;
        Ok(rng.gen_range(lo..=hi))
    }

    /// Uniform choice from a slice
    pub fn draw_choice<'a, T>(
        &mut self,
        key: &str,
        scope: &(impl Serialize + ?Sized),
        items: &'a [T],
    ) -> Result<&'a T> {
        if items.is_empty() {
            return Err(KernelError::EmptySequence {
                key: key.to_string(),
            });
        }
        let mut rng = self.sub_rng(key, scope)?;
        let idx = rng.gen_range(0..items.len());
        Ok(&items[idx])
    }

    /// Digest over sorted (stream id, counter) pairs
    ///
    /// Two runs consumed identical randomness if and only if their
    /// signatures agree.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, counter) in &self.counters {
            hasher.update((id.key.len() as u64).to_le_bytes());
            hasher.update(id.key.as_bytes());
            hasher.update(id.scope.as_bytes());
            hasher.update(counter.to_le_bytes());
        }
        hex(&hasher.finalize())
    }

    /// Bounded (key, draw_count) table, heaviest consumers first
    pub fn audit_summary(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .audit
            .counts
            .iter()
            .map(|(k, c)| (k.clone(), *c))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub(crate) fn snapshot_state(&self) -> RngSnapshot {
        // audit entries are key-sorted so two identical runs serialize to
        // identical bytes
        let mut audit: Vec<(String, u64)> = self
            .audit
            .counts
            .iter()
            .map(|(k, c)| (k.clone(), *c))
            .collect();
        audit.sort_by(|a, b| a.0.cmp(&b.0));
        RngSnapshot {
            seed: self.seed,
            counters: self
                .counters
                .iter()
                .map(|(id, c)| (id.clone(), *c))
                .collect(),
            audit,
        }
    }

    pub(crate) fn restore_state(&mut self, snap: RngSnapshot) {
        self.seed = snap.seed;
        self.counters = snap.counters.into_iter().collect();
        self.audit.counts = snap.audit.into_iter().collect();
    }

    /// Derive the next sub-draw generator for a stream and advance its counter
    ///
    /// The seed folds in the draw index *before* the increment, so the
    /// first draw on a stream uses index 0 and sequential draws are
    /// independent sub-draws rather than repeats.
    fn sub_rng(&mut self, key: &str, scope: &(impl Serialize + ?Sized)) -> Result<ChaCha8Rng> {
        let scope_bytes = encode_scope(scope)?;
        let id = StreamId {
            key: key.to_string(),
            scope: hex(&Sha256::digest(&scope_bytes)),
        };
        let counter = self.counters.entry(id).or_insert(0);
        let seed = derive_seed(self.seed, key, &scope_bytes, Some(*counter));
        *counter += 1;
        self.audit.record(key);
        Ok(ChaCha8Rng::from_seed(seed))
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource")
            .field("seed", &self.seed)
            .field("streams", &self.counters.len())
            .finish()
    }
}

/// SHA-256 over (seed, key, scope, optional draw index), length-prefixed
fn derive_seed(seed: u64, key: &str, scope_bytes: &[u8], index: Option<u64>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update((key.len() as u64).to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update((scope_bytes.len() as u64).to_le_bytes());
    hasher.update(scope_bytes);
    if let Some(index) = index {
        hasher.update(index.to_le_bytes());
    }
    hasher.finalize().into()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Bounded per-key draw counts
///
/// Eviction drops the lowest-count entry first (ties by key) so the table
/// never loses its heaviest consumers.
struct AuditTable {
    capacity: usize,
    counts: AHashMap<String, u64>,
}

impl AuditTable {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            counts: AHashMap::new(),
        }
    }

    fn record(&mut self, key: &str) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
            return;
        }
        if self.counts.len() >= self.capacity {
            if let Some(victim) = self
                .counts
                .iter()
                .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(k, _)| k.clone())
            {
                self.counts.remove(&victim);
            }
        }
        self.counts.insert(key.to_string(), 1);
    }
}
