//! Tessera Kernel - Deterministic simulation substrate

pub mod agent;
pub mod core;
pub mod events;
pub mod kernel;
pub mod rng;
pub mod snapshot;
pub mod time;
