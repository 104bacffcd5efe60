//! Core kernel primitives: configuration, clock, errors, shared types

pub mod clock;
pub mod config;
pub mod error;
pub mod types;
