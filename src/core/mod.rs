//! Core deterministic primitives.
//!
//! Randomness for cards, call order and call pacing all flows from here so a
//! session can be replayed from its seed.

pub mod rng;

pub use rng::{DeterministicRng, derive_session_seed};
