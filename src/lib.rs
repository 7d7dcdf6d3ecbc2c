//! Coordination engine for a cooperative wall of twelve button displays
//! running a pattern-matching card game.
//!
//! Each physical instance registers for one board cell and renders from the
//! shared [`state::game::GameState`]; a single engine arbitrates buzz-in
//! races, drives the phase state machine and its timers, validates completed
//! triples, and persists the whole state after every mutation. Consumers
//! observe changes through [`state::GameEngine::subscribe`], which delivers a
//! full snapshot after each applied mutation.

/// Time source abstraction for the real-time windows.
pub mod clock;
/// Engine configuration loading.
pub mod config;
/// Persistence layer: snapshot stores and storage errors.
pub mod dao;
/// Card model, deck generation, and match validation.
pub mod deck;
/// Engine-level error types.
pub mod error;
/// Inbound operations and read-only projections.
pub mod services;
/// Shared game state, phase machine, engine, and change bus.
pub mod state;

pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
pub use crate::state::{GameEngine, SharedEngine};
