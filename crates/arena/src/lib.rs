//! Arena - automated tournaments between external chess engines.
//!
//! This crate pairs engines according to a schedule, spawns and supervises
//! each pair for a game, enforces time controls, adjudicates results,
//! persists progress so tournaments can be resumed, and aggregates scores,
//! Elo estimates and SPRT state.
//!
//! # Modules
//!
//! - [`clock`] - time controls and the per-side game clock
//! - [`game`] - the per-game state machine driving two engine processes
//! - [`adjudicator`] - score/tablebase/length based forced results
//! - [`manager`] - the bounded-concurrency game scheduler
//! - [`tournament`] - pairing production, scores, strikes, SPRT, Elo
//! - [`openings`] - EPD/PGN opening suites
//! - [`persistence`] - the resumable tournament file
//! - [`output`] - PGN/EPD/live artifacts
//! - [`config`] - engine configurations and the named-engine manager
//! - [`cli`] - the command-line surface
//! - [`supervisor`] - top-level control, interrupts and exit codes

pub mod adjudicator;
pub mod cli;
pub mod clock;
pub mod config;
pub mod game;
pub mod manager;
pub mod openings;
pub mod output;
pub mod persistence;
pub mod supervisor;
pub mod tournament;
