//! Client-side session layer for Past Pursuit.
//!
//! The server owns all game rules; this crate keeps a local mirror of the
//! session in sync with the snapshots it pushes, runs the client-side
//! countdowns, and turns player actions into wire messages.

pub mod dispatch;
pub mod network;
pub mod runner;
pub mod session;
pub mod timers;
