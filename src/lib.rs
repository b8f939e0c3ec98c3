//! Quest and reward-notification tracker.
//!
//! Owns daily, main, login and energy quest state for a single player,
//! resets daily state lazily at a fixed server boundary, and raises
//! edge-triggered "reward pending" notifications for the presentation layer.

pub mod config;
pub mod data;
pub mod profile;
pub mod quest;
pub mod schedule;
pub mod session;
