//! Stateful layer: playback scheduling, persistence and the live session.

pub mod schedule;
pub mod session;
pub mod store;
