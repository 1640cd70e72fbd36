//! Beatle: an 8-lane drum step sequencer with a daily rhythm puzzle.
//!
//! `domain` is pure (grid, text codec, daily code, scoring). `sim` holds
//! timing and state. `ui` is the crossterm/rodio host used by the binary.

pub mod config;
pub mod domain;
pub mod error;
pub mod sim;
pub mod ui;
