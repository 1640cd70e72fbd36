//! Terminal host: keyboard input, drawing and sample output.

pub mod input;
pub mod renderer;
pub mod sound;
