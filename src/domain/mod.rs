//! Pure game model: the grid, its text form, the daily puzzle and scoring.

pub mod codec;
pub mod daily;
pub mod pattern;
pub mod score;
