//! Pattern grid: lanes × steps of hit/rest cells.
//!
//! The shape is fixed at construction. Every mutation keeps every lane at
//! exactly `steps` cells; a pattern is never partially valid.

/// Default lane count (one per drum voice).
pub const LANES: usize = 8;
/// Default steps per lane (one bar of 16th notes).
pub const STEPS_PER_LANE: usize = 16;

/// Display names for the default lanes, top to bottom.
pub const LANE_NAMES: [&str; LANES] = [
    "Crash Cymbal",
    "Hi-Hat",
    "Ride Cymbal",
    "High Tom",
    "Mid Tom",
    "Snare",
    "Floor Tom",
    "Kick",
];

/// Lane label, falling back to `Lane N` beyond the named set.
pub fn lane_name(lane: usize) -> String {
    LANE_NAMES
        .get(lane)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Lane {}", lane + 1))
}

/// Hit / rest glyph pair used by pattern text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Glyphs {
    pub hit: char,
    pub rest: char,
}

impl Default for Glyphs {
    fn default() -> Self {
        Glyphs { hit: 'x', rest: '-' }
    }
}

impl Glyphs {
    pub fn glyph(self, hit: bool) -> char {
        if hit { self.hit } else { self.rest }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Pattern {
    lanes: Vec<Vec<bool>>,
    steps: usize,
}

impl Pattern {
    /// All-rest pattern of the given shape.
    pub fn new(lanes: usize, steps: usize) -> Self {
        Pattern {
            lanes: vec![vec![false; steps]; lanes],
            steps,
        }
    }

    /// Build from pre-decoded lanes. Returns None if any lane length differs
    /// from `steps`.
    pub fn from_lanes(lanes: Vec<Vec<bool>>, steps: usize) -> Option<Self> {
        if lanes.iter().any(|l| l.len() != steps) {
            return None;
        }
        Some(Pattern { lanes, steps })
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn steps_per_lane(&self) -> usize {
        self.steps
    }

    pub fn lanes(&self) -> &[Vec<bool>] {
        &self.lanes
    }

    /// Out-of-range cells read as rests.
    pub fn is_hit(&self, lane: usize, step: usize) -> bool {
        self.lanes
            .get(lane)
            .and_then(|l| l.get(step))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, lane: usize, step: usize, hit: bool) {
        if let Some(cell) = self.lanes.get_mut(lane).and_then(|l| l.get_mut(step)) {
            *cell = hit;
        }
    }

    pub fn toggle(&mut self, lane: usize, step: usize) {
        if let Some(cell) = self.lanes.get_mut(lane).and_then(|l| l.get_mut(step)) {
            *cell = !*cell;
        }
    }

    /// Set every step of a lane to `hit`.
    pub fn set_lane(&mut self, lane: usize, hit: bool) {
        if let Some(cells) = self.lanes.get_mut(lane) {
            cells.fill(hit);
        }
    }

    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.fill(false);
        }
    }

    pub fn hit_count(&self) -> usize {
        self.lanes.iter().flatten().filter(|c| **c).count()
    }

    pub fn is_empty(&self) -> bool {
        self.hit_count() == 0
    }

    /// Active cells as `(lane, step)`, step-major then lane order.
    pub fn active_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.steps).flat_map(move |step| {
            (0..self.lanes.len())
                .filter(move |&lane| self.lanes[lane][step])
                .map(move |lane| (lane, step))
        })
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new(LANES, STEPS_PER_LANE)
    }
}
