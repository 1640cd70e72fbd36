/// Session: everything the host holds between frames.
///
/// ## Ownership
///   - `pattern`: the live grid, edited in place by the cursor.
///     Decoded text only replaces it after a full successful decode.
///   - `attempts`: today's scored submissions (daily mode).
///   - `run`: the playback run in flight, if any. While it lasts, new
///     playback is refused (the busy flag).
///
/// Time-dependent methods take `now` so tests can drive them.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::GridConfig;
use crate::domain::codec;
use crate::domain::pattern::Pattern;
use crate::domain::score::{Attempt, AttemptLog};
use crate::error::{BeatleError, Result};
use crate::sim::schedule::ScheduledRun;
use crate::sim::store::{self, KeyValueStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Playground,
    Daily,
}

impl Mode {
    /// Storage slot for the working grid of this mode.
    pub fn slot(self) -> &'static str {
        match self {
            Mode::Playground => "playground",
            Mode::Daily => "botd",
        }
    }
}

/// What a playback run is playing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunSource {
    Grid,
    Answer,
    Attempt(usize),
}

/// A playback run in flight, expressed in wall-clock terms.
#[derive(Clone, Debug)]
pub struct ActiveRun {
    pub source: RunSource,
    pub started: Instant,
    /// From start to step 0 (count-in length).
    pub lead: Duration,
    pub step: Duration,
    pub steps: usize,
    pub until: Instant,
}

impl ActiveRun {
    /// Step under the playhead, or None during the count-in / after the end.
    pub fn current_step(&self, now: Instant) -> Option<usize> {
        let since = now.checked_duration_since(self.started.checked_add(self.lead)?)?;
        let idx = (since.as_secs_f64() / self.step.as_secs_f64().max(f64::EPSILON)) as usize;
        if idx < self.steps { Some(idx) } else { None }
    }
}

/// Longest span a run can keep the session busy.
const MAX_RUN: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds as a Duration: negative or NaN is zero, capped at `MAX_RUN`.
fn secs(x: f64) -> Duration {
    if x.is_nan() || x <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(x).unwrap_or(MAX_RUN).min(MAX_RUN)
}

pub struct Session {
    pub grid: GridConfig,
    pub mode: Mode,
    pub pattern: Pattern,
    pub cursor_lane: usize,
    pub cursor_step: usize,
    pub include_metronome: bool,

    pub today: NaiveDate,
    pub answer: Option<String>,
    pub attempts: AttemptLog,
    /// Attempt highlighted in the history list.
    pub selected_attempt: usize,

    pub run: Option<ActiveRun>,

    /// Next whole-lane action per lane: true fills, false clears.
    lane_fill_next: Vec<bool>,

    pub message: String,
    message_until: Option<Instant>,
}

impl Session {
    pub fn new(grid: GridConfig, today: NaiveDate) -> Self {
        Session {
            grid,
            mode: Mode::Playground,
            pattern: Pattern::new(grid.lanes, grid.steps),
            cursor_lane: 0,
            cursor_step: 0,
            include_metronome: false,
            today,
            answer: None,
            attempts: AttemptLog::new(),
            selected_attempt: 0,
            run: None,
            lane_fill_next: vec![true; grid.lanes],
            message: String::new(),
            message_until: None,
        }
    }

    // ── Messages ──

    pub fn set_message(&mut self, msg: &str, now: Instant, hold: Duration) {
        self.message = msg.to_string();
        self.message_until = Some(now + hold);
    }

    pub fn expire_message(&mut self, now: Instant) {
        if self.message_until.map_or(false, |t| now >= t) {
            self.message.clear();
            self.message_until = None;
        }
    }

    // ── Grid editing ──

    /// Move the cursor, wrapping at the grid edges.
    pub fn move_cursor(&mut self, d_lane: isize, d_step: isize) {
        let lanes = self.pattern.lane_count().max(1) as isize;
        let steps = self.pattern.steps_per_lane().max(1) as isize;
        self.cursor_lane = (self.cursor_lane as isize + d_lane).rem_euclid(lanes) as usize;
        self.cursor_step = (self.cursor_step as isize + d_step).rem_euclid(steps) as usize;
    }

    pub fn toggle_at_cursor(&mut self) {
        self.pattern.toggle(self.cursor_lane, self.cursor_step);
    }

    /// Whole-lane toggle. Each lane alternates fill / clear on every use,
    /// whatever the lane currently holds.
    pub fn toggle_lane_at_cursor(&mut self) {
        let lane = self.cursor_lane;
        if let Some(fill) = self.lane_fill_next.get_mut(lane) {
            self.pattern.set_lane(lane, *fill);
            *fill = !*fill;
        }
    }

    pub fn clear(&mut self) {
        self.pattern.clear();
    }

    pub fn pattern_text(&self) -> String {
        codec::encode_pattern(&self.pattern, self.grid.glyphs)
    }

    /// Replace the grid with decoded text. On error the grid is untouched.
    pub fn load_text(&mut self, text: &str) -> Result<()> {
        let decoded = codec::decode_pattern(text, self.grid.lanes, self.grid.steps, self.grid.glyphs)?;
        self.pattern = decoded;
        Ok(())
    }

    /// Load pasted text and report the outcome in the message bar.
    pub fn apply_paste(&mut self, text: &str, now: Instant, hold: Duration) -> bool {
        match self.load_text(text) {
            Ok(()) => {
                self.set_message("Pattern loaded from paste", now, hold);
                true
            }
            Err(e) => {
                tracing::info!("pasted text rejected: {e}");
                self.set_message(&format!("Paste rejected: {}", e.user_message()), now, hold);
                false
            }
        }
    }

    pub fn save_slot(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        store::save_pattern(store, self.mode.slot(), &self.pattern, self.grid.glyphs)
    }

    /// Load this mode's slot. Returns false if the slot is empty.
    pub fn load_slot(&mut self, store: &dyn KeyValueStore) -> Result<bool> {
        match store::load_pattern(store, self.mode.slot(), self.grid.lanes, self.grid.steps, self.grid.glyphs)? {
            Some(p) => {
                self.pattern = p;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Playback busy flag ──

    pub fn is_busy(&self, now: Instant) -> bool {
        self.run.as_ref().map_or(false, |r| now < r.until)
    }

    /// Mark a run as in flight until its last step plus `tail` has passed.
    pub fn begin_run(&mut self, source: RunSource, run: &ScheduledRun, step_duration: f64, now: Instant, tail: Duration) {
        let total = secs(run.total_duration()).saturating_add(tail).min(MAX_RUN);
        self.run = Some(ActiveRun {
            source,
            started: now,
            lead: secs(run.base - run.start),
            step: secs(step_duration),
            steps: self.grid.steps,
            until: now.checked_add(total).unwrap_or(now),
        });
    }

    /// Drop the finished run.
    pub fn finish_run(&mut self, now: Instant) {
        if self.run.as_ref().map_or(false, |r| now >= r.until) {
            self.run = None;
        }
    }

    pub fn playhead(&self, now: Instant) -> Option<usize> {
        self.run.as_ref().and_then(|r| r.current_step(now))
    }

    // ── Daily puzzle ──

    pub fn todays_attempts(&self) -> &[Attempt] {
        self.attempts.for_date(self.today)
    }

    pub fn is_finished(&self, max_attempts: usize) -> bool {
        self.attempts.is_finished(self.today, max_attempts)
    }

    /// Score the live grid against `answer` and persist the attempt.
    pub fn submit(
        &mut self,
        answer: &str,
        store: &mut dyn KeyValueStore,
        max_attempts: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<Attempt> {
        if self.attempts.has_won(self.today) {
            return Err(BeatleError::AlreadySolved);
        }
        if !self.attempts.can_attempt(self.today, max_attempts) {
            return Err(BeatleError::QuotaExceeded { max: max_attempts });
        }

        let attempt = Attempt::evaluate(
            &self.pattern_text(), answer,
            self.grid.lanes, self.grid.steps, self.grid.glyphs,
            timestamp,
        );
        store::record_attempt(store, &mut self.attempts, self.today, attempt.clone())?;
        self.selected_attempt = self.todays_attempts().len().saturating_sub(1);
        tracing::info!(
            correct = attempt.correct_count,
            total = attempt.total_checked,
            used = self.todays_attempts().len(),
            "attempt recorded"
        );
        Ok(attempt)
    }

    /// Decoded pattern of a past attempt, for replay.
    pub fn attempt_pattern(&self, index: usize) -> Option<Pattern> {
        let a = self.todays_attempts().get(index)?;
        codec::decode_pattern(&a.pattern, self.grid.lanes, self.grid.steps, self.grid.glyphs).ok()
    }

    pub fn select_attempt(&mut self, delta: isize) {
        let n = self.todays_attempts().len();
        if n == 0 {
            self.selected_attempt = 0;
            return;
        }
        self.selected_attempt = (self.selected_attempt as isize + delta).clamp(0, n as isize - 1) as usize;
    }

    /// Switch to a new UTC day: forget the answer and reload attempts.
    pub fn roll_over(&mut self, today: NaiveDate, store: &dyn KeyValueStore) -> Result<()> {
        self.today = today;
        self.answer = None;
        self.selected_attempt = 0;
        self.attempts = store::load_attempts(store, today)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::Glyphs;
    use crate::sim::store::MemoryStore;
    use chrono::TimeZone;

    fn grid(lanes: usize, steps: usize) -> GridConfig {
        GridConfig { lanes, steps, glyphs: Glyphs::default() }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap()
    }

    fn run(start: f64, base: f64, end: f64) -> ScheduledRun {
        ScheduledRun { start, base, end, hits: vec![], silent_lanes: vec![] }
    }

    #[test]
    fn cursor_wraps_around_edges() {
        let mut s = Session::new(grid(8, 16), day(1));
        s.move_cursor(-1, -1);
        assert_eq!((s.cursor_lane, s.cursor_step), (7, 15));
        s.move_cursor(1, 1);
        assert_eq!((s.cursor_lane, s.cursor_step), (0, 0));
        s.move_cursor(0, 17);
        assert_eq!(s.cursor_step, 1);
    }

    #[test]
    fn cursor_edits() {
        let mut s = Session::new(grid(2, 4), day(1));
        s.move_cursor(1, 2);
        s.toggle_at_cursor();
        assert_eq!(s.pattern_text(), "----\n--x-");
        s.toggle_lane_at_cursor();
        assert_eq!(s.pattern_text(), "----\nxxxx");
        s.clear();
        assert!(s.pattern.is_empty());
    }

    #[test]
    fn lane_toggle_alternates_per_lane() {
        let mut s = Session::new(grid(2, 4), day(1));
        s.toggle_lane_at_cursor(); // lane 0: fill
        assert_eq!(s.pattern_text(), "xxxx\n----");

        // lane 1 keeps its own state and starts with fill
        s.move_cursor(1, 0);
        s.toggle_lane_at_cursor();
        assert_eq!(s.pattern_text(), "xxxx\nxxxx");

        // lane 0 clears next even after a cell was removed by hand
        s.move_cursor(-1, 0);
        s.toggle_at_cursor();
        s.toggle_lane_at_cursor();
        assert_eq!(s.pattern_text(), "----\nxxxx");

        // and fills again even though it is already empty
        s.toggle_lane_at_cursor();
        assert_eq!(s.pattern_text(), "xxxx\nxxxx");
    }

    #[test]
    fn paste_replaces_grid_or_reports_shape_error() {
        let mut s = Session::new(grid(2, 4), day(1));
        let t0 = Instant::now();
        let hold = Duration::from_secs(3);

        assert!(s.apply_paste("x---\n--x-\n", t0, hold));
        assert_eq!(s.pattern_text(), "x---\n--x-");
        assert_eq!(s.message, "Pattern loaded from paste");

        assert!(!s.apply_paste("x---\n--x", t0, hold));
        assert_eq!(s.pattern_text(), "x---\n--x-");
        assert_eq!(s.message, "Paste rejected: line 2 must have 4 characters, got 3");
    }

    #[test]
    fn bad_text_leaves_grid_untouched() {
        let mut s = Session::new(grid(2, 4), day(1));
        s.load_text("x-x-\n-x-x").unwrap();
        let before = s.pattern.clone();

        assert!(s.load_text("x-x-").unwrap_err().is_shape_error());
        assert!(s.load_text("x-x-\n-x-").unwrap_err().is_shape_error());
        assert_eq!(s.pattern, before);
    }

    #[test]
    fn slot_save_and_load_per_mode() {
        let mut store = MemoryStore::new();
        let mut s = Session::new(grid(2, 4), day(1));
        s.load_text("x---\n---x").unwrap();
        s.save_slot(&mut store).unwrap();

        s.mode = Mode::Daily;
        s.clear();
        assert!(!s.load_slot(&store).unwrap());
        assert!(s.pattern.is_empty());

        s.mode = Mode::Playground;
        assert!(s.load_slot(&store).unwrap());
        assert_eq!(s.pattern_text(), "x---\n---x");
    }

    #[test]
    fn busy_until_run_and_tail_elapse() {
        let mut s = Session::new(grid(8, 16), day(1));
        let t0 = Instant::now();
        assert!(!s.is_busy(t0));

        s.begin_run(RunSource::Grid, &run(5.0, 5.0, 6.76), 0.11, t0, Duration::from_millis(400));
        assert!(s.is_busy(t0 + Duration::from_millis(2000)));
        assert!(!s.is_busy(t0 + Duration::from_millis(2200)));

        s.finish_run(t0 + Duration::from_millis(1000));
        assert!(s.run.is_some());
        s.finish_run(t0 + Duration::from_millis(2200));
        assert!(s.run.is_none());
    }

    #[test]
    fn huge_durations_do_not_panic() {
        let mut s = Session::new(grid(8, 16), day(1));
        let t0 = Instant::now();
        s.begin_run(RunSource::Grid, &run(0.0, 1e30, 2e30), 1e30, t0, Duration::from_millis(400));
        assert!(s.is_busy(t0 + Duration::from_secs(3600)));
        assert_eq!(s.playhead(t0 + Duration::from_secs(1)), None);

        s.begin_run(RunSource::Grid, &run(0.0, f64::NAN, -1.0), -0.5, t0, Duration::ZERO);
        assert!(!s.is_busy(t0));
    }

    #[test]
    fn playhead_follows_steps_after_count_in() {
        let mut s = Session::new(grid(8, 16), day(1));
        let t0 = Instant::now();
        // 1s count-in then 16 steps of 0.25s
        s.begin_run(RunSource::Answer, &run(0.0, 1.0, 5.0), 0.25, t0, Duration::ZERO);
        assert_eq!(s.playhead(t0 + Duration::from_millis(500)), None);
        assert_eq!(s.playhead(t0 + Duration::from_millis(1100)), Some(0));
        assert_eq!(s.playhead(t0 + Duration::from_millis(1600)), Some(2));
        assert_eq!(s.playhead(t0 + Duration::from_millis(5100)), None);
    }

    #[test]
    fn submit_scores_and_persists() {
        let mut store = MemoryStore::new();
        let mut s = Session::new(grid(1, 4), day(1));
        s.load_text("x-x-").unwrap();

        let a = s.submit("x---", &mut store, 6, ts()).unwrap();
        assert_eq!(a.comparison, vec![Some(true), None, Some(false), None]);
        assert!(a.is_win());
        assert!(store.get("2025-05-01_botd_data").unwrap().is_some());

        // solved: further submissions are refused
        assert!(matches!(s.submit("x---", &mut store, 6, ts()), Err(BeatleError::AlreadySolved)));
    }

    #[test]
    fn quota_then_rollover() {
        let mut store = MemoryStore::new();
        let mut s = Session::new(grid(1, 4), day(1));
        for _ in 0..3 {
            s.submit("x---", &mut store, 3, ts()).unwrap();
        }
        assert!(s.is_finished(3));
        let err = s.submit("x---", &mut store, 3, ts()).unwrap_err();
        assert!(matches!(err, BeatleError::QuotaExceeded { max: 3 }));

        s.roll_over(day(2), &store).unwrap();
        assert!(s.todays_attempts().is_empty());
        assert!(s.submit("x---", &mut store, 3, ts()).is_ok());
        assert!(store.get("2025-05-01_botd_data").unwrap().is_none());
    }

    #[test]
    fn attempt_replay_and_selection() {
        let mut store = MemoryStore::new();
        let mut s = Session::new(grid(1, 4), day(1));
        s.load_text("-x--").unwrap();
        s.submit("x---", &mut store, 6, ts()).unwrap();
        s.load_text("--x-").unwrap();
        s.submit("x---", &mut store, 6, ts()).unwrap();
        assert_eq!(s.selected_attempt, 1);

        s.select_attempt(-5);
        assert_eq!(s.selected_attempt, 0);
        let replay = s.attempt_pattern(0).unwrap();
        assert!(replay.is_hit(0, 1));
        assert!(s.attempt_pattern(7).is_none());
    }
}
