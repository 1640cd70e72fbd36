/// Attempt scoring for the daily puzzle.
///
/// A comparison holds one verdict per cell, lane-major:
///   Some(true)  : submitted hit, answer has a hit there
///   Some(false) : submitted hit, answer rests there
///   None        : no hit submitted (not attempted)
///
/// Rests are never scored: only the submitted hits are checked, and a win
/// requires every answer hit to be matched.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::codec::{count_hits, split_lines};
use crate::domain::pattern::Glyphs;

/// Default number of submissions allowed per UTC day.
pub const MAX_ATTEMPTS: usize = 6;

pub type Verdict = Option<bool>;

fn glyph_at(lines: &[&str], lane: usize, step: usize) -> Option<char> {
    lines.get(lane).and_then(|l| l.chars().nth(step))
}

/// Compare a submission against the answer, cell by cell.
pub fn compare(submitted: &str, answer: &str, lanes: usize, steps: usize, glyphs: Glyphs) -> Vec<Verdict> {
    let sub = split_lines(submitted);
    let ans = split_lines(answer);

    let mut out = Vec::with_capacity(lanes * steps);
    for lane in 0..lanes {
        for step in 0..steps {
            let hit = glyph_at(&sub, lane, step) == Some(glyphs.hit);
            out.push(if hit {
                Some(glyph_at(&ans, lane, step) == Some(glyphs.hit))
            } else {
                None
            });
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Score {
    pub correct_count: usize,
    pub total_checked: usize,
}

impl Score {
    pub fn is_win(&self) -> bool {
        self.total_checked > 0 && self.correct_count == self.total_checked
    }
}

pub fn score(comparison: &[Verdict], answer: &str, glyphs: Glyphs) -> Score {
    Score {
        correct_count: comparison.iter().filter(|v| **v == Some(true)).count(),
        total_checked: count_hits(answer, glyphs),
    }
}

pub fn can_attempt(existing: usize, max_attempts: usize) -> bool {
    existing < max_attempts
}

// ══════════════════════════════════════════════════════════════
// Attempt records
// ══════════════════════════════════════════════════════════════

/// One scored submission. Serialized field names match the stored history
/// format (`correctCount`, `totalChecked`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub pattern: String,
    pub timestamp: DateTime<Utc>,
    pub comparison: Vec<Verdict>,
    pub correct_count: usize,
    pub total_checked: usize,
}

impl Attempt {
    /// Compare and score `submitted` against `answer`.
    pub fn evaluate(
        submitted: &str,
        answer: &str,
        lanes: usize,
        steps: usize,
        glyphs: Glyphs,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let comparison = compare(submitted, answer, lanes, steps, glyphs);
        let s = score(&comparison, answer, glyphs);
        Attempt {
            pattern: submitted.to_string(),
            timestamp,
            comparison,
            correct_count: s.correct_count,
            total_checked: s.total_checked,
        }
    }

    pub fn score(&self) -> Score {
        Score { correct_count: self.correct_count, total_checked: self.total_checked }
    }

    pub fn is_win(&self) -> bool {
        self.score().is_win()
    }

    pub fn wrong_count(&self) -> usize {
        self.comparison.iter().filter(|v| **v == Some(false)).count()
    }
}

/// Today's attempts. Holds a single date; recording under a new date drops
/// everything recorded before it.
#[derive(Clone, Debug, Default)]
pub struct AttemptLog {
    date: Option<NaiveDate>,
    attempts: Vec<Attempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(date: NaiveDate, attempts: Vec<Attempt>) -> Self {
        AttemptLog { date: Some(date), attempts }
    }

    /// Attempts recorded on `today`; empty after a rollover.
    pub fn for_date(&self, today: NaiveDate) -> &[Attempt] {
        if self.date == Some(today) { &self.attempts } else { &[] }
    }

    pub fn can_attempt(&self, today: NaiveDate, max_attempts: usize) -> bool {
        can_attempt(self.for_date(today).len(), max_attempts)
    }

    pub fn has_won(&self, today: NaiveDate) -> bool {
        self.for_date(today).iter().any(|a| a.is_win())
    }

    /// Won, or out of attempts.
    pub fn is_finished(&self, today: NaiveDate, max_attempts: usize) -> bool {
        self.has_won(today) || !self.can_attempt(today, max_attempts)
    }

    pub fn record(&mut self, today: NaiveDate, attempt: Attempt) {
        if self.date != Some(today) {
            self.attempts.clear();
            self.date = Some(today);
        }
        self.attempts.push(attempt);
    }
}

// ══════════════════════════════════════════════════════════════
// Finish screen
// ══════════════════════════════════════════════════════════════

pub fn finish_message(won: bool, attempts_used: usize) -> &'static str {
    if !won {
        return "Unlucky! Better luck tomorrow!";
    }
    match attempts_used {
        1 => "Perfect! First try!",
        2 => "Great job! Two tries!",
        3 => "Three's a charm!",
        4 | 5 => "Phew, you got it!",
        6 => "Finally! You made it!",
        _ => "Well done!",
    }
}

/// Time left until the next UTC midnight.
pub fn until_next_puzzle(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match next {
        Some(next) => next - now,
        None => Duration::zero(),
    }
}

/// `HH:MM:SS`, clamped at zero.
pub fn format_countdown(left: Duration) -> String {
    let secs = left.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const G: Glyphs = Glyphs { hit: 'x', rest: '-' };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn single_lane_example() {
        let cmp = compare("x-x-", "x---", 1, 4, G);
        assert_eq!(cmp, vec![Some(true), None, Some(false), None]);

        let s = score(&cmp, "x---", G);
        assert_eq!(s, Score { correct_count: 1, total_checked: 1 });
        assert!(s.is_win());
    }

    #[test]
    fn comparison_is_lane_major() {
        let cmp = compare("x-\n-x", "xx\n--", 2, 2, G);
        assert_eq!(cmp, vec![Some(true), None, None, Some(false)]);
    }

    #[test]
    fn missing_submission_cells_are_rests() {
        // submitted text is short on lanes and on steps
        let cmp = compare("x", "xx\nxx", 2, 2, G);
        assert_eq!(cmp, vec![Some(true), None, None, None]);
        assert_eq!(cmp.len(), 4);
    }

    #[test]
    fn partial_match_is_not_a_win() {
        let cmp = compare("x---\n----", "x---\n--x-", 2, 4, G);
        let s = score(&cmp, "x---\n--x-", G);
        assert_eq!(s.correct_count, 1);
        assert_eq!(s.total_checked, 2);
        assert!(!s.is_win());
    }

    #[test]
    fn empty_answer_never_wins() {
        let cmp = compare("----", "----", 1, 4, G);
        let s = score(&cmp, "----", G);
        assert_eq!(s, Score { correct_count: 0, total_checked: 0 });
        assert!(!s.is_win());
    }

    #[test]
    fn extra_wrong_hits_do_not_block_a_win() {
        let a = Attempt::evaluate("xxxx", "x-x-", 1, 4, G, ts());
        assert!(a.is_win());
        assert_eq!(a.wrong_count(), 2);
    }

    #[test]
    fn quota_blocks_after_max() {
        let mut log = AttemptLog::new();
        for _ in 0..MAX_ATTEMPTS {
            assert!(log.can_attempt(day(1), MAX_ATTEMPTS));
            log.record(day(1), Attempt::evaluate("----", "x---", 1, 4, G, ts()));
        }
        assert!(!log.can_attempt(day(1), MAX_ATTEMPTS));
        assert!(log.is_finished(day(1), MAX_ATTEMPTS));
        assert!(!log.has_won(day(1)));
    }

    #[test]
    fn rollover_resets_and_purges() {
        let mut log = AttemptLog::new();
        for _ in 0..MAX_ATTEMPTS {
            log.record(day(1), Attempt::evaluate("----", "x---", 1, 4, G, ts()));
        }
        assert!(log.can_attempt(day(2), MAX_ATTEMPTS));
        assert!(log.for_date(day(2)).is_empty());

        log.record(day(2), Attempt::evaluate("x---", "x---", 1, 4, G, ts()));
        assert_eq!(log.for_date(day(2)).len(), 1);
        assert!(log.for_date(day(1)).is_empty());
        assert!(log.is_finished(day(2), MAX_ATTEMPTS));
    }

    #[test]
    fn attempt_json_uses_stored_field_names() {
        let a = Attempt::evaluate("x-x-", "x---", 1, 4, G, ts());
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("\"correctCount\":1"));
        assert!(json.contains("\"totalChecked\":1"));
        assert!(json.contains("\"comparison\":[true,null,false,null]"));
        let back: Attempt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn finish_messages() {
        assert_eq!(finish_message(true, 1), "Perfect! First try!");
        assert_eq!(finish_message(true, 5), "Phew, you got it!");
        assert_eq!(finish_message(true, 9), "Well done!");
        assert_eq!(finish_message(false, 6), "Unlucky! Better luck tomorrow!");
    }

    #[test]
    fn countdown_to_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 22, 58, 30).unwrap();
        assert_eq!(format_countdown(until_next_puzzle(now)), "01:01:30");

        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(format_countdown(until_next_puzzle(now)), "00:00:01");
        assert_eq!(format_countdown(Duration::seconds(-5)), "00:00:00");
    }
}
