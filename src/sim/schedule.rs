/// Playback scheduler: turns a pattern into absolute sample-start times.
///
/// ## Timeline
///   ```text
///   now ─┬─ click ─ · ─ · ─ · ─ click ─ ... ─┬─ step 0 ─ step 1 ─ ... ─┬─ end
///        └──── lead_steps × step_duration ────┘                         │
///                       (metronome only)      base                      │
///                                              └─ steps × step_duration ┘
///   ```
///   Each active cell fires at `base + step * step_duration`.
///
/// The scheduler holds only timing constants. It issues every trigger up
/// front (fire-and-forget) and returns a `ScheduledRun` describing what was
/// issued, including when the run ends so the host can wait for it.

/// Default length of one step in seconds.
pub const STEP_DURATION: f64 = 0.11;
/// Default count-in length in steps.
pub const METRONOME_LEAD_STEPS: usize = 16;
/// Default click spacing within the count-in.
pub const METRONOME_CLICK_EVERY: usize = 4;

/// What to sound at a scheduled time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Voice {
    Lane(usize),
    Metronome,
}

/// Sample-start capability. `at` is an absolute time on the same clock the
/// caller passed as `now`.
pub trait SampleTrigger {
    /// Start the voice at `at`. Returns false if no sample is registered
    /// for it.
    fn trigger(&mut self, voice: Voice, at: f64) -> bool;
}

/// Monotonic clock in seconds.
pub trait AudioClock {
    fn now(&self) -> f64;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PlaybackOptions {
    pub include_metronome: bool,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ScheduledHit {
    pub voice: Voice,
    pub at: f64,
}

/// Everything issued by one `schedule` call.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledRun {
    pub start: f64,
    /// Time of step 0 (after the count-in, if any).
    pub base: f64,
    /// One step past the last step of the pattern.
    pub end: f64,
    /// Triggers accepted by the sample layer, in issue order.
    pub hits: Vec<ScheduledHit>,
    /// Lanes that had hits but no sample, each listed once.
    pub silent_lanes: Vec<usize>,
}

impl ScheduledRun {
    pub fn total_duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn lane_hits(&self) -> impl Iterator<Item = &ScheduledHit> {
        self.hits.iter().filter(|h| matches!(h.voice, Voice::Lane(_)))
    }

    pub fn clicks(&self) -> usize {
        self.hits.iter().filter(|h| h.voice == Voice::Metronome).count()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlaybackScheduler {
    pub lead_steps: usize,
    pub click_every: usize,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        PlaybackScheduler {
            lead_steps: METRONOME_LEAD_STEPS,
            click_every: METRONOME_CLICK_EVERY,
        }
    }
}

impl PlaybackScheduler {
    pub fn new(lead_steps: usize, click_every: usize) -> Self {
        PlaybackScheduler { lead_steps, click_every: click_every.max(1) }
    }

    /// Issue all triggers for `pattern` relative to `now`.
    ///
    /// Order: count-in clicks first, then pattern hits by step, lanes top to
    /// bottom within a step.
    pub fn schedule(
        &self,
        pattern: &crate::domain::pattern::Pattern,
        options: PlaybackOptions,
        now: f64,
        step_duration: f64,
        out: &mut dyn SampleTrigger,
    ) -> ScheduledRun {
        let mut hits = Vec::with_capacity(pattern.hit_count() + self.lead_steps / self.click_every.max(1) + 1);
        let mut silent_lanes: Vec<usize> = Vec::new();

        let base = if options.include_metronome {
            for step in (0..self.lead_steps).step_by(self.click_every.max(1)) {
                let at = now + step as f64 * step_duration;
                if out.trigger(Voice::Metronome, at) {
                    hits.push(ScheduledHit { voice: Voice::Metronome, at });
                } else {
                    tracing::warn!("metronome sample missing, count-in is silent");
                    break;
                }
            }
            now + self.lead_steps as f64 * step_duration
        } else {
            now
        };

        for (lane, step) in pattern.active_cells() {
            if silent_lanes.contains(&lane) {
                continue;
            }
            let at = base + step as f64 * step_duration;
            if out.trigger(Voice::Lane(lane), at) {
                hits.push(ScheduledHit { voice: Voice::Lane(lane), at });
            } else {
                tracing::warn!(lane, "no sample registered for lane, skipping");
                silent_lanes.push(lane);
            }
        }

        let end = base + pattern.steps_per_lane() as f64 * step_duration;
        tracing::debug!(hits = hits.len(), duration = end - now, "playback scheduled");

        ScheduledRun { start: now, base, end, hits, silent_lanes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::Pattern;

    /// Records every trigger; lanes listed in `missing` have no sample.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(Voice, f64)>,
        missing: Vec<Voice>,
    }

    impl SampleTrigger for Recorder {
        fn trigger(&mut self, voice: Voice, at: f64) -> bool {
            if self.missing.contains(&voice) {
                return false;
            }
            self.calls.push((voice, at));
            true
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn single_hit() -> Pattern {
        let mut p = Pattern::default();
        p.set(3, 5, true);
        p
    }

    #[test]
    fn single_cell_without_metronome() {
        let mut rec = Recorder::default();
        let run = PlaybackScheduler::default().schedule(
            &single_hit(), PlaybackOptions::default(), 10.0, 0.11, &mut rec,
        );
        assert_eq!(rec.calls.len(), 1);
        let (voice, at) = rec.calls[0];
        assert_eq!(voice, Voice::Lane(3));
        assert!(approx(at, 10.0 + 5.0 * 0.11));
        assert!(approx(run.base, 10.0));
        assert!(approx(run.total_duration(), 16.0 * 0.11));
    }

    #[test]
    fn single_cell_with_metronome() {
        let mut rec = Recorder::default();
        let opts = PlaybackOptions { include_metronome: true };
        let run = PlaybackScheduler::default().schedule(&single_hit(), opts, 10.0, 0.11, &mut rec);

        let lanes: Vec<_> = rec.calls.iter().filter(|(v, _)| *v != Voice::Metronome).collect();
        assert_eq!(lanes.len(), 1);
        assert!(approx(lanes[0].1, 10.0 + 16.0 * 0.11 + 5.0 * 0.11));

        // 4-beat count-in: one click every 4th step over 16 steps
        let clicks: Vec<f64> = rec.calls.iter()
            .filter(|(v, _)| *v == Voice::Metronome)
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(clicks.len(), 4);
        for (i, t) in clicks.iter().enumerate() {
            assert!(approx(*t, 10.0 + (i * 4) as f64 * 0.11));
        }
        assert_eq!(run.clicks(), 4);
        assert!(approx(run.total_duration(), 32.0 * 0.11));
    }

    #[test]
    fn triggers_are_step_then_lane_ordered() {
        let mut p = Pattern::new(3, 4);
        p.set(2, 0, true);
        p.set(0, 0, true);
        p.set(1, 3, true);
        p.set(0, 2, true);
        let mut rec = Recorder::default();
        PlaybackScheduler::default().schedule(&p, PlaybackOptions::default(), 0.0, 0.5, &mut rec);

        let order: Vec<Voice> = rec.calls.iter().map(|(v, _)| *v).collect();
        assert_eq!(order, vec![Voice::Lane(0), Voice::Lane(2), Voice::Lane(0), Voice::Lane(1)]);
        assert!(rec.calls.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn missing_lane_sample_is_skipped_silently() {
        let mut p = Pattern::new(2, 4);
        p.set_lane(0, true);
        p.set(1, 1, true);
        let mut rec = Recorder { missing: vec![Voice::Lane(0)], ..Default::default() };
        let run = PlaybackScheduler::default().schedule(&p, PlaybackOptions::default(), 0.0, 0.1, &mut rec);

        assert_eq!(rec.calls, vec![(Voice::Lane(1), 0.1)]);
        assert_eq!(run.silent_lanes, vec![0]);
        assert_eq!(run.lane_hits().count(), 1);
    }

    #[test]
    fn missing_metronome_keeps_the_lead_in_timing() {
        let mut rec = Recorder { missing: vec![Voice::Metronome], ..Default::default() };
        let opts = PlaybackOptions { include_metronome: true };
        let run = PlaybackScheduler::default().schedule(&single_hit(), opts, 0.0, 0.1, &mut rec);
        assert_eq!(run.clicks(), 0);
        assert_eq!(rec.calls.len(), 1);
        assert!(approx(rec.calls[0].1, 1.6 + 0.5));
    }

    #[test]
    fn empty_pattern_still_reports_duration() {
        let mut rec = Recorder::default();
        let run = PlaybackScheduler::new(8, 2).schedule(
            &Pattern::new(8, 16), PlaybackOptions { include_metronome: true }, 1.0, 0.25, &mut rec,
        );
        assert_eq!(run.lane_hits().count(), 0);
        assert_eq!(run.clicks(), 4);
        assert!(approx(run.end, 1.0 + 8.0 * 0.25 + 16.0 * 0.25));
    }
}
