/// Entry point and host loop.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::KeyCode;
use tracing_subscriber::EnvFilter;

use beatle::config::AppConfig;
use beatle::domain::daily::{today_utc, DailyPatternGenerator, DirFragments};
use beatle::domain::pattern::{lane_name, Pattern};
use beatle::domain::score::finish_message;
use beatle::error::BeatleError;
use beatle::sim::schedule::{AudioClock, PlaybackOptions, PlaybackScheduler, SampleTrigger};
use beatle::sim::session::{Mode, RunSource, Session};
use beatle::sim::store::{self, FileStore};
use beatle::ui::input::InputState;
use beatle::ui::renderer::{FrameInfo, Renderer};
use beatle::ui::sound::{next_volume_index, SampleBank, SilentOutput};

const MESSAGE_HOLD: Duration = Duration::from_secs(3);

fn main() {
    let store = FileStore::open_default();
    init_logging(store.dir());

    let config = AppConfig::load();
    tracing::info!(lanes = config.grid.lanes, steps = config.grid.steps, "starting");

    let mut app = App::new(config, store);

    let mut renderer = Renderer::new();
    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let result = app.run(&mut renderer);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }
    if let Err(e) = result {
        tracing::error!("host loop failed: {e}");
        eprintln!("Error: {e}");
    }

    app.save_slot();
    println!();
    println!("{}", app.session.pattern_text());
    println!();
    let used = app.session.todays_attempts().len();
    if app.session.is_finished(app.config.daily.max_attempts) {
        println!("{}", finish_message(app.session.attempts.has_won(app.session.today), used));
    } else if used > 0 {
        println!("Beat of the day: {}/{} attempts used", used, app.config.daily.max_attempts);
    }
}

/// Log to `beatle.log` next to the saved data. `RUST_LOG` overrides the
/// default `info` level.
fn init_logging(dir: &Path) {
    let path = dir.join("beatle.log");
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Logging disabled ({}): {e}", path.display());
            return;
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

// ══════════════════════════════════════════════════════════════
// Audio output: real samples or a silent clock
// ══════════════════════════════════════════════════════════════

enum Output {
    Samples(SampleBank),
    Silent(SilentOutput),
}

impl Output {
    fn open(config: &AppConfig, volume_index: usize) -> Self {
        match SampleBank::new(&config.audio.samples_dir, config.grid.lanes, volume_index) {
            Some(bank) => Output::Samples(bank),
            None => Output::Silent(SilentOutput::new()),
        }
    }

    fn now(&self) -> f64 {
        match self {
            Output::Samples(b) => b.now(),
            Output::Silent(s) => s.now(),
        }
    }

    fn trigger(&mut self) -> &mut dyn SampleTrigger {
        match self {
            Output::Samples(b) => b as &mut dyn SampleTrigger,
            Output::Silent(s) => s as &mut dyn SampleTrigger,
        }
    }

    fn set_volume_index(&mut self, index: usize) {
        if let Output::Samples(b) = self {
            b.set_volume_index(index);
        }
    }

    fn is_audible(&self) -> bool {
        matches!(self, Output::Samples(_))
    }
}

// ══════════════════════════════════════════════════════════════
// App: session + collaborators
// ══════════════════════════════════════════════════════════════

struct App {
    config: AppConfig,
    session: Session,
    store: FileStore,
    generator: DailyPatternGenerator<DirFragments>,
    scheduler: PlaybackScheduler,
    output: Output,
    volume_index: usize,
}

impl App {
    fn new(config: AppConfig, store: FileStore) -> Self {
        let today = today_utc();
        let mut session = Session::new(config.grid, today);
        session.include_metronome = config.playback.include_metronome;

        let volume_index = store::load_volume(&store).unwrap_or(config.audio.volume_index);
        let output = Output::open(&config, volume_index);

        let generator = DailyPatternGenerator::new(
            DirFragments::new(&config.daily.fragments_dir),
            config.grid.lanes,
            config.grid.steps,
            config.daily.fragments,
        )
        .with_glyphs(config.grid.glyphs);
        let scheduler = PlaybackScheduler::new(
            config.playback.metronome_lead_steps,
            config.playback.metronome_click_every,
        );

        let mut app = App { config, session, store, generator, scheduler, output, volume_index };
        let now = Instant::now();

        match store::load_attempts(&app.store, today) {
            Ok(log) => app.session.attempts = log,
            Err(e) => tracing::warn!("attempt history unreadable, starting fresh: {e}"),
        }
        if let Err(e) = app.session.load_slot(&app.store) {
            tracing::warn!("saved pattern not loaded: {e}");
            app.session.set_message(&e.user_message(), now, MESSAGE_HOLD);
        }
        if !app.output.is_audible() {
            app.session.set_message("No audio device: playback is silent", now, MESSAGE_HOLD);
        }
        app
    }

    fn run(&mut self, renderer: &mut Renderer) -> Result<(), Box<dyn std::error::Error>> {
        let mut kb = InputState::new();
        let frame = Duration::from_millis(self.config.frame_ms);

        loop {
            kb.drain_events();
            if kb.ctrl_c_pressed() {
                break;
            }

            let now = Instant::now();
            self.check_rollover();
            self.session.finish_run(now);
            self.session.expire_message(now);

            let mut quit = false;
            for key in kb.presses().to_vec() {
                if self.handle_key(key, now) {
                    quit = true;
                    break;
                }
            }
            if quit {
                break;
            }
            for text in kb.pastes().to_vec() {
                self.session.apply_paste(&text, now, MESSAGE_HOLD);
            }

            let info = FrameInfo {
                now,
                utc_now: Utc::now(),
                volume_index: self.volume_index,
                max_attempts: self.config.daily.max_attempts,
                audio_enabled: self.output.is_audible(),
            };
            renderer.render(&self.session, &info)?;
            std::thread::sleep(frame);
        }
        Ok(())
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, key: KeyCode, now: Instant) -> bool {
        let daily = self.session.mode == Mode::Daily;
        match key {
            KeyCode::Char('q') | KeyCode::Esc => return true,

            KeyCode::Left => self.session.move_cursor(0, -1),
            KeyCode::Right => self.session.move_cursor(0, 1),
            KeyCode::Up => self.session.move_cursor(-1, 0),
            KeyCode::Down => self.session.move_cursor(1, 0),
            KeyCode::Char(' ') => self.session.toggle_at_cursor(),
            KeyCode::Char('l') => self.session.toggle_lane_at_cursor(),
            KeyCode::Char('c') => {
                self.session.clear();
                self.session.set_message("Grid cleared", now, MESSAGE_HOLD);
            }

            KeyCode::Char('p') => {
                let pattern = self.session.pattern.clone();
                self.play(&pattern, RunSource::Grid, now);
            }
            KeyCode::Char('m') => {
                self.session.include_metronome = !self.session.include_metronome;
            }
            KeyCode::Char('v') => self.cycle_volume(now),

            KeyCode::Char('s') => match self.session.save_slot(&mut self.store) {
                Ok(()) => self.session.set_message("Pattern saved", now, MESSAGE_HOLD),
                Err(e) => self.report(&e, now),
            },
            KeyCode::Char('o') => match self.session.load_slot(&self.store) {
                Ok(true) => self.session.set_message("Pattern loaded", now, MESSAGE_HOLD),
                Ok(false) => self.session.set_message("Nothing saved yet", now, MESSAGE_HOLD),
                Err(e) => self.report(&e, now),
            },

            KeyCode::Char('e') => self.export(now),

            KeyCode::Char('d') => self.switch_mode(now),

            KeyCode::Enter if daily => self.submit(now),
            KeyCode::Char('a') if daily => match self.answer_pattern() {
                Some(p) => self.play(&p, RunSource::Answer, now),
                None => self.session.set_message("Puzzle unavailable today", now, MESSAGE_HOLD),
            },
            KeyCode::Char('r') if daily => {
                let i = self.session.selected_attempt;
                match self.session.attempt_pattern(i) {
                    Some(p) => self.play(&p, RunSource::Attempt(i), now),
                    None => self.session.set_message("No attempts yet", now, MESSAGE_HOLD),
                }
            }
            KeyCode::Char('[') if daily => self.session.select_attempt(-1),
            KeyCode::Char(']') if daily => self.session.select_attempt(1),
            _ => {}
        }
        false
    }

    fn play(&mut self, pattern: &Pattern, source: RunSource, now: Instant) {
        if self.session.is_busy(now) {
            self.session.set_message("Still playing", now, MESSAGE_HOLD);
            return;
        }
        let step = self.config.playback.step_duration;
        let options = PlaybackOptions { include_metronome: self.session.include_metronome };
        let clock_now = self.output.now();
        let run = self.scheduler.schedule(pattern, options, clock_now, step, self.output.trigger());

        let tail = Duration::from_millis(self.config.playback.release_tail_ms);
        self.session.begin_run(source, &run, step, now, tail);

        if !run.silent_lanes.is_empty() {
            let names: Vec<String> = run.silent_lanes.iter().map(|l| lane_name(*l)).collect();
            self.session.set_message(&format!("No sample for {}", names.join(", ")), now, MESSAGE_HOLD);
        }
    }

    fn export(&mut self, now: Instant) {
        let text = self.session.pattern_text();
        match store::export_pattern(self.store.dir(), self.session.mode.slot(), &text) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "pattern exported");
                self.session.set_message(&format!("Pattern written to {}", path.display()), now, MESSAGE_HOLD);
            }
            Err(e) => self.report(&e, now),
        }
    }

    fn cycle_volume(&mut self, now: Instant) {
        self.volume_index = next_volume_index(self.volume_index);
        self.output.set_volume_index(self.volume_index);
        if let Err(e) = store::save_volume(&mut self.store, self.volume_index) {
            tracing::warn!("volume not saved: {e}");
        }
        let label = ["Volume: low", "Volume: medium", "Volume: high"];
        let msg = label.get(self.volume_index).copied().unwrap_or("Volume");
        self.session.set_message(msg, now, MESSAGE_HOLD);
    }

    fn switch_mode(&mut self, now: Instant) {
        self.save_slot();
        self.session.mode = match self.session.mode {
            Mode::Playground => Mode::Daily,
            Mode::Daily => Mode::Playground,
        };
        self.session.clear();
        if let Err(e) = self.session.load_slot(&self.store) {
            tracing::warn!("saved pattern not loaded: {e}");
        }
        if self.session.mode == Mode::Daily {
            self.load_answer(now);
        }
    }

    fn load_answer(&mut self, now: Instant) {
        if self.session.answer.is_some() {
            return;
        }
        let today = self.session.today;
        match self.generator.load(today) {
            Ok(text) => {
                tracing::info!(code = %self.generator.code(today), "daily puzzle ready");
                self.session.answer = Some(text);
            }
            Err(e) => {
                tracing::warn!("daily puzzle unavailable: {e}");
                self.report(&e, now);
            }
        }
    }

    fn answer_pattern(&self) -> Option<Pattern> {
        let g = self.config.grid;
        let text = self.session.answer.as_deref()?;
        beatle::domain::codec::decode_pattern(text, g.lanes, g.steps, g.glyphs).ok()
    }

    fn submit(&mut self, now: Instant) {
        let Some(answer) = self.session.answer.clone() else {
            self.session.set_message("Puzzle unavailable today", now, MESSAGE_HOLD);
            return;
        };
        let max = self.config.daily.max_attempts;
        match self.session.submit(&answer, &mut self.store, max, Utc::now()) {
            Ok(a) if a.is_win() => {
                let used = self.session.todays_attempts().len();
                self.session.set_message(finish_message(true, used), now, MESSAGE_HOLD);
            }
            Ok(a) => {
                let left = max.saturating_sub(self.session.todays_attempts().len());
                let msg = format!("{}/{} found, {} wrong. {} left", a.correct_count, a.total_checked, a.wrong_count(), left);
                self.session.set_message(&msg, now, MESSAGE_HOLD);
            }
            Err(e) => self.report(&e, now),
        }
    }

    fn check_rollover(&mut self) {
        let today = today_utc();
        if today == self.session.today {
            return;
        }
        tracing::info!(%today, "new day");
        if let Err(e) = self.session.roll_over(today, &self.store) {
            tracing::warn!("attempt history unreadable after rollover: {e}");
        }
        if self.session.mode == Mode::Daily {
            self.load_answer(Instant::now());
        }
    }

    fn save_slot(&mut self) {
        if let Err(e) = self.session.save_slot(&mut self.store) {
            tracing::warn!("pattern not saved: {e}");
        }
    }

    fn report(&mut self, e: &BeatleError, now: Instant) {
        self.session.set_message(&e.user_message(), now, MESSAGE_HOLD);
    }
}
