/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory (or CWD).
/// Falls back to sensible defaults if the file is missing or incomplete.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::daily::NUM_FRAGMENTS;
use crate::domain::pattern::{Glyphs, LANES, STEPS_PER_LANE};
use crate::domain::score::MAX_ATTEMPTS;
use crate::sim::schedule::{METRONOME_CLICK_EVERY, METRONOME_LEAD_STEPS, STEP_DURATION};

/// Longest accepted step, in seconds.
pub const MAX_STEP_DURATION: f64 = 10.0;

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub grid: GridConfig,
    pub playback: PlaybackConfig,
    pub daily: DailyConfig,
    pub audio: AudioConfig,
    pub frame_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    pub lanes: usize,
    pub steps: usize,
    pub glyphs: Glyphs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    pub step_duration: f64,
    pub metronome_lead_steps: usize,
    pub metronome_click_every: usize,
    pub release_tail_ms: u64,  // extra wait after the last step so the final hit rings out
    pub include_metronome: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DailyConfig {
    pub fragments: u8,
    pub max_attempts: usize,
    pub fragments_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioConfig {
    pub samples_dir: PathBuf,
    pub volume_index: usize,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    grid: TomlGrid,
    #[serde(default)]
    playback: TomlPlayback,
    #[serde(default)]
    daily: TomlDaily,
    #[serde(default)]
    audio: TomlAudio,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlGrid {
    #[serde(default = "default_lanes")]
    lanes: usize,
    #[serde(default = "default_steps")]
    steps: usize,
    #[serde(default = "default_hit")]
    hit: char,
    #[serde(default = "default_rest")]
    rest: char,
}

#[derive(Deserialize, Debug)]
struct TomlPlayback {
    #[serde(default = "default_step_duration")]
    step_duration: f64,
    #[serde(default = "default_lead_steps")]
    metronome_lead_steps: usize,
    #[serde(default = "default_click_every")]
    metronome_click_every: usize,
    #[serde(default = "default_release_tail")]
    release_tail_ms: u64,
    #[serde(default)]
    include_metronome: bool,
}

#[derive(Deserialize, Debug)]
struct TomlDaily {
    #[serde(default = "default_fragments")]
    fragments: u8,
    #[serde(default = "default_max_attempts")]
    max_attempts: usize,
    #[serde(default = "default_fragments_dir")]
    fragments_dir: String,
}

#[derive(Deserialize, Debug)]
struct TomlAudio {
    #[serde(default = "default_samples_dir")]
    samples_dir: String,
    #[serde(default = "default_volume_index")]
    volume_index: usize,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_frame_ms")]
    frame_ms: u64,
}

// ── Defaults ──

fn default_lanes() -> usize { LANES }
fn default_steps() -> usize { STEPS_PER_LANE }
fn default_hit() -> char { 'x' }
fn default_rest() -> char { '-' }
fn default_step_duration() -> f64 { STEP_DURATION }
fn default_lead_steps() -> usize { METRONOME_LEAD_STEPS }
fn default_click_every() -> usize { METRONOME_CLICK_EVERY }
fn default_release_tail() -> u64 { 400 }
fn default_fragments() -> u8 { NUM_FRAGMENTS }
fn default_max_attempts() -> usize { MAX_ATTEMPTS }
fn default_fragments_dir() -> String { "assets/rhythms/beats".into() }
fn default_samples_dir() -> String { "sounds".into() }
fn default_volume_index() -> usize { 2 }
fn default_frame_ms() -> u64 { 16 }

impl Default for TomlGrid {
    fn default() -> Self {
        TomlGrid {
            lanes: default_lanes(),
            steps: default_steps(),
            hit: default_hit(),
            rest: default_rest(),
        }
    }
}

impl Default for TomlPlayback {
    fn default() -> Self {
        TomlPlayback {
            step_duration: default_step_duration(),
            metronome_lead_steps: default_lead_steps(),
            metronome_click_every: default_click_every(),
            release_tail_ms: default_release_tail(),
            include_metronome: false,
        }
    }
}

impl Default for TomlDaily {
    fn default() -> Self {
        TomlDaily {
            fragments: default_fragments(),
            max_attempts: default_max_attempts(),
            fragments_dir: default_fragments_dir(),
        }
    }
}

impl Default for TomlAudio {
    fn default() -> Self {
        TomlAudio {
            samples_dir: default_samples_dir(),
            volume_index: default_volume_index(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral { frame_ms: default_frame_ms() }
    }
}

// ── Loading ──

impl AppConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) current working directory.
    /// Missing file or missing keys gracefully fall back to defaults.
    pub fn load() -> Self {
        let search_dirs = candidate_dirs();
        let toml_cfg = load_toml(&search_dirs);
        Self::resolve(toml_cfg, &search_dirs)
    }

    /// Parse config text directly. Relative directories stay relative.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let toml_cfg = toml::from_str::<TomlConfig>(text)?;
        Ok(Self::resolve(toml_cfg, &[]))
    }

    fn resolve(cfg: TomlConfig, search_dirs: &[PathBuf]) -> Self {
        let mut grid = GridConfig {
            lanes: cfg.grid.lanes,
            steps: cfg.grid.steps,
            glyphs: Glyphs { hit: cfg.grid.hit, rest: cfg.grid.rest },
        };
        if grid.lanes == 0 || grid.steps == 0 || grid.steps % 4 != 0 {
            tracing::warn!(lanes = grid.lanes, steps = grid.steps,
                "grid needs lanes > 0 and a step count divisible by 4; using 8 x 16");
            grid.lanes = LANES;
            grid.steps = STEPS_PER_LANE;
        }
        if grid.glyphs.hit == grid.glyphs.rest {
            tracing::warn!("hit and rest glyphs are identical; using x and -");
            grid.glyphs = Glyphs::default();
        }

        let mut step_duration = cfg.playback.step_duration;
        if !(step_duration.is_finite() && step_duration > 0.0 && step_duration <= MAX_STEP_DURATION) {
            tracing::warn!(step_duration, "step_duration must be in (0, {MAX_STEP_DURATION}] seconds; using default");
            step_duration = STEP_DURATION;
        }

        AppConfig {
            grid,
            playback: PlaybackConfig {
                step_duration,
                metronome_lead_steps: cfg.playback.metronome_lead_steps,
                metronome_click_every: cfg.playback.metronome_click_every.max(1),
                release_tail_ms: cfg.playback.release_tail_ms,
                include_metronome: cfg.playback.include_metronome,
            },
            daily: DailyConfig {
                fragments: cfg.daily.fragments.max(1),
                max_attempts: cfg.daily.max_attempts,
                fragments_dir: resolve_dir(&cfg.daily.fragments_dir, search_dirs),
            },
            audio: AudioConfig {
                samples_dir: resolve_dir(&cfg.audio.samples_dir, search_dirs),
                volume_index: cfg.audio.volume_index,
            },
            frame_ms: cfg.general.frame_ms.max(1),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), &[])
    }
}

/// Absolute paths are used as-is; relative ones are looked up in the
/// candidate dirs and default to CWD-relative.
fn resolve_dir(dir: &str, search_dirs: &[PathBuf]) -> PathBuf {
    if Path::new(dir).is_absolute() {
        return PathBuf::from(dir);
    }
    search_dirs.iter()
        .map(|d| d.join(dir))
        .find(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from(dir))
}

/// Candidate directories to search: exe dir + CWD + system paths (deduplicated).
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    // 1. Directory of the running executable
    if let Ok(exe) = std::env::current_exe() {
        // Resolve symlinks so /usr/bin/beatle → /usr/games/beatle
        // still finds data relative to the real binary.
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    // 2. Current working directory
    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    // 3. XDG data home (~/.local/share/beatle)
    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/beatle");
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    // 4. System data directory (/usr/share/beatle)
    let sys = PathBuf::from("/usr/share/beatle");
    if sys.is_dir() && !dirs.iter().any(|d| d == &sys) {
        dirs.push(sys);
    }

    // 5. Fallback
    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

/// Search for config.toml in candidate directories.
fn load_toml(search_dirs: &[PathBuf]) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join("config.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match toml::from_str::<TomlConfig>(&text) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!("config.toml parse error: {e}; using default settings");
                        return TomlConfig::default();
                    }
                },
                Err(e) => {
                    tracing::warn!("could not read {}: {e}", path.display());
                }
            }
        }
    }
    TomlConfig::default()
}
