/// Daily puzzle generation.
///
/// ## Daily code
///   seed = year*10000 + month*100 + day (UTC calendar fields)
///   for i in 0..4:  x = sin(seed + i) * 10000;  frac = x - floor(x)
///                   digit = floor(frac * N) + 1        (N = fragment count)
///
///   The sine is plain IEEE-754 f64 `sin`. Every client derives the same
///   puzzle for the same date from this formula alone, so it must not change.
///
/// ## Assembly
///   Each digit names a fragment file (`<id>.txt`): `lanes` lines of
///   `steps / 4` glyphs. The four fragments are concatenated lane by lane in
///   code order into the full pattern text.
///
///   Fragment files are always written with `x` / `-`. Assembly translates
///   them into the configured glyphs; any other character is a shape error.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Utc};

use crate::domain::codec::{self, split_lines};
use crate::domain::pattern::{Glyphs, Pattern};
use crate::error::{BeatleError, Result};

/// Number of fragment files shipped with the game.
pub const NUM_FRAGMENTS: u8 = 9;

/// Fragments per daily pattern.
pub const PARTS: usize = 4;

/// Alphabet of the fragment files.
pub const FRAGMENT_GLYPHS: Glyphs = Glyphs { hit: 'x', rest: '-' };

// ══════════════════════════════════════════════════════════════
// Daily code
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DailyCode([u8; PARTS]);

impl DailyCode {
    pub fn ids(&self) -> [u8; PARTS] {
        self.0
    }
}

impl fmt::Display for DailyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        f.write_str(&parts.join(" "))
    }
}

fn seeded_random(seed: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    x - x.floor()
}

/// Derive the fragment selection for a UTC date. `fragments` must be ≥ 1.
pub fn daily_code(date: NaiveDate, fragments: u8) -> DailyCode {
    let seed = date.year() as f64 * 10000.0 + date.month() as f64 * 100.0 + date.day() as f64;
    let n = fragments.max(1) as f64;

    let mut digits = [0u8; PARTS];
    for (i, d) in digits.iter_mut().enumerate() {
        let rand = seeded_random(seed + i as f64);
        *d = ((rand * n).floor() as u8).saturating_add(1);
    }
    DailyCode(digits)
}

/// `YYYY-MM-DD`, used as cache and storage key.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

// ══════════════════════════════════════════════════════════════
// Fragment sources
// ══════════════════════════════════════════════════════════════

/// Fetch capability for fragment text by id.
pub trait FragmentSource {
    fn fetch(&self, id: u8) -> Result<String>;
}

const EMBEDDED: [&str; NUM_FRAGMENTS as usize] = [
    include_str!("../../assets/rhythms/beats/1.txt"),
    include_str!("../../assets/rhythms/beats/2.txt"),
    include_str!("../../assets/rhythms/beats/3.txt"),
    include_str!("../../assets/rhythms/beats/4.txt"),
    include_str!("../../assets/rhythms/beats/5.txt"),
    include_str!("../../assets/rhythms/beats/6.txt"),
    include_str!("../../assets/rhythms/beats/7.txt"),
    include_str!("../../assets/rhythms/beats/8.txt"),
    include_str!("../../assets/rhythms/beats/9.txt"),
];

/// Fragments compiled into the binary.
pub struct EmbeddedFragments;

impl FragmentSource for EmbeddedFragments {
    fn fetch(&self, id: u8) -> Result<String> {
        id.checked_sub(1)
            .and_then(|i| EMBEDDED.get(i as usize))
            .map(|s| s.to_string())
            .ok_or_else(|| BeatleError::FragmentFetch {
                fragment: id,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no embedded fragment"),
            })
    }
}

/// Fragments read from `<dir>/<id>.txt`, falling back to the embedded set
/// when the file does not exist.
pub struct DirFragments {
    dir: PathBuf,
}

impl DirFragments {
    pub fn new(dir: &Path) -> Self {
        DirFragments { dir: dir.to_path_buf() }
    }
}

impl FragmentSource for DirFragments {
    fn fetch(&self, id: u8) -> Result<String> {
        let path = self.dir.join(format!("{}.txt", id));
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(fragment = id, path = %path.display(), "fragment file missing, using embedded copy");
                EmbeddedFragments.fetch(id)
            }
            Err(source) => Err(BeatleError::FragmentFetch { fragment: id, source }),
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Generator
// ══════════════════════════════════════════════════════════════

/// Builds and caches the daily answer pattern text, one entry per UTC date.
pub struct DailyPatternGenerator<S: FragmentSource> {
    source: S,
    lanes: usize,
    steps: usize,
    fragments: u8,
    glyphs: Glyphs,
    cache: HashMap<String, String>,
}

impl<S: FragmentSource> DailyPatternGenerator<S> {
    pub fn new(source: S, lanes: usize, steps: usize, fragments: u8) -> Self {
        DailyPatternGenerator {
            source,
            lanes,
            steps,
            fragments,
            glyphs: Glyphs::default(),
            cache: HashMap::new(),
        }
    }

    /// Glyphs the assembled answer is written in.
    pub fn with_glyphs(mut self, glyphs: Glyphs) -> Self {
        self.glyphs = glyphs;
        self.cache.clear();
        self
    }

    pub fn code(&self, date: NaiveDate) -> DailyCode {
        daily_code(date, self.fragments)
    }

    pub fn is_cached(&self, date: NaiveDate) -> bool {
        self.cache.contains_key(&date_key(date))
    }

    /// Daily answer as pattern text. Fetches on the first call for a date,
    /// then serves the cached text.
    pub fn load(&mut self, date: NaiveDate) -> Result<String> {
        let key = date_key(date);
        if let Some(text) = self.cache.get(&key) {
            return Ok(text.clone());
        }

        let code = self.code(date);
        tracing::info!(date = %key, code = %code, "building daily pattern");

        let text = self.assemble(code)?;
        self.cache.insert(key, text.clone());
        Ok(text)
    }

    /// Daily answer decoded into a grid.
    pub fn load_pattern(&mut self, date: NaiveDate) -> Result<Pattern> {
        let text = self.load(date)?;
        codec::decode_pattern(&text, self.lanes, self.steps, self.glyphs)
    }

    fn assemble(&self, code: DailyCode) -> Result<String> {
        let quarter = self.steps / PARTS;
        let mut combined = vec![String::with_capacity(self.steps); self.lanes];

        for id in code.ids() {
            let text = self.source.fetch(id)?;
            let lines = split_lines(&text);

            if lines.len() != self.lanes {
                return Err(BeatleError::FragmentShape {
                    fragment: id,
                    reason: format!("expected {} lines, got {}", self.lanes, lines.len()),
                });
            }

            for (i, raw) in lines.iter().enumerate() {
                let line = raw.trim();
                if line.chars().count() != quarter {
                    return Err(BeatleError::FragmentShape {
                        fragment: id,
                        reason: format!("line {} is not {} characters: \"{}\"", i + 1, quarter, line),
                    });
                }
                for ch in line.chars() {
                    let hit = match ch {
                        c if c == FRAGMENT_GLYPHS.hit => true,
                        c if c == FRAGMENT_GLYPHS.rest => false,
                        other => {
                            return Err(BeatleError::FragmentShape {
                                fragment: id,
                                reason: format!("line {}: unexpected glyph '{}'", i + 1, other),
                            })
                        }
                    };
                    combined[i].push(self.glyphs.glyph(hit));
                }
            }
        }

        for (i, lane) in combined.iter().enumerate() {
            let got = lane.chars().count();
            if got != self.steps {
                return Err(BeatleError::AssembledLane { lane: i + 1, expected: self.steps, got });
            }
        }

        Ok(combined.join("\n"))
    }
}
