/// Persistence: a small key-value store plus the records kept in it.
///
/// ## Keys
///   `<mode>Pattern`          pattern text for a named slot (`playgroundPattern`, `botdPattern`)
///   `<YYYY-MM-DD>_botd_data` JSON array of today's attempts
///   `volume`                 volume level index
///
/// `FileStore` keeps one `<key>.txt` file per key in the data directory.
/// Only the current date's attempt key survives a new recording.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::codec;
use crate::domain::daily::date_key;
use crate::domain::pattern::{Glyphs, Pattern};
use crate::domain::score::{Attempt, AttemptLog};
use crate::error::{BeatleError, Result};

const ATTEMPT_SUFFIX: &str = "_botd_data";
const VOLUME_KEY: &str = "volume";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

// ══════════════════════════════════════════════════════════════
// In-memory store
// ══════════════════════════════════════════════════════════════

#[derive(Default, Debug)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

// ══════════════════════════════════════════════════════════════
// File store
// ══════════════════════════════════════════════════════════════

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: &Path) -> Self {
        FileStore { dir: dir.to_path_buf() }
    }

    /// Store rooted at the default data directory.
    pub fn open_default() -> Self {
        FileStore::new(&data_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", key))
    }
}

fn storage_err(key: &str, source: std::io::Error) -> BeatleError {
    BeatleError::Storage { key: key.to_string(), source }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(key, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| storage_err(key, e))?;
        std::fs::write(self.path(key), value).map_err(|e| storage_err(key, e))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(key, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(storage_err("*", e)),
        };
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().map_or(false, |x| x == "txt") {
                    path.file_stem().map(|s| s.to_string_lossy().to_string())
                } else {
                    None
                }
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Writable data directory: exe dir if writable, else
/// `~/.local/share/beatle`, else CWD.
pub fn data_dir() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            // System installs (/usr/games/) are read-only
            let test_path = parent.join(".write_test_beatle");
            if std::fs::write(&test_path, "").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return parent.to_path_buf();
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/beatle");
        if std::fs::create_dir_all(&xdg).is_ok() {
            return xdg;
        }
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

// ══════════════════════════════════════════════════════════════
// Pattern slots
// ══════════════════════════════════════════════════════════════

pub fn slot_key(slot: &str) -> String {
    format!("{}Pattern", slot)
}

pub fn save_pattern(store: &mut dyn KeyValueStore, slot: &str, pattern: &Pattern, glyphs: Glyphs) -> Result<()> {
    store.set(&slot_key(slot), &codec::encode_pattern(pattern, glyphs))
}

/// Load a slot. `Ok(None)` if the slot is empty; a shape error if the
/// stored text does not fit `lanes` × `steps`.
pub fn load_pattern(
    store: &dyn KeyValueStore,
    slot: &str,
    lanes: usize,
    steps: usize,
    glyphs: Glyphs,
) -> Result<Option<Pattern>> {
    match store.get(&slot_key(slot))? {
        Some(text) => codec::decode_pattern(&text, lanes, steps, glyphs).map(Some),
        None => Ok(None),
    }
}

/// Write pattern text to `<dir>/<slot>.pattern` for copying out of the
/// terminal. Returns the file path.
pub fn export_pattern(dir: &Path, slot: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{}.pattern", slot));
    let key = slot_key(slot);
    std::fs::create_dir_all(dir).map_err(|e| storage_err(&key, e))?;
    std::fs::write(&path, format!("{}\n", text)).map_err(|e| storage_err(&key, e))?;
    Ok(path)
}

// ══════════════════════════════════════════════════════════════
// Attempt history
// ══════════════════════════════════════════════════════════════

pub fn attempts_key(date: NaiveDate) -> String {
    format!("{}{}", date_key(date), ATTEMPT_SUFFIX)
}

pub fn load_attempts(store: &dyn KeyValueStore, today: NaiveDate) -> Result<AttemptLog> {
    let attempts: Vec<Attempt> = match store.get(&attempts_key(today))? {
        Some(json) => serde_json::from_str(&json)?,
        None => vec![],
    };
    Ok(AttemptLog::with_attempts(today, attempts))
}

/// Append to today's history and drop every other date's history.
pub fn record_attempt(
    store: &mut dyn KeyValueStore,
    log: &mut AttemptLog,
    today: NaiveDate,
    attempt: Attempt,
) -> Result<()> {
    log.record(today, attempt);
    let key = attempts_key(today);
    store.set(&key, &serde_json::to_string(log.for_date(today))?)?;

    for stale in store.keys()?.into_iter().filter(|k| k.ends_with(ATTEMPT_SUFFIX) && *k != key) {
        tracing::debug!(key = %stale, "purging attempt history from another day");
        store.remove(&stale)?;
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// Volume
// ══════════════════════════════════════════════════════════════

pub fn load_volume(store: &dyn KeyValueStore) -> Option<usize> {
    store.get(VOLUME_KEY).ok().flatten().and_then(|v| v.trim().parse().ok())
}

pub fn save_volume(store: &mut dyn KeyValueStore, index: usize) -> Result<()> {
    store.set(VOLUME_KEY, &index.to_string())
}
