/// Keyboard input collected once per frame.
///
/// Every Press or Repeat event counts as a press, so holding an arrow key
/// walks the cursor at the terminal's repeat rate. Release events (reported
/// only by terminals with keyboard enhancement) are ignored.
///
/// Pasted text arrives as one bracketed-paste event (the renderer enables
/// bracketed paste) and is collected separately from key presses.

use std::time::Duration;

use crossterm::event::{self, poll, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

pub struct InputState {
    /// Keys pressed during the most recent `drain_events()` call, in order.
    presses: Vec<KeyCode>,

    /// Raw key events collected during drain, for modifier checks.
    pub raw_events: Vec<KeyEvent>,

    /// Text pasted this frame, line endings normalized to `\n`.
    pastes: Vec<String>,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            presses: Vec::with_capacity(8),
            raw_events: Vec::with_capacity(8),
            pastes: Vec::new(),
        }
    }

    /// Drain all pending terminal events without blocking.
    /// Call once per frame.
    pub fn drain_events(&mut self) {
        self.presses.clear();
        self.raw_events.clear();
        self.pastes.clear();

        while poll(Duration::ZERO).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(key)) => self.feed(key),
                Ok(Event::Paste(text)) => self.feed_paste(&text),
                _ => {}
            }
        }
    }

    fn feed_paste(&mut self, text: &str) {
        // Terminals in raw mode often deliver bare \r between lines
        self.pastes.push(text.replace("\r\n", "\n").replace('\r', "\n"));
    }

    fn feed(&mut self, key: KeyEvent) {
        self.raw_events.push(key);
        if key.kind != KeyEventKind::Release {
            self.presses.push(normalize(key.code));
        }
    }

    /// Keys pressed this frame, oldest first.
    pub fn presses(&self) -> &[KeyCode] {
        &self.presses
    }

    /// Texts pasted this frame, oldest first.
    pub fn pastes(&self) -> &[String] {
        &self.pastes
    }

    /// Check if any raw event this frame has Ctrl+C
    pub fn ctrl_c_pressed(&self) -> bool {
        self.raw_events.iter().any(|k| {
            k.modifiers.contains(KeyModifiers::CONTROL)
                && (k.code == KeyCode::Char('c') || k.code == KeyCode::Char('C'))
        })
    }
}

/// Letter keys are matched case-insensitively.
fn normalize(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, kind: KeyEventKind, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent { code, modifiers, kind, state: KeyEventState::NONE }
    }

    #[test]
    fn presses_and_repeats_count_releases_do_not() {
        let mut kb = InputState::new();
        kb.feed(key(KeyCode::Right, KeyEventKind::Press, KeyModifiers::NONE));
        kb.feed(key(KeyCode::Right, KeyEventKind::Repeat, KeyModifiers::NONE));
        kb.feed(key(KeyCode::Right, KeyEventKind::Release, KeyModifiers::NONE));
        assert_eq!(kb.presses(), &[KeyCode::Right, KeyCode::Right]);
    }

    #[test]
    fn letters_ignore_case() {
        let mut kb = InputState::new();
        kb.feed(key(KeyCode::Char('P'), KeyEventKind::Press, KeyModifiers::SHIFT));
        kb.feed(key(KeyCode::Enter, KeyEventKind::Press, KeyModifiers::NONE));
        assert_eq!(kb.presses(), &[KeyCode::Char('p'), KeyCode::Enter]);
    }

    #[test]
    fn pasted_text_normalizes_line_endings() {
        let mut kb = InputState::new();
        kb.feed_paste("x---\r-x--\r\n--x-");
        assert_eq!(kb.pastes(), &["x---\n-x--\n--x-".to_string()]);
        assert!(kb.presses().is_empty());
    }

    #[test]
    fn ctrl_c_detected() {
        let mut kb = InputState::new();
        kb.feed(key(KeyCode::Char('c'), KeyEventKind::Press, KeyModifiers::NONE));
        assert!(!kb.ctrl_c_pressed());
        kb.feed(key(KeyCode::Char('c'), KeyEventKind::Press, KeyModifiers::CONTROL));
        assert!(kb.ctrl_c_pressed());
    }
}
