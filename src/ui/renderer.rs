/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Build the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// Screen layout:
///   row 0        HUD (mode, volume, metronome, play state)
///   rows 2..     one row per lane: name, then the steps in bars of four
///   below grid   attempt history (daily mode), message bar, help bar

use std::io::{self, BufWriter, Write};
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossterm::{
    cursor::{self, MoveTo},
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::domain::pattern::lane_name;
use crate::domain::score::{finish_message, format_countdown, until_next_puzzle, Attempt, Verdict};
use crate::sim::session::{Mode, RunSource, Session};
use crate::ui::sound::VOLUME_LEVELS;

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: [u8; 4],
    ch_len: u8,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Explicit background for every cell, also used for Clear, so the
    /// inter-row gaps on VTE terminals match the cells.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: Cell = Cell {
        ch: [b' ', 0, 0, 0],
        ch_len: 1,
        fg: Color::White,
        bg: Cell::BASE_BG,
    };

    /// Sentinel used to invalidate the back buffer.
    const INVALID: Cell = Cell {
        ch: [b'?', 0, 0, 0],
        ch_len: 1,
        fg: Color::Magenta,
        bg: Color::Magenta,
    };

    #[inline]
    fn norm_bg(bg: Color) -> Color {
        match bg {
            Color::Reset => Self::BASE_BG,
            other => other,
        }
    }

    fn from_char(c: char, fg: Color, bg: Color) -> Self {
        let mut cell = Self::BLANK;
        cell.ch_len = c.encode_utf8(&mut cell.ch).len() as u8;
        cell.fg = fg;
        cell.bg = Self::norm_bg(bg);
        cell
    }

    fn as_str(&self) -> &str {
        std::str::from_utf8(&self.ch[..self.ch_len as usize]).unwrap_or(" ")
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![Cell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    /// Write a string at (x, y). Each char occupies 1 column.
    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (cx, ch) in (x..).zip(s.chars()) {
            if cx >= self.width { break; }
            self.set(cx, y, Cell::from_char(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, Cell::from_char(' ', Color::White, bg));
        }
    }
}

// ── Layout ──

const HUD_ROW: usize = 0;
const GRID_ROW: usize = 2;
/// Columns reserved for the lane name.
const NAME_W: usize = 8;
/// Each step is drawn 2 columns wide.
const STEP_W: usize = 2;

const HUD_BG: Color = Color::Rgb { r: 20, g: 20, b: 60 };
const MSG_BG: Color = Color::Rgb { r: 200, g: 180, b: 50 };
const HIT_FG: Color = Color::Rgb { r: 255, g: 200, b: 50 };
const REST_FG: Color = Color::Rgb { r: 90, g: 90, b: 110 };
const CURSOR_BG: Color = Color::Rgb { r: 70, g: 70, b: 140 };
const PLAYHEAD_BG: Color = Color::Rgb { r: 45, g: 80, b: 45 };
const GOOD: Color = Color::Rgb { r: 80, g: 255, b: 80 };
const BAD: Color = Color::Rgb { r: 255, g: 60, b: 60 };

/// Left column of a step; bars of four are separated by one blank column.
pub fn step_col(step: usize) -> usize {
    NAME_W + step * STEP_W + step / 4
}

pub fn verdict_glyph(v: Verdict) -> char {
    match v {
        Some(true) => '✓',
        Some(false) => '✗',
        None => '·',
    }
}

/// One-line summary of an attempt for the history list.
pub fn attempt_summary(index: usize, a: &Attempt) -> String {
    let mark = if a.is_win() { "★" } else { " " };
    format!(
        "{mark} #{}  {}/{} found  {} wrong  {}",
        index + 1,
        a.correct_count,
        a.total_checked,
        a.wrong_count(),
        a.timestamp.format("%H:%M UTC"),
    )
}

fn volume_bar(index: usize) -> String {
    (0..VOLUME_LEVELS.len()).map(|i| if i <= index { '█' } else { '░' }).collect()
}

/// Per-frame facts the session does not own.
pub struct FrameInfo {
    pub now: Instant,
    pub utc_now: DateTime<Utc>,
    pub volume_index: usize,
    pub max_attempts: usize,
    pub audio_enabled: bool,
}

// ── Renderer ──

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
    last_mode: Option<Mode>,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
            last_mode: None,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            EnableBracketedPaste,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        // Force full repaint on first frame
        self.back.cells.fill(Cell::INVALID);
        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(
            self.writer,
            ResetColor,
            cursor::Show,
            DisableBracketedPaste,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    pub fn render(&mut self, s: &Session, info: &FrameInfo) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
        }

        // Clean transition on mode switch
        if self.last_mode != Some(s.mode) {
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
            self.last_mode = Some(s.mode);
        }

        self.front.clear();
        self.compose_hud(s, info);
        let below = self.compose_grid(s, info);
        let below = match s.mode {
            Mode::Daily => self.compose_daily(s, info, below),
            Mode::Playground => below,
        };
        self.compose_message(s, below);
        self.compose_help(s);

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        // Explicit base colors; ResetColor would fall back to the terminal default.
        queue!(self.writer, SetForegroundColor(Color::White), SetBackgroundColor(Cell::BASE_BG))?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    need_move = true;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.as_str()))?;
                last_x = x;
                last_y = y;
            }
        }

        self.writer.flush()
    }

    // ── Compose: build front buffer content ──

    fn compose_hud(&mut self, s: &Session, info: &FrameInfo) {
        let mode = match s.mode {
            Mode::Playground => "Playground",
            Mode::Daily => "Beat of the Day",
        };
        let play = match s.run.as_ref().map(|r| r.source) {
            Some(RunSource::Grid) => "▶ playing",
            Some(RunSource::Answer) => "▶ answer",
            Some(RunSource::Attempt(_)) => "▶ replay",
            None => "",
        };
        let vol = if info.audio_enabled { volume_bar(info.volume_index) } else { "muted".to_string() };
        let hud = format!(
            " BEATLE  {:<16} Vol {}  Metronome {:<3}  {} ",
            mode,
            vol,
            if s.include_metronome { "on" } else { "off" },
            play,
        );
        self.front.fill_row(HUD_ROW, HUD_BG);
        self.front.put_str(0, HUD_ROW, &hud, Color::White, HUD_BG);
    }

    /// Draw the lanes. Returns the first free row below the grid.
    fn compose_grid(&mut self, s: &Session, info: &FrameInfo) -> usize {
        let glyphs = s.grid.glyphs;
        let playhead = s.playhead(info.now);
        // Grid replays show the attempt being heard, not the live grid
        let shown = match s.run.as_ref().map(|r| r.source) {
            Some(RunSource::Attempt(i)) => s.attempt_pattern(i),
            _ => None,
        };
        let pattern = shown.as_ref().unwrap_or(&s.pattern);

        for lane in 0..pattern.lane_count() {
            let row = GRID_ROW + lane;
            if row >= self.front.height { break; }

            let name_fg = if lane == s.cursor_lane { HIT_FG } else { Color::Grey };
            self.front.put_str(1, row, &lane_name(lane), name_fg, Color::Reset);

            for step in 0..pattern.steps_per_lane() {
                let hit = pattern.is_hit(lane, step);
                let bg = if lane == s.cursor_lane && step == s.cursor_step {
                    CURSOR_BG
                } else if playhead == Some(step) {
                    PLAYHEAD_BG
                } else {
                    Color::Reset
                };
                let (ch, fg) = if hit { ('●', HIT_FG) } else { ('·', REST_FG) };
                let col = step_col(step);
                self.front.set(col, row, Cell::from_char(ch, fg, bg));
                self.front.set(col + 1, row, Cell::from_char(' ', fg, bg));
            }
        }

        let text_row = GRID_ROW + pattern.lane_count() + 1;
        let legend = format!(" {} hit  {} rest  {} hits", glyphs.hit, glyphs.rest, pattern.hit_count());
        self.front.put_str(0, text_row, &legend, Color::DarkGrey, Color::Reset);
        text_row + 2
    }

    fn compose_daily(&mut self, s: &Session, info: &FrameInfo, top: usize) -> usize {
        let mut row = top;
        let attempts = s.todays_attempts();

        let header = format!(
            " Attempts {}/{}   {}",
            attempts.len(),
            info.max_attempts,
            if s.answer.is_some() { "" } else { "Puzzle unavailable today" },
        );
        self.front.put_str(0, row, &header, HIT_FG, Color::Reset);
        row += 1;

        for (i, a) in attempts.iter().enumerate() {
            let selected = i == s.selected_attempt;
            let fg = if a.is_win() { GOOD } else if selected { Color::White } else { Color::Grey };
            let marker = if selected { "▸" } else { " " };
            self.front.put_str(1, row, marker, HIT_FG, Color::Reset);
            self.front.put_str(2, row, &attempt_summary(i, a), fg, Color::Reset);
            row += 1;
        }

        // Verdict grid for the selected attempt
        if let Some(a) = attempts.get(s.selected_attempt) {
            row += 1;
            let steps = s.grid.steps;
            for lane in 0..s.grid.lanes {
                if row >= self.front.height { break; }
                self.front.put_str(1, row, &lane_name(lane), Color::DarkGrey, Color::Reset);
                for step in 0..steps {
                    let v = a.comparison.get(lane * steps + step).copied().flatten();
                    let fg = match v {
                        Some(true) => GOOD,
                        Some(false) => BAD,
                        None => REST_FG,
                    };
                    self.front.set(step_col(step), row, Cell::from_char(verdict_glyph(v), fg, Color::Reset));
                }
                row += 1;
            }
        }

        if s.is_finished(info.max_attempts) {
            row += 1;
            let won = s.attempts.has_won(s.today);
            let msg = finish_message(won, attempts.len());
            self.front.put_str(1, row, msg, if won { GOOD } else { BAD }, Color::Reset);
            row += 1;
            let next = format!("Next beat in {}", format_countdown(until_next_puzzle(info.utc_now)));
            self.front.put_str(1, row, &next, Color::White, Color::Reset);
            row += 1;
        }

        row + 1
    }

    fn compose_message(&mut self, s: &Session, row: usize) {
        if s.message.is_empty() || row >= self.front.height { return; }
        let msg = format!(" ◈ {} ", s.message);
        self.front.fill_row(row, MSG_BG);
        self.front.put_str(0, row, &msg, Color::Black, MSG_BG);
    }

    fn compose_help(&mut self, s: &Session) {
        let lines = help_lines(s.mode);
        let Some(top) = self.front.height.checked_sub(lines.len()) else { return };
        for (i, line) in lines.iter().enumerate() {
            self.front.put_str(0, top + i, line, Color::DarkGrey, Color::Reset);
        }
    }
}

/// Key help for the bottom rows. Pasting a pattern works in both modes.
pub fn help_lines(mode: Mode) -> [&'static str; 2] {
    match mode {
        Mode::Playground => [
            " ←→↑↓ Move  SPC Step  L Lane  C Clear  P Play  M Metro  V Vol",
            " S/O Save/Open  E Export  Paste Load  D Daily  Q Quit",
        ],
        Mode::Daily => [
            " ←→↑↓ Move  SPC Step  L Lane  C Clear  P Play  M Metro  V Vol  S/O Save/Open  E Export",
            " ENTER Submit  A Answer  R Replay  [/] Pick  Paste Load  D Playground  Q Quit",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::Glyphs;
    use chrono::TimeZone;

    #[test]
    fn steps_are_grouped_in_bars_of_four() {
        assert_eq!(step_col(0), NAME_W);
        assert_eq!(step_col(3), NAME_W + 6);
        // one spacer column after each bar
        assert_eq!(step_col(4), NAME_W + 9);
        assert_eq!(step_col(15), NAME_W + 30 + 3);
    }

    #[test]
    fn daily_help_lists_editing_keys() {
        let help = help_lines(Mode::Daily).join(" ");
        for key in [" L Lane", " C Clear", " S/O Save/Open", " V Vol", " M Metro", " E Export", "ENTER Submit", "Paste"] {
            assert!(help.contains(key), "missing {key:?}");
        }
        let playground = help_lines(Mode::Playground).join(" ");
        assert!(playground.contains(" E Export") && !playground.contains("ENTER"));
    }

    #[test]
    fn verdict_glyphs() {
        assert_eq!(verdict_glyph(Some(true)), '✓');
        assert_eq!(verdict_glyph(Some(false)), '✗');
        assert_eq!(verdict_glyph(None), '·');
    }

    #[test]
    fn attempt_summary_line() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 14, 5, 0).unwrap();
        let a = Attempt::evaluate("xx--", "x-x-", 1, 4, Glyphs::default(), ts);
        assert_eq!(attempt_summary(0, &a), "  #1  1/2 found  1 wrong  14:05 UTC");

        let won = Attempt::evaluate("x-x-", "x-x-", 1, 4, Glyphs::default(), ts);
        assert!(attempt_summary(2, &won).starts_with("★ #3"));
    }

    #[test]
    fn volume_bar_fills_up_to_level() {
        assert_eq!(volume_bar(0), "█░░");
        assert_eq!(volume_bar(2), "███");
    }

    #[test]
    fn cells_hold_multibyte_glyphs() {
        let c = Cell::from_char('●', Color::White, Color::Reset);
        assert_eq!(c.as_str(), "●");
        assert_eq!(c.bg, Cell::BASE_BG);
    }
}
