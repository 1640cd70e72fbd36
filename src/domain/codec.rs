/// Pattern text codec.
///
/// ## Format
///   One line per lane, one glyph per step, lines joined with `\n`:
///   ```text
///   x---x---x---x---
///   ----x-------x---
///   ```
///   No header, no trailing metadata. This is the clipboard, storage and
///   fragment format.
///
/// `decode_lane` is lenient (truncates, never fails). `decode_pattern` is
/// strict about shape and all-or-nothing.

use crate::domain::pattern::{Glyphs, Pattern};
use crate::error::{BeatleError, Result};

/// Split pattern text into lines after trimming the whole blob.
/// A trailing `\r` on each line is dropped so CRLF clipboard text decodes.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.trim()
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

/// Decode a single lane. Characters past `steps` are ignored; a short line
/// yields a short lane.
pub fn decode_lane(text: &str, steps: usize, glyphs: Glyphs) -> Vec<bool> {
    text.chars().take(steps).map(|c| c == glyphs.hit).collect()
}

/// Decode a full pattern, rejecting any text whose shape is not
/// `lanes` lines of exactly `steps` characters.
pub fn decode_pattern(text: &str, lanes: usize, steps: usize, glyphs: Glyphs) -> Result<Pattern> {
    let lines = split_lines(text);
    if lines.len() != lanes {
        return Err(BeatleError::LineCount { expected: lanes, got: lines.len() });
    }

    let mut grid = Vec::with_capacity(lanes);
    for (i, line) in lines.iter().enumerate() {
        let len = line.chars().count();
        if len != steps {
            return Err(BeatleError::LineLength { line: i + 1, expected: steps, got: len });
        }
        grid.push(decode_lane(line, steps, glyphs));
    }

    // Every lane was length-checked above.
    Pattern::from_lanes(grid, steps).ok_or(BeatleError::LineCount { expected: lanes, got: 0 })
}

pub fn encode_lane(cells: &[bool], glyphs: Glyphs) -> String {
    cells.iter().map(|&c| glyphs.glyph(c)).collect()
}

pub fn encode_pattern(pattern: &Pattern, glyphs: Glyphs) -> String {
    pattern
        .lanes()
        .iter()
        .map(|lane| encode_lane(lane, glyphs))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count hit glyphs anywhere in a text blob.
pub fn count_hits(text: &str, glyphs: Glyphs) -> usize {
    text.chars().filter(|&c| c == glyphs.hit).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: Glyphs = Glyphs { hit: 'x', rest: '-' };

    fn pattern_from(rows: &[&str]) -> Pattern {
        let steps = rows[0].len();
        let lanes = rows.iter().map(|r| r.chars().map(|c| c == 'x').collect()).collect();
        Pattern::from_lanes(lanes, steps).unwrap()
    }

    #[test]
    fn decode_lane_truncates_and_tolerates_short_input() {
        assert_eq!(decode_lane("x-x-xx", 4, G), vec![true, false, true, false]);
        assert_eq!(decode_lane("x-", 4, G), vec![true, false]);
        // anything that is not the hit glyph is a rest
        assert_eq!(decode_lane("xo.X", 4, G), vec![true, false, false, false]);
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let p = pattern_from(&[
            "x---x---x---x---",
            "--x---x---x---x-",
            "----------------",
            "xxxxxxxxxxxxxxxx",
            "x-------------x-",
            "----x-------x---",
            "-x-x-x-x-x-x-x-x",
            "x--x--x---x-x---",
        ]);
        let text = encode_pattern(&p, G);
        assert_eq!(text.lines().count(), 8);
        assert_eq!(decode_pattern(&text, 8, 16, G).unwrap(), p);
    }

    #[test]
    fn encode_has_no_trailing_newline() {
        let p = pattern_from(&["x-", "-x"]);
        assert_eq!(encode_pattern(&p, G), "x-\n-x");
    }

    #[test]
    fn decode_trims_surrounding_whitespace() {
        let p = decode_pattern("\n  x-\n-x\n\n", 2, 2, G);
        // leading spaces belong to the first line after trim → "x-"
        assert_eq!(p.unwrap(), pattern_from(&["x-", "-x"]));
    }

    #[test]
    fn decode_accepts_crlf() {
        let p = decode_pattern("x-x-\r\n-x-x\r\n", 2, 4, G).unwrap();
        assert_eq!(p, pattern_from(&["x-x-", "-x-x"]));
    }

    #[test]
    fn wrong_line_count_is_rejected() {
        let err = decode_pattern("x---\n----\n----", 4, 4, G).unwrap_err();
        assert!(matches!(err, BeatleError::LineCount { expected: 4, got: 3 }));
        assert!(err.is_shape_error());
    }

    #[test]
    fn wrong_line_length_names_the_line() {
        let err = decode_pattern("x---\n--\n----", 3, 4, G).unwrap_err();
        assert!(matches!(err, BeatleError::LineLength { line: 2, expected: 4, got: 2 }));

        let err = decode_pattern("x---\n----\n-----", 3, 4, G).unwrap_err();
        assert!(matches!(err, BeatleError::LineLength { line: 3, expected: 4, got: 5 }));
    }

    #[test]
    fn custom_glyphs() {
        let g = Glyphs { hit: '#', rest: '.' };
        let p = decode_pattern("#..#\n.##.", 2, 4, g).unwrap();
        assert_eq!(encode_pattern(&p, g), "#..#\n.##.");
        assert_eq!(count_hits("#..#\n.##.", g), 4);
    }
}
