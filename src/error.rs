/// Crate-wide error type.
///
/// Variants fall into three families the host reports differently:
///   - shape errors: pasted / stored pattern text is malformed
///   - puzzle-unavailable errors: a daily fragment is missing or malformed
///   - attempt errors: the daily quota is used up or the puzzle is solved

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeatleError {
    #[error("expected {expected} lines, got {got}")]
    LineCount { expected: usize, got: usize },

    #[error("line {line} must have {expected} characters, got {got}")]
    LineLength { line: usize, expected: usize, got: usize },

    #[error("fragment {fragment}: {reason}")]
    FragmentShape { fragment: u8, reason: String },

    #[error("lane {lane} does not have {expected} steps (got {got})")]
    AssembledLane { lane: usize, expected: usize, got: usize },

    #[error("could not fetch fragment {fragment}: {source}")]
    FragmentFetch {
        fragment: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("no attempts left today ({max} used)")]
    QuotaExceeded { max: usize },

    #[error("today's puzzle is already solved")]
    AlreadySolved,

    #[error("storage error on key `{key}`: {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed attempt history: {0}")]
    Json(#[from] serde_json::Error),
}

impl BeatleError {
    /// Decode rejected the text because of its line count or line length.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, BeatleError::LineCount { .. } | BeatleError::LineLength { .. })
    }

    /// Today's puzzle cannot be built.
    pub fn is_puzzle_unavailable(&self) -> bool {
        matches!(
            self,
            BeatleError::FragmentShape { .. }
                | BeatleError::AssembledLane { .. }
                | BeatleError::FragmentFetch { .. }
        )
    }

    /// Short text for the status bar.
    pub fn user_message(&self) -> String {
        if self.is_puzzle_unavailable() {
            "Puzzle unavailable today".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, BeatleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_families_are_distinct() {
        let shape = BeatleError::LineCount { expected: 8, got: 7 };
        let frag = BeatleError::FragmentShape { fragment: 3, reason: "line 2 is not 4 characters".into() };
        let quota = BeatleError::QuotaExceeded { max: 6 };

        assert!(shape.is_shape_error());
        assert!(!shape.is_puzzle_unavailable());
        assert!(frag.is_puzzle_unavailable());
        assert!(!frag.is_shape_error());
        assert!(!quota.is_shape_error() && !quota.is_puzzle_unavailable());
    }

    #[test]
    fn puzzle_errors_collapse_to_one_message() {
        let e = BeatleError::AssembledLane { lane: 2, expected: 16, got: 12 };
        assert_eq!(e.user_message(), "Puzzle unavailable today");

        let e = BeatleError::LineLength { line: 4, expected: 16, got: 15 };
        assert_eq!(e.user_message(), "line 4 must have 16 characters, got 15");
    }
}
