//! Error types and Result alias for bitsieve
//!
//! Recoverable failures (bad query syntax, unknown stream names, capacity
//! limits) are surfaced as [`Error`] values. Internal invariant violations
//! (unknown opcodes, unplaced labels, dedupe corruption) are logic bugs and
//! panic instead; they must never be reachable from input.

use thiserror::Error as ThisError;

// ============================================================================
// Error Codes
// ============================================================================

/// Broad classification of a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed query or tree text.
    Syntax,
    /// A stream name with no configured stream id.
    UnknownStream,
    /// A quoted phrase with fewer than two tokens.
    EmptyPhrase,
    /// An iterator or cursor advanced past its end.
    EndOfSequence,
    /// A bounded structure ran out of room.
    Capacity,
    /// Mutation of a sealed index structure.
    Sealed,
    /// A document handle that resolves to no live document.
    UnknownDocument,
}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Syntax => "syntax",
            ErrorCode::UnknownStream => "unknown stream",
            ErrorCode::EmptyPhrase => "empty phrase",
            ErrorCode::EndOfSequence => "end of sequence",
            ErrorCode::Capacity => "capacity",
            ErrorCode::Sealed => "sealed",
            ErrorCode::UnknownDocument => "unknown document",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Error
// ============================================================================

/// A recoverable failure with classification and context.
///
/// Parse errors additionally carry the character position at which the
/// failure was detected.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{code}: {message}{}", position_note(.position))]
pub struct Error {
    code: ErrorCode,
    message: String,
    position: Option<usize>,
}

fn position_note(position: &Option<usize>) -> String {
    match position {
        Some(p) => format!(" (position {})", p),
        None => String::new(),
    }
}

impl Error {
    /// Create an error with a classification and message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            position: None,
        }
    }

    /// Create an error anchored to a character position in the input.
    pub fn at(code: ErrorCode, message: impl Into<String>, position: usize) -> Self {
        Self {
            code,
            message: message.into(),
            position: Some(position),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

/// Result type alias for bitsieve operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================
