//! Engine error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed FEN, UCI token or move token.
    #[error("parse error: {0}")]
    Parse(String),

    /// A move that cannot be applied to the current position: rejected by
    /// the legal filter, no piece on the source square, or a capture over an
    /// empty target.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Network file with a bad magic, version or feature count.
    #[error("bad network file: {0}")]
    Format(String),
}
