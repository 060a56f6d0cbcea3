//! Error taxonomy shared across the workspace (spec §7).
//!
//! Library calls return explicit success/failure discriminants; internal
//! invariants are enforced with `debug_assert!` (compiled out in release),
//! never by panicking in the public API.

use thiserror::Error;

use crate::mv::Move;

/// Errors produced by game-state and evaluator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PenteError {
    /// Attempt to play off-board, on an occupied cell, or violating the
    /// tournament rule. No state change occurs.
    #[error("illegal move {0}")]
    IllegalMove(Move),

    /// A search was invoked on a terminal state.
    #[error("no legal move available (terminal position)")]
    NoLegalMove,

    /// The evaluator's prior distribution didn't match the state's legal
    /// moves; the caller should fall back to a uniform prior.
    #[error("evaluator returned a prior that does not match legal moves")]
    EvaluatorMismatch,

    /// A game-record token could not be parsed as a move.
    #[error("malformed move token {0:?}")]
    MalformedRecord(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_move_formats_the_move() {
        let err = PenteError::IllegalMove(Move::new(9, 9));
        assert!(err.to_string().contains("K10"));
    }
}
