//! Pente Core - board representation and rules for the Pente family of
//! games (Pente, Gomoku, Keryo-Pente).
//!
//! This crate provides:
//! - A 361-bit packed board representation with fast dilation
//! - Game state with incremental legal-move maintenance and O(1) undo
//! - Capture and win-condition rules for all three variants
//! - A pluggable [`Evaluator`] trait for policy/value estimation
//! - Board notation and game-record parsing

pub mod bitboard;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod game_state;
pub mod mv;
pub mod record;

pub use bitboard::Bitboard;
pub use config::{CaptureRule, GameConfig, Variant};
pub use error::PenteError;
pub use evaluator::{Evaluator, HeuristicEvaluator, UniformEvaluator};
pub use game_state::{GameState, MoveInfo, Player};
pub use mv::{format_move, parse_move, Move};
pub use record::parse_game_record;
