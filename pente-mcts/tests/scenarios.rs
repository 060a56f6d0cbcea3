//! End-to-end scenarios from the engine's design document: a handful of
//! literal tactical positions the search is expected to solve regardless
//! of which evaluator or how many workers drive it.

use std::sync::Arc;

use pente_core::config::GameConfig;
use pente_core::evaluator::{HeuristicEvaluator, HeuristicWeights};
use pente_core::game_state::{GameState, Player};
use pente_core::mv::Move;
use pente_mcts::{EngineConfig, PenteMctsPlayer};
use rand::SeedableRng;

fn no_tournament_rule() -> GameConfig {
    let mut c = GameConfig::pente();
    c.tournament_rule = false;
    c
}

/// Black builds an open three J10-K10-L10 with White to move; blocking
/// either end (H10 or M10) is the only sound reply.
#[test]
fn open_three_is_blocked_at_one_end() {
    let mut state = GameState::new(no_tournament_rule());
    for &(x, y) in &[(9, 9), (8, 8), (8, 9), (10, 8), (10, 9)] {
        state.make_move(x, y).unwrap();
    }
    assert_eq!(state.current_player(), Player::White);

    let player = PenteMctsPlayer::new(
        Arc::new(HeuristicEvaluator::new(HeuristicWeights::default())),
        EngineConfig::single_threaded(4_000),
    );
    let mv = player.best_move(&state).unwrap();
    assert!(
        mv == Move::new(7, 9) || mv == Move::new(11, 9),
        "expected a block at either end of the open three, got {mv}"
    );
}

/// Black already has four in a row (J10-M10) with White covering one end
/// (H10); White must block the open end at N10 or Black wins next move.
#[test]
fn four_in_a_row_forces_the_only_block() {
    let mut state = GameState::new(no_tournament_rule());
    for &(x, y) in &[
        (9, 9),  // Black K10
        (7, 9),  // White H10
        (8, 9),  // Black J10
        (6, 9),  // White filler
        (10, 9), // Black L10
        (6, 8),  // White filler
        (11, 9), // Black M10
    ] {
        state.make_move(x, y).unwrap();
    }
    assert_eq!(state.current_player(), Player::White);

    let player = PenteMctsPlayer::new(
        Arc::new(HeuristicEvaluator::new(HeuristicWeights::default())),
        EngineConfig::single_threaded(4_000),
    );
    let mv = player.best_move(&state).unwrap();
    assert_eq!(mv, Move::new(12, 9), "the only move that stops Black's five is N10");
}

/// A forced Black win (open four along the center row) must be proven the
/// same way whether the search runs on 1, 2, or 4 worker threads; proven
/// moves are not subject to the statistical variance ordinary play is.
#[test]
fn parallel_determinism_of_proven_wins() {
    let mut config = GameConfig::gomoku();
    config.tournament_rule = false;
    let mut state = GameState::new(config);
    for &(x, y) in &[(9, 9), (9, 8), (10, 9), (9, 7), (11, 9), (9, 6), (12, 9), (9, 5)] {
        state.make_move(x, y).unwrap();
    }
    assert_eq!(state.current_player(), Player::Black);

    for workers in [1usize, 2, 4] {
        let player = PenteMctsPlayer::new(
            Arc::new(pente_core::evaluator::UniformEvaluator::new(
                1,
                rand_chacha::ChaCha8Rng::from_seed([workers as u8; 32]),
            )),
            EngineConfig {
                search: pente_mcts::SearchConfig::default(),
                parallel: pente_mcts::ParallelConfig {
                    workers,
                    max_iterations: Some(3_000),
                    time_limit: None,
                },
            },
        );
        let mv = player.parallel_search(&state).unwrap();
        let mut check = state.clone();
        check.make_move(mv.x(), mv.y()).unwrap();
        assert_eq!(
            check.winner(),
            Some(Player::Black),
            "with {workers} worker(s), the engine must play a move that wins immediately"
        );
    }
}
