//! Pente MCTS - Monte Carlo Tree Search for the Pente family of games.
//!
//! This crate provides a parallel MCTS engine:
//! - PUCT tree policy over a lock-free, arena-allocated search tree
//! - A thread pool driving many simulations concurrently against one tree
//! - A solver that proves forced wins/losses and short-circuits search there
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: `PenteMctsPlayer` (orchestration)
//! - Level 2: `arena` (node storage), `driver` (thread pool)
//! - Level 3: `search` (selection, expansion, backprop, solver)
//! - Level 4: per-node atomic stats, utilities

pub mod arena;
pub mod driver;
pub mod error;
pub mod search;

pub use arena::{NodeId, SolvedStatus, TreeArena};
pub use driver::{ParallelConfig, ParallelDriver, ProgressReport};
pub use error::MctsError;
pub use search::{MoveStats, SearchConfig, SearchCore};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pente_core::game_state::GameState;
use pente_core::mv::Move;
use pente_core::{Evaluator, PenteError};

/// Combined tuning knobs for one player: tree/PUCT settings plus how much
/// parallel work to throw at each move decision.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub parallel: ParallelConfig,
}

impl EngineConfig {
    /// A single-threaded configuration capped at a fixed iteration count;
    /// useful for deterministic tests.
    pub fn single_threaded(iterations: u64) -> EngineConfig {
        EngineConfig {
            search: SearchConfig::default(),
            parallel: ParallelConfig { workers: 1, max_iterations: Some(iterations), time_limit: None },
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> EngineConfig {
        self.parallel.time_limit = Some(limit);
        self.parallel.max_iterations = None;
        self
    }
}

/// Summary statistics from one search, for UIs and tests that want more
/// than just the chosen move.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchReport {
    pub iterations: u64,
    pub root_visits: i32,
    pub best_move: Option<Move>,
    pub top_children: Vec<MoveStats>,
    /// Set if the last search stopped early because the arena ran out of
    /// node/child capacity rather than hitting its iteration or time budget.
    pub arena_exhausted: bool,
    /// Set if the last search was cancelled via [`PenteMctsPlayer::cancel`]
    /// before it reached its iteration or time budget.
    pub cancelled: bool,
}

/// An MCTS player over a pluggable [`Evaluator`]. Holds the tree from its
/// most recent search so callers can inspect it (`stats`, `top_children`)
/// or explicitly carry it into the next move (`reuse_subtree`) without
/// forcing every call site to thread a tree through by hand. Nothing here
/// reuses a tree implicitly: each of `search`/`parallel_search` rebuilds
/// from scratch unless the caller calls `reuse_subtree` first.
pub struct PenteMctsPlayer {
    config: EngineConfig,
    evaluator: Arc<dyn Evaluator>,
    last_search: Mutex<Option<SearchCore>>,
    last_cancelled: Mutex<bool>,
    current_driver: Mutex<Option<Arc<ParallelDriver>>>,
}

impl PenteMctsPlayer {
    pub fn new(evaluator: Arc<dyn Evaluator>, config: EngineConfig) -> PenteMctsPlayer {
        PenteMctsPlayer {
            config,
            evaluator,
            last_search: Mutex::new(None),
            last_cancelled: Mutex::new(false),
            current_driver: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `Search(state, config)`: synchronous, single-threaded (ignores
    /// `config.parallel.workers`), runs the configured iteration budget
    /// and returns the recommended move.
    pub fn search(&self, state: &GameState) -> Result<Move, MctsError> {
        let mut single = self.config.parallel;
        single.workers = 1;
        self.run_search(state, single)
    }

    /// `ParallelSearch(state, parallel_config)`: same contract as
    /// `search`, using the configured worker count.
    pub fn parallel_search(&self, state: &GameState) -> Result<Move, MctsError> {
        self.run_search(state, self.config.parallel)
    }

    /// Convenience alias for `parallel_search`, the common case.
    pub fn best_move(&self, state: &GameState) -> Result<Move, MctsError> {
        self.parallel_search(state)
    }

    /// Cancel the in-flight search started by `search`/`parallel_search`, if
    /// any. Workers observe this at their next iteration boundary and stop;
    /// `run_search` then reports whatever partial result the tree has via
    /// `MctsError::Cancelled` if no move was found yet.
    pub fn cancel(&self) {
        if let Some(driver) = self.current_driver.lock().unwrap().as_ref() {
            driver.cancel();
        }
    }

    fn run_search(&self, state: &GameState, parallel: ParallelConfig) -> Result<Move, MctsError> {
        if state.is_terminal() {
            tracing::warn!(error = %PenteError::NoLegalMove, "search requested on a terminal position");
            return Err(MctsError::Game(PenteError::NoLegalMove));
        }
        let core = SearchCore::new(state, self.config.search);
        let driver = Arc::new(ParallelDriver::new());
        *self.current_driver.lock().unwrap() = Some(Arc::clone(&driver));
        driver.run(state, self.evaluator.as_ref(), &core, parallel, None);
        let cancelled = driver.is_cancelled();
        let exhausted = core.is_exhausted();
        let best = core.best_move();
        *self.last_search.lock().unwrap() = Some(core);
        *self.last_cancelled.lock().unwrap() = cancelled;
        *self.current_driver.lock().unwrap() = None;
        match best {
            Some(mv) => Ok(mv),
            None if cancelled => Err(MctsError::Cancelled),
            None if exhausted => Err(MctsError::ArenaExhausted { capacity: self.config.search.node_capacity }),
            None => Err(MctsError::Game(PenteError::NoLegalMove)),
        }
    }

    /// `Stats()`: inspection of the last search. `None` if nothing has
    /// been searched yet (or the tree was cleared).
    pub fn stats(&self) -> Option<SearchReport> {
        let guard = self.last_search.lock().unwrap();
        let core = guard.as_ref()?;
        Some(SearchReport {
            iterations: core.root_visits() as u64,
            root_visits: core.root_visits(),
            best_move: core.best_move(),
            top_children: core.top_children(8),
            arena_exhausted: core.is_exhausted(),
            cancelled: *self.last_cancelled.lock().unwrap(),
        })
    }

    /// `TopChildren(k)`: the `k` most-visited root moves of the last
    /// search, proven wins/losses ranked ahead of visit count.
    pub fn top_children(&self, k: usize) -> Vec<MoveStats> {
        self.last_search.lock().unwrap().as_ref().map(|c| c.top_children(k)).unwrap_or_default()
    }

    /// `ClearTree()`: discard the last search's tree.
    pub fn clear_tree(&self) {
        *self.last_search.lock().unwrap() = None;
        *self.last_cancelled.lock().unwrap() = false;
    }

    /// `ReuseSubtree(move)`: carry statistics from the last search's
    /// child reached by `played_move` into a fresh tree rooted at
    /// `next_state`, and make that the new "last search" tree. A no-op
    /// seed (fresh tree, no carried statistics) if there is no prior
    /// search or `played_move` wasn't one of its root children.
    pub fn reuse_subtree(&self, played_move: Move, next_state: &GameState) {
        let mut guard = self.last_search.lock().unwrap();
        let next = match guard.take() {
            Some(core) => core.reuse_subtree(played_move, next_state, self.config.search),
            None => SearchCore::new(next_state, self.config.search),
        };
        *guard = Some(next);
    }

    /// Run a search and return full statistics instead of just the move.
    /// Errors (e.g. a terminal root) still populate `stats()` with an empty
    /// report rather than panicking.
    pub fn search_with_stats(&self, state: &GameState) -> SearchReport {
        let _ = self.parallel_search(state);
        self.stats().unwrap_or(SearchReport {
            iterations: 0,
            root_visits: 0,
            best_move: None,
            top_children: Vec::new(),
            arena_exhausted: false,
            cancelled: false,
        })
    }

    /// Play a full game using this player for both sides. Stops early if a
    /// search fails (terminal root, cancellation, or arena exhaustion).
    pub fn play_game(&self, initial: GameState, max_rounds: u32) -> (GameState, Vec<Move>) {
        let mut state = initial;
        let mut moves = Vec::new();
        for _ in 0..max_rounds {
            if state.is_terminal() {
                break;
            }
            match self.best_move(&state) {
                Ok(mv) => {
                    state.make_move(mv.x(), mv.y()).expect("engine selected an illegal move");
                    moves.push(mv);
                }
                Err(_) => break,
            }
        }
        (state, moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pente_core::config::GameConfig;
    use pente_core::evaluator::UniformEvaluator;
    use rand::SeedableRng;

    #[test]
    fn player_picks_a_legal_move() {
        let state = GameState::new(GameConfig::pente());
        let player = PenteMctsPlayer::new(Arc::new(UniformEvaluator::flat()), EngineConfig::single_threaded(300));
        let mv = player.best_move(&state).unwrap();
        let mut check = state.clone();
        assert!(check.make_move(mv.x(), mv.y()).is_ok());
    }

    #[test]
    fn search_with_stats_reports_consistent_totals() {
        let state = GameState::new(GameConfig::pente());
        let player = PenteMctsPlayer::new(Arc::new(UniformEvaluator::flat()), EngineConfig::single_threaded(300));
        let report = player.search_with_stats(&state);
        assert!(report.iterations >= 300);
        assert!(report.best_move.is_some());
        assert!(!report.top_children.is_empty());
    }

    #[test]
    fn play_game_terminates_within_round_cap() {
        let state = GameState::new(GameConfig::gomoku());
        let player = PenteMctsPlayer::new(Arc::new(UniformEvaluator::new(6, rand_chacha::ChaCha8Rng::seed_from_u64(7))), EngineConfig::single_threaded(150));
        let (final_state, moves) = player.play_game(state, 20);
        assert!(moves.len() <= 20);
        assert_eq!(final_state.move_count(), moves.len());
    }

    #[test]
    fn stats_are_empty_before_any_search_and_after_clear() {
        let player = PenteMctsPlayer::new(Arc::new(UniformEvaluator::flat()), EngineConfig::single_threaded(50));
        assert!(player.stats().is_none());
        let state = GameState::new(GameConfig::pente());
        player.search(&state).unwrap();
        assert!(player.stats().is_some());
        player.clear_tree();
        assert!(player.stats().is_none());
    }

    #[test]
    fn search_on_a_terminal_state_reports_no_legal_move() {
        let state = GameState::new(GameConfig::gomoku());
        let player = PenteMctsPlayer::new(
            Arc::new(UniformEvaluator::new(5, rand_chacha::ChaCha8Rng::seed_from_u64(3))),
            EngineConfig::single_threaded(200),
        );
        let (final_state, _) = player.play_game(state, 400);
        assert!(final_state.is_terminal());
        let err = player.search(&final_state).unwrap_err();
        assert_eq!(err, MctsError::Game(PenteError::NoLegalMove));
    }

    #[test]
    fn cancel_stops_a_running_search_well_before_its_time_limit() {
        let state = GameState::new(GameConfig::pente());
        let mut config = EngineConfig::single_threaded(u64::MAX);
        config.parallel.max_iterations = None;
        config.parallel.time_limit = Some(Duration::from_secs(30));
        let player = Arc::new(PenteMctsPlayer::new(Arc::new(UniformEvaluator::flat()), config));

        let searcher = Arc::clone(&player);
        let handle = std::thread::spawn(move || searcher.search(&state));
        std::thread::sleep(Duration::from_millis(20));
        let before_cancel = std::time::Instant::now();
        player.cancel();
        let result = handle.join().unwrap();
        // Either a move was already found before cancellation landed, or
        // nothing had been found yet; either way the search must not have
        // run anywhere near its 30s time limit.
        assert!(before_cancel.elapsed() < Duration::from_secs(5));
        if let Err(err) = result {
            assert_eq!(err, MctsError::Cancelled);
        }
    }

    #[test]
    fn ucb1_mode_still_picks_a_legal_move() {
        let state = GameState::new(GameConfig::pente());
        let mut config = EngineConfig::single_threaded(300);
        config.search.search_mode = search::SearchMode::Ucb1;
        let player = PenteMctsPlayer::new(Arc::new(UniformEvaluator::flat()), config);
        let mv = player.best_move(&state).unwrap();
        let mut check = state.clone();
        assert!(check.make_move(mv.x(), mv.y()).is_ok());
    }

    #[test]
    fn reuse_subtree_carries_visits_into_the_next_search() {
        let state = GameState::new(GameConfig::pente());
        let player = PenteMctsPlayer::new(
            Arc::new(UniformEvaluator::new(2, rand_chacha::ChaCha8Rng::seed_from_u64(5))),
            EngineConfig::single_threaded(200),
        );
        let mv = player.search(&state).unwrap();
        let played_visits =
            player.top_children(usize::MAX).into_iter().find(|s| s.mv == mv).unwrap().visits;

        let mut next_state = state.clone();
        next_state.make_move(mv.x(), mv.y()).unwrap();
        player.reuse_subtree(mv, &next_state);
        assert_eq!(player.stats().unwrap().root_visits, played_visits);
    }
}
