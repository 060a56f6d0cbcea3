//! Thread-pool driver for running many search iterations in parallel
//! against a shared [`SearchCore`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use pente_core::game_state::GameState;
use pente_core::Evaluator;

use crate::error::MctsError;
use crate::search::SearchCore;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub workers: usize,
    pub max_iterations: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Default for ParallelConfig {
    fn default() -> ParallelConfig {
        ParallelConfig { workers: 4, max_iterations: Some(10_000), time_limit: None }
    }
}

/// A periodic snapshot sent over the optional progress channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProgressReport {
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Runs `config.workers` threads against one [`SearchCore`] until a stop
/// condition (iteration cap, time limit, cancellation, or arena
/// exhaustion) is hit. Cheap to construct; reusable across calls to
/// `run` as long as `cancel` hasn't been called.
pub struct ParallelDriver {
    iterations: AtomicU64,
    cancelled: AtomicBool,
}

impl ParallelDriver {
    pub fn new() -> ParallelDriver {
        ParallelDriver { iterations: AtomicU64::new(0), cancelled: AtomicBool::new(false) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn iterations_run(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    pub fn run(
        &self,
        root_state: &GameState,
        evaluator: &dyn Evaluator,
        search: &SearchCore,
        config: ParallelConfig,
        progress: Option<(crossbeam_channel::Sender<ProgressReport>, u64)>,
    ) {
        tracing::info!(
            workers = config.workers,
            max_iterations = ?config.max_iterations,
            time_limit_ms = ?config.time_limit.map(|d| d.as_millis()),
            "search start"
        );
        let deadline = config.time_limit.map(|d| Instant::now() + d);
        let started = Instant::now();
        let progress_ref = progress.as_ref();
        std::thread::scope(|scope| {
            for worker_id in 0..config.workers.max(1) {
                scope.spawn(move || {
                    tracing::debug!(worker_id, "worker started");
                    loop {
                        if self.cancelled.load(Ordering::Acquire) {
                            tracing::debug!(
                                worker_id,
                                error = %MctsError::Cancelled,
                                "worker stopping: search cancelled"
                            );
                            break;
                        }
                        let done = self.iterations.load(Ordering::Acquire);
                        if let Some(max) = config.max_iterations {
                            if done >= max {
                                break;
                            }
                        }
                        if let Some(dl) = deadline {
                            if Instant::now() >= dl {
                                break;
                            }
                        }
                        if search.is_exhausted() {
                            tracing::warn!(
                                worker_id,
                                error = %MctsError::ArenaExhausted { capacity: search.arena().capacity() },
                                "worker stopping: arena exhausted"
                            );
                            break;
                        }
                        if !search.run_iteration(root_state, evaluator) {
                            break;
                        }
                        let n = self.iterations.fetch_add(1, Ordering::AcqRel) + 1;
                        if let Some((tx, every)) = progress_ref {
                            if n.is_multiple_of(*every) {
                                let _ = tx.try_send(ProgressReport { iterations: n, elapsed: started.elapsed() });
                            }
                        }
                    }
                    tracing::debug!(worker_id, "worker stopped");
                });
            }
        });
        tracing::info!(
            iterations = self.iterations.load(Ordering::Acquire),
            elapsed_ms = started.elapsed().as_millis(),
            root_visits = search.root_visits(),
            "search stop"
        );
    }
}

impl Default for ParallelDriver {
    fn default() -> ParallelDriver {
        ParallelDriver::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pente_core::config::GameConfig;
    use pente_core::evaluator::UniformEvaluator;
    use crate::search::SearchConfig;

    #[test]
    fn parallel_run_respects_iteration_cap() {
        let state = GameState::new(GameConfig::pente());
        let search = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::flat();
        let driver = ParallelDriver::new();
        let config = ParallelConfig { workers: 4, max_iterations: Some(500), time_limit: None };
        driver.run(&state, &evaluator, &search, config, None);
        assert!(driver.iterations_run() >= 500);
        assert!(search.root_visits() >= 500);
    }

    #[test]
    fn progress_channel_receives_updates() {
        let state = GameState::new(GameConfig::pente());
        let search = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::flat();
        let driver = ParallelDriver::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = ParallelConfig { workers: 2, max_iterations: Some(200), time_limit: None };
        driver.run(&state, &evaluator, &search, config, Some((tx, 50)));
        assert!(rx.try_iter().count() > 0);
    }

    #[test]
    fn cancel_stops_workers_early() {
        let state = GameState::new(GameConfig::pente());
        let search = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::flat();
        let driver = ParallelDriver::new();
        driver.cancel();
        let config = ParallelConfig { workers: 2, max_iterations: Some(10_000), time_limit: None };
        driver.run(&state, &evaluator, &search, config, None);
        assert_eq!(driver.iterations_run(), 0);
    }
}
