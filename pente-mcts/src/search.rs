//! Single-threaded search mechanics: selection, expansion, backpropagation,
//! and solved-status (minimax) propagation. [`SearchCore`] is `Sync` and
//! holds no per-call mutable state beyond the arena's own atomics, so many
//! workers can call [`SearchCore::run_iteration`] concurrently; see
//! `driver.rs` for the thread pool that does so.

use serde::{Deserialize, Serialize};

use pente_core::game_state::GameState;
use pente_core::mv::Move;
use pente_core::{Evaluator, PenteError};

use crate::arena::{NodeId, SolvedStatus, TreeArena};

/// Which selection formula `SearchCore::select_child` uses, per spec.md's
/// `search_mode` config option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// `Q + c * sqrt(ln(N) / n_i)`; ignores priors entirely.
    Ucb1,
    /// `Q + c * P_i * sqrt(N) / (1 + n_i)`; requires priors from the
    /// evaluator.
    Puct,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// `c` in the UCB1 / PUCT selection formula.
    pub exploration_constant: f32,
    pub search_mode: SearchMode,
    pub node_capacity: usize,
    pub child_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig {
            exploration_constant: 1.4,
            search_mode: SearchMode::Puct,
            node_capacity: 200_000,
            child_capacity: 2_000_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    pub mv: Move,
    pub visits: i32,
    pub mean_value: f32,
    pub prior: f32,
    pub solved: Option<bool>,
}

/// Outcome of one simulated playout: used internally to decide whether a
/// terminal/solved value should also trigger solver propagation.
struct LeafResult {
    leaf: NodeId,
    value: f32,
    decisive: Option<SolvedStatus>,
}

pub struct SearchCore {
    arena: TreeArena,
    config: SearchConfig,
}

impl SearchCore {
    pub fn new(root_state: &GameState, config: SearchConfig) -> SearchCore {
        let arena = TreeArena::new(config.node_capacity, config.child_capacity, root_state.current_player());
        let root = arena.get(NodeId::ROOT);
        if root_state.is_terminal() {
            let status = match root_state.winner() {
                Some(w) if w == root_state.current_player() => SolvedStatus::SolvedWin,
                Some(_) => SolvedStatus::SolvedLoss,
                None => SolvedStatus::Unsolved,
            };
            if status != SolvedStatus::Unsolved {
                root.try_solve(status);
            }
        }
        SearchCore { arena, config }
    }

    pub fn arena(&self) -> &TreeArena {
        &self.arena
    }

    pub fn is_exhausted(&self) -> bool {
        self.arena.is_exhausted()
    }

    /// Build a fresh tree rooted at `new_root_state`, seeded with the
    /// accumulated statistics of `self`'s child reached by `played_move`
    /// (if any). An explicit, opt-in alternative to always rebuilding
    /// from scratch; nothing in `run_iteration` calls this implicitly.
    pub fn reuse_subtree(&self, played_move: Move, new_root_state: &GameState, config: SearchConfig) -> SearchCore {
        let fresh = SearchCore::new(new_root_state, config);
        if let Some(child_id) = self
            .arena
            .children_of(NodeId::ROOT)
            .into_iter()
            .find(|&id| self.arena.get(id).incoming_move() == played_move)
        {
            let child = self.arena.get(child_id);
            if child.visits() > 0 {
                fresh.arena.get(NodeId::ROOT).seed_from(child.visits(), child.total_value(), child.solved_status());
            }
        }
        fresh
    }

    /// Run one simulation from the root. `root_state` is never mutated;
    /// each call clones it and replays the selected path.
    pub fn run_iteration(&self, root_state: &GameState, evaluator: &dyn Evaluator) -> bool {
        if self.arena.get(NodeId::ROOT).solved_status() != SolvedStatus::Unsolved {
            return false;
        }
        let mut state = root_state.clone();
        let mut path = vec![NodeId::ROOT];
        let mut node_id = NodeId::ROOT;

        loop {
            let node = self.arena.get(node_id);
            self.arena.get(node_id).add_virtual_loss();

            if node.is_terminal() {
                let result = LeafResult {
                    leaf: node_id,
                    value: node.terminal_value(),
                    decisive: decisive_status(node.terminal_value()),
                };
                self.finish(&path, result);
                return true;
            }
            if node.solved_status() != SolvedStatus::Unsolved {
                let value = solved_value(node.solved_status());
                let result = LeafResult { leaf: node_id, value, decisive: None };
                self.finish(&path, result);
                return true;
            }

            if node.try_begin_expand() {
                let (policy, value) = evaluator.evaluate(&state);
                let policy = validated_policy(&state, policy);
                self.publish_expansion(node_id, &state, policy);
                let result = LeafResult { leaf: node_id, value, decisive: None };
                self.finish(&path, result);
                return true;
            }
            if !node.is_fully_expanded() {
                node.wait_for_expansion();
            }

            match self.select_child(node_id) {
                Some((child_id, child_mv)) => {
                    if state.make_move(child_mv.x(), child_mv.y()).is_err() {
                        // Tree and live state disagree; abandon this
                        // iteration rather than corrupt statistics.
                        self.remove_virtual_losses(&path);
                        return false;
                    }
                    path.push(child_id);
                    node_id = child_id;
                }
                None => {
                    // Expanded node with zero children: treat as terminal
                    // draw-like leaf.
                    let result = LeafResult { leaf: node_id, value: 0.0, decisive: None };
                    self.finish(&path, result);
                    return true;
                }
            }
        }
    }

    fn publish_expansion(&self, node_id: NodeId, state: &GameState, policy: Vec<(Move, f32)>) {
        let node = self.arena.get(node_id);
        let to_move = node.to_move();
        let count = policy.len();
        let Some(start) = self.arena.alloc_child_slots(count) else {
            tracing::warn!(
                error = %crate::error::MctsError::ArenaExhausted { capacity: self.arena.capacity() },
                "child-index arena exhausted; node expands with no children"
            );
            node.publish_children(0, 0);
            return;
        };
        let mut allocated = 0u32;
        for (i, (mv, prior)) in policy.into_iter().enumerate() {
            let mut child_state = state.clone();
            if child_state.make_move(mv.x(), mv.y()).is_err() {
                continue;
            }
            let child_to_move = to_move.opponent();
            let is_terminal = child_state.is_terminal();
            let terminal_value = if is_terminal {
                match child_state.winner() {
                    Some(w) if w == child_to_move => 1.0,
                    Some(_) => -1.0,
                    None => 0.0,
                }
            } else {
                0.0
            };
            let Some(child_id) =
                self.arena.alloc_node(node_id, mv, child_to_move, prior, is_terminal, terminal_value)
            else {
                tracing::warn!(
                    error = %crate::error::MctsError::ArenaExhausted { capacity: self.arena.capacity() },
                    "node arena exhausted mid-expansion; remaining children dropped"
                );
                break;
            };
            self.arena.set_child_slot(start + i as u32, child_id);
            allocated += 1;
        }
        node.set_unproven_count(allocated as i32);
        node.publish_children(start, allocated);
    }

    /// Score and pick a child by the configured selection formula. Ties in
    /// score are broken by higher prior, then by lower child index (the
    /// order children were published in, which is the order `children_of`
    /// returns them) per spec.md's tie-break rule.
    fn select_child(&self, node_id: NodeId) -> Option<(NodeId, Move)> {
        let children = self.arena.children_of(node_id);
        if children.is_empty() {
            return None;
        }
        let parent_visits = self.arena.get(node_id).visits().max(1) as f32;
        let c = self.config.exploration_constant;
        let mode = self.config.search_mode;
        let mut best: Option<(NodeId, f32, f32)> = None;
        for &child_id in &children {
            let child = self.arena.get(child_id);
            let exploit = match child.solved_status() {
                SolvedStatus::SolvedWin => -1.0, // bad for us: whoever moves there wins
                SolvedStatus::SolvedLoss => 1.0, // great for us: whoever moves there loses
                SolvedStatus::Unsolved => -child.mean_value(),
            };
            let n = (child.visits() + child.virtual_loss()) as f32;
            let score = if n <= 0.0 {
                // Unvisited children are explored before any visited one;
                // among themselves, order of prior decides (via the
                // tie-break below).
                f32::INFINITY
            } else {
                let explore = match mode {
                    SearchMode::Puct => c * child.prior() * parent_visits.sqrt() / (1.0 + n),
                    SearchMode::Ucb1 => c * (parent_visits.ln() / n).sqrt(),
                };
                exploit + explore
            };
            let prior = child.prior();
            let is_better = match best {
                None => true,
                Some((_, best_score, best_prior)) => (score, prior) > (best_score, best_prior),
            };
            if is_better {
                best = Some((child_id, score, prior));
            }
        }
        let (child_id, _, _) = best.unwrap();
        Some((child_id, self.arena.get(child_id).incoming_move()))
    }

    fn finish(&self, path: &[NodeId], result: LeafResult) {
        let leaf_to_move = self.arena.get(result.leaf).to_move();
        for &id in path {
            let node = self.arena.get(id);
            let value = if node.to_move() == leaf_to_move { result.value } else { -result.value };
            node.record_visit(value);
            node.remove_virtual_loss();
        }
        if let Some(status) = result.decisive {
            if self.arena.get(result.leaf).try_solve(status) {
                self.propagate_solved(result.leaf, status);
            }
        }
    }

    fn remove_virtual_losses(&self, path: &[NodeId]) {
        for &id in path {
            self.arena.get(id).remove_virtual_loss();
        }
    }

    fn propagate_solved(&self, mut node_id: NodeId, mut status: SolvedStatus) {
        loop {
            let node = self.arena.get(node_id);
            let parent_id = node.parent();
            if parent_id.is_none() {
                return;
            }
            let parent = self.arena.get(parent_id);
            let new_status = match status {
                SolvedStatus::SolvedLoss => Some(SolvedStatus::SolvedWin),
                SolvedStatus::SolvedWin => {
                    if parent.decrement_unproven() <= 0 {
                        Some(SolvedStatus::SolvedLoss)
                    } else {
                        None
                    }
                }
                SolvedStatus::Unsolved => None,
            };
            match new_status {
                Some(s) if parent.try_solve(s) => {
                    node_id = parent_id;
                    status = s;
                }
                _ => return,
            }
        }
    }

    pub fn best_move(&self) -> Option<Move> {
        let children = self.arena.children_of(NodeId::ROOT);
        children
            .into_iter()
            .map(|id| (id, self.arena.get(id)))
            .max_by(|(_, a), (_, b)| {
                let ka = rank_key(a);
                let kb = rank_key(b);
                ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| self.arena.get(id).incoming_move())
    }

    pub fn root_visits(&self) -> i32 {
        self.arena.get(NodeId::ROOT).visits()
    }

    pub fn top_children(&self, k: usize) -> Vec<MoveStats> {
        let mut stats: Vec<MoveStats> = self
            .arena
            .children_of(NodeId::ROOT)
            .into_iter()
            .map(|id| {
                let n = self.arena.get(id);
                MoveStats {
                    mv: n.incoming_move(),
                    visits: n.visits(),
                    mean_value: n.mean_value(),
                    prior: n.prior(),
                    // true = proven winning for the side that played this
                    // move (i.e. the opponent, to move at this child, loses).
                    solved: match n.solved_status() {
                        SolvedStatus::Unsolved => None,
                        SolvedStatus::SolvedLoss => Some(true),
                        SolvedStatus::SolvedWin => Some(false),
                    },
                }
            })
            .collect();
        stats.sort_by_key(|s| std::cmp::Reverse(s.visits));
        stats.truncate(k);
        stats
    }
}

/// Validate that `policy` covers exactly `state`'s legal moves. On a
/// mismatch (spec.md §7 `EvaluatorMismatch`), logs a warning and falls
/// back to a uniform prior over the legal moves instead of trusting the
/// evaluator's output.
fn validated_policy(state: &GameState, policy: Vec<(Move, f32)>) -> Vec<(Move, f32)> {
    let legal = state.legal_moves();
    let matches = policy.len() == legal.len() && policy.iter().all(|(mv, _)| legal.contains(mv));
    if matches {
        return policy;
    }
    tracing::warn!(
        error = %PenteError::EvaluatorMismatch,
        legal_moves = legal.len(),
        policy_moves = policy.len(),
        "evaluator prior did not match legal moves; falling back to uniform prior"
    );
    let p = if legal.is_empty() { 0.0 } else { 1.0 / legal.len() as f32 };
    legal.into_iter().map(|m| (m, p)).collect()
}

/// Solved-status ranking beats visit count: a proven win must be reported
/// even if it has fewer visits than a merely-promising sibling. A child's
/// `solved_status` describes the outcome for whoever moves *at* that
/// child, so from the parent's perspective the polarity is flipped: a
/// child the opponent loses from is the parent's best move.
fn rank_key(node: &crate::arena::Node) -> (i32, i32) {
    let solved_rank = match node.solved_status() {
        SolvedStatus::SolvedLoss => 1,
        SolvedStatus::Unsolved => 0,
        SolvedStatus::SolvedWin => -1,
    };
    (solved_rank, node.visits())
}

fn decisive_status(terminal_value: f32) -> Option<SolvedStatus> {
    if terminal_value > 0.5 {
        Some(SolvedStatus::SolvedWin)
    } else if terminal_value < -0.5 {
        Some(SolvedStatus::SolvedLoss)
    } else {
        None
    }
}

fn solved_value(status: SolvedStatus) -> f32 {
    match status {
        SolvedStatus::SolvedWin => 1.0,
        SolvedStatus::SolvedLoss => -1.0,
        SolvedStatus::Unsolved => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pente_core::config::GameConfig;
    use pente_core::evaluator::UniformEvaluator;
    use rand::SeedableRng;

    #[test]
    fn single_iteration_expands_root() {
        let state = GameState::new(GameConfig::pente());
        let core = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::flat();
        assert!(core.run_iteration(&state, &evaluator));
        assert_eq!(core.root_visits(), 1);
        assert!(!core.arena.children_of(NodeId::ROOT).is_empty());
    }

    #[test]
    fn repeated_iterations_grow_tree_and_pick_a_move() {
        let state = GameState::new(GameConfig::pente());
        let core = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::new(4, rand_chacha::ChaCha8Rng::seed_from_u64(1));
        for _ in 0..200 {
            core.run_iteration(&state, &evaluator);
        }
        assert!(core.best_move().is_some());
        assert_eq!(core.root_visits(), 200);
    }

    #[test]
    fn reuse_subtree_seeds_visits_from_the_played_child() {
        let state = GameState::new(GameConfig::pente());
        let core = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::new(2, rand_chacha::ChaCha8Rng::seed_from_u64(3));
        for _ in 0..100 {
            core.run_iteration(&state, &evaluator);
        }
        let played = core.best_move().unwrap();
        let child_visits = core
            .top_children(usize::MAX)
            .into_iter()
            .find(|s| s.mv == played)
            .unwrap()
            .visits;
        assert!(child_visits > 0);

        let mut next_state = state.clone();
        next_state.make_move(played.x(), played.y()).unwrap();
        let reused = core.reuse_subtree(played, &next_state, SearchConfig::default());
        assert_eq!(reused.root_visits(), child_visits);
    }

    #[test]
    fn solver_proves_an_immediate_winning_move() {
        // Black builds an open four along the center row; any completing
        // move wins immediately and should be provable as SolvedWin at
        // the root. Every move below is adjacent to an existing stone so
        // the sequence is legal under the default dilation frontier.
        let mut config = GameConfig::gomoku();
        config.tournament_rule = false;
        let mut state = GameState::new(config);
        for &(x, y) in &[(9, 9), (9, 8), (10, 9), (9, 7), (11, 9), (9, 6), (12, 9), (9, 5)] {
            state.make_move(x, y).unwrap();
        }
        // Black to move, stones at (9,9),(10,9),(11,9),(12,9): playing
        // (8,9) or (13,9) wins. Drive enough iterations that the solver
        // finds it.
        let core = SearchCore::new(&state, SearchConfig::default());
        let evaluator = UniformEvaluator::new(2, rand_chacha::ChaCha8Rng::seed_from_u64(2));
        for _ in 0..2000 {
            core.run_iteration(&state, &evaluator);
        }
        let mv = core.best_move().unwrap();
        let mut check = state.clone();
        check.make_move(mv.x(), mv.y()).unwrap();
        assert_eq!(check.winner(), Some(pente_core::game_state::Player::Black));
    }
}
