//! Pluggable policy/value evaluation.
//!
//! An [`Evaluator`] turns a [`GameState`] into a prior distribution over
//! legal moves and a scalar value estimate from the perspective of the
//! side to move. Implementations must be safe to call concurrently from
//! multiple search workers.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

use crate::game_state::{GameState, Player};
use crate::mv::Move;

/// A source of move priors and position values for the search tree.
///
/// `evaluate` is the entry point search actually calls; the default
/// implementation composes `evaluate_policy` and `evaluate_value` so
/// simple evaluators only need to implement those two.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, state: &GameState) -> (Vec<(Move, f32)>, f32) {
        (self.evaluate_policy(state), self.evaluate_value(state))
    }

    /// Prior probability for each legal move. Need not sum to exactly 1;
    /// callers normalize.
    fn evaluate_policy(&self, state: &GameState) -> Vec<(Move, f32)>;

    /// Scalar value in `[-1, 1]` from the perspective of `state`'s side to
    /// move: positive favors the side to move, negative favors the
    /// opponent.
    fn evaluate_value(&self, state: &GameState) -> f32;
}

/// A flat prior over legal moves and a value estimated by random
/// playout. Used as a baseline and for testing search mechanics in
/// isolation from any tactical knowledge.
pub struct UniformEvaluator {
    rollout_depth: u32,
    rng: Mutex<ChaCha8Rng>,
}

impl UniformEvaluator {
    pub fn new(rollout_depth: u32, rng: ChaCha8Rng) -> UniformEvaluator {
        UniformEvaluator { rollout_depth, rng: Mutex::new(rng) }
    }

    /// A uniform evaluator with no rollout: always returns value 0.
    pub fn flat() -> UniformEvaluator {
        UniformEvaluator::new(0, ChaCha8Rng::seed_from_u64(0))
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate_policy(&self, state: &GameState) -> Vec<(Move, f32)> {
        let moves = state.legal_moves();
        let p = if moves.is_empty() { 0.0 } else { 1.0 / moves.len() as f32 };
        moves.into_iter().map(|m| (m, p)).collect()
    }

    fn evaluate_value(&self, state: &GameState) -> f32 {
        if self.rollout_depth == 0 {
            return 0.0;
        }
        let mover = state.current_player();
        let mut sim = state.clone();
        let mut rng = self.rng.lock().unwrap();
        for _ in 0..self.rollout_depth {
            if sim.is_terminal() {
                break;
            }
            let moves = sim.legal_moves();
            if moves.is_empty() {
                break;
            }
            let pick = moves[rng.gen_range(0..moves.len())];
            if sim.make_move(pick.x(), pick.y()).is_err() {
                break;
            }
        }
        match sim.winner() {
            Some(w) if w == mover => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        }
    }
}

/// Tactical weights for [`HeuristicEvaluator`]. All weights are
/// non-negative; the evaluator only ever adds to a move's baseline
/// score, never subtracts.
#[derive(Clone, Copy, Debug)]
pub struct HeuristicWeights {
    pub baseline: f32,
    pub per_capture_event: f32,
    pub winning_move: f32,
    pub open_three: f32,
    pub blocked_four: f32,
    pub open_four: f32,
    pub block_opponent_three: f32,
    pub block_opponent_four: f32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        HeuristicWeights {
            baseline: 1.0,
            per_capture_event: 6.0,
            winning_move: 200.0,
            open_three: 5.0,
            blocked_four: 8.0,
            open_four: 30.0,
            block_opponent_three: 4.0,
            block_opponent_four: 25.0,
        }
    }
}

/// A hand-tuned tactical evaluator: scores moves by capture potential,
/// line-building (open threes/fours), and blocking the opponent's
/// threats. Safe to share across search workers; it holds no mutable
/// state.
pub struct HeuristicEvaluator {
    weights: HeuristicWeights,
}

impl HeuristicEvaluator {
    pub fn new(weights: HeuristicWeights) -> HeuristicEvaluator {
        HeuristicEvaluator { weights }
    }

    fn score_move(&self, state: &GameState, mv: Move) -> f32 {
        let player = state.current_player();
        let w = &self.weights;
        let mut score = w.baseline;

        score += self.opponent_threat_broken(state, mv, player) ;

        let mut next = state.clone();
        if next.make_move(mv.x(), mv.y()).is_err() {
            return 0.0;
        }

        if let Some(info) = next.history().last() {
            let capture_events = (0..8).filter(|i| (info.capture_mask >> (i * 2)) & 0b11 != 0).count();
            score += capture_events as f32 * w.per_capture_event;
        }

        if next.winner() == Some(player) {
            score += w.winning_move;
            return score;
        }

        score += line_threat_score(&next, mv, player, w);
        score
    }

    /// Reward for playing into a cell that breaks an existing open
    /// three or four of the opponent's stones running through it.
    fn opponent_threat_broken(&self, state: &GameState, mv: Move, player: Player) -> f32 {
        let opponent = player.opponent();
        let w = &self.weights;
        let (open_run, blocked_run) = best_run_through(state, mv, opponent);
        if open_run >= 4 {
            w.block_opponent_four
        } else if open_run == 3 {
            w.block_opponent_three
        } else if blocked_run >= 4 {
            w.block_opponent_four * 0.5
        } else {
            0.0
        }
    }
}

impl Evaluator for HeuristicEvaluator {
    fn evaluate_policy(&self, state: &GameState) -> Vec<(Move, f32)> {
        let moves = state.legal_moves();
        let scores: Vec<f32> = moves.iter().map(|&m| self.score_move(state, m)).collect();
        let total: f32 = scores.iter().sum();
        if total <= 0.0 || moves.is_empty() {
            let p = if moves.is_empty() { 0.0 } else { 1.0 / moves.len() as f32 };
            return moves.into_iter().map(|m| (m, p)).collect();
        }
        moves.into_iter().zip(scores).map(|(m, s)| (m, s / total)).collect()
    }

    fn evaluate_value(&self, state: &GameState) -> f32 {
        let moves = state.legal_moves();
        if moves.is_empty() {
            return 0.0;
        }
        let best: f32 = moves.iter().map(|&m| self.score_move(state, m)).fold(0.0, f32::max);
        (best / (best + self.weights.winning_move)).clamp(-1.0, 1.0)
    }
}

/// The longest run of `player`'s stones through `mv`'s position after a
/// hypothetical placement there, along with whether either end is open.
/// Returns `(open_run_length, blocked_run_length)`: exactly one of the
/// two is nonzero.
fn best_run_through(state: &GameState, mv: Move, player: Player) -> (i32, i32) {
    const DIRS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
    let stones = state.board(player);
    let mut best_open = 0;
    let mut best_blocked = 0;
    for &(dx, dy) in &DIRS {
        let mut count = 1;
        let (mut fx, mut fy) = (mv.x() + dx, mv.y() + dy);
        while stones.test(fx, fy) {
            count += 1;
            fx += dx;
            fy += dy;
        }
        let front_open = state.stone_at(fx, fy).is_none();
        let (mut bx, mut by) = (mv.x() - dx, mv.y() - dy);
        while stones.test(bx, by) {
            count += 1;
            bx -= dx;
            by -= dy;
        }
        let back_open = state.stone_at(bx, by).is_none();
        if front_open && back_open {
            best_open = best_open.max(count);
        } else {
            best_blocked = best_blocked.max(count);
        }
    }
    (best_open, best_blocked)
}

fn line_threat_score(state: &GameState, mv: Move, player: Player, w: &HeuristicWeights) -> f32 {
    let (open_run, blocked_run) = best_run_through(state, mv, player);
    if open_run >= 4 {
        w.open_four
    } else if open_run == 3 {
        w.open_three
    } else if blocked_run >= 4 {
        w.blocked_four
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn uniform_policy_sums_to_one() {
        let state = GameState::new(GameConfig::pente());
        let eval = UniformEvaluator::flat();
        let policy = eval.evaluate_policy(&state);
        let total: f32 = policy.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn heuristic_scores_capture_completion_at_seven() {
        let mut config = GameConfig::pente();
        config.tournament_rule = false;
        let mut state = GameState::new(config);
        state.make_move(9, 9).unwrap();
        state.make_move(9, 8).unwrap();
        state.make_move(9, 10).unwrap();
        state.make_move(9, 7).unwrap();
        // Black to move at (9, 6): captures the pair at (9,8),(9,7).
        let eval = HeuristicEvaluator::new(HeuristicWeights::default());
        let score = eval.score_move(&state, Move::new(9, 6));
        assert!((score - 7.0).abs() < 1e-4, "expected 7.0, got {score}");
    }

    #[test]
    fn heuristic_never_produces_negative_scores() {
        let state = GameState::new(GameConfig::pente());
        let eval = HeuristicEvaluator::new(HeuristicWeights::default());
        for (_, p) in eval.evaluate_policy(&state) {
            assert!(p >= 0.0);
        }
    }
}
