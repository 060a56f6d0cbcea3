//! Game state: two bitboards, capture counters, move history, and an
//! incrementally maintained legal-move set.

use serde::{Deserialize, Serialize};

use crate::bitboard::{Bitboard, BOARD_SIZE};
use crate::config::{CaptureRule, GameConfig, TOURNAMENT_PRESET_RING};
use crate::error::PenteError;
use crate::mv::Move;

const CENTER: i32 = BOARD_SIZE / 2; // 9
const CELLS: usize = (BOARD_SIZE * BOARD_SIZE) as usize;
const NO_INDEX: u16 = u16::MAX;

/// 8-connected capture directions, in a fixed order matched by
/// `MoveInfo::capture_mask`'s 2-bit-per-direction layout.
const DIRECTIONS8: [(i32, i32); 8] =
    [(0, 1), (1, 0), (1, 1), (-1, 1), (0, -1), (-1, 0), (-1, -1), (1, -1)];

/// Five-in-a-row is checked along these 4 line directions through the last move.
const LINE_DIRECTIONS4: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Hash)]
pub enum Player {
    Black,
    White,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }
}

/// A history entry recording everything needed to undo a move in O(1):
/// the move itself, who made it, which stones it captured (and in which
/// directions, as a 2-bit-per-direction mask per spec's data model), and
/// the exact diff applied to the legal-move set.
#[derive(Clone, Debug)]
pub struct MoveInfo {
    pub mv: Move,
    pub player: Player,
    /// 8 directions x 2 bits: 00 none, 01 pair capture, 10 triplet capture.
    pub capture_mask: u16,
    pub total_captured: u8,
    captured_cells: Vec<Move>,
    added_legal: Vec<Move>,
    /// Set when the opening dilation window closed on this move, in which
    /// case the legal-move set was rebuilt from scratch rather than
    /// diffed; undo mirrors that with another full rebuild.
    full_recompute: bool,
}

/// Two bitboards, capture counters, move history, and the incrementally
/// maintained legal-move set for one Pente-family game.
#[derive(Clone, Debug)]
pub struct GameState {
    black: Bitboard,
    white: Bitboard,
    side_to_move: Player,
    black_captures: u32,
    white_captures: u32,
    move_history: Vec<MoveInfo>,
    legal_cells: Vec<Move>,
    position_index: Box<[u16; CELLS]>,
    config: GameConfig,
}

impl GameState {
    pub fn new(config: GameConfig) -> GameState {
        let mut state = GameState {
            black: Bitboard::EMPTY,
            white: Bitboard::EMPTY,
            side_to_move: Player::Black,
            black_captures: 0,
            white_captures: 0,
            move_history: Vec::with_capacity(128),
            legal_cells: Vec::new(),
            position_index: Box::new([NO_INDEX; CELLS]),
            config,
        };
        state.reset();
        state
    }

    pub fn reset(&mut self) {
        self.black = Bitboard::EMPTY;
        self.white = Bitboard::EMPTY;
        self.side_to_move = Player::Black;
        self.black_captures = 0;
        self.white_captures = 0;
        self.move_history.clear();
        self.legal_cells.clear();
        self.position_index.fill(NO_INDEX);
        self.insert_legal(Move::new(CENTER, CENTER));
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn current_player(&self) -> Player {
        self.side_to_move
    }

    pub fn move_count(&self) -> usize {
        self.move_history.len()
    }

    pub fn captures(&self, player: Player) -> u32 {
        match player {
            Player::Black => self.black_captures,
            Player::White => self.white_captures,
        }
    }

    pub fn board(&self, player: Player) -> &Bitboard {
        match player {
            Player::Black => &self.black,
            Player::White => &self.white,
        }
    }

    fn board_mut(&mut self, player: Player) -> &mut Bitboard {
        match player {
            Player::Black => &mut self.black,
            Player::White => &mut self.white,
        }
    }

    pub fn stone_at(&self, x: i32, y: i32) -> Option<Player> {
        if self.black.test(x, y) {
            Some(Player::Black)
        } else if self.white.test(x, y) {
            Some(Player::White)
        } else {
            None
        }
    }

    pub fn last_move(&self) -> Option<Move> {
        self.move_history.last().map(|m| m.mv)
    }

    pub fn history(&self) -> &[MoveInfo] {
        &self.move_history
    }

    // ------------------------------------------------------------------
    // Legal moves
    // ------------------------------------------------------------------

    fn radius_for_ply(&self, ply: usize) -> i32 {
        if (ply as u32) < self.config.opening_plies {
            self.config.opening_dilation_distance
        } else {
            self.config.dilation_distance
        }
    }

    fn dilate_by(board: &Bitboard, radius: i32) -> Bitboard {
        match radius {
            1 => board.dilate1(),
            _ => board.dilate2(),
        }
    }

    fn raw_contains(&self, x: i32, y: i32) -> bool {
        if !in_bounds(x, y) {
            return false;
        }
        self.position_index[cell_index(x, y)] != NO_INDEX
    }

    /// Insert a cell into the incremental set. O(1); no-op if already present.
    fn insert_legal(&mut self, mv: Move) -> bool {
        let idx = cell_index(mv.x(), mv.y());
        if self.position_index[idx] != NO_INDEX {
            return false;
        }
        self.legal_cells.push(mv);
        self.position_index[idx] = (self.legal_cells.len() - 1) as u16;
        true
    }

    /// Remove a cell from the incremental set via swap-remove. O(1); no-op
    /// if absent.
    fn remove_legal(&mut self, mv: Move) -> bool {
        let idx = cell_index(mv.x(), mv.y());
        let pos = self.position_index[idx];
        if pos == NO_INDEX {
            return false;
        }
        let pos = pos as usize;
        let last = self.legal_cells.len() - 1;
        if pos != last {
            let moved = self.legal_cells[last];
            self.legal_cells[pos] = moved;
            self.position_index[cell_index(moved.x(), moved.y())] = pos as u16;
        }
        self.legal_cells.pop();
        self.position_index[idx] = NO_INDEX;
        true
    }

    fn recompute_legal_from_scratch(&mut self) {
        self.legal_cells.clear();
        self.position_index.fill(NO_INDEX);
        if self.move_history.is_empty() {
            self.insert_legal(Move::new(CENTER, CENTER));
            return;
        }
        let occupied = self.black.union(&self.white);
        let radius = self.radius_for_ply(self.move_history.len());
        let candidates = Self::dilate_by(&occupied, radius).intersect(&occupied.complement());
        for (x, y) in candidates.iter_set() {
            self.insert_legal(Move::new(x, y));
        }
    }

    fn add_frontier_around(&mut self, x: i32, y: i32, radius: i32, added: &mut Vec<Move>) {
        let mut bit = Bitboard::EMPTY;
        bit.set(x, y);
        let occupied = self.black.union(&self.white);
        let neighborhood = Self::dilate_by(&bit, radius).intersect(&occupied.complement());
        for (nx, ny) in neighborhood.iter_set() {
            if self.insert_legal(Move::new(nx, ny)) {
                added.push(Move::new(nx, ny));
            }
        }
    }

    fn tournament_ply_is_active(&self) -> bool {
        self.config.tournament_rule && self.move_history.len() == 2
    }

    fn is_excluded_by_tournament_rule(x: i32, y: i32) -> bool {
        let dist = (x - CENTER).abs().max((y - CENTER).abs());
        dist < 3
    }

    /// The legal moves for the side to move, applying the tournament-rule
    /// exclusion (and its preset fallback) when this is the restricted ply.
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.tournament_ply_is_active() {
            let filtered: Vec<Move> = self
                .legal_cells
                .iter()
                .copied()
                .filter(|m| !Self::is_excluded_by_tournament_rule(m.x(), m.y()))
                .collect();
            if !filtered.is_empty() {
                return filtered;
            }
            return TOURNAMENT_PRESET_RING
                .iter()
                .map(|&(x, y)| Move::new(x, y))
                .filter(|m| self.stone_at(m.x(), m.y()).is_none())
                .collect();
        }
        self.legal_cells.clone()
    }

    pub fn is_legal(&self, x: i32, y: i32) -> bool {
        if !in_bounds(x, y) || self.stone_at(x, y).is_some() {
            return false;
        }
        if self.tournament_ply_is_active() {
            if Self::is_excluded_by_tournament_rule(x, y) {
                return false;
            }
            let any_non_excluded = self
                .legal_cells
                .iter()
                .any(|m| !Self::is_excluded_by_tournament_rule(m.x(), m.y()));
            if !any_non_excluded {
                return TOURNAMENT_PRESET_RING.contains(&(x, y));
            }
        }
        self.raw_contains(x, y)
    }

    pub fn is_terminal(&self) -> bool {
        self.winner().is_some() || self.legal_cells.is_empty()
    }

    // ------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------

    pub fn make_move(&mut self, x: i32, y: i32) -> Result<(), PenteError> {
        if !self.is_legal(x, y) {
            return Err(PenteError::IllegalMove(Move::new(x, y)));
        }

        let mover = self.side_to_move;
        let mv = Move::new(x, y);
        self.board_mut(mover).set(x, y);

        let (capture_mask, total_captured, captured_cells) =
            self.detect_and_apply_captures(x, y, mover);
        match mover {
            Player::Black => self.black_captures += total_captured as u32,
            Player::White => self.white_captures += total_captured as u32,
        }

        let old_radius = self.radius_for_ply(self.move_history.len());
        let new_radius = self.radius_for_ply(self.move_history.len() + 1);
        let full_recompute = old_radius != new_radius;

        let mut added_legal = Vec::new();
        if full_recompute {
            self.move_history.push(MoveInfo {
                mv,
                player: mover,
                capture_mask,
                total_captured,
                captured_cells,
                added_legal: Vec::new(),
                full_recompute: true,
            });
            self.recompute_legal_from_scratch();
        } else {
            self.remove_legal(mv);
            self.add_frontier_around(x, y, new_radius, &mut added_legal);
            for c in &captured_cells {
                self.add_frontier_around(c.x(), c.y(), new_radius, &mut added_legal);
            }
            self.move_history.push(MoveInfo {
                mv,
                player: mover,
                capture_mask,
                total_captured,
                captured_cells,
                added_legal,
                full_recompute: false,
            });
        }

        self.side_to_move = mover.opponent();
        Ok(())
    }

    pub fn undo_move(&mut self) {
        let Some(info) = self.move_history.pop() else {
            return;
        };

        self.board_mut(info.player).clear(info.mv.x(), info.mv.y());
        match info.player {
            Player::Black => self.black_captures -= info.total_captured as u32,
            Player::White => self.white_captures -= info.total_captured as u32,
        }

        let opp = info.player.opponent();
        for c in &info.captured_cells {
            self.board_mut(opp).set(c.x(), c.y());
        }

        self.side_to_move = info.player;

        if info.full_recompute {
            self.recompute_legal_from_scratch();
        } else {
            for m in &info.added_legal {
                self.remove_legal(*m);
            }
            self.insert_legal(info.mv);
        }
    }

    fn detect_and_apply_captures(
        &mut self,
        x: i32,
        y: i32,
        player: Player,
    ) -> (u16, u8, Vec<Move>) {
        if !self.config.captures_enabled() {
            return (0, 0, Vec::new());
        }

        let mine = *self.board(player);
        let opp_player = player.opponent();
        let mut opp = *self.board(opp_player);

        let mut mask = 0u16;
        let mut total = 0u8;
        let mut captured = Vec::new();

        for (i, &(dx, dy)) in DIRECTIONS8.iter().enumerate() {
            if self.config.capture_rule == CaptureRule::PairOrTriplet {
                let (x4, y4) = (x + 4 * dx, y + 4 * dy);
                if in_bounds(x4, y4)
                    && opp.test(x + dx, y + dy)
                    && opp.test(x + 2 * dx, y + 2 * dy)
                    && opp.test(x + 3 * dx, y + 3 * dy)
                    && mine.test(x4, y4)
                {
                    opp.clear(x + dx, y + dy);
                    opp.clear(x + 2 * dx, y + 2 * dy);
                    opp.clear(x + 3 * dx, y + 3 * dy);
                    captured.push(Move::new(x + dx, y + dy));
                    captured.push(Move::new(x + 2 * dx, y + 2 * dy));
                    captured.push(Move::new(x + 3 * dx, y + 3 * dy));
                    total += 3;
                    mask |= 0b10 << (i * 2);
                    continue;
                }
            }

            let (x3, y3) = (x + 3 * dx, y + 3 * dy);
            if in_bounds(x3, y3)
                && opp.test(x + dx, y + dy)
                && opp.test(x + 2 * dx, y + 2 * dy)
                && mine.test(x3, y3)
            {
                opp.clear(x + dx, y + dy);
                opp.clear(x + 2 * dx, y + 2 * dy);
                captured.push(Move::new(x + dx, y + dy));
                captured.push(Move::new(x + 2 * dx, y + 2 * dy));
                total += 2;
                mask |= 0b01 << (i * 2);
            }
        }

        *self.board_mut(opp_player) = opp;
        (mask, total, captured)
    }

    // ------------------------------------------------------------------
    // Win conditions
    // ------------------------------------------------------------------

    pub fn winner(&self) -> Option<Player> {
        if let Some(last) = self.move_history.last() {
            if self.check_five_in_row(last.mv, last.player) {
                return Some(last.player);
            }
        }
        if self.black_captures >= self.config.captures_to_win {
            return Some(Player::Black);
        }
        if self.white_captures >= self.config.captures_to_win {
            return Some(Player::White);
        }
        None
    }

    fn check_five_in_row(&self, mv: Move, player: Player) -> bool {
        let stones = self.board(player);
        for &(dx, dy) in &LINE_DIRECTIONS4 {
            let mut count = 1;
            count += count_consecutive(stones, mv.x(), mv.y(), dx, dy);
            count += count_consecutive(stones, mv.x(), mv.y(), -dx, -dy);
            if count >= 5 {
                return true;
            }
        }
        false
    }
}

fn count_consecutive(stones: &Bitboard, x: i32, y: i32, dx: i32, dy: i32) -> i32 {
    let mut count = 0;
    let mut nx = x + dx;
    let mut ny = y + dy;
    while stones.test(nx, ny) {
        count += 1;
        nx += dx;
        ny += dy;
    }
    count
}

#[inline]
fn in_bounds(x: i32, y: i32) -> bool {
    x >= 0 && x < BOARD_SIZE && y >= 0 && y < BOARD_SIZE
}

#[inline]
fn cell_index(x: i32, y: i32) -> usize {
    (y * BOARD_SIZE + x) as usize
}
