//! Game-record parsing: replays a transcript like
//! `"1. K10 L9 2. N10 M7"` against a [`GameState`].
//!
//! Tokens are whitespace-separated; every third token (position `% 3 ==
//! 0`, starting from 0) is a move number such as `"1."` and is skipped,
//! the other two are Black's and White's moves for that turn.

use crate::error::PenteError;
use crate::game_state::GameState;
use crate::mv::parse_move;

/// Parse and apply a game record to `state` in order. Stops and returns
/// an error on the first malformed token or illegal move; `state` is
/// left partially applied in that case, matching `make_move`'s
/// no-rollback-on-error contract at the individual-move level.
pub fn parse_game_record(state: &mut GameState, record: &str) -> Result<(), PenteError> {
    for (i, token) in record.split_whitespace().enumerate() {
        if i % 3 == 0 {
            continue; // move-number token, e.g. "1."
        }
        let mv = parse_move(token).ok_or_else(|| PenteError::MalformedRecord(token.to_string()))?;
        state.make_move(mv.x(), mv.y())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn parses_numbered_record() {
        let mut state = GameState::new(GameConfig::pente());
        parse_game_record(&mut state, "1. K10 L9 2. N10 M7").unwrap();
        assert_eq!(state.move_count(), 4);
    }

    #[test]
    fn matches_direct_move_sequence() {
        let mut recorded = GameState::new(GameConfig::pente());
        parse_game_record(&mut recorded, "1. K10 L9").unwrap();

        let mut direct = GameState::new(GameConfig::pente());
        direct.make_move(9, 9).unwrap();
        direct.make_move(10, 8).unwrap();

        assert_eq!(recorded.board(crate::game_state::Player::Black), direct.board(crate::game_state::Player::Black));
        assert_eq!(recorded.board(crate::game_state::Player::White), direct.board(crate::game_state::Player::White));
    }

    #[test]
    fn rejects_bad_token() {
        let mut state = GameState::new(GameConfig::pente());
        assert!(parse_game_record(&mut state, "1. K10 ZZ99").is_err());
    }
}
