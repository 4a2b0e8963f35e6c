//! The live game the learner plays on.
//!
//! A study session never inspects board geometry. It only applies and undoes
//! moves and reads the SAN history through [`MoveValidator`].

use crate::pgn::variations::normalize_san;
use serde::{Deserialize, Serialize};
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, Position, Role, Setup, Square};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    White,
    Black,
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Side::White),
            "black" | "b" => Ok(Side::Black),
            _ => Err(format!("unknown side `{}`, expected white or black", s)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Side::White => "white",
            Side::Black => "black",
        })
    }
}

/// A move as it arrives from the board: squares, or SAN typed by hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveInput {
    Squares {
        from: Square,
        to: Square,
        promotion: Option<Role>,
    },
    San(String),
}

impl MoveInput {
    pub fn squares(from: Square, to: Square) -> Self {
        MoveInput::Squares { from, to, promotion: None }
    }
}

impl FromStr for MoveInput {
    type Err = String;

    /// `e2e4` and `e7e8q` are read as squares, anything else as SAN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty move".to_owned());
        }

        if let Ok(Uci::Normal { from, to, promotion }) = s.parse::<Uci>() {
            return Ok(MoveInput::Squares { from, to, promotion });
        }
        Ok(MoveInput::San(s.to_owned()))
    }
}

/// Rules engine boundary.
pub trait MoveValidator {
    /// Plays the legal move from `from` to `to`, returning its SAN, or `None`
    /// when no such legal move exists. Promotions default to a queen.
    fn apply_move(&mut self, from: Square, to: Square, promotion: Option<Role>) -> Option<String>;

    /// Plays a move given in SAN, returning its normalized form.
    fn apply_san(&mut self, san: &str) -> Option<String>;

    /// Takes back the last move.
    fn undo(&mut self) -> Option<String>;

    fn history(&self) -> &[String];

    fn turn(&self) -> Side;

    fn is_game_over(&self) -> bool;

    /// Back to the starting position with an empty history.
    fn reset(&mut self);

    fn apply(&mut self, input: &MoveInput) -> Option<String> {
        match input {
            MoveInput::Squares { from, to, promotion } => self.apply_move(*from, *to, *promotion),
            MoveInput::San(san) => self.apply_san(san),
        }
    }
}

/// [`MoveValidator`] backed by shakmaty.
#[derive(Clone, Debug)]
pub struct ShakmatyGame {
    positions: Vec<Chess>,
    history: Vec<String>,
}

impl Default for ShakmatyGame {
    fn default() -> Self {
        ShakmatyGame {
            positions: vec![Chess::default()],
            history: Vec::new(),
        }
    }
}

impl ShakmatyGame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Chess {
        // never empty: reset and undo keep the starting position
        &self.positions[self.positions.len() - 1]
    }

    fn push(&mut self, san: String, pos: Chess) -> Option<String> {
        self.positions.push(pos);
        self.history.push(san.clone());
        Some(san)
    }
}

impl MoveValidator for ShakmatyGame {
    fn apply_move(&mut self, from: Square, to: Square, promotion: Option<Role>) -> Option<String> {
        let wanted = |promotion| Uci::Normal { from, to, promotion };
        let legals = self.position().legal_moves();

        let m = legals.into_iter().find(|m| {
            let promotion = m.promotion().and(promotion.or(Some(Role::Queen)));
            [CastlingMode::Standard, CastlingMode::Chess960]
                .iter()
                .any(|&mode| Uci::from_move(m, mode) == wanted(promotion))
        })?;

        let mut pos = self.position().clone();
        let san = shakmaty::san::SanPlus::from_move_and_play_unchecked(&mut pos, &m);
        self.push(san.to_string(), pos)
    }

    fn apply_san(&mut self, san: &str) -> Option<String> {
        let (san, pos) = normalize_san(self.position(), san)?;
        self.push(san, pos)
    }

    fn undo(&mut self) -> Option<String> {
        if self.positions.len() <= 1 {
            return None;
        }
        self.positions.pop();
        self.history.pop()
    }

    fn history(&self) -> &[String] {
        &self.history
    }

    fn turn(&self) -> Side {
        self.position().turn().into()
    }

    fn is_game_over(&self) -> bool {
        self.position().is_game_over()
    }

    fn reset(&mut self) {
        self.positions.truncate(1);
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &mut ShakmatyGame, moves: &[&str]) {
        for m in moves {
            let input: MoveInput = m.parse().unwrap();
            assert!(game.apply(&input).is_some(), "{} should be legal", m);
        }
    }

    #[test]
    fn squares_and_san_agree() {
        let mut game = ShakmatyGame::new();
        assert_eq!(game.apply_move(Square::E2, Square::E4, None).as_deref(), Some("e4"));
        assert_eq!(game.apply_san("e5").as_deref(), Some("e5"));
        assert_eq!(game.apply_move(Square::G1, Square::F3, None).as_deref(), Some("Nf3"));
        assert_eq!(game.history(), ["e4", "e5", "Nf3"]);
        assert_eq!(game.turn(), Side::Black);
    }

    #[test]
    fn illegal_moves_change_nothing() {
        let mut game = ShakmatyGame::new();
        assert!(game.apply_move(Square::E2, Square::E5, None).is_none());
        assert!(game.apply_san("Nf6").is_none());
        assert!(game.history().is_empty());
        assert_eq!(game.turn(), Side::White);
    }

    #[test]
    fn undo_and_reset() {
        let mut game = ShakmatyGame::new();
        play(&mut game, &["e2e4", "e7e5"]);
        assert_eq!(game.undo().as_deref(), Some("e5"));
        assert_eq!(game.history(), ["e4"]);
        game.reset();
        assert!(game.history().is_empty());
        assert!(game.undo().is_none());
    }

    #[test]
    fn castling_by_king_squares() {
        let mut game = ShakmatyGame::new();
        play(&mut game, &["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
        assert_eq!(game.apply_move(Square::E1, Square::G1, None).as_deref(), Some("O-O"));
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let mut game = ShakmatyGame::new();
        play(&mut game, &["h4", "g5", "hxg5", "h6", "gxh6", "Nc6", "h7", "e6"]);
        assert_eq!(game.apply_move(Square::H7, Square::G8, None).as_deref(), Some("hxg8=Q"));
        game.undo();
        assert_eq!(
            game.apply_move(Square::H7, Square::G8, Some(Role::Knight)).as_deref(),
            Some("hxg8=N")
        );
    }

    #[test]
    fn game_over_after_mate() {
        let mut game = ShakmatyGame::new();
        play(&mut game, &["f3", "e5", "g4", "Qh4#"]);
        assert!(game.is_game_over());
        assert_eq!(game.history().last().map(String::as_str), Some("Qh4#"));
    }

    #[test]
    fn parse_inputs() {
        assert_eq!("e2e4".parse(), Ok(MoveInput::squares(Square::E2, Square::E4)));
        assert_eq!(
            "e7e8q".parse(),
            Ok(MoveInput::Squares {
                from: Square::E7,
                to: Square::E8,
                promotion: Some(Role::Queen),
            })
        );
        assert_eq!("Nf3".parse(), Ok(MoveInput::San("Nf3".to_owned())));
        assert!("  ".parse::<MoveInput>().is_err());
        assert_eq!("Black".parse(), Ok(Side::Black));
        assert!("green".parse::<Side>().is_err());
    }
}
