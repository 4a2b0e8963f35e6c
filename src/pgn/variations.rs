//! Flattens movetext with nested variations into independent branches.
//!
//! Every parenthesis opens a new line whose common prefix is taken from the
//! line being extended at that point. The open lines are kept on an explicit
//! stack, so nesting depth is bounded only by memory. Tokens are replayed on a
//! fresh [`shakmaty::Chess`] as each line grows; anything that does not parse
//! or is illegal in the line's position is skipped.

use super::lexer::{Token, TokenIterator};
use crate::branch::{Branch, BranchId, BranchSet};
use shakmaty::san::{San, SanPlus};
use shakmaty::Chess;
use std::collections::HashSet;
use tracing::debug;

/// Applies one SAN token to `pos`, returning the normalized SAN and the
/// resulting position.
pub(crate) fn normalize_san(pos: &Chess, token: &str) -> Option<(String, Chess)> {
    let token = token.trim_end_matches(|c| c == '+' || c == '#');
    let token = if token.starts_with('0') { token.replace('0', "O") } else { token.to_owned() };

    let san: San = token.parse().ok()?;
    let m = san.to_move(pos).ok()?;

    let mut next = pos.clone();
    let san = SanPlus::from_move_and_play_unchecked(&mut next, &m);
    Some((san.to_string(), next))
}

struct Line {
    prefix_len: usize,
    moves: Vec<String>,
    // positions[k] is the position after the first k moves
    positions: Vec<Chess>,
}

impl Line {
    fn new() -> Self {
        Line {
            prefix_len: 0,
            moves: Vec::new(),
            positions: vec![Chess::default()],
        }
    }

    fn fork(&self, ply: usize) -> Self {
        let ply = ply.min(self.moves.len());
        Line {
            prefix_len: ply,
            moves: self.moves[..ply].to_vec(),
            positions: self.positions[..=ply].to_vec(),
        }
    }

    fn push(&mut self, token: &str) {
        let pos = match self.positions.last() {
            Some(pos) => pos,
            None => return,
        };

        match normalize_san(pos, token) {
            Some((san, next)) => {
                self.moves.push(san);
                self.positions.push(next);
            }
            None => debug!(token, ply = self.moves.len(), "skipping move that does not apply"),
        }
    }

    /// A line only counts if it adds something to the prefix it branched from.
    fn into_moves(self) -> Option<Vec<String>> {
        if !self.moves.is_empty() && self.moves.len() > self.prefix_len {
            Some(self.moves)
        } else {
            None
        }
    }
}

struct Frame {
    // order in which the opening parenthesis was met; 0 is the main line
    slot: usize,
    // None until the first token inside the parenthesis decides where the
    // variation branches off
    line: Option<Line>,
}

struct Parser {
    stack: Vec<Frame>,
    closed: Vec<(usize, Line)>,
    next_slot: usize,
}

impl Parser {
    fn new() -> Self {
        Parser {
            stack: vec![Frame { slot: 0, line: Some(Line::new()) }],
            closed: Vec::new(),
            next_slot: 1,
        }
    }

    /// Fixes the branching point of the innermost variation if it is still
    /// open. `ply` comes from a leading move number; without one the
    /// variation replaces the last move of the enclosing line.
    fn anchor(&mut self, ply: Option<usize>) {
        if let [.., parent, top] = &mut self.stack[..] {
            if top.line.is_none() {
                top.line = parent.line.as_ref().map(|parent| {
                    let ply = ply.unwrap_or_else(|| parent.moves.len().saturating_sub(1));
                    parent.fork(ply)
                });
            }
        }
    }

    fn top_line(&mut self) -> Option<&mut Line> {
        self.stack.last_mut().and_then(|frame| frame.line.as_mut())
    }

    fn feed(&mut self, token: Token) {
        match token {
            Token::Move(m) => {
                self.anchor(None);
                match std::str::from_utf8(m) {
                    Ok(m) => {
                        if let Some(line) = self.top_line() {
                            line.push(m);
                        }
                    }
                    Err(_) => debug!("skipping non utf-8 move token"),
                }
            }
            Token::MoveNumber { number, black } => {
                let ply = (number.max(1) as usize - 1)
                    .saturating_mul(2)
                    .saturating_add(black as usize);
                self.anchor(Some(ply));
            }
            Token::StartVariation => {
                self.anchor(None);
                self.stack.push(Frame { slot: self.next_slot, line: None });
                self.next_slot += 1;
            }
            Token::EndVariation => {
                if self.stack.len() > 1 {
                    self.close_top();
                } else {
                    debug!("ignoring unbalanced closing parenthesis");
                }
            }
            Token::NullMove(_) | Token::Unknown(_) => debug!(%token, "skipping token"),
            _ => {}
        }
    }

    fn close_top(&mut self) {
        if let Some(Frame { slot, line: Some(line) }) = self.stack.pop() {
            self.closed.push((slot, line));
        }
    }

    fn finish(mut self) -> BranchSet {
        while !self.stack.is_empty() {
            self.close_top();
        }

        self.closed.sort_by_key(|(slot, _)| *slot);

        let mut seen = HashSet::new();
        let mut discriminator = 0;
        let mut branches = Vec::new();
        for (slot, line) in self.closed {
            let moves = match line.into_moves() {
                Some(moves) => moves,
                None => continue,
            };
            if !seen.insert(moves.clone()) {
                debug!(slot, "dropping duplicate line");
                continue;
            }

            let id = if slot == 0 {
                BranchId::main()
            } else {
                discriminator += 1;
                BranchId::variation(discriminator)
            };
            branches.push(Branch::new(id, moves));
        }

        BranchSet::new(branches)
    }
}

/// Parses movetext (headers, comments and results allowed) into branches:
/// the main line first, then every variation in the order its opening
/// parenthesis appears.
pub fn parse(pgn: &str) -> BranchSet {
    let mut parser = Parser::new();
    for token in TokenIterator::new(pgn.as_bytes()) {
        parser.feed(token);
    }
    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::parse;
    use proptest::prelude::*;

    fn lines(pgn: &str) -> Vec<(String, Vec<String>)> {
        parse(pgn)
            .iter()
            .map(|branch| (branch.id.to_string(), branch.moves.clone()))
            .collect()
    }

    fn branch(id: &str, moves: &[&str]) -> (String, Vec<String>) {
        (id.to_owned(), moves.iter().map(|m| m.to_string()).collect())
    }

    #[test]
    fn main_line_only() {
        assert_eq!(
            lines("[Event \"?\"]\n\n1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0"),
            [branch("main", &["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"])]
        );
    }

    #[test]
    fn long_and_malformed_headers_are_skipped() {
        let pgn = format!(
            "[Annotator \"{} e4 notes\"]\n[Event \"bad \\q Nf3\"]\n\n1. d4 d5",
            "x".repeat(260)
        );
        assert_eq!(lines(&pgn), [branch("main", &["d4", "d5"])]);
    }

    #[test]
    fn huge_move_numbers_clamp() {
        assert_eq!(
            lines("1. e4 e5 (4294967295... c5) 2. Nf3"),
            [branch("main", &["e4", "e5", "Nf3"])]
        );
    }

    #[test]
    fn restated_variation() {
        assert_eq!(
            lines("1. e4 e5 (1. e4 c5 2. Nf3) 2. Nf3"),
            [branch("main", &["e4", "e5", "Nf3"]), branch("var_1", &["e4", "c5", "Nf3"])]
        );
    }

    #[test]
    fn standard_variation_replaces_last_move() {
        assert_eq!(
            lines("1. e4 e5 (1... c5 2. Nf3) 2. Nf3 Nc6 (Nf6)"),
            [
                branch("main", &["e4", "e5", "Nf3", "Nc6"]),
                branch("var_1", &["e4", "c5", "Nf3"]),
                branch("var_2", &["e4", "e5", "Nf3", "Nf6"]),
            ]
        );
    }

    #[test]
    fn nested_variations() {
        let pgn = "1. e4 e5 (1... c5 2. Nf3 (2. Nc3 Nc6 (2... d6 3. f4)) d6) 2. Nf3 *";
        assert_eq!(
            lines(pgn),
            [
                branch("main", &["e4", "e5", "Nf3"]),
                branch("var_1", &["e4", "c5", "Nf3", "d6"]),
                branch("var_2", &["e4", "c5", "Nc3", "Nc6"]),
                branch("var_3", &["e4", "c5", "Nc3", "d6", "f4"]),
            ]
        );
    }

    #[test]
    fn sibling_variations_at_same_point() {
        assert_eq!(
            lines("1. e4 (1. d4 d5) (1. c4) e5"),
            [
                branch("main", &["e4", "e5"]),
                branch("var_1", &["d4", "d5"]),
                branch("var_2", &["c4"]),
            ]
        );
    }

    #[test]
    fn check_suffixes_are_normalized() {
        assert_eq!(
            lines("1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7 {mate} 1-0"),
            [branch("main", &["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"])]
        );
        assert_eq!(lines("1. e4 d5 2. Bb5 c6")[0].1[2], "Bb5+");
    }

    #[test]
    fn invalid_tokens_are_skipped() {
        assert_eq!(lines("1. e4 Ke3 e5 2. xyz Nf3"), [branch("main", &["e4", "e5", "Nf3"])]);
    }

    #[test]
    fn variations_adding_nothing_are_dropped() {
        // the variation's only move is illegal, so it never extends its prefix
        assert_eq!(lines("1. e4 e5 (1... Ke7) 2. Nf3"), [branch("main", &["e4", "e5", "Nf3"])]);
        assert_eq!(lines("1. e4 () e5"), [branch("main", &["e4", "e5"])]);
    }

    #[test]
    fn duplicate_lines_are_dropped() {
        assert_eq!(
            lines("1. e4 e5 (1... e5) (1... c5) (1... c5)"),
            [branch("main", &["e4", "e5"]), branch("var_1", &["e4", "c5"])]
        );
    }

    #[test]
    fn empty_inputs() {
        assert!(parse("").is_empty());
        assert!(parse("   \n ").is_empty());
        assert!(parse("[Result \"*\"] *").is_empty());
        assert!(parse("1-0").is_empty());
    }

    #[test]
    fn unbalanced_parentheses_do_not_panic() {
        assert_eq!(lines("1. e4 ) e5"), [branch("main", &["e4", "e5"])]);
        assert_eq!(
            lines("1. e4 e5 (1... c5 2. Nf3"),
            [branch("main", &["e4", "e5"]), branch("var_1", &["e4", "c5", "Nf3"])]
        );
    }

    #[test]
    fn castling_in_both_spellings() {
        let pgn = "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O (4. 0-0)";
        let parsed = lines(pgn);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1.last().map(String::as_str), Some("O-O"));
    }

    proptest! {
        #[test]
        fn parsing_is_deterministic(pick in proptest::collection::vec(0usize..6, 0..12)) {
            let pieces = ["1. e4", "e5", "(1... c5 2. Nf3)", "2. Nf3", "(2. Nc3 Nf6)", "{note}"];
            let pgn: Vec<&str> = pick.iter().map(|&i| pieces[i]).collect();
            let pgn = pgn.join(" ");
            prop_assert_eq!(parse(&pgn), parse(&pgn));
        }

        #[test]
        fn branches_extend_and_stay_nonempty(groups in 0usize..5) {
            let mut pgn = String::from("1. e4 e5 2. Nf3 Nc6");
            let alternatives = ["Nf6", "d6", "f5", "Bc5", "g6"];
            for alt in alternatives.iter().take(groups) {
                pgn.push_str(&format!(" (2... {})", alt));
            }
            let set = parse(&pgn);
            prop_assert_eq!(set.len(), groups + 1);
            for branch in set.iter() {
                prop_assert!(!branch.moves.is_empty());
            }
            for branch in set.iter().skip(1) {
                prop_assert_eq!(branch.moves.len(), 4);
            }
        }
    }
}
