// This file is part of the rust-pgn-tokenizer library.
//
// Copyright (C) 2017 Lakin Wecker <lakin@wecker.ca>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//------------------------------------------------------------------------------
// Movetext tokenizer
//------------------------------------------------------------------------------

use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_till, take_till1, take_while, take_while1, take_while_m_n},
    character::complete::digit1,
    combinator::{map, opt},
    error::{ErrorKind, ParseError},
    sequence::{pair, preceded, terminated, tuple},
    Err::Error,
    IResult,
};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Token<'a> {
    Move(&'a [u8]),
    NullMove(&'a [u8]),
    MoveNumber { number: u32, black: bool },
    EscapeComment(&'a [u8]),
    Nag(&'a [u8]),
    MoveAnnotation(&'a [u8]),
    Result(&'a [u8]),
    Commentary(&'a [u8]),
    LineComment(&'a [u8]),
    TagSymbol(&'a [u8]),
    TagString(&'a [u8]),
    StartVariation,
    EndVariation,
    /// Bytes that match no other token. The iterator skips past them.
    Unknown(&'a [u8]),
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = |x: &[u8]| String::from_utf8_lossy(x).into_owned();
        match *self {
            Token::Move(x) => write!(f, "Move({})", text(x)),
            Token::NullMove(x) => write!(f, "NullMove({})", text(x)),
            Token::MoveNumber { number, black } => {
                write!(f, "MoveNumber({}{})", number, if black { "..." } else { "." })
            }
            Token::EscapeComment(x) => write!(f, "EscapeComment({})", text(x)),
            Token::Nag(x) => write!(f, "NAG({})", text(x)),
            Token::MoveAnnotation(x) => write!(f, "MoveAnnotation({})", text(x)),
            Token::Result(x) => write!(f, "Result({})", text(x)),
            Token::Commentary(x) => write!(f, "Commentary({})", text(x)),
            Token::LineComment(x) => write!(f, "LineComment({})", text(x)),
            Token::TagSymbol(x) => write!(f, "TagSymbol({})", text(x)),
            Token::TagString(x) => write!(f, "TagString({})", text(x)),
            Token::StartVariation => write!(f, "StartVariation"),
            Token::EndVariation => write!(f, "EndVariation"),
            Token::Unknown(x) => write!(f, "Unknown({})", text(x)),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum PgnError<I> {
    SanPawnMoveInvalid,
    SanPieceMoveInvalid,
    SanCastlesInvalid,
    SanNullMoveInvalid,
    SanEmptyInput,
    SanInvalidCharacter,
    PgnStringInvalid,
    PgnStringInvalidEscapeSequence,
    PgnTagPairInvalid,
    Nom(I, ErrorKind),
}

impl<I> ParseError<I> for PgnError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        PgnError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

type LexResult<'a, O> = IResult<&'a [u8], O, PgnError<&'a [u8]>>;

pub fn is_capture(i: u8) -> bool { i == b'x' }
pub fn is_dash(i: u8) -> bool { i == b'-' }
pub fn is_digit(i: u8) -> bool { i.is_ascii_digit() }
pub fn is_equals(i: u8) -> bool { i == b'=' }
pub fn is_file(i: u8) -> bool { (b'a'..=b'h').contains(&i) }
pub fn is_letter(i: u8) -> bool { i.is_ascii_alphabetic() }
pub fn is_o(i: u8) -> bool { i == b'O' }
pub fn is_period(i: u8) -> bool { i == b'.' }
pub fn is_piece(i: u8) -> bool { matches!(i, b'R' | b'N' | b'B' | b'Q' | b'K') }
pub fn is_plus_or_hash(i: u8) -> bool { i == b'#' || i == b'+' }
pub fn is_rank(i: u8) -> bool { (b'1'..=b'8').contains(&i) }
pub fn is_space(i: u8) -> bool { i == b' ' }
pub fn is_whitespace(i: u8) -> bool { matches!(i, b' ' | b'\n' | b'\r' | b'\t') }
pub fn is_zero(i: u8) -> bool { i == b'0' }

/// Bytes that end an unrecognised run.
fn is_delimiter(i: u8) -> bool {
    is_whitespace(i) || matches!(i, b'(' | b')' | b'{' | b'[' | b';')
}

macro_rules! match_character {
    ($name:ident, $($matcher:ident),+) => {
        fn $name(incoming: &[u8]) -> Option<usize> {
            let mut i: usize = 0;
            $(
                {
                    if incoming.len() <= i || !$matcher(incoming[i]) {
                        return None
                    }
                    i += 1
                }
            )*
            Some(i)
        }
    };
}

match_character![check, is_plus_or_hash];
match_character![pawn_capture, is_capture, is_file, is_rank];
match_character![pawn_move, is_rank];
match_character![promotion, is_equals, is_piece];

fn optional_check(rest: &[u8], length: usize) -> usize {
    length + check(&rest[length..]).unwrap_or(0)
}

// e4 dxe4 e8=Q dxe8=Q
pub fn san_pawn_move(i: &[u8]) -> LexResult<Token> {
    let rest = &i[1..];
    let result = pawn_capture(rest)
        .or_else(|| pawn_move(rest))
        .map(|length| length + promotion(&rest[length..]).unwrap_or(0))
        .map(|length| optional_check(rest, length));
    match result {
        Some(length) => Ok((&i[length + 1..], Token::Move(&i[0..length + 1]))),
        None => Err(Error(PgnError::SanPawnMoveInvalid)),
    }
}

// Ng1xf3
match_character![piece_capture_with_rank_and_file, is_file, is_rank, is_capture, is_file, is_rank];
// N1xf3
match_character![piece_capture_with_rank, is_rank, is_capture, is_file, is_rank];
// Ngxf3
match_character![piece_capture_with_file, is_file, is_capture, is_file, is_rank];
// Nxf3
match_character![piece_capture, is_capture, is_file, is_rank];
// Ng1f3
match_character![piece_move_with_rank_and_file, is_file, is_rank, is_file, is_rank];
// N1f3
match_character![piece_move_with_rank, is_rank, is_file, is_rank];
// Ngf3
match_character![piece_move_with_file, is_file, is_file, is_rank];
// Nf3
match_character![piece_move, is_file, is_rank];

pub fn san_piece_move(i: &[u8]) -> LexResult<Token> {
    let rest = &i[1..];
    let result = piece_capture_with_rank_and_file(rest)
        .or_else(|| piece_capture_with_rank(rest))
        .or_else(|| piece_capture_with_file(rest))
        .or_else(|| piece_capture(rest))
        .or_else(|| piece_move_with_rank_and_file(rest))
        .or_else(|| piece_move_with_rank(rest))
        .or_else(|| piece_move_with_file(rest))
        .or_else(|| piece_move(rest))
        .map(|length| optional_check(rest, length));
    match result {
        Some(length) => Ok((&i[length + 1..], Token::Move(&i[0..length + 1]))),
        None => Err(Error(PgnError::SanPieceMoveInvalid)),
    }
}

match_character![king_side_castles, is_dash, is_o];
match_character![queen_side_castles, is_dash, is_o, is_dash, is_o];
match_character![king_side_castles_zero, is_dash, is_zero];
match_character![queen_side_castles_zero, is_dash, is_zero, is_dash, is_zero];

// O-O O-O-O 0-0 0-0-0
pub fn san_castles(i: &[u8]) -> LexResult<Token> {
    let rest = &i[1..];
    let result = if i[0] == b'O' {
        queen_side_castles(rest).or_else(|| king_side_castles(rest))
    } else {
        queen_side_castles_zero(rest).or_else(|| king_side_castles_zero(rest))
    };
    match result.map(|length| optional_check(rest, length)) {
        Some(length) => Ok((&i[length + 1..], Token::Move(&i[0..length + 1]))),
        None => Err(Error(PgnError::SanCastlesInvalid)),
    }
}

// Z0
match_character![null_move_z0, is_zero];
// --
match_character![null_move_dash_dash, is_dash];

pub fn san_null_move(i: &[u8]) -> LexResult<Token> {
    let rest = &i[1..];
    let result = null_move_dash_dash(rest)
        .or_else(|| null_move_z0(rest))
        .map(|length| optional_check(rest, length));
    match result {
        Some(length) => Ok((&i[length + 1..], Token::NullMove(&i[0..length + 1]))),
        None => Err(Error(PgnError::SanNullMoveInvalid)),
    }
}

pub fn san_move_token(i: &[u8]) -> LexResult<Token> {
    match i.first() {
        None => Err(Error(PgnError::SanEmptyInput)),
        Some(b'R' | b'N' | b'B' | b'Q' | b'K') => san_piece_move(i),
        Some(b'a'..=b'h') => san_pawn_move(i),
        Some(b'O' | b'0') => san_castles(i),
        Some(b'-' | b'Z') => san_null_move(i),
        Some(_) => Err(Error(PgnError::SanInvalidCharacter)),
    }
}

// Delimited by quote: ASCII 34
// \\ -> \
// \" -> "
//
// Results still include \" and \\
pub fn pgn_string(i: &[u8]) -> LexResult<&[u8]> {
    if i.first() != Some(&b'"') {
        return Err(Error(PgnError::PgnStringInvalid));
    }
    let mut prev = b'"';
    let mut length = 1;
    while length < i.len() {
        let mut cur = i[length];
        if cur == b'"' && prev != b'\\' {
            return Ok((&i[length + 1..], &i[1..length]));
        } else if prev == b'\\' && cur != b'\\' && cur != b'"' {
            return Err(Error(PgnError::PgnStringInvalidEscapeSequence));
        } else if prev == b'\\' && cur == b'\\' {
            // an escaped backslash does not escape the next byte
            cur = b' ';
        }
        prev = cur;
        length += 1;
    }
    Err(Error(PgnError::PgnStringInvalid))
}

pub fn pgn_escape_comment_token(i: &[u8]) -> LexResult<Token> {
    map(preceded(tag("%"), take_till(|c| c == b'\r' || c == b'\n')), Token::EscapeComment)(i)
}

pub fn pgn_line_comment_token(i: &[u8]) -> LexResult<Token> {
    map(preceded(tag(";"), take_till(|c| c == b'\r' || c == b'\n')), Token::LineComment)(i)
}

const MAX_MOVE_ANNOTATION_LENGTH: usize = 4;
pub fn pgn_move_annotation_token(i: &[u8]) -> LexResult<Token> {
    map(
        take_while_m_n(1, MAX_MOVE_ANNOTATION_LENGTH, |c| c == b'?' || c == b'!'),
        Token::MoveAnnotation,
    )(i)
}

pub fn pgn_nag_token(i: &[u8]) -> LexResult<Token> {
    map(preceded(tag("$"), digit1), Token::Nag)(i)
}

pub fn pgn_symbol(i: &[u8]) -> LexResult<&[u8]> {
    if !i.first().map_or(false, |&c| is_digit(c) || is_letter(c)) {
        return Err(Error(PgnError::Nom(i, ErrorKind::AlphaNumeric)));
    }
    take_while1(|c| {
        is_digit(c)
            || is_letter(c)
            || is_plus_or_hash(c)
            || is_equals(c)
            || matches!(c, b':' | b'_' | b'-')
    })(i)
}

pub fn pgn_game_result_token(i: &[u8]) -> LexResult<Token> {
    map(alt((tag("1/2-1/2"), tag("1-0"), tag("0-1"), tag("*"))), Token::Result)(i)
}

// Unterminated comments run to the end of the input.
pub fn pgn_commentary_token(i: &[u8]) -> LexResult<Token> {
    map(
        terminated(preceded(tag("{"), take_till(|c| c == b'}')), opt(tag("}"))),
        Token::Commentary,
    )(i)
}

pub fn remove_whitespace(i: &[u8]) -> &[u8] {
    let length = i.iter().take_while(|&&c| is_whitespace(c)).count();
    &i[length..]
}

pub fn pgn_tag_symbol_token(i: &[u8]) -> LexResult<Token> {
    map(preceded(pair(tag("["), take_while(is_whitespace)), pgn_symbol), Token::TagSymbol)(i)
}

/// Consumes the rest of a malformed tag pair through its closing `]`,
/// treating brackets inside a quoted string as text.
pub fn skip_tag_rest(i: &[u8]) -> (&[u8], &[u8]) {
    let mut quoted = false;
    let mut prev = 0u8;
    for (n, &c) in i.iter().enumerate() {
        match c {
            b'"' if prev != b'\\' => quoted = !quoted,
            b']' if !quoted => return (&i[n + 1..], &i[..n]),
            _ => {}
        }
        prev = if prev == b'\\' && c == b'\\' { b' ' } else { c };
    }
    (&i[i.len()..], i)
}

pub fn pgn_tag_string_token(i: &[u8]) -> LexResult<Token> {
    let (i, string) = pgn_string(i)?;
    let i = remove_whitespace(i);
    match i.first() {
        Some(b']') => Ok((&i[1..], Token::TagString(string))),
        _ => Err(Error(PgnError::PgnTagPairInvalid)),
    }
}

// 1. 12... 3 .
pub fn pgn_move_number(i: &[u8]) -> LexResult<Token> {
    let (rest, (digits, _, periods)) =
        tuple((digit1, take_while(is_space), take_while1(is_period)))(i)?;
    let number = std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(Error(PgnError::Nom(i, ErrorKind::Digit)))?;

    Ok((rest, Token::MoveNumber { number, black: periods.len() >= 2 }))
}

pub fn pgn_start_variation_token(i: &[u8]) -> LexResult<Token> {
    map(tag("("), |_| Token::StartVariation)(i)
}

pub fn pgn_end_variation_token(i: &[u8]) -> LexResult<Token> {
    map(tag(")"), |_| Token::EndVariation)(i)
}

pub fn pgn_unknown_token(i: &[u8]) -> LexResult<Token> {
    map(alt((take_till1(is_delimiter), take(1usize))), Token::Unknown)(i)
}

// A simple PGN token stream over a byte slice. Unlike a strict parser it never
// gives up: bytes it cannot classify come out as `Token::Unknown`.
pub struct TokenIterator<'a> {
    bytes: &'a [u8],
    // set after a tag symbol: whatever follows up to `]` belongs to the tag
    in_tag: bool,
}

impl<'a> TokenIterator<'a> {
    pub fn new(bytes: &'a [u8]) -> TokenIterator<'a> {
        TokenIterator { bytes, in_tag: false }
    }

    fn finish_tag(&mut self, i: &'a [u8]) -> Token<'a> {
        self.in_tag = false;
        match pgn_tag_string_token(i) {
            Ok((rest, token)) => {
                self.bytes = rest;
                token
            }
            Err(_) => {
                let (rest, skipped) = skip_tag_rest(i);
                self.bytes = rest;
                Token::Unknown(skipped)
            }
        }
    }
}

impl<'a> Iterator for TokenIterator<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let i = remove_whitespace(self.bytes);
        if i.is_empty() {
            self.bytes = i;
            return None;
        }
        if self.in_tag {
            return Some(self.finish_tag(i));
        }

        let result = alt((
            pgn_escape_comment_token,
            pgn_line_comment_token,
            pgn_game_result_token,
            pgn_move_number,
            pgn_tag_symbol_token,
            pgn_tag_string_token,
            pgn_start_variation_token,
            pgn_end_variation_token,
            pgn_commentary_token,
            pgn_nag_token,
            pgn_move_annotation_token,
            san_move_token,
            pgn_unknown_token,
        ))(i);

        match result {
            Ok((rest, token)) => {
                self.bytes = rest;
                self.in_tag = matches!(token, Token::TagSymbol(_));
                Some(token)
            }
            Err(_) => {
                self.bytes = &[];
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Token, TokenIterator};

    fn tokens(pgn: &str) -> Vec<Token> {
        TokenIterator::new(pgn.as_bytes()).collect()
    }

    #[test]
    fn moves_and_numbers() {
        assert_eq!(
            tokens("1. e4 e5 2.Nf3 Nc6 3... a6"),
            [
                Token::MoveNumber { number: 1, black: false },
                Token::Move(b"e4"),
                Token::Move(b"e5"),
                Token::MoveNumber { number: 2, black: false },
                Token::Move(b"Nf3"),
                Token::Move(b"Nc6"),
                Token::MoveNumber { number: 3, black: true },
                Token::Move(b"a6"),
            ]
        );
    }

    #[test]
    fn san_shapes() {
        assert_eq!(
            tokens("exd5 e8=Q+ Ngxe5 R1a3 Qh4xe1# O-O-O O-O 0-0"),
            [
                Token::Move(b"exd5"),
                Token::Move(b"e8=Q+"),
                Token::Move(b"Ngxe5"),
                Token::Move(b"R1a3"),
                Token::Move(b"Qh4xe1#"),
                Token::Move(b"O-O-O"),
                Token::Move(b"O-O"),
                Token::Move(b"0-0"),
            ]
        );
    }

    #[test]
    fn headers_comments_and_results() {
        let pgn = "[Event \"Casual \\\"game\\\"\"]\n[Site \"?\"]\n\n\
                   1. e4 {best by test} e5!? $1 ; trailing\n2. Nf3 1/2-1/2";
        assert_eq!(
            tokens(pgn),
            [
                Token::TagSymbol(b"Event"),
                Token::TagString(b"Casual \\\"game\\\""),
                Token::TagSymbol(b"Site"),
                Token::TagString(b"?"),
                Token::MoveNumber { number: 1, black: false },
                Token::Move(b"e4"),
                Token::Commentary(b"best by test"),
                Token::Move(b"e5"),
                Token::MoveAnnotation(b"!?"),
                Token::Nag(b"1"),
                Token::LineComment(b" trailing"),
                Token::MoveNumber { number: 2, black: false },
                Token::Move(b"Nf3"),
                Token::Result(b"1/2-1/2"),
            ]
        );
    }

    #[test]
    fn long_or_broken_tags_are_swallowed() {
        let long = format!("[Annotator \"{} e4\"] 1. d4", "x".repeat(300));
        let lexed = tokens(&long);
        assert_eq!(lexed[0], Token::TagSymbol(b"Annotator"));
        assert!(matches!(lexed[1], Token::TagString(s) if s.len() == 303));
        assert_eq!(lexed[2..], [Token::MoveNumber { number: 1, black: false }, Token::Move(b"d4")]);

        assert_eq!(
            tokens("[Event \"bad \\q escape e4 ]\"] e5"),
            [
                Token::TagSymbol(b"Event"),
                Token::Unknown(b"\"bad \\q escape e4 ]\""),
                Token::Move(b"e5"),
            ]
        );
        assert_eq!(
            tokens("[Site Nf3 e4] d4"),
            [Token::TagSymbol(b"Site"), Token::Unknown(b"Nf3 e4"), Token::Move(b"d4")]
        );
    }

    #[test]
    fn variations() {
        assert_eq!(
            tokens("e4 (d4) e5"),
            [
                Token::Move(b"e4"),
                Token::StartVariation,
                Token::Move(b"d4"),
                Token::EndVariation,
                Token::Move(b"e5"),
            ]
        );
    }

    #[test]
    fn garbage_is_skipped_not_fatal() {
        assert_eq!(
            tokens("e4 ??? zz9 } e5 {unterminated"),
            [
                Token::Move(b"e4"),
                Token::MoveAnnotation(b"???"),
                Token::Unknown(b"zz9"),
                Token::Unknown(b"}"),
                Token::Move(b"e5"),
                Token::Commentary(b"unterminated"),
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert!(tokens("").is_empty());
        assert!(tokens(" \n\t ").is_empty());
    }
}
