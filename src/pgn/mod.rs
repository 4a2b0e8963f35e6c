//! PGN movetext: tokenizer, variation flattening and the merged move tree.

pub mod lexer;
pub mod movetree;
pub mod tree;
pub mod variations;

pub use movetree::MoveTree;
pub use variations::parse;
