//! Runtime support for tables produced by the `parsegen` grammar compiler.
//!
//! This crate knows nothing about grammars: it holds the serialized action
//! and goto tables ([`table::ParseTable`]), the parse-result tree type
//! ([`tree::ParseTree`]), and the stack machine that drives the tables
//! against a token stream ([`engine`]).

pub mod engine;
pub mod table;
pub mod tree;

pub use crate::{
    engine::{parse, Parser, SyntaxError, Token},
    table::ParseTable,
    tree::{ParseTree, Tag},
};
