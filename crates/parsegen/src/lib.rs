//! A grammar compiler: context-free grammars in, runtime parse tables out.
//!
//! The pipeline is [`normalize`] (monomorphization, optional expansion,
//! epsilon elimination), [`factor`] (left factoring to a fixed point),
//! [`lr1`] (the automaton), and [`parse_table`] (emission). [`compile`] runs
//! all of it; the produced [`ParseTable`] is executed by the re-exported
//! `parsegen-runtime` crate.

pub mod error;
pub mod factor;
pub mod first_sets;
pub mod grammar;
pub mod ir;
pub mod lr1;
pub mod normalize;
pub mod parse_table;
pub mod types;
pub mod util;

pub use crate::{
    error::GrammarError,
    grammar::{apply, lookahead, opt, sym, Grammar, ParamArg, Rhs},
    lr1::Config,
};
pub use parsegen_runtime as runtime;
pub use parsegen_runtime::{
    engine::{parse, Parser, SyntaxError, Token},
    table::ParseTable,
    tree::{ParseTree, Tag},
};

/// Compile a grammar into a parse table with canonical LR(1) state
/// splitting.
pub fn compile(grammar: &Grammar) -> Result<ParseTable, GrammarError> {
    compile_with_config(grammar, &Config::new())
}

pub fn compile_with_config(
    grammar: &Grammar,
    config: &Config,
) -> Result<ParseTable, GrammarError> {
    let mut ir = normalize::normalize(grammar)?;
    factor::left_factor(&mut ir);
    let automaton = lr1::Automaton::generate_with_config(&ir, config)?;
    Ok(parse_table::emit(&ir, &automaton))
}
