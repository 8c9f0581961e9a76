//! The stack machine that executes a [`ParseTable`] against a token stream.
//!
//! The engine is a single iterative loop over a state stack and a value
//! stack; it never recurses, so arbitrarily deep grammars parse without
//! touching the host call stack. Tokens are peeked before they are consumed
//! so that reduce decisions and error messages always see the lookahead.

use crate::{
    table::{Action, Finisher, ParseTable, ProdId, ReduceKind, ReduceSpec, StateId, TermId},
    tree::ParseTree,
};
use rustc_hash::FxHashMap;

/// A token handed over by the external tokenizer.
///
/// `kind` names the terminal: the literal spelling for fixed tokens, the
/// category name (e.g. `IDENT`) for variable terminals.
pub trait Token {
    fn kind(&self) -> &str;

    fn line(&self) -> Option<u32> {
        None
    }
}

/// The parse-time error family.
///
/// Everything that can go wrong while consuming input is a `SyntaxError`;
/// tokenizers feeding the engine are expected to report their own failures
/// as [`SyntaxError::InvalidToken`] so callers see a single error kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("{}", unexpected_token(.expected, .found, .line))]
    UnexpectedToken {
        /// Sorted, deduplicated display names of the acceptable terminals.
        expected: Vec<String>,
        /// Display name of the terminal actually seen.
        found: String,
        line: Option<u32>,
    },

    #[error("unexpected end of input")]
    UnexpectedEnd { expected: Vec<String> },

    #[error("{}", invalid_token(.text, .line))]
    InvalidToken { text: String, line: Option<u32> },

    #[error("unknown goal symbol `{0}`")]
    UnknownGoal(String),

    /// A table invariant was violated; indicates a corrupted or mismatched
    /// table, never a malformed input.
    #[error("parser internal error: {0}")]
    Internal(&'static str),
}

fn unexpected_token(expected: &[String], found: &str, line: &Option<u32>) -> String {
    let mut msg = match expected {
        [single] => format!("expected '{}', got '{}'", single, found),
        _ => {
            let choices = expected
                .iter()
                .map(|name| format!("'{}'", name))
                .collect::<Vec<_>>()
                .join(", ");
            format!("expected one of [{}], got '{}'", choices, found)
        }
    };
    if let Some(line) = line {
        msg.push_str(&format!(" (line {})", line));
    }
    msg
}

fn invalid_token(text: &str, line: &Option<u32>) -> String {
    let mut msg = format!("invalid token '{}'", text);
    if let Some(line) = line {
        msg.push_str(&format!(" (line {})", line));
    }
    msg
}

/// Parse a complete token stream as `goal`.
///
/// Convenience wrapper around [`Parser`].
pub fn parse<T, I>(table: &ParseTable, goal: &str, tokens: I) -> Result<ParseTree<T>, SyntaxError>
where
    T: Token,
    I: IntoIterator<Item = Result<T, SyntaxError>>,
{
    Parser::new(table, goal)?.run(tokens)
}

// A value on the parse stack. `Partial` only ever appears under synthetic
// left-factoring nonterminals and never escapes an accepted parse.
enum Value<T> {
    Tree(ParseTree<T>),
    Partial(Partial<T>),
}

struct Partial<T> {
    // the `Seed` production whose layout/finisher completes this node
    seed: ProdId,
    vals: Vec<ParseTree<T>>,
}

/// One in-progress parse. All mutable state (the stacks, the lookahead) is
/// private to the instance, so any number of parses may share one table.
pub struct Parser<'t, T> {
    table: &'t ParseTable,
    kinds: FxHashMap<&'t str, TermId>,
    states: Vec<StateId>,
    values: Vec<Value<T>>,
}

impl<'t, T: Token> Parser<'t, T> {
    pub fn new(table: &'t ParseTable, goal: &str) -> Result<Self, SyntaxError> {
        let entry = table
            .entry_state(goal)
            .ok_or_else(|| SyntaxError::UnknownGoal(goal.to_owned()))?;
        let kinds = table
            .terminals
            .iter()
            .enumerate()
            .skip(TermId::EOI.index() + 1)
            .map(|(i, meta)| (meta.name.as_str(), TermId::new(i as u16)))
            .collect();
        Ok(Self {
            table,
            kinds,
            states: vec![entry],
            values: Vec::new(),
        })
    }

    /// Drive the automaton over `tokens` until the goal is accepted or the
    /// first error is hit.
    pub fn run<I>(mut self, tokens: I) -> Result<ParseTree<T>, SyntaxError>
    where
        I: IntoIterator<Item = Result<T, SyntaxError>>,
    {
        let mut tokens = tokens.into_iter();
        let mut peeked: Option<T> = None;
        let mut at_end = false;

        loop {
            let state = *self
                .states
                .last()
                .ok_or(SyntaxError::Internal("state stack underflow"))?;

            if peeked.is_none() && !at_end {
                match tokens.next() {
                    Some(token) => peeked = Some(token?),
                    None => at_end = true,
                }
            }

            let lookahead = match &peeked {
                None => TermId::EOI,
                Some(token) => match self.kinds.get(token.kind()) {
                    Some(id) => *id,
                    None => return Err(self.unexpected(state, &peeked)),
                },
            };

            match self.table.action(state, lookahead) {
                None => return Err(self.unexpected(state, &peeked)),

                Some(Action::Shift(next)) => {
                    let token = peeked
                        .take()
                        .ok_or(SyntaxError::Internal("shift without a token"))?;
                    self.values.push(Value::Tree(ParseTree::Leaf(token)));
                    self.states.push(next);
                }

                Some(Action::Reduce(prod)) => {
                    let value = self.reduce(prod)?;
                    self.values.push(value);
                    let spec = self.spec(prod)?;
                    let top = *self
                        .states
                        .last()
                        .ok_or(SyntaxError::Internal("state stack underflow"))?;
                    let next = self
                        .table
                        .goto(top, spec.lhs)
                        .ok_or(SyntaxError::Internal("missing goto entry"))?;
                    self.states.push(next);
                }

                Some(Action::Accept(prod)) => {
                    return match self.reduce(prod)? {
                        Value::Tree(tree) => Ok(tree),
                        Value::Partial(..) => {
                            Err(SyntaxError::Internal("accepted an incomplete value"))
                        }
                    };
                }
            }
        }
    }

    fn unexpected(&self, state: StateId, peeked: &Option<T>) -> SyntaxError {
        let expected = self.table.expected_terminals(state);
        match peeked {
            None => SyntaxError::UnexpectedEnd { expected },
            Some(token) => SyntaxError::UnexpectedToken {
                expected,
                found: token.kind().to_owned(),
                line: token.line(),
            },
        }
    }

    fn spec(&self, prod: ProdId) -> Result<&'t ReduceSpec, SyntaxError> {
        self.table
            .reduces
            .get(prod.index())
            .ok_or(SyntaxError::Internal("production id out of range"))
    }

    // Pop the production's stack entries and build its value.
    fn reduce(&mut self, prod: ProdId) -> Result<Value<T>, SyntaxError> {
        let spec = self.spec(prod)?;
        let pops = spec.pops as usize;
        if self.states.len() < pops || self.values.len() < pops {
            return Err(SyntaxError::Internal("reduce underflow"));
        }
        self.states.truncate(self.states.len() - pops);
        let popped = self.values.split_off(self.values.len() - pops);

        match &spec.kind {
            ReduceKind::Finish { layout, finish } => {
                let vals = into_trees(popped)?;
                Ok(Value::Tree(self.build(layout, finish, vals)?))
            }
            ReduceKind::Seed { .. } => Ok(Value::Partial(Partial {
                seed: prod,
                vals: into_trees(popped)?,
            })),
            ReduceKind::Extend => {
                let (partial, mut vals) = split_partial(popped)?;
                vals.extend(partial.vals);
                Ok(Value::Partial(Partial {
                    seed: partial.seed,
                    vals,
                }))
            }
            ReduceKind::Complete => {
                let (partial, mut vals) = split_partial(popped)?;
                vals.extend(partial.vals);
                match &self.spec(partial.seed)?.kind {
                    ReduceKind::Seed { layout, finish } => {
                        Ok(Value::Tree(self.build(layout, finish, vals)?))
                    }
                    _ => Err(SyntaxError::Internal("partial value without a seed")),
                }
            }
        }
    }

    // Fill the original production's slot layout with the popped values and
    // apply the finisher.
    fn build(
        &self,
        layout: &[crate::table::Slot],
        finish: &Finisher,
        vals: Vec<ParseTree<T>>,
    ) -> Result<ParseTree<T>, SyntaxError> {
        use crate::table::Slot;

        let mut pops = vals.into_iter();
        let mut children = Vec::with_capacity(layout.len());
        for slot in layout {
            children.push(match slot {
                Slot::Pop => pops
                    .next()
                    .ok_or(SyntaxError::Internal("slot layout underflow"))?,
                Slot::Absent => ParseTree::Absent,
                Slot::Const(pool) => self
                    .table
                    .templates
                    .get(*pool as usize)
                    .ok_or(SyntaxError::Internal("template index out of range"))?
                    .instantiate(),
            });
        }
        match finish {
            Finisher::Node(tag) => Ok(ParseTree::node(tag.clone(), children)),
            Finisher::First => children
                .into_iter()
                .next()
                .ok_or(SyntaxError::Internal("pass-through without a child")),
        }
    }
}

fn into_trees<T>(popped: Vec<Value<T>>) -> Result<Vec<ParseTree<T>>, SyntaxError> {
    popped
        .into_iter()
        .map(|value| match value {
            Value::Tree(tree) => Ok(tree),
            Value::Partial(..) => Err(SyntaxError::Internal("unexpected partial value")),
        })
        .collect()
}

fn split_partial<T>(mut popped: Vec<Value<T>>) -> Result<(Partial<T>, Vec<ParseTree<T>>), SyntaxError> {
    match popped.pop() {
        Some(Value::Partial(partial)) => Ok((partial, into_trees(popped)?)),
        _ => Err(SyntaxError::Internal("expected a partial value")),
    }
}

impl Token for String {
    fn kind(&self) -> &str {
        self
    }
}

impl<'a> Token for &'a str {
    fn kind(&self) -> &str {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_shareable_across_threads() {
        fn assert_sync_send<V: Sync + Send>() {}
        assert_sync_send::<ParseTable>();
    }

    #[test]
    fn error_message_formats() {
        let err = SyntaxError::UnexpectedToken {
            expected: vec!["(".into(), "NUM".into(), "VAR".into()],
            found: ")".into(),
            line: None,
        };
        assert_eq!(err.to_string(), "expected one of ['(', 'NUM', 'VAR'], got ')'");

        let err = SyntaxError::UnexpectedToken {
            expected: vec!["end of input".into()],
            found: "X".into(),
            line: Some(1),
        };
        assert_eq!(err.to_string(), "expected 'end of input', got 'X' (line 1)");

        let err = SyntaxError::UnexpectedEnd { expected: vec![] };
        assert_eq!(err.to_string(), "unexpected end of input");
    }
}
