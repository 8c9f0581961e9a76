//! The compiled parse-table data model.
//!
//! A [`ParseTable`] is produced by the `parsegen` compiler crate and consumed
//! by the [`engine`](crate::engine). It is plain read-only data: action and
//! goto rows per automaton state, one [`ReduceSpec`] per production telling
//! the engine how to rebuild the original tree shape, terminal metadata for
//! error messages, and one entry state per goal nonterminal. With the `serde`
//! feature enabled the whole table serializes, so grammars can be compiled
//! once and reloaded across process runs.

use crate::tree::{Tag, ValueTemplate};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TermId {
    raw: u16,
}

impl TermId {
    /// Reserved terminal meaning the end of input.
    pub const EOI: Self = Self::new(0);

    pub const fn new(raw: u16) -> Self {
        Self { raw }
    }

    pub const fn index(self) -> usize {
        self.raw as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NtId {
    raw: u16,
}

impl NtId {
    pub const fn new(raw: u16) -> Self {
        Self { raw }
    }

    pub const fn index(self) -> usize {
        self.raw as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct StateId {
    raw: u32,
}

impl StateId {
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub const fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ProdId {
    raw: u32,
}

impl ProdId {
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub const fn index(self) -> usize {
        self.raw as usize
    }
}

/// What the engine does in a state on a particular lookahead terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    Shift(StateId),
    Reduce(ProdId),
    /// Reduce the goal's accept production and stop; only ever emitted on
    /// the end-of-input terminal.
    Accept(ProdId),
}

/// Where one child value of a reduction comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Slot {
    /// The next value popped from the engine's stack.
    Pop,
    /// An optional symbol that was omitted.
    Absent,
    /// The constant value of a nonterminal that derived the empty string;
    /// indexes the table's template pool.
    Const(u32),
}

/// How a completed layout turns into a value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Finisher {
    /// Pass the sole child through unwrapped (single plain-symbol RHS with
    /// no named action).
    First,
    /// Wrap the children in a tagged node.
    Node(Tag),
}

/// How reducing one production builds its value.
///
/// `Seed`/`Extend`/`Complete` exist for productions introduced by
/// left-factoring: the tail of a factored alternative reduces to a partial
/// value carrying the original production's layout, intermediate synthetic
/// levels prepend their popped values, and the outermost replacement
/// production completes the original node, so factoring never changes the
/// shape of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReduceKind {
    Finish { layout: Vec<Slot>, finish: Finisher },
    Seed { layout: Vec<Slot>, finish: Finisher },
    Extend,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReduceSpec {
    /// Nonterminal consulted in the goto row after the reduction.
    pub lhs: NtId,
    /// How many stack entries the reduction consumes.
    pub pops: u16,
    pub kind: ReduceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TerminalMeta {
    /// Display name; the spelling for literal terminals, the category name
    /// for variable terminals, `end of input` for the reserved terminal.
    pub name: String,
    /// Recognized by pattern/category rather than literal spelling.
    pub variable: bool,
}

/// One automaton state: action and goto rows, sorted by id for binary search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    pub actions: Vec<(TermId, Action)>,
    pub gotos: Vec<(NtId, StateId)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseTable {
    pub states: Vec<State>,
    pub terminals: Vec<TerminalMeta>,
    pub reduces: Vec<ReduceSpec>,
    pub templates: Vec<ValueTemplate>,
    /// Goal nonterminal name, entry state.
    pub goals: Vec<(String, StateId)>,
}

impl ParseTable {
    pub fn action(&self, state: StateId, lookahead: TermId) -> Option<Action> {
        let row = &self.states.get(state.index())?.actions;
        let at = row.binary_search_by_key(&lookahead, |(t, _)| *t).ok()?;
        Some(row[at].1)
    }

    pub fn goto(&self, state: StateId, nonterminal: NtId) -> Option<StateId> {
        let row = &self.states.get(state.index())?.gotos;
        let at = row.binary_search_by_key(&nonterminal, |(n, _)| *n).ok()?;
        Some(row[at].1)
    }

    pub fn entry_state(&self, goal: &str) -> Option<StateId> {
        self.goals
            .iter()
            .find(|(name, _)| name == goal)
            .map(|(_, state)| *state)
    }

    pub fn goals(&self) -> impl Iterator<Item = &str> + '_ {
        self.goals.iter().map(|(name, _)| name.as_str())
    }

    pub fn terminal_name(&self, id: TermId) -> &str {
        self.terminals
            .get(id.index())
            .map(|meta| meta.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// The terminals on which `state` has any action, by display name,
    /// sorted and deduplicated. This is the "expected" set of error
    /// messages.
    pub fn expected_terminals(&self, state: StateId) -> Vec<String> {
        let mut names: Vec<String> = self
            .states
            .get(state.index())
            .map(|s| {
                s.actions
                    .iter()
                    .map(|(t, _)| self.terminal_name(*t).to_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }
}
