//! The compile-time error family.

/// Why a grammar could not be turned into a deterministic parse table.
///
/// Every variant is fatal; there is no default conflict resolution and no
/// warning level. Messages are deterministic across runs so grammar authors
/// and tests can match on them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("ambiguous grammar: nonterminal `{nonterminal}` can derive the empty string in more than one way")]
    AmbiguousEmpty { nonterminal: String },

    #[error("ambiguous grammar: two productions of `{nonterminal}` can match the same input")]
    IndistinguishableProductions { nonterminal: String },

    #[error(
        "shift-reduce conflict in state {state}: on token '{terminal}', can shift and can reduce ({production})"
    )]
    ShiftReduceConflict {
        state: u32,
        terminal: String,
        production: String,
    },

    #[error(
        "reduce-reduce conflict in state {state}: on token '{terminal}', can reduce ({first}) and ({second})"
    )]
    ReduceReduceConflict {
        state: u32,
        terminal: String,
        first: String,
        second: String,
    },

    #[error("invalid grammar: lookahead restriction at end of production (in `{nonterminal}`)")]
    TrailingLookahead { nonterminal: String },

    #[error("unknown goal nonterminal `{0}`")]
    UnknownGoal(String),

    #[error("goal nonterminal `{0}` must not be parameterized")]
    ParameterizedGoal(String),

    #[error("nonterminal `{0}` is parameterized and must be referenced through `apply`")]
    MissingApply(String),

    #[error("`apply` references unknown nonterminal `{0}`")]
    UnknownApplyTarget(String),

    #[error("nonterminal `{0}` takes no parameters")]
    ApplyToPlainNonterminal(String),

    #[error("`apply` to `{nonterminal}` does not match its parameter list [{params}]")]
    ParameterMismatch { nonterminal: String, params: String },

    #[error("parameter variable `{0}` is not bound in this context")]
    UnboundVar(String),

    #[error("lookahead restriction may only name terminals, found nonterminal `{0}`")]
    LookaheadOfNonterminal(String),

    #[error("`{0}` is declared both as a variable terminal and a nonterminal")]
    TerminalNonterminalClash(String),

    #[error("grammar has no nonterminals")]
    EmptyGrammar,

    /// The derivable-empty fixed point exceeded its iteration bound.
    /// Unreachable for any finite grammar.
    #[error("derivable-empty analysis did not converge")]
    EmptinessDivergence,
}
