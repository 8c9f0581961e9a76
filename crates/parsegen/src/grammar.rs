//! The surface grammar model.
//!
//! A [`Grammar`] is built through [`Grammar::define`] and describes
//! productions the way a grammar author writes them: symbols are referred to
//! by name, nonterminals may carry boolean parameters, right-hand sides may
//! contain optional elements and lookahead restrictions, and an alternative
//! may name a reduce action. Everything identifier-like here is a plain
//! string; the normalizer resolves names and assigns numeric identifiers.

use crate::{error::GrammarError, types::Map, util::display_fn};
use std::{collections::BTreeSet, fmt};

/// An argument passed to a parameterized nonterminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamArg {
    /// A concrete boolean value.
    Value(bool),
    /// The value of a parameter bound by the enclosing nonterminal.
    Var(String),
}

/// A reference to a grammar symbol on a right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolRef {
    /// A terminal or non-parameterized nonterminal, by name.
    Name(String),
    /// A parameterized nonterminal applied to arguments.
    Apply {
        name: String,
        args: Vec<(String, ParamArg)>,
    },
}

impl SymbolRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Apply { name, .. } => name,
        }
    }
}

/// One element of a right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elem {
    /// A required symbol occurrence.
    Symbol(SymbolRef),
    /// An omissible symbol occurrence. An omitted occurrence still takes a
    /// child slot in the produced tree.
    Optional(SymbolRef),
    /// A restriction on the next terminal. Occupies no child slot.
    Lookahead {
        set: BTreeSet<String>,
        positive: bool,
    },
}

/// Shorthand for a required symbol occurrence.
pub fn sym(name: &str) -> Elem {
    Elem::Symbol(SymbolRef::Name(name.to_owned()))
}

/// Shorthand for an omissible symbol occurrence.
pub fn opt(name: &str) -> Elem {
    Elem::Optional(SymbolRef::Name(name.to_owned()))
}

/// Shorthand for applying a parameterized nonterminal.
pub fn apply<'a, I>(name: &str, args: I) -> Elem
where
    I: IntoIterator<Item = (&'a str, ParamArg)>,
{
    Elem::Symbol(SymbolRef::Apply {
        name: name.to_owned(),
        args: args
            .into_iter()
            .map(|(param, arg)| (param.to_owned(), arg))
            .collect(),
    })
}

/// Shorthand for a lookahead restriction over the named terminals.
pub fn lookahead<'a, I>(set: I, positive: bool) -> Elem
where
    I: IntoIterator<Item = &'a str>,
{
    Elem::Lookahead {
        set: set.into_iter().map(str::to_owned).collect(),
        positive,
    }
}

/// One alternative of a nonterminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rhs {
    pub(crate) elems: Vec<Elem>,
    pub(crate) action: Option<String>,
    pub(crate) condition: Option<(String, bool)>,
}

impl Rhs {
    pub fn new<I>(elems: I) -> Self
    where
        I: IntoIterator<Item = Elem>,
    {
        Self {
            elems: elems.into_iter().collect(),
            action: None,
            condition: None,
        }
    }

    /// Tag the produced tree node with a method name instead of the default
    /// production tag.
    pub fn action(mut self, name: &str) -> Self {
        self.action = Some(name.to_owned());
        self
    }

    /// Restrict this alternative to instances where `param` has `value`.
    pub fn when(mut self, param: &str, value: bool) -> Self {
        self.condition = Some((param.to_owned(), value));
        self
    }

    pub fn elems(&self) -> &[Elem] {
        &self.elems[..]
    }
}

impl From<Vec<Elem>> for Rhs {
    fn from(elems: Vec<Elem>) -> Self {
        Self::new(elems)
    }
}

impl<const N: usize> From<[Elem; N]> for Rhs {
    fn from(elems: [Elem; N]) -> Self {
        Self::new(elems)
    }
}

impl fmt::Display for Rhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elems.is_empty() {
            f.write_str("<empty>")?;
        }
        for (i, elem) in self.elems.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match elem {
                Elem::Symbol(s) => write!(f, "{}", display_sym(s))?,
                Elem::Optional(s) => write!(f, "{}?", display_sym(s))?,
                Elem::Lookahead { set, positive } => {
                    write!(f, "[lookahead {} {{", if *positive { "in" } else { "not in" })?;
                    for (j, name) in set.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(name)?;
                    }
                    f.write_str("}]")?;
                }
            }
        }
        if let Some(action) = &self.action {
            write!(f, " => {}", action)?;
        }
        if let Some((param, value)) = &self.condition {
            write!(f, " (if {}{})", if *value { "+" } else { "~" }, param)?;
        }
        Ok(())
    }
}

fn display_sym(s: &SymbolRef) -> impl fmt::Display + '_ {
    display_fn(move |f| match s {
        SymbolRef::Name(name) => f.write_str(name),
        SymbolRef::Apply { name, args } => {
            write!(f, "{}[", name)?;
            for (i, (param, arg)) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match arg {
                    ParamArg::Value(true) => write!(f, "+{}", param)?,
                    ParamArg::Value(false) => write!(f, "~{}", param)?,
                    ParamArg::Var(var) => write!(f, "{}={}", param, var)?,
                }
            }
            f.write_str("]")
        }
    })
}

/// A nonterminal definition: its parameter list and its alternatives.
#[derive(Debug, Clone, Default)]
pub struct NonterminalDef {
    pub(crate) params: Vec<String>,
    pub(crate) alternatives: Vec<Rhs>,
}

impl NonterminalDef {
    pub fn params(&self) -> &[String] {
        &self.params[..]
    }

    pub fn alternatives(&self) -> &[Rhs] {
        &self.alternatives[..]
    }
}

/// The surface grammar as written by its author.
#[derive(Debug, Clone)]
pub struct Grammar {
    nonterminals: Map<String, NonterminalDef>,
    variable_terminals: Vec<String>,
    goals: Vec<String>,
}

impl Grammar {
    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut GrammarDef) -> Result<(), GrammarError>,
    {
        let mut def = GrammarDef {
            nonterminals: Map::default(),
            variable_terminals: Vec::new(),
            goals: Vec::new(),
        };
        f(&mut def)?;
        def.end()
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (&str, &NonterminalDef)> + '_ {
        self.nonterminals.iter().map(|(name, def)| (&**name, def))
    }

    pub fn nonterminal(&self, name: &str) -> Option<&NonterminalDef> {
        self.nonterminals.get(name)
    }

    pub fn is_nonterminal(&self, name: &str) -> bool {
        self.nonterminals.contains_key(name)
    }

    pub fn is_variable_terminal(&self, name: &str) -> bool {
        self.variable_terminals.iter().any(|t| t == name)
    }

    /// The goal nonterminals, in declaration order.
    pub fn goals(&self) -> &[String] {
        &self.goals[..]
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## goals:")?;
        for goal in &self.goals {
            writeln!(f, "{}", goal)?;
        }
        if !self.variable_terminals.is_empty() {
            writeln!(f, "\n## variable terminals:")?;
            for t in &self.variable_terminals {
                writeln!(f, "{}", t)?;
            }
        }
        writeln!(f, "\n## rules:")?;
        for (name, def) in &self.nonterminals {
            for rhs in &def.alternatives {
                write!(f, "{}", name)?;
                if !def.params.is_empty() {
                    write!(f, "[{}]", def.params.join(", "))?;
                }
                writeln!(f, " := {}", rhs)?;
            }
        }
        Ok(())
    }
}

/// The contextural values for building a `Grammar`.
#[derive(Debug)]
pub struct GrammarDef {
    nonterminals: Map<String, NonterminalDef>,
    variable_terminals: Vec<String>,
    goals: Vec<String>,
}

impl GrammarDef {
    /// Append an alternative to the named nonterminal, creating it on first
    /// mention.
    pub fn rule(&mut self, lhs: &str, rhs: impl Into<Rhs>) -> Result<(), GrammarError> {
        self.nonterminals
            .entry(lhs.to_owned())
            .or_default()
            .alternatives
            .push(rhs.into());
        Ok(())
    }

    /// Declare the parameter list of the named nonterminal.
    pub fn params<'a, I>(&mut self, nt: &str, params: I) -> Result<(), GrammarError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let def = self.nonterminals.entry(nt.to_owned()).or_default();
        def.params = params.into_iter().map(str::to_owned).collect();
        Ok(())
    }

    /// Register a goal nonterminal. May be called more than once; without any
    /// call, the first-declared nonterminal becomes the sole goal.
    pub fn goal(&mut self, name: &str) {
        self.goals.push(name.to_owned());
    }

    /// Declare a terminal whose matched text varies between occurrences, such
    /// as an identifier or a numeric literal.
    pub fn variable_terminal(&mut self, name: &str) {
        if !self.variable_terminals.iter().any(|t| t == name) {
            self.variable_terminals.push(name.to_owned());
        }
    }

    fn end(mut self) -> Result<Grammar, GrammarError> {
        if self.nonterminals.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }

        for t in &self.variable_terminals {
            if self.nonterminals.contains_key(t) {
                return Err(GrammarError::TerminalNonterminalClash(t.clone()));
            }
        }

        if self.goals.is_empty() {
            // `nonterminals` keeps declaration order.
            let first = self
                .nonterminals
                .keys()
                .next()
                .cloned()
                .ok_or(GrammarError::EmptyGrammar)?;
            self.goals.push(first);
        }
        for goal in &self.goals {
            let def = self
                .nonterminals
                .get(goal)
                .ok_or_else(|| GrammarError::UnknownGoal(goal.clone()))?;
            if !def.params.is_empty() {
                return Err(GrammarError::ParameterizedGoal(goal.clone()));
            }
        }

        Ok(Grammar {
            nonterminals: self.nonterminals,
            variable_terminals: self.variable_terminals,
            goals: self.goals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_goal_is_first_nonterminal() {
        let g = Grammar::define(|g| {
            g.rule("expr", [sym("term")])?;
            g.rule("term", [sym("NUM")])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(g.goals(), ["expr".to_owned()]);
    }

    #[test]
    fn goal_must_exist() {
        let err = Grammar::define(|g| {
            g.rule("expr", [sym("NUM")])?;
            g.goal("nope");
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownGoal(name) if name == "nope"));
    }

    #[test]
    fn goal_must_be_plain() {
        let err = Grammar::define(|g| {
            g.params("expr", ["In"])?;
            g.rule("expr", [sym("NUM")])?;
            g.goal("expr");
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::ParameterizedGoal(_)));
    }

    #[test]
    fn display_round_up() {
        let g = Grammar::define(|g| {
            g.rule("stmt", Rhs::new([sym("expr"), sym("SEMI")]).action("expr_stmt"))?;
            g.rule("stmt", [lookahead(["IF"], false), opt("expr")])?;
            Ok(())
        })
        .unwrap();
        let shown = g.to_string();
        assert!(shown.contains("stmt := expr SEMI => expr_stmt"));
        assert!(shown.contains("stmt := [lookahead not in {IF}] expr?"));
    }
}
