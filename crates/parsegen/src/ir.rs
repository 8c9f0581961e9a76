//! The lowered grammar shared by the factoring and automaton passes.
//!
//! By the time an [`IrGrammar`] exists, every surface construct has been
//! compiled away: names are interned to numeric identifiers, parameterized
//! nonterminals are split into one plain nonterminal per reachable argument
//! combination, optionals are expanded, no user nonterminal derives the empty
//! string, and lookahead restrictions are canonical sets of allowed
//! terminals attached to individual symbol occurrences. Each production
//! already carries the [`ReduceKind`] the runtime will execute, so emitting
//! the table is a flat translation.

use crate::util::display_fn;
use parsegen_runtime::{
    table::{NtId, ProdId, ReduceKind, TermId},
    tree::ValueTemplate,
};
use std::{collections::BTreeSet, fmt};

/// A terminal symbol of the lowered grammar. Index 0 is always the
/// end-of-input marker.
#[derive(Debug, Clone)]
pub struct IrTerminal {
    pub name: String,
    pub variable: bool,
}

/// A nonterminal of the lowered grammar.
#[derive(Debug, Clone)]
pub struct IrNonterminal {
    /// Display name; monomorphized instances carry their argument values,
    /// e.g. `expr[+In]`.
    pub name: String,
    /// The surface name this instance was derived from. Used for tree tags.
    pub base: String,
    pub prods: Vec<ProdId>,
    /// Introduced by left factoring; reduces to these rebuild an in-flight
    /// production rather than finish a tree node.
    pub synthetic: bool,
    /// Augmentation nonterminal for a goal; its reductions accept.
    pub accept: bool,
}

/// A canonicalized lookahead restriction: the set of terminals the next
/// token may be. End-of-input is never a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Restriction {
    pub allowed: BTreeSet<TermId>,
}

impl Restriction {
    pub fn allows(&self, t: TermId) -> bool {
        self.allowed.contains(&t)
    }

    /// Conjunction of two restrictions at the same position.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            allowed: self.allowed.intersection(&other.allowed).copied().collect(),
        }
    }
}

/// Combine an optional restriction with a further one.
pub fn combine(
    base: Option<Restriction>,
    extra: Option<&Restriction>,
) -> Option<Restriction> {
    match (base, extra) {
        (Some(a), Some(b)) => Some(a.intersect(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymId {
    T(TermId),
    N(NtId),
}

/// One symbol occurrence on a right-hand side, with the lookahead
/// restriction (if any) that was written immediately before it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrSym {
    pub sym: SymId,
    pub restriction: Option<Restriction>,
}

/// A production of the lowered grammar.
#[derive(Debug, Clone)]
pub struct IrProd {
    pub lhs: NtId,
    pub syms: Vec<IrSym>,
    pub reduce: ReduceKind,
}

/// A goal registered by the grammar author, bound to its augmentation
/// nonterminal.
#[derive(Debug, Clone)]
pub struct IrGoal {
    pub name: String,
    pub accept_nt: NtId,
}

#[derive(Debug, Clone)]
pub struct IrGrammar {
    pub terminals: Vec<IrTerminal>,
    pub nonterminals: Vec<IrNonterminal>,
    pub prods: Vec<IrProd>,
    /// Trees for erased empty derivations, referenced by `Slot::Const`.
    pub templates: Vec<ValueTemplate>,
    pub goals: Vec<IrGoal>,
}

impl IrGrammar {
    pub fn terminal(&self, id: TermId) -> &IrTerminal {
        &self.terminals[id.index()]
    }

    pub fn nonterminal(&self, id: NtId) -> &IrNonterminal {
        &self.nonterminals[id.index()]
    }

    pub fn prod(&self, id: ProdId) -> &IrProd {
        &self.prods[id.index()]
    }

    pub fn is_accept(&self, prod: ProdId) -> bool {
        self.nonterminal(self.prod(prod).lhs).accept
    }

    /// Append a production and register it with its left-hand side.
    pub fn add_prod(&mut self, lhs: NtId, syms: Vec<IrSym>, reduce: ReduceKind) -> ProdId {
        let id = ProdId::new(self.prods.len() as u32);
        self.prods.push(IrProd { lhs, syms, reduce });
        self.nonterminals[lhs.index()].prods.push(id);
        id
    }

    pub fn terminal_name(&self, id: TermId) -> &str {
        if id == TermId::EOI {
            "end of input"
        } else {
            &self.terminal(id).name
        }
    }

    pub fn sym_name(&self, sym: SymId) -> &str {
        match sym {
            SymId::T(t) => self.terminal_name(t),
            SymId::N(n) => &self.nonterminal(n).name,
        }
    }

    // `"LHS := R1 R2 R3"`
    pub fn display_prod(&self, id: ProdId) -> impl fmt::Display + '_ {
        display_fn(move |f| {
            let prod = self.prod(id);
            write!(f, "{} :=", self.nonterminal(prod.lhs).name)?;
            if prod.syms.is_empty() {
                write!(f, " <empty>")?;
            }
            for s in &prod.syms {
                if let Some(r) = &s.restriction {
                    write!(f, " [lookahead in {{")?;
                    for (i, t) in r.allowed.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.terminal_name(*t))?;
                    }
                    write!(f, "}}]")?;
                }
                write!(f, " {}", self.sym_name(s.sym))?;
            }
            Ok(())
        })
    }
}

impl fmt::Display for IrGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for (i, t) in self.terminals.iter().enumerate() {
            write!(f, "{}", self.terminal_name(TermId::new(i as u16)))?;
            if t.variable {
                write!(f, " (variable)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## nonterminals:")?;
        for (i, nt) in self.nonterminals.iter().enumerate() {
            write!(f, "{}", nt.name)?;
            if nt.synthetic {
                write!(f, " (synthetic)")?;
            }
            if let Some(goal) = self
                .goals
                .iter()
                .find(|g| g.accept_nt == NtId::new(i as u16))
            {
                write!(f, " (accepts {})", goal.name)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## rules:")?;
        for nt in &self.nonterminals {
            for prod in &nt.prods {
                writeln!(f, "{}", self.display_prod(*prod))?;
            }
        }

        Ok(())
    }
}
