//! Calculation of nullability and FIRST sets.

use crate::{
    ir::{IrGrammar, IrSym, SymId},
    types::Set,
};
use parsegen_runtime::table::{NtId, TermId};

#[derive(Debug)]
pub struct FirstSets {
    nullable: Vec<bool>,
    first: Vec<Set<TermId>>,
}

impl FirstSets {
    #[tracing::instrument(skip_all)]
    pub fn new(g: &IrGrammar) -> Self {
        let mut nullable = vec![false; g.nonterminals.len()];

        // Nullability by fixed point. Only synthetic and accept nonterminals
        // can carry empty productions at this stage.
        let mut changed = true;
        while changed {
            changed = false;
            for nt in &g.nonterminals {
                for &p in &nt.prods {
                    let prod = g.prod(p);
                    if nullable[prod.lhs.index()] {
                        continue;
                    }
                    let all_nullable = prod.syms.iter().all(|s| match s.sym {
                        SymId::T(..) => false,
                        SymId::N(n) => nullable[n.index()],
                    });
                    if all_nullable {
                        nullable[prod.lhs.index()] = true;
                        changed = true;
                    }
                }
            }
        }

        // FIRST sets by fixed point, restricted at occurrences that carry a
        // lookahead restriction.
        let mut first: Vec<Set<TermId>> = vec![Set::default(); g.nonterminals.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for nt in &g.nonterminals {
                for &p in &nt.prods {
                    let prod = g.prod(p);
                    for s in &prod.syms {
                        let before = first[prod.lhs.index()].len();
                        match s.sym {
                            SymId::T(t) => {
                                if s.restriction.as_ref().map_or(true, |r| r.allows(t)) {
                                    first[prod.lhs.index()].insert(t);
                                }
                            }
                            SymId::N(n) => {
                                let added: Vec<TermId> = first[n.index()]
                                    .iter()
                                    .copied()
                                    .filter(|t| {
                                        s.restriction.as_ref().map_or(true, |r| r.allows(*t))
                                    })
                                    .collect();
                                first[prod.lhs.index()].extend(added);
                            }
                        }
                        if first[prod.lhs.index()].len() != before {
                            changed = true;
                        }
                        let continues = matches!(s.sym, SymId::N(n) if nullable[n.index()]);
                        if !continues {
                            break;
                        }
                    }
                }
            }
        }

        tracing::trace!(
            nullable = nullable.iter().filter(|b| **b).count(),
            "first sets computed"
        );

        Self { nullable, first }
    }

    pub fn first(&self, nt: NtId) -> &Set<TermId> {
        &self.first[nt.index()]
    }

    /// FIRST of a suffix of a production body, falling back to the provided
    /// lookaheads when the whole suffix can derive empty.
    pub fn first_of<I>(&self, syms: &[IrSym], lookaheads: I) -> Set<TermId>
    where
        I: IntoIterator<Item = TermId>,
    {
        let mut res = Set::default();
        for s in syms {
            match s.sym {
                SymId::T(t) => {
                    if s.restriction.as_ref().map_or(true, |r| r.allows(t)) {
                        res.insert(t);
                    }
                }
                SymId::N(n) => {
                    res.extend(self.first(n).iter().copied().filter(|t| {
                        s.restriction.as_ref().map_or(true, |r| r.allows(*t))
                    }));
                }
            }
            let continues = matches!(s.sym, SymId::N(n) if self.nullable[n.index()]);
            if !continues {
                return res;
            }
        }
        res.extend(lookaheads);
        res
    }
}
