//! Left factoring.
//!
//! Whenever two alternatives of a nonterminal start with the same symbol
//! occurrence (same symbol, same lookahead restriction), their longest
//! common prefix is hoisted into a single replacement production and the
//! distinct tails move to a fresh synthetic nonterminal. Repeating this to a
//! fixed point leaves every nonterminal's alternatives pairwise
//! distinguishable by their first symbol, which is what lets many grammars
//! come out of the automaton without conflicts.
//!
//! Factoring must not change the shape of produced trees, so reduce kinds
//! are rewritten rather than copied:
//!
//! * a tail keeps the original production's layout as a `Seed`, producing a
//!   partial value holding the popped tail children;
//! * further factoring of a tail stays a `Seed` (the layout travels with the
//!   deepest tail) while synthetic middles become `Extend`, prepending their
//!   popped values to the partial;
//! * the replacement production `Complete`s the partial with the hoisted
//!   prefix values, or `Extend`s it when the replaced production was itself
//!   synthetic.

use crate::{
    ir::{IrGrammar, IrNonterminal, IrSym, SymId},
    types::Map,
};
use parsegen_runtime::table::{NtId, ProdId, ReduceKind};

#[tracing::instrument(skip_all)]
pub fn left_factor(ir: &mut IrGrammar) {
    let mut rounds = 0usize;
    loop {
        let mut changed = false;
        let mut at = 0;
        while at < ir.nonterminals.len() {
            let nt = NtId::new(at as u16);
            at += 1;
            if ir.nonterminal(nt).accept {
                continue;
            }
            changed |= factor_nonterminal(ir, nt);
        }
        rounds += 1;
        if !changed {
            break;
        }
    }
    tracing::trace!(
        rounds,
        nonterminals = ir.nonterminals.len(),
        "left factoring finished"
    );
}

fn factor_nonterminal(ir: &mut IrGrammar, nt: NtId) -> bool {
    let prods = ir.nonterminal(nt).prods.clone();

    // Group alternatives by their first symbol occurrence.
    let mut groups: Map<IrSym, Vec<ProdId>> = Map::default();
    for &p in &prods {
        if let Some(first) = ir.prod(p).syms.first() {
            groups.entry(first.clone()).or_default().push(p);
        }
    }
    if groups.values().all(|members| members.len() < 2) {
        return false;
    }

    let mut replacement: Map<ProdId, ProdId> = Map::default();
    for members in groups.values().filter(|members| members.len() >= 2) {
        let prefix_len = common_prefix_len(ir, members);
        let lhs_synthetic = ir.nonterminal(nt).synthetic;

        let tail_nt = NtId::new(ir.nonterminals.len() as u16);
        let parent_name = ir.nonterminal(nt).name.clone();
        let parent_base = ir.nonterminal(nt).base.clone();
        ir.nonterminals.push(IrNonterminal {
            name: format!("{}#{}", parent_name, tail_nt.index()),
            base: parent_base,
            prods: Vec::new(),
            synthetic: true,
            accept: false,
        });

        for &p in members {
            let tail_syms: Vec<IrSym> = ir.prod(p).syms[prefix_len..].to_vec();
            let tail_kind = match ir.prod(p).reduce.clone() {
                ReduceKind::Finish { layout, finish } | ReduceKind::Seed { layout, finish } => {
                    ReduceKind::Seed { layout, finish }
                }
                ReduceKind::Extend | ReduceKind::Complete => ReduceKind::Extend,
            };
            ir.add_prod(tail_nt, tail_syms, tail_kind);
        }

        // One production with the hoisted prefix stands in for the group.
        let leader = members[0];
        let mut syms = ir.prod(leader).syms[..prefix_len].to_vec();
        syms.push(IrSym {
            sym: SymId::N(tail_nt),
            restriction: None,
        });
        let kind = if lhs_synthetic {
            ReduceKind::Extend
        } else {
            ReduceKind::Complete
        };
        let new_prod = ir.add_prod(nt, syms, kind);
        replacement.insert(leader, new_prod);
        for &p in &members[1..] {
            replacement.insert(p, new_prod);
        }
    }

    // Rebuild the alternative list in place: the replacement sits where the
    // first member of its group was; other members disappear.
    let mut new_list = Vec::with_capacity(prods.len());
    for p in prods {
        match replacement.get(&p) {
            None => new_list.push(p),
            Some(&r) => {
                if !new_list.contains(&r) {
                    new_list.push(r);
                }
            }
        }
    }
    ir.nonterminals[nt.index()].prods = new_list;
    true
}

fn common_prefix_len(ir: &IrGrammar, members: &[ProdId]) -> usize {
    let first = &ir.prod(members[0]).syms;
    let mut len = first.len();
    for &p in &members[1..] {
        let syms = &ir.prod(p).syms;
        let mut shared = 0;
        while shared < len && shared < syms.len() && syms[shared] == first[shared] {
            shared += 1;
        }
        len = shared;
    }
    len
}
