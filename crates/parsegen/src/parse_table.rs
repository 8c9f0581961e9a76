//! Emission of the runtime [`ParseTable`].
//!
//! A flat translation: automaton states become sorted action/goto rows,
//! every production becomes a [`ReduceSpec`], and the template pool and goal
//! list carry over. Nothing here can fail; all validation happened earlier.

use crate::{
    ir::IrGrammar,
    lr1::{Automaton, LrAction},
};
use parsegen_runtime::table::{Action, ParseTable, ReduceSpec, State, TerminalMeta};

#[tracing::instrument(skip_all)]
pub fn emit(g: &IrGrammar, automaton: &Automaton) -> ParseTable {
    let states = automaton
        .states
        .iter()
        .map(|data| {
            let mut actions: Vec<_> = data
                .actions
                .iter()
                .map(|(t, action)| {
                    let action = match action {
                        LrAction::Shift(next) => Action::Shift(*next),
                        LrAction::Reduce(prod) => Action::Reduce(*prod),
                        LrAction::Accept(prod) => Action::Accept(*prod),
                    };
                    (*t, action)
                })
                .collect();
            actions.sort_by_key(|(t, _)| *t);

            let mut gotos: Vec<_> = data.gotos.iter().map(|(n, s)| (*n, *s)).collect();
            gotos.sort_by_key(|(n, _)| *n);

            State { actions, gotos }
        })
        .collect();

    let terminals = g
        .terminals
        .iter()
        .map(|t| TerminalMeta {
            name: t.name.clone(),
            variable: t.variable,
        })
        .collect();

    // Indexed by production id; productions orphaned by left factoring get a
    // spec too, they are simply never referenced by an action.
    let reduces = g
        .prods
        .iter()
        .map(|prod| ReduceSpec {
            lhs: prod.lhs,
            pops: prod.syms.len() as u16,
            kind: prod.reduce.clone(),
        })
        .collect();

    let goals = g
        .goals
        .iter()
        .zip(&automaton.entries)
        .map(|(goal, entry)| (goal.name.clone(), *entry))
        .collect();

    ParseTable {
        states,
        terminals,
        reduces,
        templates: g.templates.clone(),
        goals,
    }
}
