//! Lowering from the surface grammar to the epsilon-free IR.
//!
//! The passes run in a fixed order:
//!
//! 1. Monomorphization: every reachable (nonterminal, argument-values)
//!    combination becomes one plain IR nonterminal; conditional alternatives
//!    are kept or dropped per instance; names are interned.
//! 2. Restriction canonicalization: each run of lookahead rules collapses to
//!    the set of allowed next terminals (negative rules complement against
//!    the grammar's vocabulary, end-of-input excluded).
//! 3. Optional expansion: a production with `k` omissible occurrences
//!    becomes `2^k` variants sharing one child layout, omitted occurrences
//!    marked absent.
//! 4. Derivable-empty analysis: fixed point over the expanded productions.
//!    Each nullable nonterminal must have exactly one empty derivation; its
//!    value is captured as a template.
//! 5. Goal augmentation: one accept nonterminal per goal, with an extra
//!    empty-input production when the goal itself is nullable.
//! 6. Epsilon elimination: every variant that erases a nullable occurrence
//!    replaces its child slot with the captured template; fully empty
//!    variants are dropped. Two variants of one nonterminal with identical
//!    bodies are rejected as ambiguous.
//!
//! After this module runs, no production of a user nonterminal is empty and
//! every production knows exactly how to rebuild its author-visible tree.

use crate::{
    error::GrammarError,
    grammar::{Elem, Grammar, NonterminalDef, ParamArg, SymbolRef},
    ir::{combine, IrGoal, IrGrammar, IrNonterminal, IrSym, IrTerminal, Restriction, SymId},
    types::{Map, Queue, Set},
};
use parsegen_runtime::{
    table::{Finisher, NtId, ReduceKind, Slot, TermId},
    tree::{Tag, ValueTemplate},
};
use std::collections::BTreeSet;
use std::mem;

/// A nonterminal instance: surface name plus argument values in parameter
/// declaration order.
type InstKey = (String, Vec<bool>);

/// A single lookahead rule as written, before canonicalization.
#[derive(Debug, Clone)]
struct RawRestriction {
    set: BTreeSet<TermId>,
    positive: bool,
}

/// One symbol occurrence after monomorphization.
#[derive(Debug, Clone)]
struct MonoElem {
    sym: SymId,
    optional: bool,
    /// Lookahead rules written immediately before this occurrence.
    restr: Vec<RawRestriction>,
}

/// One alternative of one instance, before optional expansion.
#[derive(Debug, Clone)]
struct MonoProd {
    lhs: NtId,
    elems: Vec<MonoElem>,
    action: Option<String>,
    /// Position in the surface alternative list; `None` when the surface
    /// nonterminal has a single alternative.
    tag_index: Option<u32>,
    /// Single required plain symbol and no action: the child passes through
    /// without a wrapping node.
    passthrough: bool,
}

/// An expanded production: concrete symbols plus the layout that rebuilds
/// the surface tree shape.
#[derive(Debug, Clone)]
struct XProd {
    lhs: NtId,
    syms: Vec<IrSym>,
    layout: Vec<Slot>,
    finish: Finisher,
    accept: bool,
}

#[tracing::instrument(skip_all)]
pub fn normalize(grammar: &Grammar) -> Result<IrGrammar, GrammarError> {
    let mut lowerer = Lowerer::new(grammar);
    let (mono, goal_ids) = lowerer.run()?;
    let Lowerer {
        terminals,
        mut nonterminals,
        ..
    } = lowerer;

    let expanded = expand_optionals(&mono, &nonterminals, terminals.len())?;

    let (templates, template_of) = derive_empties(&expanded, &nonterminals)?;

    let (expanded, goals) =
        augment_goals(grammar, expanded, &mut nonterminals, &goal_ids, &template_of);

    let mut ir = IrGrammar {
        terminals,
        nonterminals,
        prods: Vec::new(),
        templates,
        goals,
    };
    eliminate_epsilons(&mut ir, expanded, &template_of)?;

    tracing::trace!(
        terminals = ir.terminals.len(),
        nonterminals = ir.nonterminals.len(),
        prods = ir.prods.len(),
        "grammar lowered"
    );

    Ok(ir)
}

struct Lowerer<'g> {
    grammar: &'g Grammar,
    terminals: Vec<IrTerminal>,
    term_ids: Map<String, TermId>,
    nonterminals: Vec<IrNonterminal>,
    nt_ids: Map<InstKey, NtId>,
    pending: Queue<InstKey>,
}

impl<'g> Lowerer<'g> {
    fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            terminals: vec![IrTerminal {
                name: "end of input".to_owned(),
                variable: false,
            }],
            term_ids: Map::default(),
            nonterminals: Vec::new(),
            nt_ids: Map::default(),
            pending: Queue::default(),
        }
    }

    fn run(&mut self) -> Result<(Vec<MonoProd>, Vec<NtId>), GrammarError> {
        // Goals are validated plain by `Grammar::define`.
        let goal_ids: Vec<NtId> = self
            .grammar
            .goals()
            .iter()
            .map(|goal| self.intern_instance(goal, Vec::new()))
            .collect();

        let mut prods = Vec::new();
        while let Some((name, args)) = self.pending.pop() {
            self.lower_instance(&name, &args, &mut prods)?;
        }
        Ok((prods, goal_ids))
    }

    fn intern_term(&mut self, name: &str) -> TermId {
        if let Some(id) = self.term_ids.get(name) {
            return *id;
        }
        let id = TermId::new(self.terminals.len() as u16);
        self.terminals.push(IrTerminal {
            name: name.to_owned(),
            variable: self.grammar.is_variable_terminal(name),
        });
        self.term_ids.insert(name.to_owned(), id);
        id
    }

    fn intern_instance(&mut self, name: &str, args: Vec<bool>) -> NtId {
        let key = (name.to_owned(), args);
        if let Some(id) = self.nt_ids.get(&key) {
            return *id;
        }
        let id = NtId::new(self.nonterminals.len() as u16);
        self.nonterminals.push(IrNonterminal {
            name: instance_name(self.grammar, &key.0, &key.1),
            base: key.0.clone(),
            prods: Vec::new(),
            synthetic: false,
            accept: false,
        });
        self.nt_ids.insert(key.clone(), id);
        self.pending.push(key);
        id
    }

    fn resolve(
        &mut self,
        sym: &SymbolRef,
        params: &[String],
        bindings: &[bool],
    ) -> Result<SymId, GrammarError> {
        let name = sym.name();
        match self.grammar.nonterminal(name) {
            Some(def) => match sym {
                SymbolRef::Name(..) => {
                    if !def.params().is_empty() {
                        return Err(GrammarError::MissingApply(name.to_owned()));
                    }
                    Ok(SymId::N(self.intern_instance(name, Vec::new())))
                }
                SymbolRef::Apply { args, .. } => {
                    if def.params().is_empty() {
                        return Err(GrammarError::ApplyToPlainNonterminal(name.to_owned()));
                    }
                    let values = eval_args(name, def, args, params, bindings)?;
                    Ok(SymId::N(self.intern_instance(name, values)))
                }
            },
            None => match sym {
                SymbolRef::Name(..) => Ok(SymId::T(self.intern_term(name))),
                SymbolRef::Apply { .. } => {
                    Err(GrammarError::UnknownApplyTarget(name.to_owned()))
                }
            },
        }
    }

    fn lower_instance(
        &mut self,
        name: &str,
        args: &[bool],
        prods: &mut Vec<MonoProd>,
    ) -> Result<(), GrammarError> {
        let def = match self.grammar.nonterminal(name) {
            Some(def) => def.clone(),
            None => return Ok(()),
        };
        let lhs = self.nt_ids[&(name.to_owned(), args.to_vec())];
        let multi = def.alternatives().len() > 1;

        for (alt_index, rhs) in def.alternatives().iter().enumerate() {
            if let Some((param, value)) = &rhs.condition {
                let at = def
                    .params()
                    .iter()
                    .position(|p| p == param)
                    .ok_or_else(|| GrammarError::UnboundVar(param.clone()))?;
                if args[at] != *value {
                    continue;
                }
            }

            let mut pending_restr: Vec<RawRestriction> = Vec::new();
            let mut elems = Vec::new();
            for elem in rhs.elems() {
                match elem {
                    Elem::Lookahead { set, positive } => {
                        let mut ids = BTreeSet::new();
                        for t in set {
                            if self.grammar.is_nonterminal(t) {
                                return Err(GrammarError::LookaheadOfNonterminal(t.clone()));
                            }
                            ids.insert(self.intern_term(t));
                        }
                        pending_restr.push(RawRestriction {
                            set: ids,
                            positive: *positive,
                        });
                    }
                    Elem::Symbol(sym) => {
                        let sym = self.resolve(sym, def.params(), args)?;
                        elems.push(MonoElem {
                            sym,
                            optional: false,
                            restr: mem::take(&mut pending_restr),
                        });
                    }
                    Elem::Optional(sym) => {
                        let sym = self.resolve(sym, def.params(), args)?;
                        elems.push(MonoElem {
                            sym,
                            optional: true,
                            restr: mem::take(&mut pending_restr),
                        });
                    }
                }
            }
            if !pending_restr.is_empty() {
                return Err(GrammarError::TrailingLookahead {
                    nonterminal: self.nonterminals[lhs.index()].name.clone(),
                });
            }

            let passthrough = rhs.elems().len() == 1
                && matches!(rhs.elems()[0], Elem::Symbol(..))
                && rhs.action.is_none();
            prods.push(MonoProd {
                lhs,
                elems,
                action: rhs.action.clone(),
                tag_index: multi.then_some(alt_index as u32),
                passthrough,
            });
        }
        Ok(())
    }
}

fn eval_args(
    name: &str,
    def: &NonterminalDef,
    args: &[(String, ParamArg)],
    params: &[String],
    bindings: &[bool],
) -> Result<Vec<bool>, GrammarError> {
    let mismatch = || GrammarError::ParameterMismatch {
        nonterminal: name.to_owned(),
        params: def.params().join(", "),
    };
    if args.len() != def.params().len() {
        return Err(mismatch());
    }
    let mut values = Vec::with_capacity(args.len());
    for param in def.params() {
        let (_, arg) = args
            .iter()
            .find(|(p, _)| p == param)
            .ok_or_else(mismatch)?;
        let value = match arg {
            ParamArg::Value(v) => *v,
            ParamArg::Var(var) => {
                let at = params
                    .iter()
                    .position(|p| p == var)
                    .ok_or_else(|| GrammarError::UnboundVar(var.clone()))?;
                bindings[at]
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// `name`, or `name[+P, ~Q]` for a monomorphized instance.
fn instance_name(grammar: &Grammar, base: &str, args: &[bool]) -> String {
    if args.is_empty() {
        return base.to_owned();
    }
    let params = grammar
        .nonterminal(base)
        .map(|def| def.params())
        .unwrap_or(&[]);
    let mut out = format!("{}[", base);
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push(if *value { '+' } else { '~' });
        out.push_str(params.get(i).map(String::as_str).unwrap_or("?"));
    }
    out.push(']');
    out
}

/// Collapse a run of lookahead rules into the allowed-terminal set.
fn canonicalize(
    restr: &[RawRestriction],
    vocab_len: usize,
) -> Option<Restriction> {
    let mut out: Option<Restriction> = None;
    for r in restr {
        let allowed: BTreeSet<TermId> = if r.positive {
            r.set.clone()
        } else {
            (1..vocab_len)
                .map(|i| TermId::new(i as u16))
                .filter(|t| !r.set.contains(t))
                .collect()
        };
        out = combine(out, Some(&Restriction { allowed }));
    }
    out
}

fn expand_optionals(
    mono: &[MonoProd],
    nonterminals: &[IrNonterminal],
    vocab_len: usize,
) -> Result<Vec<XProd>, GrammarError> {
    let mut out = Vec::new();
    for prod in mono {
        let finish = if let Some(action) = &prod.action {
            Finisher::Node(Tag::method(action))
        } else if prod.passthrough {
            Finisher::First
        } else {
            let base = &nonterminals[prod.lhs.index()].base;
            Finisher::Node(Tag::production(base, prod.tag_index))
        };

        let restrictions: Vec<Option<Restriction>> = prod
            .elems
            .iter()
            .map(|e| canonicalize(&e.restr, vocab_len))
            .collect();

        let optionals: Vec<usize> = prod
            .elems
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.optional.then_some(i))
            .collect();

        for mask in 0u32..(1u32 << optionals.len()) {
            let omitted: Set<usize> = optionals
                .iter()
                .enumerate()
                .filter_map(|(bit, &at)| (mask & (1 << bit) != 0).then_some(at))
                .collect();

            let mut syms = Vec::new();
            let mut layout = Vec::new();
            let mut carry: Option<Restriction> = None;
            for (i, elem) in prod.elems.iter().enumerate() {
                let restriction = combine(carry.take(), restrictions[i].as_ref());
                if omitted.contains(&i) {
                    layout.push(Slot::Absent);
                    carry = restriction;
                } else {
                    syms.push(IrSym {
                        sym: elem.sym,
                        restriction,
                    });
                    layout.push(Slot::Pop);
                }
            }
            if carry.is_some() {
                return Err(GrammarError::TrailingLookahead {
                    nonterminal: nonterminals[prod.lhs.index()].name.clone(),
                });
            }

            out.push(XProd {
                lhs: prod.lhs,
                syms,
                layout,
                finish: finish.clone(),
                accept: false,
            });
        }
    }
    Ok(out)
}

/// Derivable-empty fixed point. Returns the template pool and, per nullable
/// nonterminal, the pool index of its unique empty derivation's value.
fn derive_empties(
    expanded: &[XProd],
    nonterminals: &[IrNonterminal],
) -> Result<(Vec<ValueTemplate>, Map<NtId, u32>), GrammarError> {
    let mut templates: Vec<ValueTemplate> = Vec::new();
    let mut template_of: Map<NtId, u32> = Map::default();
    let mut derived = vec![false; expanded.len()];

    let mut passes = 0usize;
    loop {
        let mut changed = false;
        for (pi, xp) in expanded.iter().enumerate() {
            if derived[pi] {
                continue;
            }
            let all_empty = xp.syms.iter().all(|s| match s.sym {
                SymId::T(..) => false,
                SymId::N(n) => template_of.contains_key(&n),
            });
            if !all_empty {
                continue;
            }
            derived[pi] = true;
            changed = true;

            let mut children = Vec::with_capacity(xp.layout.len());
            let mut next_sym = 0usize;
            for slot in &xp.layout {
                match slot {
                    Slot::Pop => {
                        let child = match xp.syms[next_sym].sym {
                            SymId::N(n) => templates[template_of[&n] as usize].clone(),
                            SymId::T(..) => ValueTemplate::Absent,
                        };
                        next_sym += 1;
                        children.push(child);
                    }
                    Slot::Absent => children.push(ValueTemplate::Absent),
                    Slot::Const(at) => children.push(templates[*at as usize].clone()),
                }
            }
            let template = match &xp.finish {
                Finisher::First => children.swap_remove(0),
                Finisher::Node(tag) => ValueTemplate::Node {
                    tag: tag.clone(),
                    children,
                },
            };

            if template_of.contains_key(&xp.lhs) {
                return Err(GrammarError::AmbiguousEmpty {
                    nonterminal: nonterminals[xp.lhs.index()].name.clone(),
                });
            }
            let at = templates.len() as u32;
            templates.push(template);
            template_of.insert(xp.lhs, at);
        }
        if !changed {
            break;
        }
        passes += 1;
        if passes > expanded.len() + 1 {
            return Err(GrammarError::EmptinessDivergence);
        }
    }

    Ok((templates, template_of))
}

/// Add one accept nonterminal per goal. A nullable goal additionally gets an
/// empty accept production so the empty input is accepted with the goal's
/// empty-derivation value.
fn augment_goals(
    grammar: &Grammar,
    mut expanded: Vec<XProd>,
    nonterminals: &mut Vec<IrNonterminal>,
    goal_ids: &[NtId],
    template_of: &Map<NtId, u32>,
) -> (Vec<XProd>, Vec<IrGoal>) {
    let mut goals = Vec::new();
    for (goal, &goal_nt) in grammar.goals().iter().zip(goal_ids) {
        let accept_nt = NtId::new(nonterminals.len() as u16);
        nonterminals.push(IrNonterminal {
            name: format!("$accept({})", goal),
            base: goal.clone(),
            prods: Vec::new(),
            synthetic: false,
            accept: true,
        });
        expanded.push(XProd {
            lhs: accept_nt,
            syms: vec![IrSym {
                sym: SymId::N(goal_nt),
                restriction: None,
            }],
            layout: vec![Slot::Pop],
            finish: Finisher::First,
            accept: true,
        });
        if let Some(&at) = template_of.get(&goal_nt) {
            expanded.push(XProd {
                lhs: accept_nt,
                syms: Vec::new(),
                layout: vec![Slot::Const(at)],
                finish: Finisher::First,
                accept: true,
            });
        }
        goals.push(IrGoal {
            name: goal.clone(),
            accept_nt,
        });
    }
    (expanded, goals)
}

/// Rewrite every variant that erases a nullable occurrence, drop variants
/// that became fully empty, and reject nonterminals left with two
/// indistinguishable bodies.
fn eliminate_epsilons(
    ir: &mut IrGrammar,
    expanded: Vec<XProd>,
    template_of: &Map<NtId, u32>,
) -> Result<(), GrammarError> {
    let mut seen: Set<(NtId, Vec<IrSym>)> = Set::default();

    for xp in expanded {
        if xp.accept {
            ir.add_prod(
                xp.lhs,
                xp.syms,
                ReduceKind::Finish {
                    layout: xp.layout,
                    finish: xp.finish,
                },
            );
            continue;
        }
        if xp.syms.is_empty() {
            // Only existed to feed the derivable-empty analysis.
            continue;
        }

        let nullable_at: Vec<usize> = xp
            .syms
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s.sym {
                SymId::N(n) if template_of.contains_key(&n) => Some(i),
                _ => None,
            })
            .collect();

        for mask in 0u32..(1u32 << nullable_at.len()) {
            let removed: Set<usize> = nullable_at
                .iter()
                .enumerate()
                .filter_map(|(bit, &at)| (mask & (1 << bit) != 0).then_some(at))
                .collect();
            if removed.len() == xp.syms.len() {
                // Fully empty; its value lives in the template pool.
                continue;
            }

            let mut syms = Vec::new();
            let mut layout = Vec::new();
            let mut carry: Option<Restriction> = None;
            let mut next_sym = 0usize;
            for slot in &xp.layout {
                match slot {
                    Slot::Absent => layout.push(Slot::Absent),
                    Slot::Const(at) => layout.push(Slot::Const(*at)),
                    Slot::Pop => {
                        let at = next_sym;
                        next_sym += 1;
                        let s = &xp.syms[at];
                        let restriction = combine(carry.take(), s.restriction.as_ref());
                        match (removed.contains(&at), s.sym) {
                            (true, SymId::N(n)) => {
                                layout.push(Slot::Const(template_of[&n]));
                                carry = restriction;
                            }
                            _ => {
                                syms.push(IrSym {
                                    sym: s.sym,
                                    restriction,
                                });
                                layout.push(Slot::Pop);
                            }
                        }
                    }
                }
            }
            if carry.is_some() {
                return Err(GrammarError::TrailingLookahead {
                    nonterminal: ir.nonterminal(xp.lhs).name.clone(),
                });
            }

            if !seen.insert((xp.lhs, syms.clone())) {
                return Err(GrammarError::IndistinguishableProductions {
                    nonterminal: ir.nonterminal(xp.lhs).name.clone(),
                });
            }
            ir.add_prod(
                xp.lhs,
                syms,
                ReduceKind::Finish {
                    layout,
                    finish: xp.finish.clone(),
                },
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{apply, opt, sym, Rhs};

    fn nt<'a>(ir: &'a IrGrammar, name: &str) -> &'a IrNonterminal {
        ir.nonterminals
            .iter()
            .find(|nt| nt.name == name)
            .unwrap_or_else(|| panic!("no nonterminal {}", name))
    }

    #[test]
    fn optional_expansion_and_nullable_goal() {
        let g = Grammar::define(|g| {
            g.rule("a", [opt("X"), opt("Y")])?;
            Ok(())
        })
        .unwrap();
        let ir = normalize(&g).unwrap();

        // X Y / X / Y survive; the fully empty variant becomes a template.
        assert_eq!(nt(&ir, "a").prods.len(), 3);
        assert_eq!(ir.templates.len(), 1);
        assert_eq!(
            ir.templates[0],
            ValueTemplate::Node {
                tag: Tag::production("a", None),
                children: vec![ValueTemplate::Absent, ValueTemplate::Absent],
            }
        );
        // The goal is nullable, so its accept nonterminal also has an
        // empty-input production.
        assert_eq!(nt(&ir, "$accept(a)").prods.len(), 2);
    }

    #[test]
    fn monomorphization_splits_instances() {
        let g = Grammar::define(|g| {
            g.rule("s", [apply("n", [("Y", ParamArg::Value(true))])])?;
            g.rule("s", [apply("n", [("Y", ParamArg::Value(false))])])?;
            g.params("n", ["Y"])?;
            g.rule("n", [sym("A")])?;
            g.rule("n", Rhs::new([sym("B")]).when("Y", true))?;
            g.goal("s");
            Ok(())
        })
        .unwrap();
        let ir = normalize(&g).unwrap();

        assert_eq!(nt(&ir, "n[+Y]").prods.len(), 2);
        assert_eq!(nt(&ir, "n[~Y]").prods.len(), 1);
    }

    #[test]
    fn two_empty_alternatives_are_ambiguous() {
        let g = Grammar::define(|g| {
            g.rule("goal", Vec::<Elem>::new())?;
            g.rule("goal", Vec::<Elem>::new())?;
            Ok(())
        })
        .unwrap();
        let err = normalize(&g).unwrap_err();
        assert!(matches!(err, GrammarError::AmbiguousEmpty { .. }));
        assert!(err.to_string().starts_with("ambiguous grammar"));
    }

    #[test]
    fn empty_derivation_through_two_paths_is_ambiguous() {
        let g = Grammar::define(|g| {
            g.rule("goal", [opt("phrase")])?;
            g.rule("phrase", [opt("X")])?;
            Ok(())
        })
        .unwrap();
        let err = normalize(&g).unwrap_err();
        assert!(matches!(err, GrammarError::AmbiguousEmpty { .. }));
    }

    #[test]
    fn duplicate_bodies_after_elimination_are_ambiguous() {
        let g = Grammar::define(|g| {
            g.rule("goal", [sym("a"), sym("a")])?;
            g.rule("a", [opt("X")])?;
            Ok(())
        })
        .unwrap();
        let err = normalize(&g).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::IndistinguishableProductions { .. }
        ));
    }

    #[test]
    fn trailing_lookahead_is_rejected() {
        let g = Grammar::define(|g| {
            g.rule(
                "stmt",
                [sym("X"), crate::grammar::lookahead(["Y"], false)],
            )?;
            Ok(())
        })
        .unwrap();
        let err = normalize(&g).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid grammar: lookahead restriction at end of production (in `stmt`)"
        );
    }

    #[test]
    fn single_plain_symbol_passes_through() {
        let g = Grammar::define(|g| {
            g.rule("a", [sym("NUM")])?;
            Ok(())
        })
        .unwrap();
        let ir = normalize(&g).unwrap();
        let prod = ir.prod(nt(&ir, "a").prods[0]);
        assert!(matches!(
            &prod.reduce,
            ReduceKind::Finish {
                finish: Finisher::First,
                ..
            }
        ));
    }
}
