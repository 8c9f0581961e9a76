//! The implementation of the LR(1) automaton.
//!
//! Items carry, besides the production and marker position, the lookahead
//! restriction inherited from the item that spawned them in closure
//! expansion: a restriction written before a nonterminal occurrence
//! constrains which terminals may begin that nonterminal's productions, so
//! it must follow the derivation one level down. An inherited restriction
//! only constrains the marker position it was created at and dies when the
//! marker advances.
//!
//! States with equal core sets are merged according to the configured
//! strategy: only on identical lookaheads by default (canonical LR(1)), or
//! by Pager's weak-compatibility test. Any state left with competing
//! actions on one terminal is a hard error.

use crate::{
    error::GrammarError,
    first_sets::FirstSets,
    ir::{combine, IrGrammar, Restriction, SymId},
    types::{Map, Set},
    util::display_fn,
};
use parsegen_runtime::table::{NtId, ProdId, StateId, TermId};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
};

#[derive(Debug, Copy, Clone)]
enum MergeMode {
    /// States are merged only when their lookahead sets coincide, as in
    /// Knuth's canonical LR(1) construction.
    Canonical,

    /// States are merged when they are weakly compatible in the sense of
    /// Pager's Practical General Method (PGM).
    Pgm,
}

#[derive(Debug)]
pub struct Config {
    merge_mode: MergeMode,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            merge_mode: MergeMode::Canonical,
        }
    }

    /// Merge states only on identical lookaheads (canonical LR(1)).
    ///
    /// The default. Canonical splitting keeps every state's action row
    /// exact, which in turn keeps the "expected ..." sets in syntax errors
    /// as tight as possible.
    pub fn use_canonical(&mut self) -> &mut Self {
        self.merge_mode = MergeMode::Canonical;
        self
    }

    /// Merge weakly compatible states (Pager's PGM).
    ///
    /// Keeps the state count close to LALR without introducing the
    /// reduce-reduce conflicts LALR merging can; error reporting may become
    /// slightly less precise in merged states.
    pub fn use_pgm(&mut self) -> &mut Self {
        self.merge_mode = MergeMode::Pgm;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
struct NodeID {
    raw: u64,
}

impl NodeID {
    const fn new(raw: u64) -> Self {
        Self { raw }
    }
}

// LR(1) item: a production with a marker position, plus the restriction
// inherited at closure time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct LRItemCore {
    prod: ProdId,
    marker: usize,
    inherited: Option<Restriction>,
}

impl LRItemCore {
    /// The restriction in force at the marker position.
    fn effective(&self, g: &IrGrammar) -> Option<Restriction> {
        let own = g.prod(self.prod).syms.get(self.marker);
        combine(
            self.inherited.clone(),
            own.and_then(|s| s.restriction.as_ref()),
        )
    }

    fn display<'g>(&'g self, g: &'g IrGrammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let prod = g.prod(self.prod);
            write!(f, "({} :=", g.nonterminal(prod.lhs).name)?;
            for (i, s) in prod.syms.iter().enumerate() {
                if i == self.marker {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.sym_name(s.sym))?;
            }
            if self.marker == prod.syms.len() {
                f.write_str(" .")?;
            }
            f.write_str(")")
        })
    }
}

#[derive(Debug, Clone)]
struct LRItemContext {
    lookaheads: Set<TermId>,
}

//  - key: core item
//  - value: associated lookahead symbols
type LRItemSet = BTreeMap<LRItemCore, LRItemContext>;
type LRItemCores = BTreeSet<LRItemCore>;

/// The action an automaton state performs on a particular lookahead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LrAction {
    Shift(StateId),
    Reduce(ProdId),
    Accept(ProdId),
}

#[derive(Debug)]
pub struct StateData {
    item_set: LRItemSet,
    pub actions: Map<TermId, LrAction>,
    pub gotos: Map<NtId, StateId>,
}

#[derive(Debug)]
pub struct Automaton {
    pub states: Vec<StateData>,
    /// Entry state per goal, parallel to the grammar's goal list.
    pub entries: Vec<StateId>,
}

impl Automaton {
    pub fn generate(g: &IrGrammar) -> Result<Self, GrammarError> {
        Self::generate_with_config(g, &Config::new())
    }

    #[tracing::instrument(skip_all)]
    pub fn generate_with_config(g: &IrGrammar, config: &Config) -> Result<Self, GrammarError> {
        let mut gen = Generator::new(g, config);
        gen.populate_nodes();
        let automaton = gen.finalize()?;
        tracing::trace!(states = automaton.states.len(), "automaton generated");
        Ok(automaton)
    }

    pub fn display<'g>(&'g self, g: &'g IrGrammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (id, state) in self.states.iter().enumerate() {
                if id > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### State {:02}", id)?;
                writeln!(f, "## item_sets")?;
                for (core, ctx) in &state.item_set {
                    write!(f, "- {}  [", core.display(g))?;
                    for (i, lookahead) in ctx.lookaheads.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        f.write_str(g.terminal_name(*lookahead))?;
                    }
                    f.write_str("]\n")?;
                }
                writeln!(f, "## actions")?;
                for (token, action) in &state.actions {
                    let token = g.terminal_name(*token);
                    match action {
                        LrAction::Shift(n) => writeln!(f, "- {} => shift({:02})", token, n)?,
                        LrAction::Reduce(p) => {
                            writeln!(f, "- {} => reduce({})", token, g.display_prod(*p))?
                        }
                        LrAction::Accept(..) => writeln!(f, "- {} => accept", token)?,
                    }
                }
                writeln!(f, "## gotos")?;
                for (nt, goto) in &state.gotos {
                    writeln!(f, "- {} => goto({:02})", g.nonterminal(*nt).name, goto)?;
                }
            }
            Ok(())
        })
    }
}

// === Generator ===

#[derive(Debug)]
struct PendingNodes {
    next_node_id: u64,
    queue: VecDeque<(NodeID, LRItemSet, Option<NodeID>)>,
}

impl PendingNodes {
    /// Push an LR(1) item set into the queue, and obtain its registered id.
    fn enqueue(&mut self, item_set: LRItemSet, prev_node: Option<NodeID>) -> NodeID {
        let id = NodeID::new(self.next_node_id);
        self.next_node_id += 1;
        self.queue.push_back((id, item_set, prev_node));
        id
    }

    fn dequeue(&mut self) -> Option<(NodeID, LRItemSet, Option<NodeID>)> {
        self.queue.pop_front()
    }
}

#[derive(Debug)]
struct NodeExtractor<'g> {
    g: &'g IrGrammar,
    first_sets: FirstSets,
}

impl NodeExtractor<'_> {
    /// Closure expansion.
    fn expand_closures(&self, items: &mut LRItemSet) {
        let mut changed = true;
        while changed {
            changed = false;

            let mut added: Map<LRItemCore, Set<TermId>> = Map::default();
            for (core, ctx) in items.iter() {
                let prod = self.g.prod(core.prod);

                // [X -> ... @ Y beta]
                //  Y: one nonterminal symbol
                let (head, beta) = match &prod.syms[core.marker..] {
                    [head, beta @ ..] => (head, beta),
                    [] => continue,
                };
                let y = match head.sym {
                    SymId::N(y) => y,
                    SymId::T(..) => continue,
                };

                // A restriction in force before Y constrains the first
                // terminal of whatever Y derives, so the spawned items
                // inherit it.
                let inherited = core.effective(self.g);

                // x \in First(beta x1) \cup ... \cup First(beta xk)
                // for lookaheads {x1,...,xk}
                let x = self
                    .first_sets
                    .first_of(beta, ctx.lookaheads.iter().copied());
                for &q in &self.g.nonterminal(y).prods {
                    added
                        .entry(LRItemCore {
                            prod: q,
                            marker: 0,
                            inherited: inherited.clone(),
                        })
                        .or_default()
                        .extend(x.iter().copied());
                }
            }

            for (core, lookaheads) in added {
                let ctx = items.entry(core).or_insert_with(|| {
                    changed = true;
                    LRItemContext {
                        lookaheads: Set::default(),
                    }
                });
                for l in lookaheads {
                    changed |= ctx.lookaheads.insert(l);
                }
            }
        }
    }

    /// Extract the (unexpanded) successor item sets of one item set,
    /// keyed by transition label.
    fn extract_transitions(&self, items: &LRItemSet) -> Map<SymId, LRItemSet> {
        let mut item_sets: Map<SymId, LRItemSet> = Map::default();
        for (core, ctx) in items {
            let prod = self.g.prod(core.prod);
            if core.marker >= prod.syms.len() {
                continue;
            }

            let next = &prod.syms[core.marker];
            // A terminal excluded by the restriction in force cannot be
            // shifted from this item.
            if let SymId::T(t) = next.sym {
                if let Some(r) = core.effective(self.g) {
                    if !r.allows(t) {
                        continue;
                    }
                }
            }

            // The inherited restriction constrained this position only.
            let advanced = LRItemCore {
                prod: core.prod,
                marker: core.marker + 1,
                inherited: None,
            };
            let slot = item_sets
                .entry(next.sym)
                .or_default()
                .entry(advanced)
                .or_insert_with(|| LRItemContext {
                    lookaheads: Set::default(),
                });
            slot.lookaheads.extend(ctx.lookaheads.iter().copied());
        }
        item_sets
    }
}

#[derive(Debug)]
struct Generator<'g> {
    extractor: NodeExtractor<'g>,
    pending_nodes: PendingNodes,
    nodes: Map<NodeID, (LRItemSet, Map<SymId, NodeID>)>,
    same_cores: Map<LRItemCores, Set<NodeID>>,
    entries: Vec<NodeID>,
    config: &'g Config,
}

impl<'g> Generator<'g> {
    fn new(g: &'g IrGrammar, config: &'g Config) -> Self {
        let mut pending_nodes = PendingNodes {
            next_node_id: 0,
            queue: VecDeque::new(),
        };

        // One start node per goal, seeded with the accept items on
        // end-of-input.
        let mut entries = Vec::with_capacity(g.goals.len());
        for goal in &g.goals {
            let mut item_set = LRItemSet::new();
            for &prod in &g.nonterminal(goal.accept_nt).prods {
                item_set.insert(
                    LRItemCore {
                        prod,
                        marker: 0,
                        inherited: None,
                    },
                    LRItemContext {
                        lookaheads: Some(TermId::EOI).into_iter().collect(),
                    },
                );
            }
            entries.push(pending_nodes.enqueue(item_set, None));
        }

        Self {
            extractor: NodeExtractor {
                g,
                first_sets: FirstSets::new(g),
            },
            pending_nodes,
            nodes: Map::default(),
            same_cores: Map::default(),
            entries,
            config,
        }
    }

    fn populate_nodes(&mut self) {
        'dequeue: while let Some((new_id, mut new_item_set, prev_node)) =
            self.pending_nodes.dequeue()
        {
            self.extractor.expand_closures(&mut new_item_set);

            let cores: LRItemCores = new_item_set.keys().cloned().collect();

            // Search for a compatible node; on a hit, patch that node
            // instead of creating a new one.
            if let Some(same_cores) = self.same_cores.get(&cores) {
                for &orig_id in same_cores {
                    let orig_node = &mut self.nodes[&orig_id];
                    match compare_item_sets(self.config.merge_mode, &orig_node.0, &new_item_set) {
                        ItemSetDiff::Same => {
                            // Fully covered already.
                        }

                        ItemSetDiff::Compatible => {
                            // Merge the lookaheads.
                            let mut modified = false;
                            for (new_core, new_ctx) in &new_item_set {
                                if let Some(orig_ctx) = orig_node.0.get_mut(new_core) {
                                    for l in &new_ctx.lookaheads {
                                        modified |= orig_ctx.lookaheads.insert(*l);
                                    }
                                }
                            }

                            // Successors only need regenerating when the
                            // lookaheads actually changed.
                            if modified {
                                for (symbol, succ) in
                                    self.extractor.extract_transitions(&orig_node.0.clone())
                                {
                                    let id = self.pending_nodes.enqueue(succ, Some(orig_id));
                                    self.nodes[&orig_id].1.insert(symbol, id);
                                }
                            }
                        }

                        ItemSetDiff::Different => continue,
                    }

                    // The id reserved for this set is already recorded on
                    // the predecessor's edge (or in the entry list); point
                    // it at the merged node instead.
                    match prev_node {
                        Some(prev_node_id) => {
                            let prev_node = &mut self.nodes[&prev_node_id];
                            for edge in prev_node.1.values_mut() {
                                if *edge == new_id {
                                    *edge = orig_id;
                                }
                            }
                        }
                        None => {
                            for entry in &mut self.entries {
                                if *entry == new_id {
                                    *entry = orig_id;
                                }
                            }
                        }
                    }

                    continue 'dequeue;
                }
            }

            // No merge candidate; create the node and queue its successors.
            let mut edges = Map::default();
            for (symbol, succ) in self.extractor.extract_transitions(&new_item_set) {
                let id = self.pending_nodes.enqueue(succ, Some(new_id));
                edges.insert(symbol, id);
            }

            self.nodes.insert(new_id, (new_item_set, edges));
            self.same_cores.entry(cores).or_default().insert(new_id);
        }
    }

    fn finalize(self) -> Result<Automaton, GrammarError> {
        let g = self.extractor.g;

        // Node merging leaves holes in the id space; compact it.
        let mut new_ids: Map<NodeID, StateId> = Map::default();
        for (at, &orig_id) in self.nodes.keys().enumerate() {
            new_ids.insert(orig_id, StateId::new(at as u32));
        }

        let mut states = Vec::with_capacity(self.nodes.len());
        for (item_set, edges) in self.nodes.into_values() {
            let id = StateId::new(states.len() as u32);

            #[derive(Default)]
            struct PendingAction {
                shift: Option<StateId>,
                reduces: Vec<ProdId>,
            }
            let mut pending_actions: Map<TermId, PendingAction> = Map::default();
            let mut gotos: Map<NtId, StateId> = Map::default();
            for (symbol, target) in edges {
                let target = new_ids[&target];
                match symbol {
                    SymId::T(t) => {
                        pending_actions.entry(t).or_default().shift.replace(target);
                    }
                    SymId::N(n) => {
                        gotos.insert(n, target);
                    }
                }
            }
            for (core, ctx) in &item_set {
                if core.marker < g.prod(core.prod).syms.len() {
                    continue;
                }
                for lookahead in &ctx.lookaheads {
                    pending_actions
                        .entry(*lookahead)
                        .or_default()
                        .reduces
                        .push(core.prod);
                }
            }

            let mut actions: Map<TermId, LrAction> = Map::default();
            for (symbol, pending) in pending_actions {
                let resolved = match (pending.shift, &pending.reduces[..]) {
                    (Some(target), []) => LrAction::Shift(target),
                    (None, &[prod]) => {
                        if g.is_accept(prod) {
                            LrAction::Accept(prod)
                        } else {
                            LrAction::Reduce(prod)
                        }
                    }
                    (Some(..), &[prod, ..]) => {
                        return Err(GrammarError::ShiftReduceConflict {
                            state: id.index() as u32,
                            terminal: g.terminal_name(symbol).to_owned(),
                            production: g.display_prod(prod).to_string(),
                        });
                    }
                    (None, &[first, second, ..]) => {
                        return Err(GrammarError::ReduceReduceConflict {
                            state: id.index() as u32,
                            terminal: g.terminal_name(symbol).to_owned(),
                            first: g.display_prod(first).to_string(),
                            second: g.display_prod(second).to_string(),
                        });
                    }
                    (None, []) => continue,
                };
                actions.insert(symbol, resolved);
            }

            states.push(StateData {
                item_set,
                actions,
                gotos,
            });
        }

        let entries = self.entries.iter().map(|id| new_ids[id]).collect();
        Ok(Automaton { states, entries })
    }
}

enum ItemSetDiff {
    Same,
    Compatible,
    Different,
}

fn compare_item_sets(mode: MergeMode, left: &LRItemSet, right: &LRItemSet) -> ItemSetDiff {
    // Assume that `left` and `right` have the same cores.

    let mut is_canonically_same = true;
    for (left, right) in left.values().zip(right.values()) {
        if !left.lookaheads.is_superset(&right.lookaheads) {
            is_canonically_same = false;
            break;
        }
    }
    if is_canonically_same {
        return ItemSetDiff::Same;
    }

    match mode {
        MergeMode::Pgm if is_pgm_weakly_compatible(left, right) => ItemSetDiff::Compatible,
        _ => ItemSetDiff::Different,
    }
}

fn is_pgm_weakly_compatible(left: &LRItemSet, right: &LRItemSet) -> bool {
    is_pgm_weakly_compatible_c1(left, right)
        || is_pgm_weakly_compatible_c2(left)
        || is_pgm_weakly_compatible_c2(right)
}

fn is_pgm_weakly_compatible_c1(left: &LRItemSet, right: &LRItemSet) -> bool {
    for (i, left) in left.values().enumerate() {
        for (j, right) in right.values().enumerate() {
            if i == j {
                continue;
            }
            if !left.lookaheads.is_disjoint(&right.lookaheads) {
                return false;
            }
        }
    }
    true
}

fn is_pgm_weakly_compatible_c2(items: &LRItemSet) -> bool {
    for (i, c1) in items.values().enumerate() {
        for c2 in items.values().skip(i + 1) {
            if c1.lookaheads.is_disjoint(&c2.lookaheads) {
                return false;
            }
        }
    }
    true
}
