/*
 * IDE tabulation solver
 *
 * Two-phase worklist algorithm over the exploded supergraph. Phase 1
 * tabulates jump functions: for every function start point (sp, d1) it
 * records, per reachable node/fact pair (n, d2), the composed edge
 * function along all realizable same-level paths. Callee effects are
 * captured once per (callee, entry fact) as end summaries and spliced
 * into every caller, so a procedure body is re-analyzed only when a new
 * entry fact arrives. Phase 2 seeds the initial facts with the
 * lattice's top value and pushes concrete values through the tabulated
 * jump functions, descending into callees along call edges.
 *
 * Nodes are visited at most once per fact/function change because
 * propagation re-enqueues a path edge only when its jump function
 * actually grew under join. An optional node budget bounds phase 1; a
 * run that trips it is marked unsound in the stats and its results are
 * a lower bound on the true ones.
 *
 * References:
 * - Reps, Horwitz, Sagiv: "Precise Interprocedural Dataflow Analysis
 *   via Graph Reachability" (POPL '95)
 * - Sagiv, Reps, Horwitz: "Precise Interprocedural Dataflow Analysis
 *   with Applications to Constant Propagation" (TAPSOFT '95)
 */

use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::problem::IdeProblem;
use crate::callgraph::CallGraph;
use crate::config::AnalysisConfig;
use crate::edgefn::{self, compose, join_fns, EdgeFn, JoinSemiLattice};
use crate::errors::Result;
use crate::program::{FunctionId, InstId, ProgramView};

/// Same-level realizable path from a function start point to a node.
#[derive(Debug, Clone)]
struct PathEdge<D> {
    sp: InstId,
    d1: D,
    n: InstId,
    d2: D,
}

/// Counters describing a finished solver run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolverStats {
    /// Worklist items processed in phase 1.
    pub num_processed: usize,
    /// Distinct jump-function table entries.
    pub num_jump_fns: usize,
    /// Recorded (callee, entry fact) end summaries.
    pub num_summaries: usize,
    /// Call-site visits answered from an existing procedure analysis.
    pub num_summary_reuses: usize,
    /// True when the node budget cut phase 1 short; results are then a
    /// lower bound, not a fixpoint.
    pub unsound: bool,
}

/// Immutable query interface over a finished run.
pub struct SolverResults<D, L> {
    vals: FxHashMap<(InstId, D), L>,
    reachable: FxHashMap<InstId, FxHashSet<D>>,
    entry_analyses: FxHashMap<(FunctionId, D), usize>,
    zero: D,
    stats: SolverStats,
}

impl<D: Clone + Eq + Hash, L: JoinSemiLattice> SolverResults<D, L> {
    /// Lattice value of `fact` at `n`. `None` when the fact does not
    /// hold at `n`; a reachable fact without a computed value reads as
    /// top.
    pub fn lookup(&self, n: InstId, fact: &D) -> Option<L> {
        if !self.is_reachable(n, fact) {
            return None;
        }
        Some(
            self.vals
                .get(&(n, fact.clone()))
                .cloned()
                .unwrap_or_else(L::top),
        )
    }

    /// All non-zero facts holding at `n`, with their values.
    pub fn results_at(&self, n: InstId) -> FxHashMap<D, L> {
        let Some(facts) = self.reachable.get(&n) else {
            return FxHashMap::default();
        };
        facts
            .iter()
            .filter(|d| **d != self.zero)
            .map(|d| {
                let v = self
                    .vals
                    .get(&(n, d.clone()))
                    .cloned()
                    .unwrap_or_else(L::top);
                (d.clone(), v)
            })
            .collect()
    }

    /// Non-zero facts holding at `n`.
    pub fn reachable_facts_at(&self, n: InstId) -> FxHashSet<D> {
        self.reachable
            .get(&n)
            .map(|facts| facts.iter().filter(|d| **d != self.zero).cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `fact` holds at `n` (zero fact included).
    pub fn is_reachable(&self, n: InstId, fact: &D) -> bool {
        self.reachable.get(&n).is_some_and(|s| s.contains(fact))
    }

    /// How many times a procedure body was tabulated for `entry_fact`.
    /// At most 1 in any complete run; repeat callers reuse the summary.
    pub fn analysis_count(&self, f: FunctionId, entry_fact: &D) -> usize {
        self.entry_analyses
            .get(&(f, entry_fact.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }
}

pub struct TabulationSolver<'a, V, P>
where
    V: ProgramView,
    P: IdeProblem,
{
    view: &'a V,
    call_graph: &'a CallGraph,
    problem: &'a P,
    config: AnalysisConfig,
    worklist: VecDeque<PathEdge<P::Fact>>,
    /// (sp, d1) -> (n, d2) -> composed edge function.
    jump_fns: FxHashMap<(InstId, P::Fact), FxHashMap<(InstId, P::Fact), EdgeFn<P::Value>>>,
    /// (callee, entry fact) -> callers that entered with it, as
    /// (caller sp, caller d1, call inst, call fact).
    incoming: FxHashMap<(FunctionId, P::Fact), FxHashSet<(InstId, P::Fact, InstId, P::Fact)>>,
    /// (callee, entry fact) -> (exit, exit fact) -> summary function.
    end_summaries: FxHashMap<(FunctionId, P::Fact), FxHashMap<(InstId, P::Fact), EdgeFn<P::Value>>>,
    entry_analyses: FxHashMap<(FunctionId, P::Fact), usize>,
    stats: SolverStats,
}

impl<'a, V, P> TabulationSolver<'a, V, P>
where
    V: ProgramView,
    P: IdeProblem,
{
    pub fn new(
        view: &'a V,
        call_graph: &'a CallGraph,
        problem: &'a P,
        config: AnalysisConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            view,
            call_graph,
            problem,
            config,
            worklist: VecDeque::new(),
            jump_fns: FxHashMap::default(),
            incoming: FxHashMap::default(),
            end_summaries: FxHashMap::default(),
            entry_analyses: FxHashMap::default(),
            stats: SolverStats::default(),
        })
    }

    /// Run both phases to completion and freeze the results.
    pub fn solve(mut self) -> SolverResults<P::Fact, P::Value> {
        self.seed();
        self.tabulate();
        let vals = self.compute_values();

        let mut reachable: FxHashMap<InstId, FxHashSet<P::Fact>> = FxHashMap::default();
        for inner in self.jump_fns.values() {
            for (n, d2) in inner.keys() {
                reachable.entry(*n).or_default().insert(d2.clone());
            }
        }

        self.stats.num_jump_fns = self.jump_fns.values().map(|m| m.len()).sum();
        self.stats.num_summaries = self.end_summaries.values().map(|m| m.len()).sum();
        debug!(
            processed = self.stats.num_processed,
            jump_fns = self.stats.num_jump_fns,
            summaries = self.stats.num_summaries,
            reuses = self.stats.num_summary_reuses,
            unsound = self.stats.unsound,
            "tabulation finished"
        );

        SolverResults {
            vals,
            reachable,
            entry_analyses: self.entry_analyses,
            zero: self.problem.zero_value(),
            stats: self.stats,
        }
    }

    fn seed(&mut self) {
        let zero = self.problem.zero_value();
        for (n, facts) in self.problem.initial_seeds() {
            self.propagate(n, zero.clone(), n, zero.clone(), edgefn::identity());
            for d in facts {
                self.propagate(n, zero.clone(), n, d, edgefn::identity());
            }
        }
    }

    /// Phase 1: exhaust the worklist, honoring the node budget.
    fn tabulate(&mut self) {
        while let Some(edge) = self.worklist.pop_front() {
            if let Some(budget) = self.config.node_budget {
                if self.stats.num_processed >= budget {
                    warn!(budget, "node budget exhausted; results are unsound");
                    self.stats.unsound = true;
                    return;
                }
            }
            self.stats.num_processed += 1;

            // Re-read the table: the function may have grown past the
            // snapshot the edge was queued with.
            let f = self.jump_fn(edge.sp, &edge.d1, edge.n, &edge.d2);
            if self.view.is_call(edge.n) {
                self.process_call(&edge, f);
            } else if self.view.is_exit(edge.n) {
                self.process_exit(&edge, f);
            } else {
                self.process_normal(&edge, f);
            }
        }
    }

    fn jump_fn(&self, sp: InstId, d1: &P::Fact, n: InstId, d2: &P::Fact) -> EdgeFn<P::Value> {
        self.jump_fns
            .get(&(sp, d1.clone()))
            .and_then(|inner| inner.get(&(n, d2.clone())))
            .cloned()
            .unwrap_or_else(|| self.problem.all_top())
    }

    /// Join `f` into the jump-function table and re-enqueue the path
    /// edge when the entry actually changed.
    fn propagate(&mut self, sp: InstId, d1: P::Fact, n: InstId, d2: P::Fact, f: EdgeFn<P::Value>) {
        let inner = self.jump_fns.entry((sp, d1.clone())).or_default();
        let merged = match inner.get(&(n, d2.clone())) {
            Some(existing) => {
                let joined = join_fns(existing.clone(), f);
                if joined.equal_to(&**existing) {
                    return;
                }
                joined
            }
            None => f,
        };
        trace!(?sp, ?n, "propagate path edge");
        inner.insert((n, d2.clone()), merged);
        self.worklist.push_back(PathEdge { sp, d1, n, d2 });
    }

    fn process_normal(&mut self, edge: &PathEdge<P::Fact>, f: EdgeFn<P::Value>) {
        for m in self.view.successors_of(edge.n) {
            for d3 in self.problem.normal_flow(edge.n, m, &edge.d2) {
                let step = self.problem.normal_edge(edge.n, &edge.d2, m, &d3);
                self.propagate(edge.sp, edge.d1.clone(), m, d3, compose(f.clone(), step));
            }
        }
    }

    fn process_call(&mut self, edge: &PathEdge<P::Fact>, f_caller: EdgeFn<P::Value>) {
        let call = edge.n;
        let ret_sites = self.view.return_sites_of(call);
        let callees: FxHashSet<FunctionId> = self
            .call_graph
            .targets_of_call(call)
            .cloned()
            .unwrap_or_default();

        for callee in &callees {
            // Problem-level summary replaces descending into the body.
            if let Some(facts) = self.problem.summary_flow(call, *callee, &edge.d2) {
                for &r in &ret_sites {
                    for d3 in &facts {
                        let step = self.problem.summary_edge(call, &edge.d2, r, d3);
                        self.propagate(
                            edge.sp,
                            edge.d1.clone(),
                            r,
                            d3.clone(),
                            compose(f_caller.clone(), step),
                        );
                    }
                }
                continue;
            }

            // Bodyless targets contribute nothing; the call-to-return
            // path below still runs.
            let Some(entry) = self.view.entry_of(*callee) else {
                continue;
            };

            for d3 in self.problem.call_flow(call, *callee, &edge.d2) {
                let entry_key = (*callee, d3.clone());
                self.incoming.entry(entry_key.clone()).or_default().insert((
                    edge.sp,
                    edge.d1.clone(),
                    call,
                    edge.d2.clone(),
                ));

                if self.entry_analyses.contains_key(&entry_key) {
                    self.stats.num_summary_reuses += 1;
                } else {
                    self.entry_analyses.insert(entry_key.clone(), 1);
                    self.propagate(entry, d3.clone(), entry, d3.clone(), edgefn::identity());
                }

                // Splice summaries that already exist for this entry.
                let summaries: Vec<(InstId, P::Fact, EdgeFn<P::Value>)> = self
                    .end_summaries
                    .get(&entry_key)
                    .map(|m| {
                        m.iter()
                            .map(|((exit, d4), f_sum)| (*exit, d4.clone(), f_sum.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                for (exit, d4, f_sum) in summaries {
                    self.apply_summary(
                        edge.sp,
                        &edge.d1,
                        call,
                        &edge.d2,
                        &f_caller,
                        *callee,
                        &d3,
                        exit,
                        &d4,
                        &f_sum,
                        &ret_sites,
                    );
                }
            }
        }

        // Call-to-return runs unconditionally; for an unresolved call
        // (empty target set) it is the only flow across the site.
        for &r in &ret_sites {
            for d3 in self.problem.call_to_ret_flow(call, r, &callees, &edge.d2) {
                let step = self.problem.call_to_ret_edge(call, &edge.d2, r, &d3);
                self.propagate(
                    edge.sp,
                    edge.d1.clone(),
                    r,
                    d3,
                    compose(f_caller.clone(), step),
                );
            }
        }
    }

    fn process_exit(&mut self, edge: &PathEdge<P::Fact>, f_sum: EdgeFn<P::Value>) {
        let callee = self.view.function_of(edge.n);
        let entry_key = (callee, edge.d1.clone());

        let summaries = self.end_summaries.entry(entry_key.clone()).or_default();
        let exit_key = (edge.n, edge.d2.clone());
        let merged = match summaries.get(&exit_key) {
            Some(existing) => {
                let joined = join_fns(existing.clone(), f_sum);
                if joined.equal_to(&**existing) {
                    return;
                }
                joined
            }
            None => f_sum,
        };
        summaries.insert(exit_key, merged.clone());

        // Replay the grown summary into every caller seen so far; new
        // callers pick it up at call-processing time.
        let callers: Vec<(InstId, P::Fact, InstId, P::Fact)> = self
            .incoming
            .get(&entry_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        for (c_sp, c_d1, call, call_fact) in callers {
            let f_caller = self.jump_fn(c_sp, &c_d1, call, &call_fact);
            let ret_sites = self.view.return_sites_of(call);
            self.apply_summary(
                c_sp, &c_d1, call, &call_fact, &f_caller, callee, &edge.d1, edge.n, &edge.d2,
                &merged, &ret_sites,
            );
        }
    }

    /// Compose caller prefix, call edge, callee summary and return edge
    /// into the caller's jump table at each return site.
    fn apply_summary(
        &mut self,
        sp: InstId,
        d1: &P::Fact,
        call: InstId,
        call_fact: &P::Fact,
        f_caller: &EdgeFn<P::Value>,
        callee: FunctionId,
        entry_fact: &P::Fact,
        exit: InstId,
        exit_fact: &P::Fact,
        f_sum: &EdgeFn<P::Value>,
        ret_sites: &[InstId],
    ) {
        for &r in ret_sites {
            for d5 in self
                .problem
                .return_flow(call, callee, exit, r, exit_fact)
            {
                let f_call = self.problem.call_edge(call, call_fact, callee, entry_fact);
                let f_ret = self
                    .problem
                    .return_edge(call, callee, exit, exit_fact, r, &d5);
                let through_callee = compose(f_call, compose(f_sum.clone(), f_ret));
                self.propagate(
                    sp,
                    d1.clone(),
                    r,
                    d5,
                    compose(f_caller.clone(), through_callee),
                );
            }
        }
    }

    /// Phase 2: push concrete lattice values through the jump functions.
    fn compute_values(&self) -> FxHashMap<(InstId, P::Fact), P::Value> {
        let mut vals: FxHashMap<(InstId, P::Fact), P::Value> = FxHashMap::default();
        let mut worklist: VecDeque<(InstId, P::Fact)> = VecDeque::new();

        let zero = self.problem.zero_value();
        for n in self.problem.initial_seeds().into_keys() {
            let key = (n, zero.clone());
            vals.insert(key.clone(), self.problem.top_element());
            worklist.push_back(key);
        }

        while let Some((sp, d1)) = worklist.pop_front() {
            let entry_val = match vals.get(&(sp, d1.clone())) {
                Some(v) => v.clone(),
                None => self.problem.top_element(),
            };
            let Some(inner) = self.jump_fns.get(&(sp, d1.clone())) else {
                continue;
            };

            for ((n, d2), f) in inner {
                let v = f.apply_to(&entry_val);
                let key = (*n, d2.clone());
                merge_value(self.problem, &mut vals, key.clone(), v);

                // Descend into callees with the value at the call site.
                if !self.view.is_call(*n) {
                    continue;
                }
                let node_val = match vals.get(&key) {
                    Some(v) => v.clone(),
                    None => continue,
                };
                let Some(targets) = self.call_graph.targets_of_call(*n) else {
                    continue;
                };
                for callee in targets {
                    if self.problem.summary_flow(*n, *callee, d2).is_some() {
                        continue;
                    }
                    let Some(entry) = self.view.entry_of(*callee) else {
                        continue;
                    };
                    for d3 in self.problem.call_flow(*n, *callee, d2) {
                        let ev = self
                            .problem
                            .call_edge(*n, d2, *callee, &d3)
                            .apply_to(&node_val);
                        let entry_pair = (entry, d3);
                        if merge_value(self.problem, &mut vals, entry_pair.clone(), ev) {
                            worklist.push_back(entry_pair);
                        }
                    }
                }
            }
        }
        vals
    }
}

/// Join `v` into `vals[key]`; true when the stored value grew.
fn merge_value<P: IdeProblem>(
    problem: &P,
    vals: &mut FxHashMap<(InstId, P::Fact), P::Value>,
    key: (InstId, P::Fact),
    v: P::Value,
) -> bool {
    match vals.get_mut(&key) {
        Some(existing) => {
            let joined = problem.join_values(existing, &v);
            if joined == *existing {
                false
            } else {
                *existing = joined;
                true
            }
        }
        None => {
            vals.insert(key, v);
            true
        }
    }
}
