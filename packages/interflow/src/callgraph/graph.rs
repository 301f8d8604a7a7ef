/*
 * Materialized call graph
 *
 * Built once per analysis run by walking every instruction through a
 * resolution strategy; the solvers then consult the recorded per-call
 * target sets instead of re-resolving. Address-taken bookkeeping runs
 * over the whole program before any call is resolved, so a
 * function-pointer call sees every address-taken function regardless of
 * instruction order.
 */

use petgraph::graphmap::DiGraphMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::resolver::CallResolver;
use crate::program::{FunctionId, InstId, ProgramView};

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraphMap<FunctionId, ()>,
    call_targets: FxHashMap<InstId, FxHashSet<FunctionId>>,
}

impl CallGraph {
    /// Build the call graph for the whole program view.
    pub fn build<V: ProgramView, R: CallResolver>(view: &V, resolver: &mut R) -> Self {
        // Bookkeeping pass over every instruction first, calls
        // included: a function address can escape as a call argument,
        // and a function-pointer call earlier in program order must
        // still see it in the address-taken set.
        for f in view.functions() {
            for &i in view.instructions_of(f) {
                resolver.other_inst(i);
            }
        }

        let mut cg = CallGraph::default();
        for f in view.functions() {
            cg.graph.add_node(f);
        }
        for f in view.functions() {
            for &i in view.instructions_of(f) {
                if !view.is_call(i) {
                    continue;
                }
                resolver.pre_call(i);
                let mut targets = resolver.resolve(i);
                resolver.handle_possible_targets(i, &mut targets);
                resolver.post_call(i);

                if targets.is_empty() {
                    debug!(call = ?i, "call site has no resolvable targets");
                }
                for t in &targets {
                    cg.graph.add_edge(f, *t, ());
                }
                cg.call_targets.insert(i, targets);
            }
        }
        debug!(
            functions = cg.num_functions(),
            call_edges = cg.num_call_edges(),
            "call graph built"
        );
        cg
    }

    /// Targets recorded for a call instruction. `None` for instructions
    /// that are not calls; an empty set for unresolved calls.
    pub fn targets_of_call(&self, call: InstId) -> Option<&FxHashSet<FunctionId>> {
        self.call_targets.get(&call)
    }

    /// Functions a function may call.
    pub fn callees_of(&self, f: FunctionId) -> Vec<FunctionId> {
        self.graph
            .neighbors_directed(f, petgraph::Direction::Outgoing)
            .collect()
    }

    /// Functions that may call `f`.
    pub fn callers_of(&self, f: FunctionId) -> Vec<FunctionId> {
        self.graph
            .neighbors_directed(f, petgraph::Direction::Incoming)
            .collect()
    }

    /// Functions that no recorded call targets.
    pub fn entry_points(&self) -> Vec<FunctionId> {
        self.graph
            .nodes()
            .filter(|f| self.callers_of(*f).is_empty())
            .collect()
    }

    /// Functions with no outgoing call edges.
    pub fn leaf_functions(&self) -> Vec<FunctionId> {
        self.graph
            .nodes()
            .filter(|f| self.callees_of(*f).is_empty())
            .collect()
    }

    pub fn num_functions(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_call_edges(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::resolver::ChaResolver;
    use crate::program::{
        CallSite, CallTargetExpr, InstKind, Operand, ProgramBuilder, Signature, ValueKind,
    };

    fn direct_call(callee: FunctionId) -> InstKind {
        InstKind::Call(CallSite {
            target: CallTargetExpr::Direct(callee),
            args: vec![],
            dest: None,
        })
    }

    #[test]
    fn test_direct_call_edges() {
        let mut b = ProgramBuilder::new();
        let callee = b.simple_function("callee");
        b.inst(callee, InstKind::Return { value: None });
        let main = b.simple_function("main");
        b.inst(main, direct_call(callee));
        b.inst(main, InstKind::Return { value: None });
        let db = b.build();

        let mut resolver = ChaResolver::new(&db);
        let cg = CallGraph::build(&db, &mut resolver);

        assert_eq!(cg.num_functions(), 2);
        assert_eq!(cg.callees_of(main), vec![callee]);
        assert_eq!(cg.callers_of(callee), vec![main]);
        assert_eq!(cg.entry_points(), vec![main]);
        assert_eq!(cg.leaf_functions(), vec![callee]);
    }

    #[test]
    fn test_virtual_call_resolves_subtype_cone() {
        let mut b = ProgramBuilder::new();
        let f = b.simple_function("f");
        b.inst(f, InstKind::Return { value: None });
        let g = b.simple_function("g");
        b.inst(g, InstKind::Return { value: None });

        let base = b.hierarchy_mut().add_type("B", vec![], vec![Some(f)]);
        let _derived = b.hierarchy_mut().add_type("D", vec![base], vec![Some(g)]);

        let recv = b.ptr_value("recv", Some(base));
        let main = b.simple_function("main");
        let call = b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Virtual {
                    receiver: recv,
                    slot: 0,
                },
                args: vec![],
                dest: None,
            }),
        );
        b.inst(main, InstKind::Return { value: None });
        let db = b.build();

        let mut resolver = ChaResolver::new(&db);
        let cg = CallGraph::build(&db, &mut resolver);
        let targets = cg.targets_of_call(call).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&f));
        assert!(targets.contains(&g));
    }

    #[test]
    fn test_function_pointer_restricted_to_address_taken() {
        let mut b = ProgramBuilder::new();
        let sig = Signature::new(vec![ValueKind::Int], None);

        let p0 = b.int_value("a");
        let taken = b.function("taken", vec![p0], sig.clone());
        b.inst(taken, InstKind::Return { value: None });
        let p1 = b.int_value("b");
        let not_taken = b.function("not_taken", vec![p1], sig.clone());
        b.inst(not_taken, InstKind::Return { value: None });

        let fp = b.ptr_value("fp", None);
        let x = b.int_value("x");
        let main = b.simple_function("main");
        b.inst(
            main,
            InstKind::Assign {
                dest: fp,
                src: Operand::Func(taken),
            },
        );
        let call = b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Pointer {
                    callee: fp,
                    signature: sig,
                },
                args: vec![Operand::Value(x)],
                dest: None,
            }),
        );
        b.inst(main, InstKind::Return { value: None });
        let db = b.build();

        let mut resolver = ChaResolver::new(&db);
        let cg = CallGraph::build(&db, &mut resolver);
        let targets = cg.targets_of_call(call).unwrap();
        assert_eq!(targets.len(), 1);
        assert!(targets.contains(&taken));
    }

    /// A function address escaping as a call argument counts as
    /// address-taken for the whole program, even for a function-pointer
    /// call that precedes the escaping call in program order.
    #[test]
    fn test_address_escaping_as_call_argument_seen_by_earlier_fp_call() {
        let mut b = ProgramBuilder::new();
        let sig = Signature::new(vec![ValueKind::Int], None);

        let p0 = b.int_value("a");
        let f2 = b.function("f2", vec![p0], sig.clone());
        b.inst(f2, InstKind::Return { value: None });
        let p1 = b.int_value("b");
        let g = b.function("g", vec![p1], sig.clone());
        b.inst(g, InstKind::Return { value: None });

        let cb = b.ptr_value("cb", None);
        let sink = b.function("sink", vec![cb], Signature::new(vec![ValueKind::Ptr], None));
        b.inst(sink, InstKind::Return { value: None });

        let fp = b.ptr_value("fp", None);
        let main = b.simple_function("main");
        b.inst(
            main,
            InstKind::Assign {
                dest: fp,
                src: Operand::Func(f2),
            },
        );
        let fp_call = b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Pointer {
                    callee: fp,
                    signature: sig,
                },
                args: vec![Operand::Const(0)],
                dest: None,
            }),
        );
        b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Direct(sink),
                args: vec![Operand::Func(g)],
                dest: None,
            }),
        );
        b.inst(main, InstKind::Return { value: None });
        let db = b.build();

        let mut resolver = ChaResolver::new(&db);
        let cg = CallGraph::build(&db, &mut resolver);
        let targets = cg.targets_of_call(fp_call).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&f2));
        assert!(targets.contains(&g));
    }

    #[test]
    fn test_unresolved_call_records_empty_set() {
        let mut b = ProgramBuilder::new();
        let fp = b.ptr_value("fp", None);
        let main = b.simple_function("main");
        let call = b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Pointer {
                    callee: fp,
                    signature: Signature::new(vec![ValueKind::Ptr, ValueKind::Ptr], None),
                },
                args: vec![],
                dest: None,
            }),
        );
        b.inst(main, InstKind::Return { value: None });
        let db = b.build();

        let mut resolver = ChaResolver::new(&db);
        let cg = CallGraph::build(&db, &mut resolver);
        let targets = cg.targets_of_call(call).unwrap();
        assert!(targets.is_empty());
    }
}
