/*
 * End-to-end solver scenarios
 *
 * Whole-pipeline tests: program construction, call-graph resolution and
 * a full solver run, checked against hand-computed fixpoints.
 */

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

use interflow::mono::MonoSolver;
use interflow::problems::{CpFact, LinearConstants, MemDef, MemReachDefs, ValueSet};
use interflow::program::{
    BinOpKind, CallSite, CallTargetExpr, InstKind, Operand, ProgramBuilder, Signature, ValueKind,
};
use interflow::{
    AnalysisConfig, CallGraph, ChaResolver, ProgramDb, ProgramView, TabulationSolver,
};

fn vals(values: &[i64], cap: usize) -> ValueSet {
    ValueSet::from_set(values.iter().copied().collect::<BTreeSet<_>>(), cap)
}

fn solve_constants(
    db: &ProgramDb,
    entry: interflow::FunctionId,
    config: AnalysisConfig,
) -> interflow::SolverResults<CpFact, ValueSet> {
    let problem = LinearConstants::new(db, entry, &config).expect("entry has a body");
    let mut resolver = ChaResolver::new(db);
    let cg = CallGraph::build(db, &mut resolver);
    TabulationSolver::new(db, &cg, &problem, config)
        .expect("valid config")
        .solve()
}

/// A virtual call on a base-typed receiver reaches every concrete
/// override in the subtype cone, and the caller sees the join of all
/// their return values.
#[test]
fn virtual_dispatch_joins_over_subtype_cone() {
    let mut b = ProgramBuilder::new();
    let ret_int = Signature::new(vec![], Some(ValueKind::Int));

    let f = b.function("B::m", vec![], ret_int.clone());
    b.inst(
        f,
        InstKind::Return {
            value: Some(Operand::Const(1)),
        },
    );
    let g = b.function("D::m", vec![], ret_int);
    b.inst(
        g,
        InstKind::Return {
            value: Some(Operand::Const(2)),
        },
    );

    let base = b.hierarchy_mut().add_type("B", vec![], vec![Some(f)]);
    let _derived = b.hierarchy_mut().add_type("D", vec![base], vec![Some(g)]);

    // Unrelated hierarchy with the same slot index must stay out.
    let h = b.function("X::m", vec![], Signature::new(vec![], Some(ValueKind::Int)));
    b.inst(
        h,
        InstKind::Return {
            value: Some(Operand::Const(99)),
        },
    );
    let _unrelated = b.hierarchy_mut().add_type("X", vec![], vec![Some(h)]);

    let recv = b.ptr_value("recv", Some(base));
    let y = b.int_value("y");
    let main = b.simple_function("main");
    let call = b.inst(
        main,
        InstKind::Call(CallSite {
            target: CallTargetExpr::Virtual {
                receiver: recv,
                slot: 0,
            },
            args: vec![],
            dest: Some(y),
        }),
    );
    let ret = b.inst(main, InstKind::Return { value: None });
    let db = b.build();

    let mut resolver = ChaResolver::new(&db);
    let cg = CallGraph::build(&db, &mut resolver);
    let targets = cg.targets_of_call(call).expect("call site recorded");
    assert_eq!(targets.len(), 2);
    assert!(targets.contains(&f));
    assert!(targets.contains(&g));
    assert!(!targets.contains(&h));

    let results = solve_constants(&db, main, AnalysisConfig::default());
    assert_eq!(results.lookup(ret, &CpFact::Var(y)), Some(vals(&[1, 2], 4)));
}

/// Joining one candidate more than the cap allows widens the whole set
/// to Bottom; within the cap the union is kept exactly.
#[test]
fn candidate_set_widens_exactly_at_cap() {
    fn three_way_assign() -> (ProgramDb, interflow::FunctionId, interflow::ValueId, interflow::InstId)
    {
        let mut b = ProgramBuilder::new();
        let x = b.int_value("x");
        let main = b.simple_function("main");
        let head = b.inst(main, InstKind::Nop);
        let arms: Vec<_> = (1..=3)
            .map(|c| {
                b.inst(
                    main,
                    InstKind::Assign {
                        dest: x,
                        src: Operand::Const(c),
                    },
                )
            })
            .collect();
        let merge = b.inst(main, InstKind::Nop);
        b.inst(main, InstKind::Return { value: None });
        for &arm in &arms {
            b.edge(head, arm);
            b.edge(arm, merge);
        }
        (b.build(), main, x, merge)
    }

    let (db, main, x, merge) = three_way_assign();
    let results = solve_constants(&db, main, AnalysisConfig::default().with_max_set_size(2));
    assert_eq!(results.lookup(merge, &CpFact::Var(x)), Some(ValueSet::Bottom));

    let (db, main, x, merge) = three_way_assign();
    let results = solve_constants(&db, main, AnalysisConfig::default().with_max_set_size(3));
    assert_eq!(
        results.lookup(merge, &CpFact::Var(x)),
        Some(vals(&[1, 2, 3], 3))
    );
}

/// An unresolved function-pointer call is not an error: caller facts
/// survive along the call-to-return path and only the call's dest loses
/// its value.
#[test]
fn unresolved_pointer_call_passes_facts_through() {
    let mut b = ProgramBuilder::new();
    let x = b.int_value("x");
    let y = b.int_value("y");
    let fp = b.ptr_value("fp", None);
    let main = b.simple_function("main");
    b.inst(
        main,
        InstKind::Assign {
            dest: x,
            src: Operand::Const(5),
        },
    );
    let call = b.inst(
        main,
        InstKind::Call(CallSite {
            // No function in the program has this signature.
            target: CallTargetExpr::Pointer {
                callee: fp,
                signature: Signature::new(vec![ValueKind::Ptr, ValueKind::Ptr], None),
            },
            args: vec![],
            dest: Some(y),
        }),
    );
    let ret = b.inst(main, InstKind::Return { value: None });
    let db = b.build();

    let mut resolver = ChaResolver::new(&db);
    let cg = CallGraph::build(&db, &mut resolver);
    assert!(cg.targets_of_call(call).expect("recorded").is_empty());

    let results = solve_constants(&db, main, AnalysisConfig::default());
    assert_eq!(results.lookup(ret, &CpFact::Var(x)), Some(vals(&[5], 4)));
    assert_eq!(results.lookup(ret, &CpFact::Var(y)), Some(ValueSet::Bottom));
}

/// A callee is tabulated once per entry fact; further call sites with
/// the same entry fact reuse the recorded summary.
#[test]
fn procedure_summaries_are_reused_across_call_sites() {
    let mut b = ProgramBuilder::new();
    let sig = Signature::new(vec![ValueKind::Int], Some(ValueKind::Int));
    let p = b.int_value("p");
    let id = b.function("id", vec![p], sig);
    b.inst(id, InstKind::Nop);
    b.inst(
        id,
        InstKind::Return {
            value: Some(Operand::Value(p)),
        },
    );

    let y1 = b.int_value("y1");
    let y2 = b.int_value("y2");
    let main = b.simple_function("main");
    for dest in [y1, y2] {
        b.inst(
            main,
            InstKind::Call(CallSite {
                target: CallTargetExpr::Direct(id),
                args: vec![Operand::Const(5)],
                dest: Some(dest),
            }),
        );
    }
    let ret = b.inst(main, InstKind::Return { value: None });
    let db = b.build();

    let results = solve_constants(&db, main, AnalysisConfig::default());

    assert_eq!(results.analysis_count(id, &CpFact::Var(p)), 1);
    assert_eq!(results.analysis_count(id, &CpFact::Zero), 1);
    assert!(results.stats().num_summary_reuses >= 1);
    assert_eq!(results.lookup(ret, &CpFact::Var(y1)), Some(vals(&[5], 4)));
    assert_eq!(results.lookup(ret, &CpFact::Var(y2)), Some(vals(&[5], 4)));
}

/// A loop keeps adding candidates; the capped join drives the value to
/// Bottom and the fixpoint terminates instead of chasing an unbounded
/// ascending chain.
#[test]
fn loop_converges_to_bottom_under_widening() {
    let mut b = ProgramBuilder::new();
    let x = b.int_value("x");
    let main = b.simple_function("main");
    let init = b.inst(
        main,
        InstKind::Assign {
            dest: x,
            src: Operand::Const(0),
        },
    );
    let head = b.inst(main, InstKind::Nop);
    let body = b.inst(
        main,
        InstKind::BinOp {
            dest: x,
            op: BinOpKind::Add,
            lhs: Operand::Value(x),
            rhs: Operand::Const(1),
        },
    );
    let exit = b.inst(main, InstKind::Return { value: None });
    b.edge(init, head);
    b.edge(head, body);
    b.edge(head, exit);
    b.edge(body, head);
    let db = b.build();

    let results = solve_constants(&db, main, AnalysisConfig::default());
    assert_eq!(results.lookup(exit, &CpFact::Var(x)), Some(ValueSet::Bottom));
    assert!(!results.stats().unsound);
}

/// Recursion terminates because truncated call strings collapse the
/// context space; definitions written through a pointer parameter still
/// reach the caller.
#[test]
fn recursion_is_bounded_by_call_string_depth() {
    let mut b = ProgramBuilder::new();
    let sig = Signature::new(vec![ValueKind::Ptr], None);
    let param = b.ptr_value("param", None);
    let rec = b.function("rec", vec![param], sig);
    let inner_store = b.inst(
        rec,
        InstKind::Store {
            addr: param,
            src: Operand::Const(9),
        },
    );
    b.inst(
        rec,
        InstKind::Call(CallSite {
            target: CallTargetExpr::Direct(rec),
            args: vec![Operand::Value(param)],
            dest: None,
        }),
    );
    b.inst(rec, InstKind::Return { value: None });

    let ptr = b.ptr_value("p", None);
    let main = b.simple_function("main");
    b.inst(
        main,
        InstKind::Call(CallSite {
            target: CallTargetExpr::Direct(rec),
            args: vec![Operand::Value(ptr)],
            dest: None,
        }),
    );
    let ret = b.inst(main, InstKind::Return { value: None });
    let db = b.build();

    let problem = MemReachDefs::new(&db, main, None).expect("entry has a body");
    let mut resolver = ChaResolver::new(&db);
    let cg = CallGraph::build(&db, &mut resolver);
    let config = AnalysisConfig::default().with_call_string_depth(2);
    let results = MonoSolver::new(&db, &cg, &problem, config)
        .expect("valid config")
        .solve();

    // With K = 2 the recursive descent can only mint a handful of
    // distinct contexts before they repeat.
    let rec_entry = db.entry_of(rec).expect("rec has a body");
    assert!(results.contexts_at(rec_entry).len() <= 3);

    let defs = results.facts_at(ret);
    assert!(defs.contains(&MemDef {
        location: ptr,
        def: inner_store,
    }));
}
