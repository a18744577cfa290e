//! Property-based tests for the program builder.
//!
//! Tests that generated names stay unique, statements keep emission order,
//! and block discipline holds for arbitrary operation sequences.

use proptest::prelude::*;
use qpulse_ir::prelude::*;
use qpulse_ir::{ElementType as Ty, IrError, Literal, Program, StatementKind};

/// Declaration requests.
#[derive(Debug, Clone)]
enum DeclOp {
    Scalar(Ty),
    Array(Ty, usize),
    Stream,
}

fn arb_type() -> impl Strategy<Value = Ty> {
    prop_oneof![Just(Ty::Int), Just(Ty::Fixed), Just(Ty::Bool)]
}

fn arb_decl_op() -> impl Strategy<Value = DeclOp> {
    prop_oneof![
        arb_type().prop_map(DeclOp::Scalar),
        (arb_type(), 1_usize..20).prop_map(|(t, n)| DeclOp::Array(t, n)),
        Just(DeclOp::Stream),
    ]
}

/// Statements emitted at top level.
#[derive(Debug, Clone)]
enum StmtOp {
    Play(u8),
    Wait(i64),
    Align,
    Pause,
}

fn arb_stmt_op() -> impl Strategy<Value = StmtOp> {
    prop_oneof![
        (0_u8..4).prop_map(StmtOp::Play),
        (4_i64..1000).prop_map(StmtOp::Wait),
        Just(StmtOp::Align),
        Just(StmtOp::Pause),
    ]
}

fn stmt_name(op: &StmtOp) -> &'static str {
    match op {
        StmtOp::Play(_) => "play",
        StmtOp::Wait(_) => "wait",
        StmtOp::Align => "align",
        StmtOp::Pause => "pause",
    }
}

fn build(ops: &[StmtOp]) -> Program {
    let mut b = ProgramBuilder::new();
    for op in ops {
        match op {
            StmtOp::Play(n) => b.play(format!("pulse{n}"), "e").unwrap(),
            StmtOp::Wait(t) => b.wait(*t, &["e"]).unwrap(),
            StmtOp::Align => b.align(&["e", "f"]).unwrap(),
            StmtOp::Pause => b.pause().unwrap(),
        };
    }
    b.finish().unwrap()
}

proptest! {
    #[test]
    fn declared_names_are_unique_and_sequential(
        ops in prop::collection::vec(arb_decl_op(), 1..40),
    ) {
        let mut b = ProgramBuilder::new();
        let mut names = Vec::new();
        let (mut v, mut a, mut r) = (0, 0, 0);
        for op in &ops {
            let name = match op {
                DeclOp::Scalar(t) => {
                    v += 1;
                    let var = b.declare(*t).unwrap();
                    prop_assert_eq!(var.name(), format!("v{v}"));
                    var.name().to_string()
                }
                DeclOp::Array(t, n) => {
                    a += 1;
                    let arr = b.declare_array(*t, *n).unwrap();
                    prop_assert_eq!(arr.name(), format!("a{a}"));
                    arr.name().to_string()
                }
                DeclOp::Stream => {
                    r += 1;
                    let s = b.declare_stream();
                    prop_assert_eq!(s.name(), format!("r{r}"));
                    s.name().to_string()
                }
            };
            prop_assert!(!names.contains(&name));
            names.push(name);
        }
        let program = b.finish().unwrap();
        prop_assert_eq!(program.declarations().len(), v + a);
    }

    #[test]
    fn statements_keep_emission_order(ops in prop::collection::vec(arb_stmt_op(), 0..30)) {
        let program = build(&ops);
        let emitted: Vec<_> = program
            .root_body()
            .statements
            .iter()
            .map(|s| s.kind.name())
            .collect();
        let expected: Vec<_> = ops.iter().map(stmt_name).collect();
        prop_assert_eq!(emitted, expected);
    }

    #[test]
    fn else_accepted_only_after_if(
        before_else in prop::collection::vec(arb_stmt_op(), 0..4),
        with_if in any::<bool>(),
    ) {
        let mut b = ProgramBuilder::new();
        let x = b.declare(Ty::Int).unwrap();
        if with_if {
            b.if_(x.gt(0)).unwrap().end().unwrap();
        }
        for op in &before_else {
            match op {
                StmtOp::Pause => b.pause().unwrap(),
                _ => b.align(&["e"]).unwrap(),
            };
        }
        let result = b.else_().map(|_| ());
        if with_if && before_else.is_empty() {
            prop_assert!(result.is_ok());
            prop_assert!(matches!(b.else_().map(|_| ()), Err(IrError::Structure(_))));
        } else {
            prop_assert!(matches!(result, Err(IrError::Structure(_))));
        }
    }

    #[test]
    fn for_each_requires_equal_lengths(n in 1_usize..8, m in 1_usize..8) {
        let mut b = ProgramBuilder::new();
        let x = b.declare(Ty::Int).unwrap();
        let y = b.declare(Ty::Int).unwrap();
        let first: Vec<i64> = (0..n as i64).collect();
        let second: Vec<i64> = (0..m as i64).collect();
        let result = b
            .for_each_(&[x, y], vec![first.into(), second.into()])
            .map(|_| ());
        if n == m {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(matches!(result, Err(IrError::Value(_))), "expected value error");
        }
    }

    #[test]
    fn inferred_array_type(
        values in prop::collection::vec(any::<i32>(), 1..10),
        fixed in any::<bool>(),
    ) {
        let mut literals: Vec<Literal> =
            values.iter().map(|v| Literal::Int(i64::from(*v))).collect();
        if fixed {
            literals.push(Literal::Fixed(0.5));
        }
        let mut b = ProgramBuilder::new();
        let x = b.declare(Ty::Fixed).unwrap();
        b.for_each_(&[x], vec![literals.into()]).unwrap().end().unwrap();
        let program = b.finish().unwrap();
        let expected = if fixed { Ty::Fixed } else { Ty::Int };
        prop_assert_eq!(program.declaration("a1").unwrap().element_type, expected);
        prop_assert!(matches!(
            program.root_body().statements[0].kind,
            StatementKind::ForEach { .. }
        ), "first statement is not a ForEach");
    }
}
