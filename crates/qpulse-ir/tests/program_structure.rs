//! Integration tests for program construction.
//!
//! These tests build complete programs through the public API and check the
//! shape of the resulting statement tree, declarations and pipeline section.

use qpulse_ir::prelude::*;
use qpulse_ir::{
    Body, Declared, DeclareOptions, InitValue, IrError, Literal, PlayStatement, Program,
    StatementKind, StreamOperator, TimestampMode,
};

/// Helper: statement names of a block.
fn names(body: &Body) -> Vec<&'static str> {
    body.statements.iter().map(|s| s.kind.name()).collect()
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_for_loop_with_single_play() {
    let mut b = ProgramBuilder::new();
    let i = b.declare(ElementType::Int).unwrap();
    {
        let mut body = b.for_(ForSpec::range(&i, 0, i.lt(10), &i + 1)).unwrap();
        body.play("p", "e").unwrap();
    }
    let program = b.finish().unwrap();

    let root = program.root_body();
    assert_eq!(root.len(), 1);
    let StatementKind::For(f) = &root.statements[0].kind else {
        panic!("expected a for statement");
    };
    assert_eq!(f.condition, Some(i.lt(10)));

    let body = program.body(f.body).unwrap();
    assert_eq!(body.len(), 1);
    match &body.statements[0].kind {
        StatementKind::Play(PlayStatement { pulse, element, .. }) => {
            assert_eq!(pulse.name(), Some("p"));
            assert_eq!(element, "e");
        }
        other => panic!("unexpected {other:?}"),
    }

    let init = program.body(f.init).unwrap();
    let update = program.body(f.update).unwrap();
    assert_eq!(names(init), vec!["assign"]);
    assert_eq!(names(update), vec!["assign"]);
}

#[test]
fn test_second_else_fails() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    {
        let mut s = b.if_(x.gt(0)).unwrap();
        s.play("a", "e").unwrap();
    }
    b.else_().unwrap().end().unwrap();
    let err = b.else_().unwrap_err();
    assert!(matches!(err, IrError::Structure(_)));
    assert_eq!(
        err.to_string(),
        "Structure error: only a single 'else' statement can follow an 'if' statement"
    );
}

#[test]
fn test_else_after_other_statement_fails() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    b.if_(x.gt(0)).unwrap().end().unwrap();
    b.wait(4, &["e"]).unwrap();
    assert!(matches!(b.else_(), Err(IrError::Structure(_))));
}

#[test]
fn test_nested_blocks_close_in_order() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    {
        let mut outer = b.infinite_loop_().unwrap();
        {
            let mut inner = outer.if_(x.equals(1)).unwrap();
            inner.assign(&x, 0).unwrap();
        }
        outer.assign(&x, &x + 1).unwrap();
        assert_eq!(outer.scopes().depth(), 2);
    }
    assert_eq!(b.scopes().depth(), 1);

    let program = b.finish().unwrap();
    let all: Vec<_> = program.statements().iter().map(|s| s.kind.name()).collect();
    // init and update blocks are empty
    assert_eq!(all, vec!["for", "if", "assign", "assign"]);
}

#[test]
fn test_for_each_length_mismatch() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Fixed).unwrap();
    let y = b.declare(ElementType::Fixed).unwrap();
    let err = b
        .for_each_(
            &[x, y],
            vec![vec![0.1, 0.2].into(), vec![0.1, 0.2, 0.3].into()],
        )
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, IrError::Value(_)));
}

#[test]
fn test_for_each_over_declared_array() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    let amps = b.declare_array_init(ElementType::Int, [1, 2, 3]).unwrap();
    {
        let mut s = b.for_each_(&[x.clone()], vec![(&amps).into()]).unwrap();
        s.wait(&x, &["e"]).unwrap();
    }
    let program = b.finish().unwrap();
    let StatementKind::ForEach { iterators, .. } = &program.root_body().statements[0].kind else {
        panic!("expected for_each");
    };
    assert_eq!(iterators, &vec![(x, amps)]);
}

// ============================================================================
// Declarations
// ============================================================================

#[test]
fn test_declaration_names_and_values() {
    let mut b = ProgramBuilder::new();
    let v = b.declare_init(ElementType::Int, 5).unwrap();
    let a = b.declare_array_init(ElementType::Fixed, [0.5, 1.5]).unwrap();
    let s = b.declare_stream();
    let w = b.declare(ElementType::Bool).unwrap();

    assert_eq!(v.name(), "v1");
    assert_eq!(a.name(), "a1");
    assert_eq!(s.name(), "r1");
    assert_eq!(w.name(), "v2");

    let program = b.finish().unwrap();
    let decl = program.declaration("a1").unwrap();
    assert_eq!(decl.size, 2);
    assert_eq!(decl.values, vec![Literal::Fixed(0.5), Literal::Fixed(1.5)]);
    assert_eq!(
        program.declaration("v1").unwrap().values,
        vec![Literal::Int(5)]
    );
}

#[test]
fn test_declare_rejects_size_and_value() {
    let mut b = ProgramBuilder::new();
    let options = DeclareOptions {
        size: Some(2),
        value: Some(InitValue::List(vec![Literal::Int(1), Literal::Int(2)])),
    };
    assert!(matches!(
        b.declare_with(ElementType::Int, options),
        Err(IrError::Value(_))
    ));
    assert!(matches!(
        b.declare_with(ElementType::Int, DeclareOptions::size(0)),
        Err(IrError::Value(_))
    ));
    assert!(matches!(
        b.declare_with(ElementType::Int, DeclareOptions::size(3)),
        Ok(Declared::Array(_))
    ));
}

#[test]
fn test_declare_inside_nested_block() {
    let mut b = ProgramBuilder::new();
    {
        let mut s = b.infinite_loop_().unwrap();
        let tmp = s.declare(ElementType::Int).unwrap();
        s.assign(&tmp, 1).unwrap();
    }
    let program = b.finish().unwrap();
    assert_eq!(program.declarations().len(), 1);
}

// ============================================================================
// Stream processing
// ============================================================================

#[test]
fn test_shared_pipeline_prefix() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Fixed).unwrap();
    let s = b.declare_stream();
    b.save(&x, &s).unwrap();
    {
        let mut sp = b.stream_processing().unwrap();
        let buffered = s.buffer(&[2, 5]);
        buffered.average().save(&mut sp, "mean");
        buffered.save_all(&mut sp, "raw");
        s.with_timestamps().save_all(&mut sp, "stamped");
    }
    let program = b.finish().unwrap();

    let mean = program.sink("mean").unwrap();
    assert!(mean.kind.is_single());
    let ops = mean.pipeline.operators();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0], &StreamOperator::Buffer(vec![2, 5]));
    assert_eq!(ops[1], &StreamOperator::Average);

    let stamped = program.sink("stamped").unwrap();
    assert_eq!(stamped.pipeline.source().timestamps, TimestampMode::With);
    assert_eq!(stamped.pipeline.source().name, "r1");
}

#[test]
fn test_stream_is_not_an_expression() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    let s = b.declare_stream();
    let err = Expression::binary(qpulse_ir::BinaryOperator::Add, &x, &s).unwrap_err();
    assert!(matches!(err, IrError::Type(_)));
}

#[test]
fn test_histogram_bins() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Int).unwrap();
    let s = b.declare_stream();
    b.save(&x, &s).unwrap();
    {
        let mut sp = b.stream_processing().unwrap();
        s.histogram(&bins(0, 10, 5)).save(&mut sp, "hist");
    }
    let program = b.finish().unwrap();
    let ops = program.sink("hist").unwrap().pipeline.operators();
    match ops[0] {
        StreamOperator::Histogram(b) => assert_eq!(b.len(), 5),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_program_json_roundtrip() {
    let mut b = ProgramBuilder::new();
    let x = b.declare(ElementType::Fixed).unwrap();
    let s = b.declare_stream();
    {
        let mut l = b.while_(x.lt(1.0)).unwrap();
        l.play(Pulse::named("gauss").amp(&x * 0.5), "q").unwrap();
        l.assign(&x, &x + 0.1).unwrap();
        l.save(&x, &s).unwrap();
    }
    {
        let mut sp = b.stream_processing().unwrap();
        s.save_all(&mut sp, "x");
    }
    let program = b.finish().unwrap();

    let json = program.to_json_pretty().unwrap();
    let restored = Program::from_json(&json).unwrap();
    assert_eq!(restored, program);
}
