//! Result schema inference from a program's pipeline section.

use rustc_hash::FxHashMap;

use qpulse_hal::{ElementDtype, ResultItemSchema, ResultSchema, ScalarKind};
use qpulse_ir::{
    ElementType, MapFunction, PipelineNode, Program, ScalarRef, SourceSpec, StatementKind,
    StreamOperator, TimestampMode,
};

/// Schema of every sink of `program`, in pipeline order.
pub(crate) fn infer_schema(program: &Program) -> ResultSchema {
    let saved = saved_types(program);
    let items = program
        .sinks()
        .iter()
        .map(|sink| ResultItemSchema {
            name: sink.tag.clone(),
            is_single: sink.kind.is_single(),
            expected_count: if sink.kind.is_single() {
                Some(1)
            } else {
                expected_count(&sink.pipeline)
            },
            dtype: pipeline_dtype(&sink.pipeline, &saved),
        })
        .collect();
    ResultSchema { items }
}

/// Element type of the variables saved into each stream source.
fn saved_types(program: &Program) -> FxHashMap<String, ElementType> {
    let mut saved = FxHashMap::default();
    for statement in program.statements() {
        let StatementKind::Save { source, stream } = &statement.kind else {
            continue;
        };
        let declaration = match source {
            ScalarRef::Variable(var) => var.name(),
            ScalarRef::ArrayCell { array, .. } => array.name(),
        };
        if let Some(declaration) = program.declaration(declaration) {
            saved
                .entry(stream.clone())
                .or_insert(declaration.element_type);
        }
    }
    saved
}

fn source_dtype(spec: &SourceSpec, saved: &FxHashMap<String, ElementType>) -> ElementDtype {
    if spec.timestamps == TimestampMode::Only {
        return ElementDtype::scalar(ScalarKind::Int);
    }
    let kind = if spec.adc_trace {
        ScalarKind::Int
    } else {
        saved
            .get(&spec.name)
            .map_or(ScalarKind::Float, |ty| ScalarKind::from_element_type(*ty))
    };
    let dtype = ElementDtype::scalar(kind);
    if spec.timestamps == TimestampMode::With {
        dtype.with_timestamps()
    } else {
        dtype
    }
}

fn pipeline_dtype(node: &PipelineNode, saved: &FxHashMap<String, ElementType>) -> ElementDtype {
    match node {
        PipelineNode::Source(spec) => source_dtype(spec, saved),
        PipelineNode::Stage { op, upstream } => {
            let input = pipeline_dtype(upstream, saved);
            apply_operator(op, input, saved)
        }
    }
}

/// Output dtype of one stage. Only the pass-through operators keep timestamps.
fn apply_operator(
    op: &StreamOperator<Box<PipelineNode>>,
    input: ElementDtype,
    saved: &FxHashMap<String, ElementType>,
) -> ElementDtype {
    let shape = input.shape.clone();
    match op {
        StreamOperator::Skip(_) | StreamOperator::SkipLast(_) | StreamOperator::Take(_) => input,
        StreamOperator::Average => ElementDtype::scalar(ScalarKind::Float).with_shape(shape),
        StreamOperator::Buffer(dims) => {
            ElementDtype::scalar(input.kind).with_shape(prepend(dims, &shape))
        }
        StreamOperator::BufferAndSkip { length, .. } => {
            ElementDtype::scalar(input.kind).with_shape(prepend(&[*length], &shape))
        }
        StreamOperator::Flatten => {
            ElementDtype::scalar(input.kind).with_shape(shape.iter().skip(1).copied().collect())
        }
        StreamOperator::Histogram(bins) => {
            ElementDtype::scalar(ScalarKind::Int).with_shape(vec![bins.len()])
        }
        StreamOperator::Zip(other) => {
            let other = pipeline_dtype(other, saved);
            ElementDtype::scalar(promote(input.kind, other.kind)).with_shape(prepend(&[2], &shape))
        }
        StreamOperator::Map(function) => map_dtype(function, input.kind, shape),
    }
}

fn map_dtype(function: &MapFunction, kind: ScalarKind, shape: Vec<usize>) -> ElementDtype {
    let float = ElementDtype::scalar(ScalarKind::Float);
    match function {
        MapFunction::Average | MapFunction::DotProduct(_) | MapFunction::TupleDotProduct => float,
        MapFunction::MultiplyBy(_) | MapFunction::Convolution { .. } => float.with_shape(shape),
        MapFunction::TupleMultiply | MapFunction::TupleConvolution(_) => {
            float.with_shape(shape.into_iter().skip(1).collect())
        }
        // Real and imaginary parts.
        MapFunction::Fft => float.with_shape(prepend(&shape, &[2])),
        MapFunction::BooleanToInt => ElementDtype::scalar(match kind {
            ScalarKind::Bool => ScalarKind::Int,
            other => other,
        })
        .with_shape(shape),
    }
}

/// Number of items a multi-valued sink produces, when a `take` bounds it.
fn expected_count(pipeline: &PipelineNode) -> Option<usize> {
    let mut count = None;
    for op in pipeline.operators() {
        count = match op {
            StreamOperator::Take(n) => Some(count.map_or(*n, |c: usize| c.min(*n))),
            StreamOperator::Skip(n) | StreamOperator::SkipLast(n) => {
                count.map(|c: usize| c.saturating_sub(*n))
            }
            StreamOperator::Buffer(dims) => {
                let size = dims.iter().product::<usize>().max(1);
                count.map(|c| c / size)
            }
            StreamOperator::BufferAndSkip { length, skip } => {
                count.map(|c| c / (length + skip).max(1))
            }
            StreamOperator::Flatten => None,
            _ => count,
        };
    }
    count
}

fn prepend(head: &[usize], tail: &[usize]) -> Vec<usize> {
    head.iter().chain(tail).copied().collect()
}

fn promote(a: ScalarKind, b: ScalarKind) -> ScalarKind {
    match (a, b) {
        (ScalarKind::Float, _) | (_, ScalarKind::Float) => ScalarKind::Float,
        (ScalarKind::Bool, ScalarKind::Bool) => ScalarKind::Bool,
        _ => ScalarKind::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpulse_ir::prelude::*;
    use qpulse_ir::{SinkKind, bins};

    #[test]
    fn test_schema_follows_saved_variable_type() {
        let mut b = ProgramBuilder::new();
        let n = b.declare(ElementType::Int).unwrap();
        let state = b.declare(ElementType::Bool).unwrap();
        let s_n = b.declare_stream();
        let s_state = b.declare_stream();
        b.save(&n, &s_n).unwrap();
        b.save(&state, &s_state).unwrap();
        let mut sp = b.stream_processing().unwrap();
        s_n.save_all(&mut sp, "n");
        s_state.boolean_to_int().save_all(&mut sp, "state");
        s_state.save(&mut sp, "last_state");
        drop(sp);
        let program = b.finish().unwrap();

        let schema = infer_schema(&program);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get("n").unwrap().dtype, ElementDtype::scalar(ScalarKind::Int));
        assert_eq!(
            schema.get("state").unwrap().dtype,
            ElementDtype::scalar(ScalarKind::Int)
        );
        let last = schema.get("last_state").unwrap();
        assert!(last.is_single);
        assert_eq!(last.dtype, ElementDtype::scalar(ScalarKind::Bool));
        assert_eq!(program.sink("last_state").unwrap().kind, SinkKind::Save);
    }

    #[test]
    fn test_schema_average_buffer_and_timestamps() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        let s = b.declare_stream();
        b.save(&x, &s).unwrap();
        let mut sp = b.stream_processing().unwrap();
        s.buffer(&[3]).average().save(&mut sp, "avg");
        s.with_timestamps().save_all(&mut sp, "stamped");
        s.histogram(&bins(0, 10, 5)).save(&mut sp, "hist");
        s.take(4).save_all(&mut sp, "first");
        drop(sp);
        let program = b.finish().unwrap();

        let schema = infer_schema(&program);
        assert_eq!(
            schema.get("avg").unwrap().dtype,
            ElementDtype::scalar(ScalarKind::Float).with_shape(vec![3])
        );
        assert_eq!(
            schema.get("stamped").unwrap().dtype,
            ElementDtype::scalar(ScalarKind::Int).with_timestamps()
        );
        assert_eq!(
            schema.get("hist").unwrap().dtype,
            ElementDtype::scalar(ScalarKind::Int).with_shape(vec![5])
        );
        assert_eq!(schema.get("first").unwrap().expected_count, Some(4));
        assert_eq!(schema.get("stamped").unwrap().expected_count, None);
    }
}
