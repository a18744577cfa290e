//! Result stream processing pipelines.
//!
//! A pipeline starts at a [`ResultSource`] declared with
//! [`ProgramBuilder::declare_stream`](crate::ProgramBuilder::declare_stream)
//! and chains operators through [`StreamOps`]. Every operator call returns a
//! new [`ResultStream`] sharing its upstream by reference count, so a common
//! prefix can feed several sinks without being copied. Streams are write-only
//! descriptors: they have no arithmetic and are rejected as expression
//! operands.
//!
//! ```
//! use qpulse_ir::{ElementType, ProgramBuilder, StreamOps};
//!
//! let mut b = ProgramBuilder::new();
//! let x = b.declare(ElementType::Fixed).unwrap();
//! let s = b.declare_stream();
//! b.save(&x, &s).unwrap();
//!
//! let mut sp = b.stream_processing().unwrap();
//! let averaged = s.average();
//! averaged.save(&mut sp, "avg");
//! averaged.buffer(&[10]).save_all(&mut sp, "avg_buffers");
//! drop(sp);
//!
//! let program = b.finish().unwrap();
//! assert_eq!(program.sinks().len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::expression::Operand;
use crate::scope::StreamProcessing;

/// Which part of a timestamped stream item to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampMode {
    /// Values only.
    #[default]
    Without,
    /// Values paired with their timestamps.
    With,
    /// Timestamps only.
    Only,
}

/// Analog input of a raw ADC stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdcInput {
    Input1,
    Input2,
}

/// The head of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub adc_trace: bool,
    pub timestamps: TimestampMode,
    pub input: Option<AdcInput>,
}

/// Convolution output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvolutionMode {
    Full,
    Same,
    Valid,
}

/// Right-hand side of `multiply_by`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MultiplyOperand {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// Per-item functions applied by [`StreamOperator::Map`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapFunction {
    /// Average of the elements of an array item.
    Average,
    DotProduct(Vec<f64>),
    /// Dot product of the two vectors of a zipped item.
    TupleDotProduct,
    MultiplyBy(MultiplyOperand),
    /// Product of the members of a zipped item.
    TupleMultiply,
    Convolution {
        vector: Vec<f64>,
        mode: Option<ConvolutionMode>,
    },
    TupleConvolution(Option<ConvolutionMode>),
    Fft,
    BooleanToInt,
}

/// One pipeline stage.
///
/// `S` is the representation of the second input of `Zip`: a live
/// [`ResultStream`] while building, a boxed [`PipelineNode`] once serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamOperator<S> {
    /// Running average since program start.
    Average,
    /// Gather items into arrays of the given dimensions; only full buffers are emitted.
    Buffer(Vec<usize>),
    BufferAndSkip { length: usize, skip: usize },
    Map(MapFunction),
    /// Emit the elements of array items one by one.
    Flatten,
    Skip(usize),
    SkipLast(usize),
    Take(usize),
    /// Histogram over inclusive `(low, high)` bins.
    Histogram(Vec<(f64, f64)>),
    Zip(S),
}

impl<S> StreamOperator<S> {
    /// Operator name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StreamOperator::Average => "average",
            StreamOperator::Buffer(_) => "buffer",
            StreamOperator::BufferAndSkip { .. } => "buffer_and_skip",
            StreamOperator::Map(_) => "map",
            StreamOperator::Flatten => "flatten",
            StreamOperator::Skip(_) => "skip",
            StreamOperator::SkipLast(_) => "skip_last",
            StreamOperator::Take(_) => "take",
            StreamOperator::Histogram(_) => "histogram",
            StreamOperator::Zip(_) => "zip",
        }
    }
}

#[derive(Debug)]
enum StreamNode {
    Source(SourceSpec),
    Stage {
        op: StreamOperator<ResultStream>,
        upstream: ResultStream,
    },
}

/// An immutable pipeline stage.
///
/// Cloning is cheap and shares the stage.
#[derive(Debug, Clone)]
pub struct ResultStream(Arc<StreamNode>);

impl ResultStream {
    fn from_source(spec: SourceSpec) -> Self {
        Self(Arc::new(StreamNode::Source(spec)))
    }

    fn stage(&self, op: StreamOperator<ResultStream>) -> Self {
        Self(Arc::new(StreamNode::Stage {
            op,
            upstream: self.clone(),
        }))
    }

    /// The stage feeding this one, or `None` at the source.
    pub fn upstream(&self) -> Option<&ResultStream> {
        match &*self.0 {
            StreamNode::Source(_) => None,
            StreamNode::Stage { upstream, .. } => Some(upstream),
        }
    }

    /// The operator of this stage, or `None` at the source.
    pub fn operator(&self) -> Option<&StreamOperator<ResultStream>> {
        match &*self.0 {
            StreamNode::Source(_) => None,
            StreamNode::Stage { op, .. } => Some(op),
        }
    }

    /// The source at the head of the chain.
    pub fn source(&self) -> &SourceSpec {
        let mut node = self;
        loop {
            match &*node.0 {
                StreamNode::Source(spec) => return spec,
                StreamNode::Stage { upstream, .. } => node = upstream,
            }
        }
    }

    /// Whether both handles are the same stage object.
    pub fn same_stage(&self, other: &ResultStream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Serializable form of the chain.
    pub fn to_pipeline(&self) -> PipelineNode {
        match &*self.0 {
            StreamNode::Source(spec) => PipelineNode::Source(spec.clone()),
            StreamNode::Stage { op, upstream } => PipelineNode::Stage {
                op: lower_operator(op),
                upstream: Box::new(upstream.to_pipeline()),
            },
        }
    }
}

fn lower_operator(op: &StreamOperator<ResultStream>) -> StreamOperator<Box<PipelineNode>> {
    match op {
        StreamOperator::Average => StreamOperator::Average,
        StreamOperator::Buffer(dims) => StreamOperator::Buffer(dims.clone()),
        StreamOperator::BufferAndSkip { length, skip } => StreamOperator::BufferAndSkip {
            length: *length,
            skip: *skip,
        },
        StreamOperator::Map(f) => StreamOperator::Map(f.clone()),
        StreamOperator::Flatten => StreamOperator::Flatten,
        StreamOperator::Skip(n) => StreamOperator::Skip(*n),
        StreamOperator::SkipLast(n) => StreamOperator::SkipLast(*n),
        StreamOperator::Take(n) => StreamOperator::Take(*n),
        StreamOperator::Histogram(bins) => StreamOperator::Histogram(bins.clone()),
        StreamOperator::Zip(other) => StreamOperator::Zip(Box::new(other.to_pipeline())),
    }
}

impl fmt::Display for ResultStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            StreamNode::Source(spec) => write!(f, "{}", spec.name),
            StreamNode::Stage { op, upstream } => write!(f, "{upstream}.{}()", op.name()),
        }
    }
}

/// Serialized pipeline, as stored in a finished program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineNode {
    Source(SourceSpec),
    Stage {
        op: StreamOperator<Box<PipelineNode>>,
        upstream: Box<PipelineNode>,
    },
}

impl PipelineNode {
    /// The source at the head of the chain.
    pub fn source(&self) -> &SourceSpec {
        match self {
            PipelineNode::Source(spec) => spec,
            PipelineNode::Stage { upstream, .. } => upstream.source(),
        }
    }

    /// Operators in application order, source first.
    pub fn operators(&self) -> Vec<&StreamOperator<Box<PipelineNode>>> {
        let mut ops = Vec::new();
        let mut node = self;
        while let PipelineNode::Stage { op, upstream } = node {
            ops.push(op);
            node = upstream;
        }
        ops.reverse();
        ops
    }
}

/// How a sink retains values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkKind {
    /// Keep only the latest item.
    Save,
    /// Keep every item in order.
    SaveAll,
    /// `SaveAll` registered implicitly by a legacy string tag.
    AutoSaveAll,
}

impl SinkKind {
    /// Whether the sink exposes a single value.
    pub fn is_single(&self) -> bool {
        matches!(self, SinkKind::Save)
    }
}

/// A named pipeline terminal in a finished program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSpec {
    pub tag: String,
    pub kind: SinkKind,
    pub pipeline: PipelineNode,
}

/// The pipeline section of a program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    pub sinks: Vec<SinkSpec>,
}

/// A declared stream source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultSource {
    spec: SourceSpec,
}

impl ResultSource {
    pub(crate) fn new(name: String, adc_trace: bool) -> Self {
        Self {
            spec: SourceSpec {
                name,
                adc_trace,
                timestamps: TimestampMode::Without,
                input: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_adc_trace(&self) -> bool {
        self.spec.adc_trace
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Items paired with their timestamps.
    pub fn with_timestamps(&self) -> ResultSource {
        self.with(|spec| spec.timestamps = TimestampMode::With)
    }

    /// Timestamps only.
    pub fn timestamps(&self) -> ResultSource {
        self.with(|spec| spec.timestamps = TimestampMode::Only)
    }

    /// Raw ADC samples of analog input 1.
    pub fn input1(&self) -> ResultSource {
        self.with(|spec| spec.input = Some(AdcInput::Input1))
    }

    /// Raw ADC samples of analog input 2.
    pub fn input2(&self) -> ResultSource {
        self.with(|spec| spec.input = Some(AdcInput::Input2))
    }

    fn with(&self, f: impl FnOnce(&mut SourceSpec)) -> ResultSource {
        let mut spec = self.spec.clone();
        f(&mut spec);
        ResultSource { spec }
    }
}

/// Pipeline operators, available on sources and stages alike.
pub trait StreamOps {
    /// This value as a pipeline stage.
    fn stream(&self) -> ResultStream;

    fn average(&self) -> ResultStream {
        self.stream().stage(StreamOperator::Average)
    }

    fn buffer(&self, dims: &[usize]) -> ResultStream {
        self.stream().stage(StreamOperator::Buffer(dims.to_vec()))
    }

    fn buffer_and_skip(&self, length: usize, skip: usize) -> ResultStream {
        self.stream()
            .stage(StreamOperator::BufferAndSkip { length, skip })
    }

    fn map(&self, function: MapFunction) -> ResultStream {
        self.stream().stage(StreamOperator::Map(function))
    }

    fn flatten(&self) -> ResultStream {
        self.stream().stage(StreamOperator::Flatten)
    }

    fn skip(&self, length: usize) -> ResultStream {
        self.stream().stage(StreamOperator::Skip(length))
    }

    fn skip_last(&self, length: usize) -> ResultStream {
        self.stream().stage(StreamOperator::SkipLast(length))
    }

    fn take(&self, length: usize) -> ResultStream {
        self.stream().stage(StreamOperator::Take(length))
    }

    fn histogram(&self, bins: &[(f64, f64)]) -> ResultStream {
        self.stream()
            .stage(StreamOperator::Histogram(bins.to_vec()))
    }

    /// Pair each item with the corresponding item of `other`.
    fn zip(&self, other: &impl StreamOps) -> ResultStream {
        self.stream().stage(StreamOperator::Zip(other.stream()))
    }

    fn dot_product(&self, vector: &[f64]) -> ResultStream {
        self.map(MapFunction::DotProduct(vector.to_vec()))
    }

    fn tuple_dot_product(&self) -> ResultStream {
        self.map(MapFunction::TupleDotProduct)
    }

    fn multiply_by(&self, scalar: f64) -> ResultStream {
        self.map(MapFunction::MultiplyBy(MultiplyOperand::Scalar(scalar)))
    }

    fn multiply_by_vector(&self, vector: &[f64]) -> ResultStream {
        self.map(MapFunction::MultiplyBy(MultiplyOperand::Vector(
            vector.to_vec(),
        )))
    }

    fn tuple_multiply(&self) -> ResultStream {
        self.map(MapFunction::TupleMultiply)
    }

    fn convolution(&self, vector: &[f64], mode: Option<ConvolutionMode>) -> ResultStream {
        self.map(MapFunction::Convolution {
            vector: vector.to_vec(),
            mode,
        })
    }

    fn tuple_convolution(&self, mode: Option<ConvolutionMode>) -> ResultStream {
        self.map(MapFunction::TupleConvolution(mode))
    }

    fn fft(&self) -> ResultStream {
        self.map(MapFunction::Fft)
    }

    fn boolean_to_int(&self) -> ResultStream {
        self.map(MapFunction::BooleanToInt)
    }

    /// Terminate in a sink keeping only the latest item.
    fn save(&self, sp: &mut StreamProcessing<'_>, tag: impl Into<String>) {
        sp.register_sink(tag.into(), SinkKind::Save, self.stream());
    }

    /// Terminate in a sink keeping every item.
    fn save_all(&self, sp: &mut StreamProcessing<'_>, tag: impl Into<String>) {
        sp.register_sink(tag.into(), SinkKind::SaveAll, self.stream());
    }
}

impl StreamOps for ResultStream {
    fn stream(&self) -> ResultStream {
        self.clone()
    }
}

impl StreamOps for ResultSource {
    fn stream(&self) -> ResultStream {
        ResultStream::from_source(self.spec.clone())
    }
}

impl From<&ResultStream> for Operand {
    fn from(s: &ResultStream) -> Self {
        Operand::Stream(s.to_string())
    }
}

impl From<&ResultSource> for Operand {
    fn from(s: &ResultSource) -> Self {
        Operand::Stream(s.name().to_string())
    }
}

/// Inclusive integer histogram bins covering `[start, end]` in `count` steps.
///
/// The last bin is truncated at `end`.
pub fn bins(start: i64, end: i64, count: u32) -> Vec<(f64, f64)> {
    if count == 0 || end < start {
        return Vec::new();
    }
    let count = i64::from(count);
    let width = (end - start + count) / count;
    let mut out = Vec::new();
    let mut low = start;
    while low < end {
        let high = (low + width - 1).min(end);
        out.push((low as f64, high as f64));
        low += width;
    }
    out
}
