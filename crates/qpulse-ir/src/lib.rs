//! QPulse Program Intermediate Representation
//!
//! This crate provides the embedded language for writing pulse-sequencing
//! programs and the immutable [`Program`] it produces. It is the foundation
//! of the QPulse stack: execution backends consume a `Program`, and the
//! results client decodes the outputs of its pipeline section.
//!
//! # Overview
//!
//! A program is built with a [`ProgramBuilder`], which keeps a stack of open
//! scopes. Hardware statements are appended to the block on top of the
//! stack; control-flow methods (`if_`, `for_`, `for_each_`, ...) open a
//! nested block and return a [`Scope`] guard that closes it when dropped.
//! The stream processing section is opened with
//! [`ProgramBuilder::stream_processing`] and is where result pipelines get
//! named sinks.
//!
//! # Core Components
//!
//! - **Expressions**: [`Expression`], [`VarRef`], [`ArrayRef`] with operator
//!   overloading and the [`Compare`] trait for comparisons
//! - **Declarations**: [`DeclarationTable`] with sequential `v`/`a`/`r` naming
//! - **Statements**: [`StatementKind`] nodes held in [`Body`] blocks
//! - **Streams**: [`ResultSource`], [`ResultStream`] and the [`StreamOps`] chain
//! - **Program**: [`Program`], serializable to JSON
//!
//! # Example: Power Rabi
//!
//! ```rust
//! use qpulse_ir::prelude::*;
//!
//! let mut b = ProgramBuilder::new();
//! let n = b.declare(ElementType::Int).unwrap();
//! let a = b.declare(ElementType::Fixed).unwrap();
//! let i = b.declare(ElementType::Fixed).unwrap();
//! let i_stream = b.declare_stream();
//! {
//!     let mut shots = b.for_(ForSpec::range(&n, 0, n.lt(100), &n + 1)).unwrap();
//!     let mut amps = shots
//!         .for_each_(&[a.clone()], vec![vec![0.1, 0.2, 0.3].into()])
//!         .unwrap();
//!     amps.play(Pulse::named("x180").amp(&a), "qubit").unwrap();
//!     amps.align(&["qubit", "resonator"]).unwrap();
//!     amps.measure("readout", "resonator", MeasureStream::None, [demod().full("cos", &i)])
//!         .unwrap();
//!     amps.save(&i, &i_stream).unwrap();
//! }
//! {
//!     let mut sp = b.stream_processing().unwrap();
//!     i_stream.buffer(&[3]).average().save_all(&mut sp, "I");
//! }
//! let program = b.finish().unwrap();
//!
//! assert_eq!(program.declarations().len(), 4);
//! assert_eq!(program.sink("I").unwrap().pipeline.operators().len(), 2);
//! ```
//!
//! # Statements
//!
//! | Method | Statement |
//! |--------|-----------|
//! | `play`, `play_with` | Play a named pulse or ramp on an element |
//! | `wait`, `align`, `wait_for_trigger` | Timing |
//! | `update_frequency`, `update_correction`, `reset_phase` | Oscillator and mixer |
//! | `frame_rotation`, `reset_frame`, `ramp_to_zero` | Frame and output level |
//! | `measure` | Readout with demodulation, integration or time tagging |
//! | `assign`, `save` | Variables and streaming |
//! | `if_`, `else_`, `for_`, `while_`, `for_each_`, `infinite_loop_` | Control flow |

pub mod builder;
pub mod declaration;
pub mod error;
pub mod expression;
pub mod measure;
pub mod program;
pub mod scope;
pub mod statement;
pub mod stream;

pub use builder::{
    program, ForEachValues, ForSpec, MeasureStream, PlayOptions, ProgramBuilder, SaveTarget, Sink,
};
pub use declaration::{
    Declaration, DeclarationKind, DeclarationTable, DeclareOptions, Declared, ElementType,
    InitValue,
};
pub use error::{IrError, IrResult};
pub use expression::{
    math, to_expression, ArrayRef, BinaryOperator, Compare, Expression, IoChannel, Literal,
    MathFunction, Operand, VarRef, IO1, IO2,
};
pub use measure::{AnalogProcess, Integration, ProcessTarget, TimeDivision};
pub use program::Program;
pub use scope::{Frame, Scope, ScopeStack, StreamProcessing};
pub use statement::{
    Amplitude, Body, BodyId, ForStatement, MeasureStatement, PlayStatement, Pulse, ScalarRef,
    SourceLoc, Statement, StatementKind,
};
pub use stream::{
    bins, AdcInput, MapFunction, PipelineNode, PipelineSection, ResultSource, ResultStream,
    SinkKind, SinkSpec, SourceSpec, StreamOperator, StreamOps, TimestampMode,
};

/// Everything needed to write programs.
pub mod prelude {
    pub use crate::builder::{
        ForEachValues, ForSpec, MeasureStream, PlayOptions, ProgramBuilder, SaveTarget,
    };
    pub use crate::declaration::ElementType;
    pub use crate::expression::{
        math, ArrayRef, Compare, Expression, IoChannel, VarRef, IO1, IO2,
    };
    pub use crate::measure::{demod, integration, time_tagging};
    pub use crate::statement::Pulse;
    pub use crate::stream::{bins, StreamOps};
}
