//! Statement nodes.
//!
//! Statements live in [`Body`] blocks held by an arena; control-flow
//! statements refer to their child blocks by [`BodyId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;

use crate::error::{IrError, IrResult};
use crate::expression::{ArrayRef, Expression, VarRef};
use crate::measure::AnalogProcess;

/// Index of a [`Body`] in a program's body arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body{}", self.0)
    }
}

/// An ordered block of statements. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub statements: Vec<Statement>,
}

impl Body {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn last(&self) -> Option<&Statement> {
        self.statements.last()
    }
}

/// Where in the caller's source a statement was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    /// Location of the caller of the (track-caller) function invoking this.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file().to_string(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A statement with its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub loc: SourceLoc,
}

/// A scalar storage location: assignment target or save source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarRef {
    Variable(VarRef),
    ArrayCell { array: ArrayRef, index: Expression },
}

impl ScalarRef {
    /// The cell `array[index]`.
    pub fn cell(array: &ArrayRef, index: impl Into<Expression>) -> Self {
        ScalarRef::ArrayCell {
            array: array.clone(),
            index: index.into(),
        }
    }

    /// Name of the variable or array this refers to.
    pub fn name(&self) -> &str {
        match self {
            ScalarRef::Variable(var) => var.name(),
            ScalarRef::ArrayCell { array, .. } => array.name(),
        }
    }
}

impl From<VarRef> for ScalarRef {
    fn from(v: VarRef) -> Self {
        ScalarRef::Variable(v)
    }
}

impl From<&VarRef> for ScalarRef {
    fn from(v: &VarRef) -> Self {
        ScalarRef::Variable(v.clone())
    }
}

impl TryFrom<Expression> for ScalarRef {
    type Error = IrError;

    fn try_from(expr: Expression) -> IrResult<Self> {
        match expr {
            Expression::Variable(var) => Ok(ScalarRef::Variable(var)),
            Expression::ArrayCell { array, index } => Ok(ScalarRef::ArrayCell {
                array,
                index: *index,
            }),
            other => Err(IrError::Type(format!(
                "{other} is not a variable or an array cell"
            ))),
        }
    }
}

/// Pulse amplitude scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Amplitude {
    Scalar(Expression),
    /// 2x2 matrix, row-major.
    Matrix(Box<[Expression; 4]>),
}

/// What a `play` statement plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pulse {
    /// A pulse defined in the hardware configuration.
    Named {
        name: String,
        amp: Option<Amplitude>,
    },
    /// A ramp with the given slope.
    Ramp(Expression),
}

impl Pulse {
    pub fn named(name: impl Into<String>) -> Self {
        Pulse::Named {
            name: name.into(),
            amp: None,
        }
    }

    pub fn ramp(slope: impl Into<Expression>) -> Self {
        Pulse::Ramp(slope.into())
    }

    /// Scale the pulse amplitude. Ramp pulses ignore scaling.
    pub fn amp(self, v: impl Into<Expression>) -> Self {
        self.with_amp(Amplitude::Scalar(v.into()))
    }

    /// Apply a 2x2 amplitude matrix.
    pub fn amp_matrix(
        self,
        v00: impl Into<Expression>,
        v01: impl Into<Expression>,
        v10: impl Into<Expression>,
        v11: impl Into<Expression>,
    ) -> Self {
        self.with_amp(Amplitude::Matrix(Box::new([
            v00.into(),
            v01.into(),
            v10.into(),
            v11.into(),
        ])))
    }

    fn with_amp(self, amplitude: Amplitude) -> Self {
        match self {
            Pulse::Named { name, .. } => Pulse::Named {
                name,
                amp: Some(amplitude),
            },
            ramp @ Pulse::Ramp(_) => ramp,
        }
    }

    /// Name of a named pulse.
    pub fn name(&self) -> Option<&str> {
        match self {
            Pulse::Named { name, .. } => Some(name),
            Pulse::Ramp(_) => None,
        }
    }
}

impl From<&str> for Pulse {
    fn from(name: &str) -> Self {
        Pulse::named(name)
    }
}

impl From<String> for Pulse {
    fn from(name: String) -> Self {
        Pulse::named(name)
    }
}

/// A `play` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayStatement {
    pub pulse: Pulse,
    pub element: String,
    pub duration: Option<Expression>,
    pub condition: Option<Expression>,
    pub target: Option<String>,
}

/// A `measure` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureStatement {
    pub pulse: Pulse,
    pub element: String,
    /// Raw ADC stream source name, if raw samples are kept.
    pub stream: Option<String>,
    pub processes: Vec<AnalogProcess>,
}

/// A `for` loop. `init` and `update` are statement blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    pub init: BodyId,
    pub update: BodyId,
    pub condition: Option<Expression>,
    pub body: BodyId,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    Play(PlayStatement),
    Pause,
    UpdateFrequency {
        element: String,
        frequency: Expression,
    },
    UpdateCorrection {
        element: String,
        matrix: Box<[Expression; 4]>,
    },
    Align {
        elements: Vec<String>,
    },
    ResetPhase {
        element: String,
    },
    Wait {
        duration: Expression,
        elements: Vec<String>,
    },
    WaitForTrigger {
        element: String,
        pulse_to_play: Option<String>,
    },
    Save {
        source: ScalarRef,
        stream: String,
    },
    Measure(MeasureStatement),
    If {
        condition: Expression,
        body: BodyId,
        else_body: Option<BodyId>,
    },
    ForEach {
        iterators: Vec<(VarRef, ArrayRef)>,
        body: BodyId,
    },
    For(ForStatement),
    Assign {
        target: ScalarRef,
        value: Expression,
    },
    RampToZero {
        element: String,
        duration: Option<u32>,
    },
    ZRotation {
        angle: Expression,
        elements: Vec<String>,
    },
    ResetFrame {
        elements: Vec<String>,
    },
}

impl StatementKind {
    /// Short lowercase name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Play(_) => "play",
            StatementKind::Pause => "pause",
            StatementKind::UpdateFrequency { .. } => "update_frequency",
            StatementKind::UpdateCorrection { .. } => "update_correction",
            StatementKind::Align { .. } => "align",
            StatementKind::ResetPhase { .. } => "reset_phase",
            StatementKind::Wait { .. } => "wait",
            StatementKind::WaitForTrigger { .. } => "wait_for_trigger",
            StatementKind::Save { .. } => "save",
            StatementKind::Measure(_) => "measure",
            StatementKind::If { .. } => "if",
            StatementKind::ForEach { .. } => "for_each",
            StatementKind::For(_) => "for",
            StatementKind::Assign { .. } => "assign",
            StatementKind::RampToZero { .. } => "ramp_to_zero",
            StatementKind::ZRotation { .. } => "z_rotation",
            StatementKind::ResetFrame { .. } => "reset_frame",
        }
    }

    /// Child blocks, in declaration order.
    pub fn child_bodies(&self) -> Vec<BodyId> {
        match self {
            StatementKind::If {
                body, else_body, ..
            } => std::iter::once(*body).chain(*else_body).collect(),
            StatementKind::ForEach { body, .. } => vec![*body],
            StatementKind::For(f) => vec![f.init, f.update, f.body],
            _ => Vec::new(),
        }
    }
}
