//! Analog measurement processes used by `measure`.
//!
//! ```
//! use qpulse_ir::measure::{demod, integration, time_tagging};
//! use qpulse_ir::{ArrayRef, VarRef};
//!
//! let i = VarRef::new("v1");
//! let trace = ArrayRef::new("a1");
//!
//! let full = demod().full("cos", &i);
//! let sliced = integration().sliced("sin", &trace, 10).with_output("out1");
//! let tags = time_tagging::raw(&trace, 500);
//! # let _ = (full, sliced, tags);
//! ```

use serde::{Deserialize, Serialize};

use crate::expression::{ArrayRef, VarRef};
use crate::statement::ScalarRef;

/// How an analog window is split into array cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeDivision {
    /// Each chunk lands in its own cell.
    Sliced { samples_per_chunk: u32 },
    /// Each cell holds the running sum up to its chunk.
    Accumulated { samples_per_chunk: u32 },
    /// Each cell holds the sum of the last `chunks_per_window` chunks.
    MovingWindow {
        samples_per_chunk: u32,
        chunks_per_window: u32,
    },
}

/// Destination of a demodulation or integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessTarget {
    Scalar(ScalarRef),
    Vector {
        array: ArrayRef,
        division: TimeDivision,
    },
}

/// Demodulation or bare integration against named integration weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub weights: String,
    /// Element output to read from; empty selects the element's default.
    pub element_output: String,
    pub target: ProcessTarget,
}

/// One output of a `measure` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalogProcess {
    Demod(Integration),
    BareIntegration(Integration),
    RawTimeTagging {
        target: ArrayRef,
        target_len: Option<VarRef>,
        max_time: u32,
        element_output: String,
    },
}

impl AnalogProcess {
    /// Read from a specific element output.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        match &mut self {
            AnalogProcess::Demod(i) | AnalogProcess::BareIntegration(i) => {
                i.element_output = output.into();
            }
            AnalogProcess::RawTimeTagging { element_output, .. } => {
                *element_output = output.into();
            }
        }
        self
    }

    /// Name of the variable or array written by this process.
    pub fn target_name(&self) -> &str {
        match self {
            AnalogProcess::Demod(i) | AnalogProcess::BareIntegration(i) => match &i.target {
                ProcessTarget::Scalar(s) => s.name(),
                ProcessTarget::Vector { array, .. } => array.name(),
            },
            AnalogProcess::RawTimeTagging { target, .. } => target.name(),
        }
    }
}

/// Accumulation method selector: [`demod`] or [`integration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulationMethod {
    Demod,
    Integration,
}

/// Demodulation.
pub fn demod() -> AccumulationMethod {
    AccumulationMethod::Demod
}

/// Bare integration.
pub fn integration() -> AccumulationMethod {
    AccumulationMethod::Integration
}

impl AccumulationMethod {
    fn build(self, weights: &str, target: ProcessTarget) -> AnalogProcess {
        let integration = Integration {
            weights: weights.to_string(),
            element_output: String::new(),
            target,
        };
        match self {
            AccumulationMethod::Demod => AnalogProcess::Demod(integration),
            AccumulationMethod::Integration => AnalogProcess::BareIntegration(integration),
        }
    }

    /// Whole-window result into a scalar.
    pub fn full(self, weights: &str, target: impl Into<ScalarRef>) -> AnalogProcess {
        self.build(weights, ProcessTarget::Scalar(target.into()))
    }

    pub fn sliced(self, weights: &str, target: &ArrayRef, samples_per_chunk: u32) -> AnalogProcess {
        self.vector(weights, target, TimeDivision::Sliced { samples_per_chunk })
    }

    pub fn accumulated(
        self,
        weights: &str,
        target: &ArrayRef,
        samples_per_chunk: u32,
    ) -> AnalogProcess {
        self.vector(
            weights,
            target,
            TimeDivision::Accumulated { samples_per_chunk },
        )
    }

    pub fn moving_window(
        self,
        weights: &str,
        target: &ArrayRef,
        samples_per_chunk: u32,
        chunks_per_window: u32,
    ) -> AnalogProcess {
        self.vector(
            weights,
            target,
            TimeDivision::MovingWindow {
                samples_per_chunk,
                chunks_per_window,
            },
        )
    }

    fn vector(self, weights: &str, target: &ArrayRef, division: TimeDivision) -> AnalogProcess {
        self.build(
            weights,
            ProcessTarget::Vector {
                array: target.clone(),
                division,
            },
        )
    }
}

/// Time tagging.
pub mod time_tagging {
    use super::AnalogProcess;
    use crate::expression::{ArrayRef, VarRef};

    /// Record raw arrival times into `target`, up to `max_time` ns.
    pub fn raw(target: &ArrayRef, max_time: u32) -> AnalogProcess {
        AnalogProcess::RawTimeTagging {
            target: target.clone(),
            target_len: None,
            max_time,
            element_output: String::new(),
        }
    }

    /// Like [`raw`], also storing the number of tags in `target_len`.
    pub fn raw_with_len(target: &ArrayRef, max_time: u32, target_len: &VarRef) -> AnalogProcess {
        AnalogProcess::RawTimeTagging {
            target: target.clone(),
            target_len: Some(target_len.clone()),
            max_time,
            element_output: String::new(),
        }
    }
}
