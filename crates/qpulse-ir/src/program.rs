//! The finished program.

use serde::{Deserialize, Serialize};

use crate::declaration::Declaration;
use crate::error::{IrError, IrResult};
use crate::statement::{Body, BodyId, Statement};
use crate::stream::{PipelineSection, SinkSpec};

/// An immutable pulse program: declarations, the statement tree and the
/// pipeline section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    declarations: Vec<Declaration>,
    bodies: Vec<Body>,
    root: BodyId,
    pipeline: PipelineSection,
}

impl Program {
    pub(crate) fn new(
        declarations: Vec<Declaration>,
        bodies: Vec<Body>,
        root: BodyId,
        pipeline: PipelineSection,
    ) -> Self {
        Self {
            declarations,
            bodies,
            root,
            pipeline,
        }
    }

    /// Declarations in declaration order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn root(&self) -> BodyId {
        self.root
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize)
    }

    /// The top-level block.
    pub fn root_body(&self) -> &Body {
        // The root is created with the program and bodies are never removed.
        &self.bodies[self.root.0 as usize]
    }

    /// Every statement, depth first in source order.
    pub fn statements(&self) -> Vec<&Statement> {
        let mut out = Vec::new();
        self.collect(self.root, &mut out);
        out
    }

    fn collect<'a>(&'a self, id: BodyId, out: &mut Vec<&'a Statement>) {
        let Some(body) = self.body(id) else {
            return;
        };
        for statement in &body.statements {
            out.push(statement);
            for child in statement.kind.child_bodies() {
                self.collect(child, out);
            }
        }
    }

    pub fn pipeline(&self) -> &PipelineSection {
        &self.pipeline
    }

    pub fn sinks(&self) -> &[SinkSpec] {
        &self.pipeline.sinks
    }

    /// First sink registered under `tag`.
    pub fn sink(&self, tag: &str) -> Option<&SinkSpec> {
        self.pipeline.sinks.iter().find(|s| s.tag == tag)
    }

    pub fn to_json(&self) -> IrResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> IrResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a serialized program, checking that its block references resolve.
    pub fn from_json(json: &str) -> IrResult<Self> {
        let program: Program = serde_json::from_str(json)?;
        program.check_blocks()?;
        Ok(program)
    }

    fn check_blocks(&self) -> IrResult<()> {
        let resolve = |id: BodyId| {
            self.body(id)
                .map(|_| ())
                .ok_or_else(|| IrError::Structure(format!("unknown block {id}")))
        };
        resolve(self.root)?;
        for body in &self.bodies {
            for statement in &body.statements {
                for child in statement.kind.child_bodies() {
                    resolve(child)?;
                }
            }
        }
        Ok(())
    }
}
