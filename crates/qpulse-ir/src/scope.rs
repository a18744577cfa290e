//! Scope stack and scope guards.
//!
//! The stack lives inside a [`ProgramBuilder`]. Opening a block pushes a
//! frame and returns a guard borrowing the builder; dropping the guard pops
//! the frame. Guards deref to the builder, so statements emitted through a
//! guard land in the guard's block.

use std::ops::{Deref, DerefMut};
use tracing::{debug, error};

use crate::builder::ProgramBuilder;
use crate::error::{IrError, IrResult};
use crate::statement::BodyId;
use crate::stream::{ResultStream, SinkKind};

/// Identity of a pushed frame, checked when it is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

/// Location of a `for` statement and its sub-blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForSlots {
    /// Block holding the `for` statement.
    pub owner: BodyId,
    /// Index of the `for` statement in `owner`.
    pub index: usize,
    pub init: BodyId,
    pub update: BodyId,
    pub body: BodyId,
}

/// A scope stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// The program's top-level block. Only valid at the bottom of the stack.
    Program(BodyId),
    /// A statement block.
    Body(BodyId),
    /// A raw `for` loop whose sub-block must be chosen explicitly.
    For(ForSlots),
    /// The stream processing section.
    StreamProcessing,
}

impl Frame {
    pub fn describe(&self) -> &'static str {
        match self {
            Frame::Program(_) => "program scope",
            Frame::Body(_) => "body scope",
            Frame::For(_) => "for scope",
            Frame::StreamProcessing => "stream processing scope",
        }
    }
}

/// LIFO stack of frames.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<(FrameToken, Frame)>,
    next_token: u64,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) -> FrameToken {
        let token = FrameToken(self.next_token);
        self.next_token += 1;
        debug!(depth = self.frames.len(), "push {}", frame.describe());
        self.frames.push((token, frame));
        token
    }

    /// Pop the frame identified by `token`, which must be on top.
    pub fn pop(&mut self, token: FrameToken) -> IrResult<Frame> {
        match self.frames.last() {
            Some((top, _)) if *top == token => {}
            Some((_, frame)) => {
                return Err(IrError::scope(
                    "the most recently opened scope to close first",
                    format!("open {}", frame.describe()),
                ));
            }
            None => return Err(IrError::scope("an open scope", "empty scope stack")),
        }
        let (_, frame) = self
            .frames
            .pop()
            .ok_or_else(|| IrError::scope("an open scope", "empty scope stack"))?;
        debug!(depth = self.frames.len(), "pop {}", frame.describe());
        Ok(frame)
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last().map(|(_, frame)| frame)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The block statements are currently appended to.
    pub fn current_body(&self) -> IrResult<BodyId> {
        match self.top() {
            Some(Frame::Program(body) | Frame::Body(body)) => Ok(*body),
            Some(Frame::For(_)) => Err(IrError::scope(
                "scope with body (use for_init_, for_update_, for_body_ or for_cond)",
                "for scope",
            )),
            Some(other) => Err(IrError::scope("scope with body", other.describe())),
            None => Err(IrError::scope("scope with body", "empty scope stack")),
        }
    }

    /// The raw `for` frame on top of the stack.
    pub fn current_for(&self) -> IrResult<ForSlots> {
        match self.top() {
            Some(Frame::For(slots)) => Ok(*slots),
            Some(other) => Err(IrError::scope("for scope", other.describe())),
            None => Err(IrError::scope("for scope", "empty scope stack")),
        }
    }

    /// Check that the bottom frame is the program.
    pub fn root_program(&self) -> IrResult<BodyId> {
        match self.frames.first() {
            Some((_, Frame::Program(body))) => Ok(*body),
            Some((_, other)) => Err(IrError::scope("program scope", other.describe())),
            None => Err(IrError::scope("program scope", "empty scope stack")),
        }
    }

    /// Check that the program frame itself is on top.
    pub fn program_on_top(&self) -> IrResult<()> {
        match self.top() {
            Some(Frame::Program(_)) => Ok(()),
            Some(other) => Err(IrError::scope("program scope", other.describe())),
            None => Err(IrError::scope("program scope", "empty scope stack")),
        }
    }
}

/// Pop `token` from `builder`'s stack on guard drop.
fn close_on_drop(builder: &mut ProgramBuilder, token: FrameToken) {
    if let Err(err) = builder.scopes_mut().pop(token) {
        error!("scope closed out of order: {err}");
        debug_assert!(false, "scope closed out of order: {err}");
    }
}

/// Guard for a statement block (or a raw `for` frame).
///
/// Closes its frame when dropped; call [`Scope::end`] to close it explicitly
/// and observe ordering errors.
#[derive(Debug)]
#[must_use = "the block closes as soon as the guard is dropped"]
pub struct Scope<'a> {
    builder: &'a mut ProgramBuilder,
    token: FrameToken,
    closed: bool,
}

impl<'a> Scope<'a> {
    pub(crate) fn open(builder: &'a mut ProgramBuilder, frame: Frame) -> Self {
        let token = builder.scopes_mut().push(frame);
        Self {
            builder,
            token,
            closed: false,
        }
    }

    /// Close the block now.
    pub fn end(mut self) -> IrResult<()> {
        self.closed = true;
        self.builder.scopes_mut().pop(self.token).map(|_| ())
    }
}

impl Deref for Scope<'_> {
    type Target = ProgramBuilder;

    fn deref(&self) -> &ProgramBuilder {
        &*self.builder
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut ProgramBuilder {
        &mut *self.builder
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            close_on_drop(&mut *self.builder, self.token);
        }
    }
}

/// Guard for the stream processing section.
///
/// Pipelines are terminated with
/// [`StreamOps::save`](crate::stream::StreamOps::save) and
/// [`StreamOps::save_all`](crate::stream::StreamOps::save_all), which need
/// this guard.
#[must_use = "the stream processing section closes as soon as the guard is dropped"]
pub struct StreamProcessing<'a> {
    builder: &'a mut ProgramBuilder,
    token: FrameToken,
    closed: bool,
}

impl<'a> StreamProcessing<'a> {
    pub(crate) fn open(builder: &'a mut ProgramBuilder) -> Self {
        let token = builder.scopes_mut().push(Frame::StreamProcessing);
        Self {
            builder,
            token,
            closed: false,
        }
    }

    pub(crate) fn register_sink(&mut self, tag: String, kind: SinkKind, stream: ResultStream) {
        self.builder.add_sink(tag, kind, stream);
    }

    /// Close the section now.
    pub fn end(mut self) -> IrResult<()> {
        self.closed = true;
        self.builder.scopes_mut().pop(self.token).map(|_| ())
    }
}

impl Deref for StreamProcessing<'_> {
    type Target = ProgramBuilder;

    fn deref(&self) -> &ProgramBuilder {
        &*self.builder
    }
}

impl DerefMut for StreamProcessing<'_> {
    fn deref_mut(&mut self) -> &mut ProgramBuilder {
        &mut *self.builder
    }
}

impl Drop for StreamProcessing<'_> {
    fn drop(&mut self) {
        if !self.closed {
            close_on_drop(&mut *self.builder, self.token);
        }
    }
}
