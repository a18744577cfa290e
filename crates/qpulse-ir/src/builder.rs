//! The program builder.
//!
//! [`ProgramBuilder`] owns everything built during one construction pass:
//! the statement arena, the declaration table, the scope stack and the
//! registered pipeline sinks. [`ProgramBuilder::finish`] closes the program
//! scope and produces an immutable [`Program`].

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::declaration::{DeclarationTable, DeclareOptions, Declared, ElementType, InitValue};
use crate::error::{IrError, IrResult};
use crate::expression::{ArrayRef, Expression, Literal, VarRef};
use crate::measure::AnalogProcess;
use crate::program::Program;
use crate::scope::{ForSlots, Frame, FrameToken, Scope, ScopeStack, StreamProcessing};
use crate::statement::{
    Body, BodyId, ForStatement, MeasureStatement, PlayStatement, Pulse, ScalarRef, SourceLoc,
    Statement, StatementKind,
};
use crate::stream::{PipelineSection, ResultSource, ResultStream, SinkKind, SinkSpec, StreamOps};

/// A registered pipeline terminal.
#[derive(Debug, Clone)]
pub struct Sink {
    pub tag: String,
    pub kind: SinkKind,
    pub stream: ResultStream,
}

/// Optional arguments of `play`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayOptions {
    pub duration: Option<Expression>,
    pub condition: Option<Expression>,
    pub target: Option<String>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pulse duration (in clock cycles).
    pub fn duration(mut self, duration: impl Into<Expression>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    /// Play only when `condition` holds.
    pub fn condition(mut self, condition: impl Into<Expression>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Play to a specific element input.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Where a `save` statement sends its value.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveTarget {
    Stream(ResultSource),
    /// Legacy string tag: the value is saved with timestamps under this tag.
    Tag(String),
}

impl From<&ResultSource> for SaveTarget {
    fn from(s: &ResultSource) -> Self {
        SaveTarget::Stream(s.clone())
    }
}

impl From<ResultSource> for SaveTarget {
    fn from(s: ResultSource) -> Self {
        SaveTarget::Stream(s)
    }
}

impl From<&str> for SaveTarget {
    fn from(tag: &str) -> Self {
        SaveTarget::Tag(tag.to_string())
    }
}

impl From<String> for SaveTarget {
    fn from(tag: String) -> Self {
        SaveTarget::Tag(tag)
    }
}

/// Raw ADC destination of a `measure` statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MeasureStream {
    /// Raw samples are not kept.
    #[default]
    None,
    Stream(ResultSource),
    /// Legacy string tag: samples of each input are saved as
    /// `<tag>_input1` and `<tag>_input2`.
    Tag(String),
}

impl From<&ResultSource> for MeasureStream {
    fn from(s: &ResultSource) -> Self {
        MeasureStream::Stream(s.clone())
    }
}

impl From<ResultSource> for MeasureStream {
    fn from(s: ResultSource) -> Self {
        MeasureStream::Stream(s)
    }
}

impl From<&str> for MeasureStream {
    fn from(tag: &str) -> Self {
        MeasureStream::Tag(tag.to_string())
    }
}

impl From<String> for MeasureStream {
    fn from(tag: String) -> Self {
        MeasureStream::Tag(tag)
    }
}

/// Arguments of `for_`.
///
/// With every field empty the loop is opened raw, and its init, update,
/// condition and body are filled through `for_init_`, `for_update_`,
/// `for_cond` and `for_body_`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForSpec {
    pub var: Option<VarRef>,
    pub init: Option<Expression>,
    pub cond: Option<Expression>,
    pub update: Option<Expression>,
}

impl ForSpec {
    /// An empty (raw) loop spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// `for (var = init; cond; var = update)`.
    pub fn range(
        var: &VarRef,
        init: impl Into<Expression>,
        cond: impl Into<Expression>,
        update: impl Into<Expression>,
    ) -> Self {
        Self {
            var: Some(var.clone()),
            init: Some(init.into()),
            cond: Some(cond.into()),
            update: Some(update.into()),
        }
    }

    pub fn var(mut self, var: &VarRef) -> Self {
        self.var = Some(var.clone());
        self
    }

    pub fn init(mut self, init: impl Into<Expression>) -> Self {
        self.init = Some(init.into());
        self
    }

    pub fn cond(mut self, cond: impl Into<Expression>) -> Self {
        self.cond = Some(cond.into());
        self
    }

    pub fn update(mut self, update: impl Into<Expression>) -> Self {
        self.update = Some(update.into());
        self
    }

    pub fn is_raw(&self) -> bool {
        self.var.is_none() && self.init.is_none() && self.cond.is_none() && self.update.is_none()
    }
}

/// Values iterated by one `for_each_` variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ForEachValues {
    /// A declared array.
    Array(ArrayRef),
    /// Inline literals, auto-declared as an array.
    Literals(Vec<Literal>),
}

impl From<ArrayRef> for ForEachValues {
    fn from(a: ArrayRef) -> Self {
        ForEachValues::Array(a)
    }
}

impl From<&ArrayRef> for ForEachValues {
    fn from(a: &ArrayRef) -> Self {
        ForEachValues::Array(a.clone())
    }
}

macro_rules! impl_for_each_from_vec {
    ($($t:ty),*) => {
        $(
            impl From<Vec<$t>> for ForEachValues {
                fn from(v: Vec<$t>) -> Self {
                    ForEachValues::Literals(v.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

impl_for_each_from_vec!(i32, i64, f64, bool, Literal);

/// Scoped builder for one program.
///
/// The builder starts with the program scope open. Nested blocks are opened
/// with methods returning a [`Scope`] guard that closes the block on drop:
///
/// ```
/// use qpulse_ir::{Compare, ElementType, ForSpec, ProgramBuilder};
///
/// let mut b = ProgramBuilder::new();
/// let i = b.declare(ElementType::Int).unwrap();
/// {
///     let mut body = b.for_(ForSpec::range(&i, 0, i.lt(10), &i + 1)).unwrap();
///     body.play("pi", "qubit").unwrap();
/// }
/// let program = b.finish().unwrap();
/// assert_eq!(program.root_body().len(), 1);
/// ```
#[derive(Debug)]
pub struct ProgramBuilder {
    bodies: Vec<Body>,
    root: BodyId,
    program_token: FrameToken,
    scopes: ScopeStack,
    declarations: DeclarationTable,
    sinks: Vec<Sink>,
    legacy_streams: FxHashMap<String, ResultSource>,
    legacy_saves: FxHashSet<String>,
    legacy_adc: FxHashSet<String>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a program in a closure.
pub fn program(build: impl FnOnce(&mut ProgramBuilder) -> IrResult<()>) -> IrResult<Program> {
    let mut builder = ProgramBuilder::new();
    build(&mut builder)?;
    builder.finish()
}

impl ProgramBuilder {
    /// Create a builder with the program scope open.
    pub fn new() -> Self {
        let mut scopes = ScopeStack::new();
        let root = BodyId(0);
        let program_token = scopes.push(Frame::Program(root));
        Self {
            bodies: vec![Body::default()],
            root,
            program_token,
            scopes,
            declarations: DeclarationTable::new(),
            sinks: Vec::new(),
            legacy_streams: FxHashMap::default(),
            legacy_saves: FxHashSet::default(),
            legacy_adc: FxHashSet::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut ScopeStack {
        &mut self.scopes
    }

    pub fn declarations(&self) -> &DeclarationTable {
        &self.declarations
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize)
    }

    pub fn root(&self) -> BodyId {
        self.root
    }

    /// The block statements are currently appended to.
    pub fn current_body(&self) -> IrResult<&Body> {
        let id = self.scopes.current_body()?;
        self.body_ref(id)
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    fn body_ref(&self, id: BodyId) -> IrResult<&Body> {
        self.bodies
            .get(id.0 as usize)
            .ok_or_else(|| IrError::Structure(format!("unknown block {id}")))
    }

    fn body_mut(&mut self, id: BodyId) -> IrResult<&mut Body> {
        self.bodies
            .get_mut(id.0 as usize)
            .ok_or_else(|| IrError::Structure(format!("unknown block {id}")))
    }

    fn new_body(&mut self) -> BodyId {
        self.bodies.push(Body::default());
        BodyId((self.bodies.len() - 1) as u32)
    }

    #[track_caller]
    fn push_into(&mut self, body: BodyId, kind: StatementKind) -> IrResult<()> {
        let loc = SourceLoc::caller();
        debug!(statement = kind.name(), %body, "emit");
        self.body_mut(body)?.statements.push(Statement { kind, loc });
        Ok(())
    }

    #[track_caller]
    fn emit(&mut self, kind: StatementKind) -> IrResult<&mut Self> {
        let body = self.scopes.current_body()?;
        self.push_into(body, kind)?;
        Ok(self)
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Declare with explicit options.
    pub fn declare_with(
        &mut self,
        element_type: ElementType,
        options: DeclareOptions,
    ) -> IrResult<Declared> {
        self.scopes.root_program()?;
        let declared = self.declarations.declare(element_type, options)?;
        debug!(?declared, %element_type, "declare");
        Ok(declared)
    }

    /// Declare an uninitialized scalar.
    pub fn declare(&mut self, element_type: ElementType) -> IrResult<VarRef> {
        self.declare_scalar(element_type, DeclareOptions::default())
    }

    /// Declare a scalar with an initial value.
    pub fn declare_init(
        &mut self,
        element_type: ElementType,
        value: impl Into<Literal>,
    ) -> IrResult<VarRef> {
        self.declare_scalar(
            element_type,
            DeclareOptions::value(InitValue::Scalar(value.into())),
        )
    }

    /// Declare an uninitialized array of `size` elements.
    pub fn declare_array(&mut self, element_type: ElementType, size: usize) -> IrResult<ArrayRef> {
        self.declare_vector(element_type, DeclareOptions::size(size))
    }

    /// Declare an array initialized from `values`.
    pub fn declare_array_init<T: Into<Literal>>(
        &mut self,
        element_type: ElementType,
        values: impl IntoIterator<Item = T>,
    ) -> IrResult<ArrayRef> {
        let values = values.into_iter().map(Into::into).collect();
        self.declare_vector(element_type, DeclareOptions::value(InitValue::List(values)))
    }

    fn declare_scalar(
        &mut self,
        element_type: ElementType,
        options: DeclareOptions,
    ) -> IrResult<VarRef> {
        self.declare_with(element_type, options)?
            .into_scalar()
            .ok_or_else(|| IrError::Value("expected a scalar declaration".into()))
    }

    fn declare_vector(
        &mut self,
        element_type: ElementType,
        options: DeclareOptions,
    ) -> IrResult<ArrayRef> {
        self.declare_with(element_type, options)?
            .into_array()
            .ok_or_else(|| IrError::Value("expected an array declaration".into()))
    }

    /// Declare a result stream source.
    pub fn declare_stream(&mut self) -> ResultSource {
        let name = self.declarations.next_stream_name();
        debug!(stream = %name, "declare stream");
        ResultSource::new(name, false)
    }

    /// Declare a raw ADC trace stream source. Trace streams cannot be used in `save`.
    pub fn declare_adc_stream(&mut self) -> ResultSource {
        let name = format!(
            "adc_trace_variable_buffered_{}",
            self.declarations.next_stream_name()
        );
        debug!(stream = %name, "declare adc trace stream");
        ResultSource::new(name, true)
    }

    fn legacy_stream(&mut self, tag: &str) -> ResultSource {
        if let Some(source) = self.legacy_streams.get(tag) {
            return source.clone();
        }
        let source = self.declare_stream();
        self.legacy_streams.insert(tag.to_string(), source.clone());
        source
    }

    fn legacy_save_stream(&mut self, tag: &str) -> ResultSource {
        let source = self.legacy_stream(tag);
        if self.legacy_saves.insert(tag.to_string()) {
            self.add_sink(
                tag.to_string(),
                SinkKind::SaveAll,
                source.with_timestamps().stream(),
            );
        }
        source
    }

    fn legacy_adc_stream(&mut self, tag: &str) -> ResultSource {
        let source = self.legacy_stream(tag);
        if self.legacy_adc.insert(tag.to_string()) {
            self.add_sink(
                format!("{tag}_input1"),
                SinkKind::AutoSaveAll,
                source.input1().with_timestamps().stream(),
            );
            self.add_sink(
                format!("{tag}_input2"),
                SinkKind::AutoSaveAll,
                source.input2().with_timestamps().stream(),
            );
        }
        source
    }

    pub(crate) fn add_sink(&mut self, tag: String, kind: SinkKind, stream: ResultStream) {
        if self.sinks.iter().any(|s| s.tag == tag) {
            warn!(%tag, "result tag registered more than once");
        }
        debug!(%tag, ?kind, pipeline = %stream, "register sink");
        self.sinks.push(Sink { tag, kind, stream });
    }

    // ========================================================================
    // Hardware statements
    // ========================================================================

    /// Play `pulse` on `element`.
    #[track_caller]
    pub fn play(&mut self, pulse: impl Into<Pulse>, element: &str) -> IrResult<&mut Self> {
        self.play_with(pulse, element, PlayOptions::default())
    }

    /// Play with duration, condition or target.
    #[track_caller]
    pub fn play_with(
        &mut self,
        pulse: impl Into<Pulse>,
        element: &str,
        options: PlayOptions,
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::Play(PlayStatement {
            pulse: pulse.into(),
            element: element.to_string(),
            duration: options.duration,
            condition: options.condition,
            target: options.target,
        }))
    }

    /// Pause until resumed by the host.
    #[track_caller]
    pub fn pause(&mut self) -> IrResult<&mut Self> {
        self.emit(StatementKind::Pause)
    }

    #[track_caller]
    pub fn update_frequency(
        &mut self,
        element: &str,
        frequency: impl Into<Expression>,
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::UpdateFrequency {
            element: element.to_string(),
            frequency: frequency.into(),
        })
    }

    /// Replace the element's mixer correction matrix.
    #[track_caller]
    pub fn update_correction(
        &mut self,
        element: &str,
        c00: impl Into<Expression>,
        c01: impl Into<Expression>,
        c10: impl Into<Expression>,
        c11: impl Into<Expression>,
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::UpdateCorrection {
            element: element.to_string(),
            matrix: Box::new([c00.into(), c01.into(), c10.into(), c11.into()]),
        })
    }

    #[track_caller]
    pub fn align(&mut self, elements: &[&str]) -> IrResult<&mut Self> {
        self.emit(StatementKind::Align {
            elements: to_names(elements),
        })
    }

    #[track_caller]
    pub fn reset_phase(&mut self, element: &str) -> IrResult<&mut Self> {
        self.emit(StatementKind::ResetPhase {
            element: element.to_string(),
        })
    }

    /// Wait `duration` clock cycles on `elements`.
    #[track_caller]
    pub fn wait(
        &mut self,
        duration: impl Into<Expression>,
        elements: &[&str],
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::Wait {
            duration: duration.into(),
            elements: to_names(elements),
        })
    }

    /// Wait for an external trigger, optionally playing a pulse meanwhile.
    #[track_caller]
    pub fn wait_for_trigger(
        &mut self,
        element: &str,
        pulse_to_play: Option<&str>,
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::WaitForTrigger {
            element: element.to_string(),
            pulse_to_play: pulse_to_play.map(str::to_string),
        })
    }

    #[track_caller]
    pub fn ramp_to_zero(&mut self, element: &str, duration: Option<u32>) -> IrResult<&mut Self> {
        self.emit(StatementKind::RampToZero {
            element: element.to_string(),
            duration,
        })
    }

    /// Shift the oscillator phase of `elements` by `angle` (virtual Z).
    #[track_caller]
    pub fn frame_rotation(
        &mut self,
        angle: impl Into<Expression>,
        elements: &[&str],
    ) -> IrResult<&mut Self> {
        self.emit(StatementKind::ZRotation {
            angle: angle.into(),
            elements: to_names(elements),
        })
    }

    /// Alias of [`ProgramBuilder::frame_rotation`].
    #[track_caller]
    pub fn z_rotation(
        &mut self,
        angle: impl Into<Expression>,
        elements: &[&str],
    ) -> IrResult<&mut Self> {
        self.frame_rotation(angle, elements)
    }

    #[track_caller]
    pub fn reset_frame(&mut self, elements: &[&str]) -> IrResult<&mut Self> {
        self.emit(StatementKind::ResetFrame {
            elements: to_names(elements),
        })
    }

    /// Play a measurement pulse and route the acquired signal.
    #[track_caller]
    pub fn measure(
        &mut self,
        pulse: impl Into<Pulse>,
        element: &str,
        stream: impl Into<MeasureStream>,
        processes: impl IntoIterator<Item = AnalogProcess>,
    ) -> IrResult<&mut Self> {
        self.scopes.current_body()?;
        let stream = match stream.into() {
            MeasureStream::None => None,
            MeasureStream::Stream(source) => Some(source.name().to_string()),
            MeasureStream::Tag(tag) => Some(self.legacy_adc_stream(&tag).name().to_string()),
        };
        self.emit(StatementKind::Measure(MeasureStatement {
            pulse: pulse.into(),
            element: element.to_string(),
            stream,
            processes: processes.into_iter().collect(),
        }))
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// `target = value`. The target must be a variable or an array cell.
    #[track_caller]
    pub fn assign(
        &mut self,
        target: impl Into<Expression>,
        value: impl Into<Expression>,
    ) -> IrResult<&mut Self> {
        let target = ScalarRef::try_from(target.into())?;
        self.emit(StatementKind::Assign {
            target,
            value: value.into(),
        })
    }

    /// Stream the value of a variable or array cell.
    #[track_caller]
    pub fn save(
        &mut self,
        source: impl Into<Expression>,
        target: impl Into<SaveTarget>,
    ) -> IrResult<&mut Self> {
        let source = ScalarRef::try_from(source.into())?;
        self.scopes.current_body()?;
        let stream = match target.into() {
            SaveTarget::Stream(stream) => stream,
            SaveTarget::Tag(tag) => self.legacy_save_stream(&tag),
        };
        if stream.is_adc_trace() {
            return Err(IrError::Value(format!(
                "adc trace stream '{}' cannot be used in save",
                stream.name()
            )));
        }
        self.emit(StatementKind::Save {
            source,
            stream: stream.name().to_string(),
        })
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    /// Open the body of `if condition`.
    #[track_caller]
    pub fn if_(&mut self, condition: impl Into<Expression>) -> IrResult<Scope<'_>> {
        self.scopes.current_body()?;
        let body = self.new_body();
        self.emit(StatementKind::If {
            condition: condition.into(),
            body,
            else_body: None,
        })?;
        Ok(Scope::open(self, Frame::Body(body)))
    }

    /// Open the `else` block of the `if` statement just before.
    pub fn else_(&mut self) -> IrResult<Scope<'_>> {
        let current = self.scopes.current_body()?;
        match self.body_ref(current)?.last().map(|s| &s.kind) {
            Some(StatementKind::If {
                else_body: None, ..
            }) => {}
            Some(StatementKind::If {
                else_body: Some(_), ..
            }) => {
                return Err(IrError::Structure(
                    "only a single 'else' statement can follow an 'if' statement".into(),
                ));
            }
            _ => {
                return Err(IrError::Structure(
                    "'else' statement must directly follow 'if' statement".into(),
                ));
            }
        }

        let else_id = self.new_body();
        if let Some(Statement {
            kind: StatementKind::If { else_body, .. },
            ..
        }) = self.body_mut(current)?.statements.last_mut()
        {
            *else_body = Some(else_id);
        }
        debug!(body = %else_id, "open else");
        Ok(Scope::open(self, Frame::Body(else_id)))
    }

    /// Open a `for` loop.
    ///
    /// A raw spec returns a for scope whose parts are selected with
    /// [`for_init_`](Self::for_init_), [`for_update_`](Self::for_update_),
    /// [`for_cond`](Self::for_cond) and [`for_body_`](Self::for_body_).
    /// Otherwise the init and update assignments are emitted and the loop
    /// body is returned directly.
    #[track_caller]
    pub fn for_(&mut self, spec: ForSpec) -> IrResult<Scope<'_>> {
        let raw = spec.is_raw();
        if spec.var.is_none() && (spec.init.is_some() || spec.update.is_some()) {
            return Err(IrError::Value(
                "for_ init and update need a loop variable".into(),
            ));
        }

        let owner = self.scopes.current_body()?;
        let index = self.body_ref(owner)?.len();
        let init = self.new_body();
        let update = self.new_body();
        let body = self.new_body();
        self.emit(StatementKind::For(ForStatement {
            init,
            update,
            condition: spec.cond,
            body,
        }))?;

        if let Some(var) = spec.var {
            if let Some(value) = spec.init {
                self.push_into(
                    init,
                    StatementKind::Assign {
                        target: ScalarRef::Variable(var.clone()),
                        value,
                    },
                )?;
            }
            if let Some(value) = spec.update {
                self.push_into(
                    update,
                    StatementKind::Assign {
                        target: ScalarRef::Variable(var),
                        value,
                    },
                )?;
            }
        }

        let frame = if raw {
            Frame::For(ForSlots {
                owner,
                index,
                init,
                update,
                body,
            })
        } else {
            Frame::Body(body)
        };
        Ok(Scope::open(self, frame))
    }

    /// `for_` with only a condition.
    #[track_caller]
    pub fn while_(&mut self, cond: impl Into<Expression>) -> IrResult<Scope<'_>> {
        self.for_(ForSpec::new().cond(cond))
    }

    /// A loop whose condition is the literal `true`.
    #[track_caller]
    pub fn infinite_loop_(&mut self) -> IrResult<Scope<'_>> {
        self.for_(ForSpec::new().cond(true))
    }

    /// Open the init block of the raw `for` on top of the stack.
    pub fn for_init_(&mut self) -> IrResult<Scope<'_>> {
        let slots = self.scopes.current_for()?;
        Ok(Scope::open(self, Frame::Body(slots.init)))
    }

    /// Open the update block of the raw `for` on top of the stack.
    pub fn for_update_(&mut self) -> IrResult<Scope<'_>> {
        let slots = self.scopes.current_for()?;
        Ok(Scope::open(self, Frame::Body(slots.update)))
    }

    /// Open the body of the raw `for` on top of the stack.
    pub fn for_body_(&mut self) -> IrResult<Scope<'_>> {
        let slots = self.scopes.current_for()?;
        Ok(Scope::open(self, Frame::Body(slots.body)))
    }

    /// Set the condition of the raw `for` on top of the stack.
    pub fn for_cond(&mut self, cond: impl Into<Expression>) -> IrResult<&mut Self> {
        let slots = self.scopes.current_for()?;
        let statement = self
            .body_mut(slots.owner)?
            .statements
            .get_mut(slots.index)
            .ok_or_else(|| IrError::Structure("for statement is missing".into()))?;
        match &mut statement.kind {
            StatementKind::For(f) => f.condition = Some(cond.into()),
            other => {
                return Err(IrError::Structure(format!(
                    "expected a for statement, found {}",
                    other.name()
                )));
            }
        }
        Ok(self)
    }

    /// Iterate variables over arrays in lockstep.
    ///
    /// Each variable is paired with a declared array or an inline literal
    /// list, which is declared as an array of the inferred element type.
    /// All arrays must have the same length.
    #[track_caller]
    pub fn for_each_(
        &mut self,
        vars: &[VarRef],
        values: Vec<ForEachValues>,
    ) -> IrResult<Scope<'_>> {
        self.scopes.current_body()?;
        if values.is_empty() {
            return Err(IrError::Value("values cannot be empty".into()));
        }
        if vars.len() != values.len() {
            return Err(IrError::Value(
                "number of variables does not match number of array values".into(),
            ));
        }

        let mut lengths = Vec::with_capacity(values.len());
        let mut inferred = Vec::with_capacity(values.len());
        for value in &values {
            match value {
                ForEachValues::Array(array) => {
                    let decl = self.declarations.get(array.name()).ok_or_else(|| {
                        IrError::Value(format!("array {array} is not declared"))
                    })?;
                    lengths.push(decl.size);
                    inferred.push(None);
                }
                ForEachValues::Literals(list) => {
                    if list.is_empty() {
                        return Err(IrError::Value("values cannot be empty".into()));
                    }
                    lengths.push(list.len());
                    inferred.push(Some(ElementType::infer(list)?));
                }
            }
        }
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(IrError::Value(format!(
                "for_each_ arrays must have equal lengths, got {lengths:?}"
            )));
        }

        let mut iterators = Vec::with_capacity(vars.len());
        for ((var, value), element_type) in vars.iter().zip(values).zip(inferred) {
            let array = match (value, element_type) {
                (ForEachValues::Array(array), _) => array,
                (ForEachValues::Literals(list), Some(element_type)) => {
                    self.declare_array_init(element_type, list)?
                }
                (ForEachValues::Literals(_), None) => {
                    return Err(IrError::Value("values cannot be empty".into()));
                }
            };
            iterators.push((var.clone(), array));
        }

        let body = self.new_body();
        self.emit(StatementKind::ForEach { iterators, body })?;
        Ok(Scope::open(self, Frame::Body(body)))
    }

    /// Open the stream processing section. Only valid directly in the program scope.
    pub fn stream_processing(&mut self) -> IrResult<StreamProcessing<'_>> {
        self.scopes.program_on_top()?;
        Ok(StreamProcessing::open(self))
    }

    // ========================================================================
    // Finish
    // ========================================================================

    /// Close the program scope and generate the pipeline section.
    pub fn finish(mut self) -> IrResult<Program> {
        self.scopes.pop(self.program_token)?;

        let sinks: Vec<SinkSpec> = self
            .sinks
            .iter()
            .map(|sink| SinkSpec {
                tag: sink.tag.clone(),
                kind: sink.kind,
                pipeline: sink.stream.to_pipeline(),
            })
            .collect();
        debug!(
            sinks = sinks.len(),
            blocks = self.bodies.len(),
            declarations = self.declarations.len(),
            "program finished"
        );

        Ok(Program::new(
            self.declarations.into_entries(),
            self.bodies,
            self.root,
            PipelineSection { sinks },
        ))
    }
}

fn to_names(elements: &[&str]) -> Vec<String> {
    elements.iter().map(|e| (*e).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Compare;
    use crate::measure::demod;

    fn kinds(b: &ProgramBuilder, id: BodyId) -> Vec<&'static str> {
        b.body(id)
            .unwrap()
            .statements
            .iter()
            .map(|s| s.kind.name())
            .collect()
    }

    #[test]
    fn test_statements_append_in_order() {
        let mut b = ProgramBuilder::new();
        b.play("x90", "q1")
            .unwrap()
            .wait(16, &["q1"])
            .unwrap()
            .align(&["q1", "rr1"])
            .unwrap();
        assert_eq!(kinds(&b, b.root()), vec!["play", "wait", "align"]);
    }

    #[test]
    fn test_if_else_blocks() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        {
            let mut s = b.if_(x.gt(0)).unwrap();
            s.play("a", "e").unwrap();
        }
        {
            let mut s = b.else_().unwrap();
            s.play("b", "e").unwrap();
        }
        let err = b.else_().unwrap_err();
        assert!(matches!(err, IrError::Structure(msg) if msg.contains("single")));

        let root = b.body(b.root()).unwrap();
        match &root.statements[0].kind {
            StatementKind::If {
                body,
                else_body: Some(else_body),
                ..
            } => {
                assert_eq!(kinds(&b, *body), vec!["play"]);
                assert_eq!(kinds(&b, *else_body), vec!["play"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_else_without_if() {
        let mut b = ProgramBuilder::new();
        assert!(matches!(b.else_(), Err(IrError::Structure(_))));
        b.pause().unwrap();
        let err = b.else_().unwrap_err();
        assert!(matches!(err, IrError::Structure(msg) if msg.contains("directly follow")));
    }

    #[test]
    fn test_raw_for_requires_slot() {
        let mut b = ProgramBuilder::new();
        let i = b.declare(ElementType::Int).unwrap();
        {
            let mut f = b.for_(ForSpec::new()).unwrap();
            assert!(matches!(f.play("p", "e"), Err(IrError::Scope { .. })));
            {
                let mut init = f.for_init_().unwrap();
                init.assign(&i, 0).unwrap();
            }
            f.for_cond(i.lt(3)).unwrap();
            {
                let mut update = f.for_update_().unwrap();
                update.assign(&i, &i + 1).unwrap();
            }
            {
                let mut body = f.for_body_().unwrap();
                body.play("p", "e").unwrap();
            }
        }
        assert!(matches!(b.for_body_(), Err(IrError::Scope { .. })));

        let root = b.body(b.root()).unwrap();
        match &root.statements[0].kind {
            StatementKind::For(f) => {
                assert_eq!(f.condition, Some(i.lt(3)));
                assert_eq!(kinds(&b, f.init), vec!["assign"]);
                assert_eq!(kinds(&b, f.update), vec!["assign"]);
                assert_eq!(kinds(&b, f.body), vec!["play"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_for_init_without_var() {
        let mut b = ProgramBuilder::new();
        assert!(matches!(
            b.for_(ForSpec::new().init(0)),
            Err(IrError::Value(_))
        ));
    }

    #[test]
    fn test_while_and_infinite_loop() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Fixed).unwrap();
        {
            let mut w = b.while_(x.le(30)).unwrap();
            w.assign(&x, &x + 1).unwrap();
        }
        {
            let mut l = b.infinite_loop_().unwrap();
            l.play("p", "e").unwrap();
        }
        let root = b.body(b.root()).unwrap();
        match (&root.statements[0].kind, &root.statements[1].kind) {
            (StatementKind::For(w), StatementKind::For(l)) => {
                assert_eq!(w.condition, Some(x.le(30)));
                assert!(b.body(w.init).unwrap().is_empty());
                assert_eq!(l.condition, Some(Expression::literal(true)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_for_each_declares_literal_arrays() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Fixed).unwrap();
        let y = b.declare(ElementType::Int).unwrap();
        {
            let mut s = b
                .for_each_(
                    &[x.clone(), y.clone()],
                    vec![vec![0.1, 0.4, 0.6].into(), vec![1, 2, 3].into()],
                )
                .unwrap();
            s.play(Pulse::named("p").amp(&x), "e").unwrap();
        }
        let a1 = b.declarations().get("a1").unwrap();
        let a2 = b.declarations().get("a2").unwrap();
        assert_eq!(a1.element_type, ElementType::Fixed);
        assert_eq!(a2.element_type, ElementType::Int);
        assert_eq!(a1.size, a2.size);
    }

    #[test]
    fn test_for_each_rejects_mismatches() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        let y = b.declare(ElementType::Int).unwrap();

        let err = b
            .for_each_(&[x.clone()], vec![vec![1].into(), vec![2].into()])
            .unwrap_err();
        assert!(matches!(err, IrError::Value(msg) if msg.contains("number of variables")));

        let err = b
            .for_each_(&[x.clone(), y], vec![vec![1, 2].into(), vec![3].into()])
            .unwrap_err();
        assert!(matches!(err, IrError::Value(msg) if msg.contains("equal lengths")));

        assert!(b.for_each_(&[], Vec::new()).is_err());
        assert!(
            b.for_each_(&[x], vec![vec![true, false].into()])
                .map(|_| ())
                .is_ok()
        );
        assert!(b.declarations().get("a2").is_none());
    }

    #[test]
    fn test_assign_target_must_be_scalar_ref() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        let a = b.declare_array(ElementType::Int, 4).unwrap();
        b.assign(a.at(1), &x).unwrap();
        assert!(matches!(b.assign(&x + 1, 2), Err(IrError::Type(_))));
        assert!(matches!(b.assign(&a, 2), Err(IrError::Type(_))));
    }

    #[test]
    fn test_legacy_save_registers_tag_once() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        b.save(&x, "x").unwrap().save(&x, "x").unwrap();

        assert_eq!(b.sinks().len(), 1);
        assert_eq!(b.sinks()[0].tag, "x");
        assert_eq!(b.sinks()[0].kind, SinkKind::SaveAll);
        assert_eq!(
            b.sinks()[0].stream.source().timestamps,
            crate::stream::TimestampMode::With
        );
    }

    #[test]
    fn test_adc_trace_rejected_in_save() {
        let mut b = ProgramBuilder::new();
        let x = b.declare(ElementType::Int).unwrap();
        let trace = b.declare_adc_stream();
        assert!(trace.name().starts_with("adc_trace_variable_buffered_r"));
        assert!(matches!(b.save(&x, &trace), Err(IrError::Value(_))));
    }

    #[test]
    fn test_measure_with_legacy_tag() {
        let mut b = ProgramBuilder::new();
        let i = b.declare(ElementType::Fixed).unwrap();
        b.measure("readout", "rr1", "raw", [demod().full("cos", &i)])
            .unwrap();
        let tags: Vec<_> = b.sinks().iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(tags, vec!["raw_input1", "raw_input2"]);
        assert!(b.sinks().iter().all(|s| s.kind == SinkKind::AutoSaveAll));
    }

    #[test]
    fn test_stream_processing_only_at_program_level() {
        let mut b = ProgramBuilder::new();
        {
            let mut s = b.infinite_loop_().unwrap();
            assert!(matches!(s.stream_processing(), Err(IrError::Scope { .. })));
        }
        let mut sp = b.stream_processing().unwrap();
        assert!(matches!(sp.pause(), Err(IrError::Scope { .. })));
        sp.end().unwrap();
        b.pause().unwrap();
    }

    #[test]
    fn test_explicit_end_out_of_order() {
        let mut b = ProgramBuilder::new();
        // Leak the guard so its frame stays open.
        std::mem::forget(b.infinite_loop_().unwrap());
        let err = b.finish().unwrap_err();
        assert!(matches!(err, IrError::Scope { .. }));
    }

    #[test]
    fn test_closure_entry() {
        let program = program(|b| {
            let x = b.declare_init(ElementType::Int, 2)?;
            b.save(&x, "x")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(program.sinks().len(), 1);
        assert_eq!(program.declarations().len(), 1);
    }
}
