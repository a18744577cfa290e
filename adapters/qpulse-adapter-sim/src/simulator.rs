//! Simulator backend implementation.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::Rng;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use qpulse_hal::{
    ChunkStream, Diagnostic, DiagnosticLevel, ElementDtype, ExecuteRequest, ExecuteResponse,
    ExecutionBackend, HalError, HalResult, HardwareConfig, JobId, ResultChunk, ResultHeader,
    ResultItemSchema, ResultSchema, ResultValue, ScalarKind,
};
use qpulse_ir::{Program, StatementKind};

use crate::schema::infer_schema;

/// Items per chunk unless configured otherwise.
const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Poll interval of streams following a result that is still processing.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(10);

/// One named result of a simulated job.
struct SimResult {
    schema: ResultItemSchema,
    header: ResultHeader,
    /// Every item for `save_all` results, only the latest for `save`.
    items: Vec<ResultValue>,
}

impl SimResult {
    fn new(schema: ResultItemSchema) -> Self {
        Self {
            schema,
            header: ResultHeader::default(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, values: Vec<ResultValue>) -> HalResult<()> {
        if self.header.done || self.header.closed {
            return Err(HalError::InvalidRequest(format!(
                "result {} no longer accepts values",
                self.schema.name
            )));
        }
        // Reject values the dtype cannot carry.
        self.schema.dtype.encode(&values)?;

        self.header.count_so_far += values.len();
        if self.schema.is_single {
            if let Some(last) = values.into_iter().last() {
                self.items = vec![last];
            }
        } else {
            self.items.extend(values);
        }
        Ok(())
    }
}

/// Job data for the simulator.
struct SimJob {
    schema: ResultSchema,
    results: FxHashMap<String, SimResult>,
    paused: bool,
}

type JobTable = Arc<Mutex<FxHashMap<String, SimJob>>>;

fn lock(jobs: &Mutex<FxHashMap<String, SimJob>>) -> MutexGuard<'_, FxHashMap<String, SimJob>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory scripted execution backend.
///
/// Accepted programs get a job whose results are fed by the caller through
/// [`push_values`](Self::push_values) or [`fill_synthetic`](Self::fill_synthetic)
/// and completed with [`finish`](Self::finish) or [`close`](Self::close).
/// Programs pausing at a `pause` statement start paused.
pub struct SimulatorBackend {
    name: String,
    /// Active jobs.
    jobs: JobTable,
    chunk_size: usize,
    /// Diagnostics returned for every execution, rejecting it.
    rejection: Option<Vec<Diagnostic>>,
}

impl SimulatorBackend {
    /// Create a new simulator backend with default settings.
    pub fn new() -> Self {
        Self {
            name: "simulator".to_string(),
            jobs: Arc::new(Mutex::new(FxHashMap::default())),
            chunk_size: DEFAULT_CHUNK_SIZE,
            rejection: None,
        }
    }

    /// Serve fetches in chunks of `chunk_size` items.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Reject every execution with these diagnostics.
    pub fn with_rejection(mut self, messages: Vec<Diagnostic>) -> Self {
        self.rejection = Some(messages);
        self
    }

    /// Ids of every job accepted so far.
    pub fn job_ids(&self) -> Vec<JobId> {
        lock(&self.jobs).keys().map(|id| JobId::new(id.clone())).collect()
    }

    fn with_job<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut SimJob) -> HalResult<T>,
    ) -> HalResult<T> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        f(job)
    }

    fn with_result<T>(
        &self,
        job_id: &JobId,
        name: &str,
        f: impl FnOnce(&mut SimResult) -> HalResult<T>,
    ) -> HalResult<T> {
        self.with_job(job_id, |job| {
            let result = job
                .results
                .get_mut(name)
                .ok_or_else(|| HalError::ResultNotFound(name.to_string()))?;
            f(result)
        })
    }

    // ========================================================================
    // Result harness
    // ========================================================================

    /// Append values to a named result.
    pub fn push_values(
        &self,
        job_id: &JobId,
        name: &str,
        values: impl IntoIterator<Item = ResultValue>,
    ) -> HalResult<()> {
        let values: Vec<_> = values.into_iter().collect();
        let count = values.len();
        self.with_result(job_id, name, |result| result.push(values))?;
        debug!(job_id = %job_id, name, count, "pushed values");
        Ok(())
    }

    /// Flag a named result as having lost data.
    pub fn set_dataloss(&self, job_id: &JobId, name: &str) -> HalResult<()> {
        self.with_result(job_id, name, |result| {
            result.header.has_dataloss = true;
            Ok(())
        })
    }

    /// Mark one result as done.
    pub fn finish_result(&self, job_id: &JobId, name: &str) -> HalResult<()> {
        self.with_result(job_id, name, |result| {
            result.header.done = true;
            Ok(())
        })
    }

    /// Mark every result of a job as done.
    pub fn finish(&self, job_id: &JobId) -> HalResult<()> {
        self.with_job(job_id, |job| {
            for result in job.results.values_mut() {
                result.header.done = true;
            }
            job.paused = false;
            Ok(())
        })?;
        info!(job_id = %job_id, "job finished");
        Ok(())
    }

    /// Close every result of a job that is not done yet.
    pub fn close(&self, job_id: &JobId) -> HalResult<()> {
        self.with_job(job_id, |job| {
            for result in job.results.values_mut() {
                if !result.header.done {
                    result.header.closed = true;
                }
            }
            job.paused = false;
            Ok(())
        })
    }

    /// Push `count` random values into every result of a job.
    ///
    /// Bounded results receive at most their expected count.
    pub fn fill_synthetic(&self, job_id: &JobId, count: usize) -> HalResult<()> {
        let mut rng = rand::thread_rng();
        self.with_job(job_id, |job| {
            for result in job.results.values_mut() {
                if result.header.done || result.header.closed {
                    continue;
                }
                let n = result
                    .schema
                    .expected_count
                    .map_or(count, |expected| expected.min(count));
                let offset = result.header.count_so_far;
                let values = (0..n)
                    .map(|i| synthetic_value(&result.schema.dtype, offset + i, &mut rng))
                    .collect();
                result.push(values)?;
            }
            Ok(())
        })?;
        debug!(job_id = %job_id, count, "filled synthetic values");
        Ok(())
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn synthetic_value(dtype: &ElementDtype, index: usize, rng: &mut impl Rng) -> ResultValue {
    let value = synthetic_array(dtype.kind, &dtype.shape, rng);
    if dtype.timestamped {
        ResultValue::Timestamped {
            value: Box::new(value),
            timestamp: index as i64 * 4,
        }
    } else {
        value
    }
}

fn synthetic_array(kind: ScalarKind, shape: &[usize], rng: &mut impl Rng) -> ResultValue {
    match shape.split_first() {
        Some((dim, rest)) => {
            ResultValue::Array((0..*dim).map(|_| synthetic_array(kind, rest, rng)).collect())
        }
        None => match kind {
            ScalarKind::Int => ResultValue::Int(rng.gen_range(0..100)),
            ScalarKind::Float => ResultValue::Float(rng.gen_range(-1.0..1.0)),
            ScalarKind::Bool => ResultValue::Bool(rng.gen_bool(0.5)),
        },
    }
}

/// Elements used by a program that the hardware configuration does not define.
///
/// Only checked when the configuration has an `elements` mapping.
fn unknown_elements(program: &Program, config: &HardwareConfig) -> Vec<Diagnostic> {
    let Some(defined) = config.section("elements").and_then(|e| e.as_object()) else {
        return Vec::new();
    };
    let mut unknown: Vec<&str> = Vec::new();
    for statement in program.statements() {
        for element in statement_elements(&statement.kind) {
            if !defined.contains_key(element) && !unknown.contains(&element) {
                unknown.push(element);
            }
        }
    }
    unknown
        .into_iter()
        .map(|element| Diagnostic::error(format!("unknown element '{element}'")))
        .collect()
}

fn statement_elements(kind: &StatementKind) -> Vec<&str> {
    match kind {
        StatementKind::Play(play) => vec![play.element.as_str()],
        StatementKind::Measure(measure) => vec![measure.element.as_str()],
        StatementKind::UpdateFrequency { element, .. }
        | StatementKind::UpdateCorrection { element, .. }
        | StatementKind::ResetPhase { element }
        | StatementKind::WaitForTrigger { element, .. }
        | StatementKind::RampToZero { element, .. } => vec![element.as_str()],
        StatementKind::Align { elements }
        | StatementKind::Wait { elements, .. }
        | StatementKind::ZRotation { elements, .. }
        | StatementKind::ResetFrame { elements } => elements.iter().map(String::as_str).collect(),
        _ => Vec::new(),
    }
}

fn encode_chunk(dtype: &ElementDtype, items: &[ResultValue]) -> HalResult<ResultChunk> {
    Ok(ResultChunk {
        count: items.len(),
        data: dtype.encode(items)?,
    })
}

/// State of a stream following a result until it is done or closed.
struct Follow {
    jobs: JobTable,
    job_id: String,
    name: String,
    position: usize,
    chunk_size: usize,
    finished: bool,
}

impl Follow {
    async fn next_chunk(&mut self) -> Option<HalResult<ResultChunk>> {
        while !self.finished {
            let chunk = {
                let jobs = lock(&self.jobs);
                match jobs.get(&self.job_id).and_then(|job| job.results.get(&self.name)) {
                    None => {
                        self.finished = true;
                        Some(Err(HalError::ResultNotFound(self.name.clone())))
                    }
                    Some(result) => {
                        let end = result.items.len().min(self.position + self.chunk_size);
                        if self.position < end {
                            let items = &result.items[self.position..end];
                            self.position = end;
                            Some(encode_chunk(&result.schema.dtype, items))
                        } else {
                            self.finished = result.header.done || result.header.closed;
                            None
                        }
                    }
                }
            };
            if chunk.is_some() {
                return chunk;
            }
            if !self.finished {
                tokio::time::sleep(FOLLOW_INTERVAL).await;
            }
        }
        None
    }
}

#[async_trait]
impl ExecutionBackend for SimulatorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request))]
    async fn execute(&self, request: &ExecuteRequest) -> HalResult<ExecuteResponse> {
        let program = Program::from_json(&request.program)?;
        let job_id = JobId::new(Uuid::new_v4().to_string());

        if let Some(messages) = &self.rejection {
            warn!(job_id = %job_id, "rejecting program");
            return Ok(ExecuteResponse {
                job_id,
                ok: false,
                messages: messages.clone(),
            });
        }

        let mut messages = unknown_elements(&program, &request.config);
        if messages.iter().any(|d| d.level == DiagnosticLevel::Error) {
            return Ok(ExecuteResponse {
                job_id,
                ok: false,
                messages,
            });
        }

        let schema = infer_schema(&program);
        let mut results: FxHashMap<String, SimResult> = schema
            .items
            .iter()
            .map(|item| (item.name.clone(), SimResult::new(item.clone())))
            .collect();
        if request.options.dry_run {
            for result in results.values_mut() {
                result.header.closed = true;
            }
            messages.push(Diagnostic::new(
                DiagnosticLevel::Info,
                "dry run: program accepted without running",
            ));
        }
        let paused = !request.options.dry_run
            && program
                .statements()
                .iter()
                .any(|s| matches!(s.kind, StatementKind::Pause));

        debug!(job_id = %job_id, results = schema.len(), paused, "accepted program");
        lock(&self.jobs).insert(
            job_id.0.clone(),
            SimJob {
                schema,
                results,
                paused,
            },
        );

        Ok(ExecuteResponse {
            job_id,
            ok: true,
            messages,
        })
    }

    async fn result_schema(&self, job_id: &JobId) -> HalResult<ResultSchema> {
        self.with_job(job_id, |job| Ok(job.schema.clone()))
    }

    async fn result_header(&self, job_id: &JobId, name: &str) -> HalResult<ResultHeader> {
        self.with_result(job_id, name, |result| Ok(result.header))
    }

    async fn fetch_chunks(
        &self,
        job_id: &JobId,
        name: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> HalResult<ChunkStream> {
        let Some(limit) = limit else {
            self.with_result(job_id, name, |_| Ok(()))?;
            let follow = Follow {
                jobs: Arc::clone(&self.jobs),
                job_id: job_id.0.clone(),
                name: name.to_string(),
                position: offset,
                chunk_size: self.chunk_size,
                finished: false,
            };
            let chunks = stream::unfold(follow, |mut follow| async move {
                let chunk = follow.next_chunk().await?;
                Some((chunk, follow))
            });
            return Ok(chunks.boxed());
        };

        let chunks = self.with_result(job_id, name, |result| {
            let start = offset.min(result.items.len());
            let end = offset.saturating_add(limit).min(result.items.len());
            result.items[start..end]
                .chunks(self.chunk_size)
                .map(|items| encode_chunk(&result.schema.dtype, items))
                .collect::<HalResult<Vec<_>>>()
        })?;
        debug!(name, offset, limit, chunks = chunks.len(), "serving chunks");
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn resume(&self, job_id: &JobId) -> HalResult<()> {
        self.with_job(job_id, |job| {
            job.paused = false;
            Ok(())
        })
    }

    async fn halt(&self, job_id: &JobId) -> HalResult<()> {
        self.close(job_id)
    }

    async fn is_paused(&self, job_id: &JobId) -> HalResult<bool> {
        self.with_job(job_id, |job| Ok(job.paused))
    }
}
