//! Results client.
//!
//! A [`JobResults`] holds one [`NamedJobResult`] per sink of the job's
//! pipeline. Handles poll a header snapshot to track progress and fetch
//! items as binary chunks decoded with the sink's [`ElementDtype`].
//!
//! ```text
//!   header: count_so_far, done, closed, has_dataloss
//!   fetch(range) ──→ snapshot header ──→ fetch_chunks(offset, limit) ──→ decode
//! ```

use futures::stream::{self, BoxStream, StreamExt};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use crate::backend::ExecutionBackend;
use crate::dtype::{ElementDtype, ResultValue};
use crate::error::{HalError, HalResult};
use crate::job::JobId;

/// How long `fetcher` waits for a first value before streaming.
const FETCHER_FIRST_VALUE_WAIT: Duration = Duration::from_millis(500);

/// Progress of one named result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultHeader {
    pub count_so_far: usize,
    /// All items were produced.
    pub done: bool,
    /// The result stopped before being done (job halted or failed).
    pub closed: bool,
    pub has_dataloss: bool,
}

/// Schema of one named result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItemSchema {
    pub name: String,
    /// Fed by `save` (latest value only) rather than `save_all`.
    pub is_single: bool,
    pub expected_count: Option<usize>,
    pub dtype: ElementDtype,
}

/// Schema of every named result of a job, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSchema {
    pub items: Vec<ResultItemSchema>,
}

impl ResultSchema {
    pub fn get(&self, name: &str) -> Option<&ResultItemSchema> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Item selection for [`NamedJobResult::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRange {
    /// Every item available when the fetch starts.
    All,
    Index(usize),
    /// `start..stop`; missing bounds default to `0` and the current count.
    Slice {
        start: Option<usize>,
        stop: Option<usize>,
    },
}

impl From<usize> for FetchRange {
    fn from(index: usize) -> Self {
        FetchRange::Index(index)
    }
}

impl From<Range<usize>> for FetchRange {
    fn from(r: Range<usize>) -> Self {
        FetchRange::Slice {
            start: Some(r.start),
            stop: Some(r.end),
        }
    }
}

impl From<RangeFrom<usize>> for FetchRange {
    fn from(r: RangeFrom<usize>) -> Self {
        FetchRange::Slice {
            start: Some(r.start),
            stop: None,
        }
    }
}

impl From<RangeTo<usize>> for FetchRange {
    fn from(r: RangeTo<usize>) -> Self {
        FetchRange::Slice {
            start: None,
            stop: Some(r.end),
        }
    }
}

impl From<RangeFull> for FetchRange {
    fn from(_: RangeFull) -> Self {
        FetchRange::All
    }
}

/// Fetched items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FetchedResult {
    /// Items of a `save_all` result.
    Values(Vec<ResultValue>),
    /// The value of a `save` result, if one was produced.
    Single(Option<ResultValue>),
}

impl FetchedResult {
    /// Items as a list; a single value becomes a list of at most one.
    pub fn into_values(self) -> Vec<ResultValue> {
        match self {
            FetchedResult::Values(values) => values,
            FetchedResult::Single(value) => value.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FetchedResult::Values(values) => values.len(),
            FetchedResult::Single(value) => usize::from(value.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one named result of a job.
#[derive(Clone)]
pub struct NamedJobResult {
    job_id: JobId,
    schema: ResultItemSchema,
    backend: Arc<dyn ExecutionBackend>,
    poll_interval: Duration,
}

impl fmt::Debug for NamedJobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedJobResult")
            .field("job_id", &self.job_id)
            .field("schema", &self.schema)
            .field("backend", &self.backend.name())
            .finish()
    }
}

fn deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl NamedJobResult {
    pub fn new(
        job_id: JobId,
        schema: ResultItemSchema,
        backend: Arc<dyn ExecutionBackend>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            job_id,
            schema,
            backend,
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_single(&self) -> bool {
        self.schema.is_single
    }

    pub fn expected_count(&self) -> Option<usize> {
        self.schema.expected_count
    }

    pub fn dtype(&self) -> &ElementDtype {
        &self.schema.dtype
    }

    /// Current header snapshot.
    pub async fn header(&self) -> HalResult<ResultHeader> {
        self.backend.result_header(&self.job_id, self.name()).await
    }

    /// Number of items produced so far.
    pub async fn count_so_far(&self) -> HalResult<usize> {
        Ok(self.header().await?.count_so_far)
    }

    pub async fn has_dataloss(&self) -> HalResult<bool> {
        Ok(self.header().await?.has_dataloss)
    }

    /// Neither done nor closed.
    pub async fn is_processing(&self) -> HalResult<bool> {
        let header = self.header().await?;
        Ok(!(header.done || header.closed))
    }

    /// Wait until at least `count` items were produced.
    ///
    /// Returns without error when the timeout elapses first. A single
    /// result can only wait for one value.
    #[instrument(skip(self), fields(name = %self.schema.name))]
    pub async fn wait_for_values(
        &self,
        count: usize,
        timeout: Option<Duration>,
    ) -> HalResult<()> {
        if self.schema.is_single && count != 1 {
            return Err(HalError::InvalidRequest(
                "single result can wait only for a single value".into(),
            ));
        }
        let deadline = deadline(timeout);
        loop {
            if self.count_so_far().await? >= count {
                return Ok(());
            }
            if expired(deadline) {
                debug!(count, "wait_for_values reached its deadline");
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Wait until the result is done or closed.
    ///
    /// Returns `true` if it finished and `false` if it closed before being
    /// done. Fails with [`HalError::Timeout`] when the deadline elapses.
    #[instrument(skip(self), fields(name = %self.schema.name))]
    pub async fn wait_for_all_values(&self, timeout: Option<Duration>) -> HalResult<bool> {
        let deadline = deadline(timeout);
        loop {
            let header = self.header().await?;
            if header.done || header.closed {
                return Ok(header.done);
            }
            if expired(deadline) {
                return Err(HalError::Timeout(format!(
                    "result {} was not done in time",
                    self.name()
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Fetch items into memory.
    ///
    /// The item count is fixed by a header snapshot taken before streaming,
    /// so items produced meanwhile are not included. A single result always
    /// returns its one value; other ranges are ignored with a warning.
    pub async fn fetch(&self, range: impl Into<FetchRange>) -> HalResult<FetchedResult> {
        let range = range.into();
        if self.schema.is_single {
            if !matches!(range, FetchRange::All | FetchRange::Index(0)) {
                warn!(
                    name = %self.name(),
                    "Fetching single result will always return the single value"
                );
            }
            let values = self.fetch_slice(Some(0), Some(1)).await?;
            return Ok(FetchedResult::Single(values.into_iter().next()));
        }

        let values = match range {
            FetchRange::All => {
                let count = self.count_so_far().await?;
                self.fetch_slice(Some(0), Some(count)).await?
            }
            FetchRange::Index(index) => {
                self.fetch_slice(Some(index), Some(index.saturating_add(1)))
                    .await?
            }
            FetchRange::Slice { start, stop } => self.fetch_slice(start, stop).await?,
        };
        Ok(FetchedResult::Values(values))
    }

    /// Fetch every item available now.
    pub async fn fetch_all(&self) -> HalResult<FetchedResult> {
        self.fetch(FetchRange::All).await
    }

    #[instrument(skip(self), fields(name = %self.schema.name))]
    async fn fetch_slice(
        &self,
        start: Option<usize>,
        stop: Option<usize>,
    ) -> HalResult<Vec<ResultValue>> {
        let header = self.header().await?;
        let stop = stop.unwrap_or(header.count_so_far);
        let start = start.unwrap_or(0);
        let limit = stop.saturating_sub(start);

        let mut chunks = self
            .backend
            .fetch_chunks(&self.job_id, self.name(), start, Some(limit))
            .await?;
        let mut count = 0;
        let mut data = Vec::with_capacity(limit * self.schema.dtype.item_size());
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            count += chunk.count;
            data.extend_from_slice(&chunk.data);
        }
        debug!(start, limit, count, "fetched result chunks");

        if header.has_dataloss {
            warn!("Results variable {} has data loss", self.name());
        }
        self.schema.dtype.decode(&data, count)
    }

    /// Stream items one by one as they arrive.
    ///
    /// Only for `save_all` results. Waits briefly for a first value, then
    /// follows the result from its first item.
    pub async fn fetcher(&self) -> HalResult<BoxStream<'static, HalResult<ResultValue>>> {
        if self.schema.is_single {
            return Err(HalError::InvalidRequest(format!(
                "result {} holds a single value; use fetch",
                self.name()
            )));
        }
        self.wait_for_values(1, Some(FETCHER_FIRST_VALUE_WAIT))
            .await?;

        let chunks = self
            .backend
            .fetch_chunks(&self.job_id, self.name(), 0, None)
            .await?;
        let dtype = self.schema.dtype.clone();
        let items = chunks
            .map(move |chunk| match chunk.and_then(|c| dtype.decode(&c.data, c.count)) {
                Ok(values) => values.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(err) => vec![Err(err)],
            })
            .flat_map(stream::iter)
            .boxed();
        Ok(items)
    }
}

/// Handles to every named result of a job.
#[derive(Debug, Clone)]
pub struct JobResults {
    job_id: JobId,
    results: Vec<NamedJobResult>,
    by_name: FxHashMap<String, usize>,
}

impl JobResults {
    /// Load the job's result schema and create a handle per result.
    #[instrument(skip(backend))]
    pub async fn load(
        job_id: JobId,
        backend: Arc<dyn ExecutionBackend>,
        poll_interval: Duration,
    ) -> HalResult<Self> {
        let schema = backend.result_schema(&job_id).await?;
        debug!(results = schema.len(), "loaded result schema");

        let mut by_name = FxHashMap::default();
        let mut results = Vec::with_capacity(schema.len());
        for item in schema.items {
            by_name.entry(item.name.clone()).or_insert(results.len());
            results.push(NamedJobResult::new(
                job_id.clone(),
                item,
                Arc::clone(&backend),
                poll_interval,
            ));
        }
        Ok(Self {
            job_id,
            results,
            by_name,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn get(&self, name: &str) -> Option<&NamedJobResult> {
        self.by_name.get(name).map(|&i| &self.results[i])
    }

    /// Like [`get`](Self::get), failing with [`HalError::ResultNotFound`].
    pub fn require(&self, name: &str) -> HalResult<&NamedJobResult> {
        self.get(name)
            .ok_or_else(|| HalError::ResultNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Handles in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedJobResult)> {
        self.results.iter().map(|r| (r.name(), r))
    }

    /// Whether results are still being produced, judged by the first result.
    pub async fn is_processing(&self) -> HalResult<bool> {
        match self.results.first() {
            Some(result) => result.is_processing().await,
            None => Ok(false),
        }
    }

    /// Wait for every result in turn, sharing one deadline.
    ///
    /// Every result is polled at least once, even after the deadline has
    /// passed. Returns `false` if any result closed before being done.
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    pub async fn wait_for_all_values(&self, timeout: Option<Duration>) -> HalResult<bool> {
        let deadline = deadline(timeout);
        let mut all_done = true;
        for result in &self.results {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            all_done &= result.wait_for_all_values(remaining).await?;
        }
        Ok(all_done)
    }
}

impl<'a> IntoIterator for &'a JobResults {
    type Item = &'a NamedJobResult;
    type IntoIter = std::slice::Iter<'a, NamedJobResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
