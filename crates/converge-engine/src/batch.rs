//! Batch submission.
//!
//! Every chunk of a [`BatchPlan`] is submitted in order, whatever earlier
//! chunks reported. Unprocessed items from all chunks are accumulated into one
//! [`BatchReport`].

use std::fmt::Display;
use std::future::Future;

use converge_core::{BatchPlan, ResourceRef, UnprocessedItem};
use tracing::{debug, warn};

use crate::error::PartialBatchFailure;

/// Error code recorded for items whose whole chunk was rejected.
pub const CHUNK_FAILED: &str = "ChunkFailed";

/// What one chunk call reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome<T> {
    pub unprocessed: Vec<UnprocessedItem<T>>,
}

impl<T> ChunkOutcome<T> {
    /// Every item in the chunk was processed.
    pub fn complete() -> Self {
        Self {
            unprocessed: Vec::new(),
        }
    }

    pub fn with_unprocessed(unprocessed: Vec<UnprocessedItem<T>>) -> Self {
        Self { unprocessed }
    }
}

/// Aggregate result of submitting a whole plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<T> {
    pub chunks_submitted: usize,
    /// Chunks whose call failed outright.
    pub chunks_failed: usize,
    pub items_submitted: usize,
    pub unprocessed: Vec<UnprocessedItem<T>>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            chunks_submitted: 0,
            chunks_failed: 0,
            items_submitted: 0,
            unprocessed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    fn record(&mut self, size: usize, unprocessed: impl IntoIterator<Item = UnprocessedItem<T>>) {
        self.chunks_submitted += 1;
        self.items_submitted += size;
        self.unprocessed.extend(unprocessed);
    }

    fn record_failed(&mut self, chunk: Vec<T>, error: &impl Display) {
        let message = error.to_string();
        self.chunks_failed += 1;
        self.record(
            chunk.len(),
            chunk
                .into_iter()
                .map(|item| UnprocessedItem::new(item, CHUNK_FAILED, message.clone())),
        );
    }

    /// Chunks the remote accepted, possibly with rejected items.
    pub fn chunks_accepted(&self) -> usize {
        self.chunks_submitted - self.chunks_failed
    }

    /// Success only if every chunk fully succeeded.
    pub fn is_success(&self) -> bool {
        self.unprocessed.is_empty()
    }

    /// Converts the report into a structured failure naming every unprocessed item.
    pub fn into_result(self, resource: &ResourceRef, concern: &str) -> Result<usize, PartialBatchFailure>
    where
        T: Display,
    {
        if self.unprocessed.is_empty() {
            return Ok(self.items_submitted);
        }
        Err(PartialBatchFailure {
            resource: resource.clone(),
            concern: concern.to_string(),
            unprocessed: self
                .unprocessed
                .into_iter()
                .map(|u| u.map(|item| item.to_string()))
                .collect(),
        })
    }
}

/// Submits every chunk in order. A chunk whose call fails outright has all of
/// its items recorded as unprocessed, and submission continues.
pub async fn submit<T, E, F, Fut>(plan: BatchPlan<T>, mut submit_chunk: F) -> BatchReport<T>
where
    T: Clone,
    E: Display,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<ChunkOutcome<T>, E>>,
{
    let total = plan.len();
    let mut report = BatchReport::default();

    for (index, chunk) in plan.into_iter().enumerate() {
        let size = chunk.len();
        match submit_chunk(chunk.clone()).await {
            Ok(outcome) => {
                debug!(chunk = index + 1, total, size, unprocessed = outcome.unprocessed.len(), "Chunk submitted");
                report.record(size, outcome.unprocessed);
            }
            Err(err) => {
                warn!(chunk = index + 1, total, size, error = %err, "Chunk rejected");
                report.record_failed(chunk, &err);
            }
        }
    }

    report
}

/// Submits every chunk in order, threading `state` (typically a concurrency
/// token) from each call into the next.
///
/// A chunk whose call fails outright is recorded like in [`submit`], and the
/// state the call handed back is passed on to the next chunk.
pub async fn submit_threaded<T, S, E, F, Fut>(
    plan: BatchPlan<T>,
    mut state: S,
    mut submit_chunk: F,
) -> (S, BatchReport<T>)
where
    T: Clone,
    E: Display,
    F: FnMut(S, Vec<T>) -> Fut,
    Fut: Future<Output = (S, Result<ChunkOutcome<T>, E>)>,
{
    let total = plan.len();
    let mut report = BatchReport::default();

    for (index, chunk) in plan.into_iter().enumerate() {
        let size = chunk.len();
        let (next, result) = submit_chunk(state, chunk.clone()).await;
        state = next;
        match result {
            Ok(outcome) => {
                debug!(chunk = index + 1, total, size, unprocessed = outcome.unprocessed.len(), "Chunk submitted");
                report.record(size, outcome.unprocessed);
            }
            Err(err) => {
                warn!(chunk = index + 1, total, size, error = %err, "Chunk rejected");
                report.record_failed(chunk, &err);
            }
        }
    }

    (state, report)
}
