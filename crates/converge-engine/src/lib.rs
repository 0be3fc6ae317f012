//! # converge-engine
//!
//! Reconciles a locally-desired resource against remote, eventually-consistent,
//! versioned state.
//!
//! ## Components
//!
//! - [`diff()`]: add/remove/modify partition of desired against observed
//! - [`batch`]: in-order chunk submission with aggregated per-item failures
//! - [`retry_when`]: bounded retry of transient errors with one final attempt
//! - [`Waiter`]: status polling until target, failure or timeout
//! - [`Mutator`]: ordered single-concern calls threading the concurrency token
//! - [`Reconciler`]: one full pass (read, create, diff, mutate, wait) and destroy
//!
//! ## Example
//!
//! ```ignore
//! use converge_engine::{DesiredResource, Reconciler};
//!
//! let reconciler = Reconciler::from_config(client, &config);
//! let report = reconciler.reconcile(&desired).await?;
//! assert!(reconciler.reconcile(&desired).await?.is_noop());
//! ```

pub mod batch;
pub mod diff;
pub mod error;
pub mod mutate;
pub mod plan;
pub mod reconcile;
pub mod retry;
pub mod wait;

pub use batch::{BatchReport, CHUNK_FAILED, ChunkOutcome, submit, submit_threaded};
pub use diff::{diff, diff_attributes, diff_keys};
pub use error::{EngineError, MutationFailure, PartialBatchFailure, Result};
pub use mutate::{BatchItem, MutationReport, Mutator};
pub use plan::{BatchLimits, MutationPlan, MutationStep};
pub use reconcile::{DesiredResource, Lifecycle, ReconcileReport, ReconcileSettings, Reconciler};
pub use retry::{retry_until_not_found, retry_when, retry_when_new_resource_not_found};
pub use wait::{StatusSource, WaitError, Waiter};
