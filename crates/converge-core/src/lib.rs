//! # converge-core
//!
//! Data model for reconciling a locally-desired collection against remote,
//! eventually-consistent, versioned state.
//!
//! This crate holds plain values only. The remote contract lives in
//! `converge-remote` and the algorithms (diff, retry, wait, mutate) live in
//! `converge-engine`.
//!
//! ## Overview
//!
//! - [`DesiredState`] / [`ObservedState`]: ordered keyed collections being reconciled
//! - [`ConcurrencyToken`]: optimistic-concurrency value threaded through mutations
//! - [`LifecycleStatus`]: status string surfaced by the remote for waiters
//! - [`ChangeSet`]: add/remove/modify partition produced by diffing
//! - [`BatchPlan`]: ordered chunks respecting a per-call item limit
//! - [`WaitSpec`]: description of one asynchronous status transition
//! - [`RetryPolicy`]: budget and backoff for transient-error retries

mod batch;
mod change;
mod error;
mod retry;
mod state;
mod token;
mod wait;

pub use batch::{BatchPlan, UnprocessedItem};
pub use change::ChangeSet;
pub use error::CoreError;
pub use retry::{Backoff, RetryPolicy};
pub use state::{DesiredState, ObservedState, ResourceRef};
pub use token::{ConcurrencyToken, LifecycleStatus};
pub use wait::{AbsencePolicy, StatusClass, WaitSpec};

/// Result type for data model operations.
pub type Result<T> = std::result::Result<T, CoreError>;
