//! In-memory remote backend for the reconciliation engine.
//!
//! This crate provides an in-memory implementation of the `RemoteApi` trait
//! from `converge-remote`, using a `DashMap` for concurrent access. It models
//! the behaviours the engine has to cope with: rotating concurrency tokens,
//! transitional lifecycle statuses, read-after-create lag, per-call batch
//! limits, rejected batch items and injected faults.
//!
//! # Example
//!
//! ```ignore
//! use converge_remote_memory::{InMemoryRemote, Operation};
//! use converge_remote::{RemoteApi, RemoteError};
//!
//! let remote = InMemoryRemote::new().with_settle_reads(2).with_batch_limit(10);
//! remote.fail_next(Operation::Create, RemoteError::throttled("slow down")).await;
//!
//! let created = remote.create(&resource, &attributes).await; // throttled
//! ```

mod journal;
mod remote;

pub use journal::{CallRecord, Operation};
pub use remote::{InMemoryRemote, status};

// Re-export the RemoteApi trait for convenience
pub use converge_remote::{RemoteApi, RemoteError, RemoteResource};
