//! # converge-remote
//!
//! The contract between the reconciliation engine and a remote control-plane API.
//!
//! This crate defines the [`RemoteApi`] trait every backend implements, the
//! [`RemoteError`] taxonomy, the [`TransientClassifier`] used by the retrier,
//! and the idempotent read/delete [`GuardedRemote`]. It does not contain a
//! real backend; `converge-remote-memory` provides an in-memory one.
//!
//! ## Example
//!
//! ```ignore
//! use converge_remote::{GuardedRemote, RemoteApi};
//!
//! async fn observe(api: impl RemoteApi, resource: &ResourceRef) -> Result<(), RemoteError> {
//!     let guard = GuardedRemote::new(api);
//!     match guard.read(resource).await? {
//!         Some(remote) => println!("{} at {}", remote.status, remote.token),
//!         None => println!("{resource} does not exist"),
//!     }
//!     Ok(())
//! }
//! ```

mod classify;
mod error;
pub mod guard;
mod traits;
mod types;

pub use classify::TransientClassifier;
pub use error::{ErrorCategory, RemoteError};
pub use guard::{DeleteOutcome, GuardedRemote, absent_if_not_found, assert_single, ignore_not_found};
pub use traits::{DynRemote, RemoteApi};
pub use types::{BatchOutcome, Member, RejectedItem, RemoteResource};
