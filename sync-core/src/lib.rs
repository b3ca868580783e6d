//! # sync-core
//!
//! Field synchronization between in-memory instances.
//!
//! Instances that share a broadcast group keep their tracked fields equal by
//! pushing writes through a shared [`SynchronizationAuthority`] and
//! receiving each other's writes through subscriber callbacks.
//!
//! ```text
//! x.write(name) ─► SynchronizationContext ─► authority.push ─┬─► y callback ─► y.name
//!                                                             └─► z callback ─► z.name
//! ```
//!
//! - [`InMemoryAuthority`] - the process-local broker
//! - [`SynchronizationContext`] - one instance's synchronize/desynchronize
//!   state machine, with rollback on partial failure
//! - [`SyncField`] - the local storage generated accessors read and write
//! - [`Saga`] - the compensating-action runner the transitions share
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use propsync_core::{InMemoryAuthority, SyncField, SynchronizationContext};
//! use propsync_types::InstanceIdentity;
//!
//! let authority = Arc::new(InMemoryAuthority::new());
//!
//! let x_name = SyncField::<String>::new("name");
//! let x = SynchronizationContext::builder(
//!     Arc::clone(&authority),
//!     InstanceIdentity::new("Person", "x").unwrap(),
//! )
//! .source_id("G")
//! .track(&x_name)
//! .build()
//! .unwrap();
//!
//! let y_name = SyncField::<String>::new("name");
//! let y = SynchronizationContext::builder(
//!     Arc::clone(&authority),
//!     InstanceIdentity::new("Person", "y").unwrap(),
//! )
//! .source_id("G")
//! .track(&y_name)
//! .build()
//! .unwrap();
//!
//! x.synchronize().unwrap();
//! y.synchronize().unwrap();
//! x.write(&x_name, "Alice".to_string()).unwrap();
//! assert_eq!(y_name.get(), "Alice");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authority;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod memory;
pub mod saga;
pub mod testing;

pub use authority::{callback, Callback, SyncValue, SynchronizationAuthority};
pub use config::{AuthorityConfig, Config, ConfigError};
pub use context::{ContextBuilder, SyncStatus, SynchronizationContext};
pub use error::{
    AuthorityError, AuthorityResult, CallbackError, Error, NotificationFailure,
    NotificationFailures, Result, RollbackFailure, Transition, TransitionError,
    TransitionResult, TransitionStep,
};
pub use field::{ChangeHook, SyncField};
pub use memory::{AuthorityStats, InMemoryAuthority};
pub use saga::{Saga, SagaFailure};
