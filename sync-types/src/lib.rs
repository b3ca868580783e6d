//! # sync-types
//!
//! Key and identity types for propsync field synchronization.
//!
//! This crate provides the foundational types shared by every propsync crate:
//! - [`SyncKey`] - one participant within one broadcast group
//! - [`StateId`] - the storage key a group's value lives under
//! - [`ParticipantId`], [`InstanceIdentity`] - who is participating
//! - [`KeyError`] - construction errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;

pub use error::{KeyComponent, KeyError, KeyResult};
pub use ids::{InstanceIdentity, ParticipantId, StateId, SyncKey};
