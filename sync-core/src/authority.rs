//! The synchronization authority contract.
//!
//! An authority is a broker keyed by broadcast group ([`StateId`]) that
//! stores the last pushed value and the callbacks to notify on change.
//! Participants are told apart by their [`ParticipantId`] so a push never
//! echoes back to the participant that made it.
//!
//! The methods are generic over the value type, so the trait is used as a
//! type parameter (`SynchronizationContext<A: SynchronizationAuthority>`)
//! rather than as a trait object.
//!
//! [`StateId`]: propsync_types::StateId
//! [`ParticipantId`]: propsync_types::ParticipantId

use propsync_types::SyncKey;
use std::sync::Arc;

use crate::error::{AuthorityResult, CallbackError};

/// A value that can be synchronized.
///
/// `Default` supplies the value pulled from a group nobody has pushed to.
pub trait SyncValue: Clone + Default + Send + Sync + 'static {}

impl<T> SyncValue for T where T: Clone + Default + Send + Sync + 'static {}

/// A subscriber callback, invoked with every value another participant pushes.
pub type Callback<T> = Arc<dyn Fn(&T) -> Result<(), CallbackError> + Send + Sync>;

/// Broker of "last known value" plus "who to notify on change".
///
/// Implementations must:
/// - serialize `push` per state id, including its fan-out, and make a
///   completed push visible to every later `pull`;
/// - skip the pushing participant's own callback;
/// - keep at most one callback per participant per state id;
/// - treat unsubscribing an unknown participant or state as a no-op.
pub trait SynchronizationAuthority: Send + Sync + 'static {
    /// Current value for the key's group, or `T::default()` if nothing has
    /// been pushed yet.
    fn pull<T: SyncValue>(&self, key: &SyncKey) -> T;

    /// Store `value` for the key's group and notify every other subscriber.
    ///
    /// Returns [`AuthorityError::AggregateNotificationFailure`] if any
    /// callback failed; the value is stored regardless.
    ///
    /// [`AuthorityError::AggregateNotificationFailure`]: crate::AuthorityError::AggregateNotificationFailure
    fn push<T: SyncValue>(&self, key: &SyncKey, value: T) -> AuthorityResult<()>;

    /// Register (or replace) the key's participant callback.
    fn subscribe<T: SyncValue>(&self, key: &SyncKey, callback: Callback<T>)
        -> AuthorityResult<()>;

    /// Remove the key's participant callback.
    fn unsubscribe(&self, key: &SyncKey) -> AuthorityResult<()>;
}

/// Wrap a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: Fn(&T) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}
