//! Error types for sync-core.

use propsync_types::{KeyError, ParticipantId, StateId};
use std::fmt;

/// Error type returned by subscriber callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a [`SynchronizationAuthority`](crate::SynchronizationAuthority).
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// The backend could not register a callback.
    #[error("failed to subscribe {participant} to state {state_id}: {reason}")]
    SubscriptionFailure {
        /// The group the subscription targeted.
        state_id: StateId,
        /// The participant that tried to subscribe.
        participant: ParticipantId,
        /// Backend-specific reason.
        reason: String,
    },

    /// The backend could not deregister a callback.
    #[error("failed to unsubscribe {participant} from state {state_id}: {reason}")]
    UnsubscriptionFailure {
        /// The group the unsubscription targeted.
        state_id: StateId,
        /// The participant that tried to unsubscribe.
        participant: ParticipantId,
        /// Backend-specific reason.
        reason: String,
    },

    /// One or more subscriber callbacks failed during a push.
    ///
    /// The pushed value has already been stored when this is returned.
    #[error(transparent)]
    AggregateNotificationFailure(#[from] NotificationFailures),
}

/// A single subscriber callback that failed during fan-out.
#[derive(Debug, thiserror::Error)]
pub enum NotificationFailure {
    /// The callback returned an error.
    #[error("callback for {participant} failed: {source}")]
    Failed {
        /// The participant whose callback failed.
        participant: ParticipantId,
        /// The error the callback returned.
        source: CallbackError,
    },

    /// The callback panicked.
    #[error("callback for {participant} panicked: {message}")]
    Panicked {
        /// The participant whose callback panicked.
        participant: ParticipantId,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// A fan-out worker thread died outside of any callback.
    #[error("fan-out worker panicked: {message}")]
    WorkerPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl NotificationFailure {
    /// The participant whose callback failed, when known.
    pub fn participant(&self) -> Option<&ParticipantId> {
        match self {
            NotificationFailure::Failed { participant, .. }
            | NotificationFailure::Panicked { participant, .. } => Some(participant),
            NotificationFailure::WorkerPanicked { .. } => None,
        }
    }
}

/// Every callback failure collected from one push.
#[derive(Debug)]
pub struct NotificationFailures {
    state_id: StateId,
    failures: Vec<NotificationFailure>,
}

impl NotificationFailures {
    /// Bundle the failures collected while fanning out a push to `state_id`.
    pub fn new(state_id: StateId, failures: Vec<NotificationFailure>) -> Self {
        Self { state_id, failures }
    }

    /// The group the failing push targeted.
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    /// The individual failures.
    pub fn failures(&self) -> &[NotificationFailure] {
        &self.failures
    }

    /// Number of callbacks that failed.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True when no callback failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for NotificationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriber callback(s) failed for state {}",
            self.failures.len(),
            self.state_id
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for NotificationFailures {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Which state transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `synchronize()`
    Synchronize,
    /// `desynchronize()`
    Desynchronize,
    /// `resynchronize()`
    Resynchronize,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Synchronize => "synchronize",
            Transition::Desynchronize => "desynchronize",
            Transition::Resynchronize => "resynchronize",
        };
        f.write_str(name)
    }
}

/// The authority operation that failed inside a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStep {
    /// Registering a field's callback.
    Subscribe,
    /// Removing a field's callback.
    Unsubscribe,
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionStep::Subscribe => f.write_str("subscribe"),
            TransitionStep::Unsubscribe => f.write_str("unsubscribe"),
        }
    }
}

/// A compensation that failed while unwinding a transition.
#[derive(Debug, thiserror::Error)]
#[error("rollback of `{property}` failed: {source}")]
pub struct RollbackFailure {
    /// The property whose compensation failed.
    pub property: String,
    /// The authority error the compensation hit.
    pub source: AuthorityError,
}

/// A state transition could not complete; rollback was attempted.
///
/// After a failed [`TransitionStep::Subscribe`] the instance is
/// desynchronized; after a failed [`TransitionStep::Unsubscribe`] it is
/// still synchronized. Neither holds when `rollback_failures` is non-empty.
#[derive(Debug, thiserror::Error)]
#[error(
    "{transition} failed to {step} `{property}`: {source}{}",
    rollback_suffix(.rollback_failures)
)]
pub struct TransitionError {
    /// The transition the caller requested.
    pub transition: Transition,
    /// The authority operation that failed.
    pub step: TransitionStep,
    /// The property whose step failed.
    pub property: String,
    /// The original cause.
    pub source: AuthorityError,
    /// Compensations that also failed during the unwind.
    pub rollback_failures: Vec<RollbackFailure>,
}

impl TransitionError {
    /// True when every compensation ran cleanly.
    pub fn rolled_back(&self) -> bool {
        self.rollback_failures.is_empty()
    }
}

fn rollback_suffix(failures: &[RollbackFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" ({} rollback step(s) also failed)", failures.len())
    }
}

/// Umbrella error for callers mixing key, authority and transition calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key construction failed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// An authority call failed.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// A state transition failed.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Result type alias for sync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for authority operations.
pub type AuthorityResult<T> = std::result::Result<T, AuthorityError>;

/// Result type alias for state transitions.
pub type TransitionResult<T> = std::result::Result<T, TransitionError>;
