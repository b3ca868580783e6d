//! Error types for propsync keys.

use std::fmt;
use thiserror::Error;

/// One of the string parts a [`SyncKey`](crate::SyncKey) is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyComponent {
    /// The tenant/type identifier.
    TypeId,
    /// The synchronized property name.
    Property,
    /// The source-group identifier the instance points at.
    SourceId,
    /// The participating instance identifier.
    InstanceId,
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyComponent::TypeId => "type id",
            KeyComponent::Property => "property",
            KeyComponent::SourceId => "source id",
            KeyComponent::InstanceId => "instance id",
        };
        f.write_str(name)
    }
}

/// Errors raised while building keys and identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A required key component was empty.
    #[error("invalid sync key: {component} must not be empty")]
    InvalidKey {
        /// The component that was missing.
        component: KeyComponent,
    },
}

/// Result type alias for key construction.
pub type KeyResult<T> = std::result::Result<T, KeyError>;
