//! Identity and key types for propsync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{KeyComponent, KeyError, KeyResult};

const STATE_ID_DOMAIN: &[u8] = b"propsync-state-id-v1";

fn require(value: impl Into<String>, component: KeyComponent) -> KeyResult<String> {
    let value = value.into();
    if value.is_empty() {
        return Err(KeyError::InvalidKey { component });
    }
    Ok(value)
}

/// Storage key for one broadcast group.
///
/// SHA-256 over a domain separator and the length-prefixed group parts
/// (type id, property, source id), displayed as URL-safe base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId([u8; 32]);

impl StateId {
    /// Derive the state id for a broadcast group.
    pub fn derive(type_id: &str, property: &str, source_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(STATE_ID_DOMAIN);
        for part in [type_id, property, source_id] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({})", &self.to_string()[..8])
    }
}

/// Identifies one participating instance within a broadcast group.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> KeyResult<Self> {
        require(id, KeyComponent::InstanceId).map(Self)
    }

    /// Create a random participant id (UUID v4).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = KeyError;

    fn try_from(value: String) -> KeyResult<Self> {
        Self::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

/// The identity of one synchronized instance: its type and its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    type_id: String,
    instance_id: ParticipantId,
}

impl InstanceIdentity {
    /// Create an identity from explicit parts.
    pub fn new(type_id: impl Into<String>, instance_id: impl Into<String>) -> KeyResult<Self> {
        Ok(Self {
            type_id: require(type_id, KeyComponent::TypeId)?,
            instance_id: ParticipantId::new(instance_id)?,
        })
    }

    /// Create an identity with a fresh random instance id.
    pub fn random(type_id: impl Into<String>) -> KeyResult<Self> {
        Ok(Self {
            type_id: require(type_id, KeyComponent::TypeId)?,
            instance_id: ParticipantId::random(),
        })
    }

    /// The type identifier shared by all instances of the same type.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// This instance's participant id.
    pub fn instance_id(&self) -> &ParticipantId {
        &self.instance_id
    }

    /// Build the key for one of this instance's properties within the
    /// group pointed at by `source_id`.
    pub fn key(&self, property: &str, source_id: &str) -> KeyResult<SyncKey> {
        SyncKey::new(
            self.type_id.as_str(),
            property,
            source_id,
            self.instance_id.as_str(),
        )
    }
}

/// Identifies one participant within one broadcast group.
///
/// Two keys are equal when they name the same participant in the same
/// group; the individual group parts only matter through the derived
/// [`StateId`].
#[derive(Clone)]
pub struct SyncKey {
    type_id: String,
    property: String,
    source_id: String,
    participant: ParticipantId,
    state_id: StateId,
}

impl SyncKey {
    /// Build a key. Every component must be non-empty.
    pub fn new(
        type_id: impl Into<String>,
        property: impl Into<String>,
        source_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> KeyResult<Self> {
        let type_id = require(type_id, KeyComponent::TypeId)?;
        let property = require(property, KeyComponent::Property)?;
        let source_id = require(source_id, KeyComponent::SourceId)?;
        let participant = ParticipantId::new(instance_id)?;
        let state_id = StateId::derive(&type_id, &property, &source_id);
        Ok(Self {
            type_id,
            property,
            source_id,
            participant,
            state_id,
        })
    }

    /// Human-readable broadcast group name (`type.property@source`).
    pub fn group_id(&self) -> String {
        format!("{}.{}@{}", self.type_id, self.property, self.source_id)
    }

    /// The storage key of the broadcast group.
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    /// The participant this key belongs to.
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant
    }

    /// The type identifier part.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// The property name part.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The source-group identifier part.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

impl PartialEq for SyncKey {
    fn eq(&self, other: &Self) -> bool {
        self.state_id == other.state_id && self.participant == other.participant
    }
}

impl Eq for SyncKey {}

impl Hash for SyncKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.participant.hash(state);
        self.state_id.hash(state);
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} as {}", self.group_id(), self.participant)
    }
}

impl fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncKey")
            .field("group", &self.group_id())
            .field("participant", &self.participant)
            .field("state_id", &self.state_id)
            .finish()
    }
}
