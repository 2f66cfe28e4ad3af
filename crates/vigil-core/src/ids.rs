//! # Identifier Newtypes
//!
//! UUID-backed newtypes for every addressable record in the engine, plus
//! the validated [`ActorId`] for humans acting on workflow steps. Mixing
//! up an `InstanceId` and a `RunId` is a type error, not a runtime bug.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// A business entity being tracked for compliance.
    EntityId
);
uuid_id!(
    /// An obligation definition (recurring-duty template). Definitions are
    /// immutable once referenced; a change mints a new `DefinitionId`.
    DefinitionId
);
uuid_id!(
    /// One concrete obligation occurrence for one entity and one period.
    InstanceId
);
uuid_id!(
    /// A registered workflow template (service + version).
    TemplateId
);
uuid_id!(
    /// One execution of a workflow template against an obligation instance.
    RunId
);
uuid_id!(
    /// An immutable notification event.
    EventId
);

/// Identifier of a human actor (ops analyst, QC reviewer, client user).
///
/// # Validation
///
/// Must be a non-empty string after trimming. No further format is imposed
/// because actor identity comes from the surrounding product's user system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor identifier, validating non-emptiness.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidActorId`] if the string is empty
    /// or whitespace-only.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidActorId);
        }
        Ok(Self(trimmed))
    }

    /// Access the actor identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
