//! Catalyst shared types - identifier newtypes used across the workspace
//!
//! Every entity id is a String newtype: caller-supplied via `new`, or
//! generated as a UUID v4 via `generate`. Timestamps everywhere are
//! `chrono::DateTime<Utc>` so persisted state serializes as ISO-8601 UTC.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// A named agent (human or automated) participating in the system.
    AgentId
);
string_id!(
    /// Top-level project container.
    CompoundId
);
string_id!(
    /// Named grouping of atoms under one compound.
    MoleculeId
);
string_id!(
    /// Minimal independently verifiable unit of work.
    AtomId
);
string_id!(
    /// Scoped, time-bounded permission grant.
    GrantId
);
string_id!(
    /// Directed handoff event between two agents.
    HandoffId
);
string_id!(
    /// Entry in the append-only grant audit trail.
    AuditRecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_unique() {
        assert_ne!(AtomId::generate(), AtomId::generate());
    }

    #[test]
    fn display_matches_inner() {
        let id = AgentId::new("agent-1");
        assert_eq!(id.to_string(), "agent-1");
        assert_eq!(id.as_str(), "agent-1");
    }

    #[test]
    fn serde_round_trip_is_transparent_string() {
        let id = GrantId::new("g-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"g-1\"");
    }
}
