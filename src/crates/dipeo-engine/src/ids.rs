//! Stable opaque identifiers.
//!
//! Node, edge, and execution identity are newtypes rather than bare
//! `String`s: the scheduler's tie-break (spec §4.6, "then by stable
//! `NodeID`") and the event log's per-execution keying both rely on
//! `Hash + Eq + Ord`, and the newtype wrapper stops a `NodeId` and an
//! `EdgeId` from being accidentally interchangeable at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(NodeId);
opaque_id!(EdgeId);
opaque_id!(PersonId);

/// `exec_` + 32 lowercase hex characters (spec §6 "Execution ID format").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    const PREFIX: &'static str = "exec_";

    /// Generate a fresh, valid execution id.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, &hex[..32]))
    }

    /// Validate an externally supplied id against the required shape.
    pub fn parse(raw: impl Into<String>) -> Result<Self, crate::error::EngineError> {
        let raw = raw.into();
        let suffix = raw
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| crate::error::EngineError::InvalidId(raw.clone()))?;
        if suffix.len() != 32 || !suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(crate::error::EngineError::InvalidId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse() {
        let id = ExecutionId::generate();
        assert!(id.0.starts_with("exec_"));
        assert_eq!(id.0.len(), 5 + 32);
        ExecutionId::parse(id.0.clone()).expect("generated id must parse");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ExecutionId::parse("exec_short").is_err());
        assert!(ExecutionId::parse("wrongprefix_00000000000000000000000000000000").is_err());
        assert!(ExecutionId::parse("exec_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_err());
    }

    #[test]
    fn node_ids_are_ordered_for_tie_break() {
        let mut ids = vec![NodeId::from("n3"), NodeId::from("n1"), NodeId::from("n2")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("n1"), NodeId::from("n2"), NodeId::from("n3")]);
    }
}
