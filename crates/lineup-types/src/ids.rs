//! Typed identifiers for scopes and items.
//!
//! Both ID types wrap UUIDv7 (time-ordered, globally unique) and display as
//! standard UUID text for logging. The `short()` form (first 8 hex chars) is
//! for human-facing output only, never a lookup key.
//!
//! `ScopeId::named` derives a deterministic UUIDv5 from a label, so hosts can
//! address "the buttons of profile 42" without a lookup table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A scope identifier: one independently ordered list.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(uuid::Uuid);

/// An item identifier, unique across scopes.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters. For display only, never a lookup key.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl FromStr for $T {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(ScopeId, "ScopeId");
impl_typed_id!(ItemId, "ItemId");

/// Fixed namespace for deriving deterministic ScopeIds via UUIDv5.
const LINEUP_SCOPE_NS: uuid::Uuid = uuid::uuid!("3f0c9a52-6d1e-4b7a-9c28-5e41d07b8f13");

impl ScopeId {
    /// Deterministic scope for a host-side label (UUIDv5).
    ///
    /// Same label, same scope, every time.
    pub fn named(label: &str) -> Self {
        Self(uuid::Uuid::new_v5(&LINEUP_SCOPE_NS, label.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        assert_ne!(ItemId::new(), ItemId::new());
        assert_ne!(ScopeId::new(), ScopeId::new());
    }

    #[test]
    fn test_short_is_8_chars() {
        assert_eq!(ItemId::new().short().len(), 8);
    }

    #[test]
    fn test_parse_hex_and_uuid_format() {
        let id = ItemId::new();
        assert_eq!(ItemId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(id.to_string().parse::<ItemId>().unwrap(), id);
    }

    #[test]
    fn test_roundtrip_bytes() {
        let id = ScopeId::new();
        assert_eq!(ScopeId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn test_named_scope_is_deterministic() {
        assert_eq!(ScopeId::named("profile-42"), ScopeId::named("profile-42"));
        assert_ne!(ScopeId::named("profile-42"), ScopeId::named("profile-43"));
    }

    #[test]
    fn test_debug_uses_short_form() {
        let id = ItemId::new();
        assert_eq!(format!("{id:?}"), format!("ItemId({})", id.short()));
    }

    #[test]
    fn test_serde_transparent() {
        let id = ScopeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
