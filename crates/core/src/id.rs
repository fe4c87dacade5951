//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Code of a warehouse, as stored in the warehouse catalog.
///
/// The code is kept verbatim (it is matched against order headers as-is); only blank
/// codes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WarehouseCode(String);

/// Product reference within a warehouse's stock context.
///
/// Always stored trimmed: `" ABC1 "` and `"ABC1"` are the same reference. Only the
/// ERP's padding characters are stripped (see [`REFERENCE_PADDING`]); other Unicode
/// whitespace such as NBSP is part of the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(String);

/// Identifier of one rebuild run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RebuildId(Uuid);

impl WarehouseCode {
    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::invalid_id("warehouse code cannot be empty"));
        }
        Ok(Self(code))
    }
}

/// Characters stripped from both ends of a raw reference.
pub const REFERENCE_PADDING: [char; 6] = [' ', '\t', '\n', '\r', '\0', '\x0B'];

impl Reference {
    /// Build a reference from raw source text, trimming surrounding padding.
    pub fn new(raw: impl AsRef<str>) -> DomainResult<Self> {
        let trimmed = raw.as_ref().trim_matches(&REFERENCE_PADDING[..]);
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("reference cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $t {
            type Error = DomainError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_string_newtype!(WarehouseCode);
impl_string_newtype!(Reference);

impl RebuildId {
    /// Create a new run identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so run ids sort by start time in audit logs.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RebuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RebuildId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
