//! Segment naming conventions.
//!
//! Every topic maps to two POSIX shared-memory objects:
//!
//! ```text
//! /{prefix}_{unit}_{topic}              ← data segment (capacity bytes)
//! /{prefix}_{unit}_{topic}_{suffix}     ← flag segment (1 byte)
//! /{prefix}__registry                   ← registry liveness marker
//! ```
//!
//! Resolution is pure; validation of OS constraints happens when a name is
//! handed to the shared-memory layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

pub const DEFAULT_PREFIX: &str = "PBB";
pub const DEFAULT_FLAG_SUFFIX: &str = "f";
const MARKER_TAG: &str = "_registry";
// NAME_MAX minus the leading slash.
const MAX_NAME_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub unit: String,
    pub topic: String,
}

impl Address {
    pub fn new(unit: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            topic: topic.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.topic)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let (unit, topic) = value.split_once('/').ok_or_else(|| Error::InvalidName {
            name: value.to_string(),
            reason: "address must be <unit>/<topic>",
        })?;
        if unit.is_empty() || topic.is_empty() {
            return Err(Error::InvalidName {
                name: value.to_string(),
                reason: "unit and topic must be non-empty",
            });
        }
        Ok(Self::new(unit, topic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNames {
    pub data: String,
    pub flag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Naming {
    pub prefix: String,
    pub flag_suffix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            flag_suffix: DEFAULT_FLAG_SUFFIX.to_string(),
        }
    }
}

impl Naming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, address: &Address) -> SegmentNames {
        let data = format!("{}_{}_{}", self.prefix, address.unit, address.topic);
        let flag = format!("{}_{}", data, self.flag_suffix);
        SegmentNames { data, flag }
    }

    /// Name of the marker segment a running registry holds for this namespace.
    pub fn marker(&self) -> String {
        format!("{}_{}", self.prefix, MARKER_TAG)
    }
}

/// Checks that `name` is acceptable to `shm_open` once a leading slash is added.
pub fn validate_segment_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.contains('/') {
        Some("contains '/'")
    } else if name.contains('\0') {
        Some("contains NUL byte")
    } else if name.len() > MAX_NAME_LEN {
        Some("name too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
