//! Workflow status of a factory entity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered workflow status.
///
/// `Unknown` is a sentinel for absent or undecodable values; a stored entity
/// never rests in it. The discriminants are the wire values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Status {
    /// Absent or undecodable.
    #[default]
    Unknown = 0,
    /// Order accepted, nothing sourced yet.
    Pending = 1,
    /// Parts have been sourced.
    Sourced = 2,
    /// Parts have been assembled.
    Assembled = 3,
    /// Ready for delivery.
    Completed = 4,
}

impl Status {
    /// All statuses a stored entity may hold, in workflow order.
    pub const VALID: [Status; 4] = [
        Status::Pending,
        Status::Sourced,
        Status::Assembled,
        Status::Completed,
    ];

    /// Map a wire value to a status. Unassigned values map to `Unknown`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Status::Pending,
            2 => Status::Sourced,
            3 => Status::Assembled,
            4 => Status::Completed,
            _ => Status::Unknown,
        }
    }

    /// Wire value of this status.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this status may be stored on an entity.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Status::Unknown
    }

    /// Upper-case name, as used in log lines and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unknown => "UNKNOWN",
            Status::Pending => "PENDING",
            Status::Sourced => "SOURCED",
            Status::Assembled => "ASSEMBLED",
            Status::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Status::Pending),
            "SOURCED" => Ok(Status::Sourced),
            "ASSEMBLED" => Ok(Status::Assembled),
            "COMPLETED" => Ok(Status::Completed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}
