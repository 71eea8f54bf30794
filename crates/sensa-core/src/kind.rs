//! # Point Kinds
//!
//! The closed set of sample kinds and the table that maps each one to its
//! wire payload key, store table and wire field names.
//!
//! ```text
//! ┌──────────────┬───────────────────────┬───────────────┬──────────────────────────────┐
//! │ Kind         │ Payload key           │ Store table   │ Wire fields (+ timestamp)    │
//! ├──────────────┼───────────────────────┼───────────────┼──────────────────────────────┤
//! │ Location     │ gpsPoints             │ locations     │ lat, lon, speed, accuracy    │
//! │ Acceleration │ accelerationPoints    │ accelerations │ ax, ay, az                   │
//! │ Rotation     │ rotationPoints        │ rotations     │ rX, rY, rZ                   │
//! │ Direction    │ magneticValuePoints   │ directions    │ mX, mY, mZ                   │
//! └──────────────┴───────────────────────┴───────────────┴──────────────────────────────┘
//! ```
//!
//! [`PerKind`] is a fixed four-slot array indexed by kind. Planner counts,
//! limits and per-run bookkeeping all use it.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// PointKind
// =============================================================================

/// Sample kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Location,
    Acceleration,
    Rotation,
    Direction,
}

impl PointKind {
    /// All kinds in payload order.
    pub const ALL: [PointKind; 4] = [
        PointKind::Location,
        PointKind::Acceleration,
        PointKind::Rotation,
        PointKind::Direction,
    ];

    /// Slot in a [`PerKind`] array.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            PointKind::Location => 0,
            PointKind::Acceleration => 1,
            PointKind::Rotation => 2,
            PointKind::Direction => 3,
        }
    }

    /// Key of this kind's array in the upload payload.
    pub const fn payload_key(self) -> &'static str {
        match self {
            PointKind::Location => "gpsPoints",
            PointKind::Acceleration => "accelerationPoints",
            PointKind::Rotation => "rotationPoints",
            PointKind::Direction => "magneticValuePoints",
        }
    }

    /// SQLite table holding this kind.
    pub const fn table(self) -> &'static str {
        match self {
            PointKind::Location => "locations",
            PointKind::Acceleration => "accelerations",
            PointKind::Rotation => "rotations",
            PointKind::Direction => "directions",
        }
    }

    /// Wire field names of the value columns, excluding `timestamp`.
    pub const fn value_fields(self) -> &'static [&'static str] {
        match self {
            PointKind::Location => &["lat", "lon", "speed", "accuracy"],
            PointKind::Acceleration => &["ax", "ay", "az"],
            PointKind::Rotation => &["rX", "rY", "rZ"],
            PointKind::Direction => &["mX", "mY", "mZ"],
        }
    }

    /// Returns true for the three-axis kinds.
    #[inline]
    pub const fn is_inertial(self) -> bool {
        !matches!(self, PointKind::Location)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PointKind::Location => "location",
            PointKind::Acceleration => "acceleration",
            PointKind::Rotation => "rotation",
            PointKind::Direction => "direction",
        }
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownKind(s.to_string()))
    }
}

// =============================================================================
// PerKind
// =============================================================================

/// One value per [`PointKind`], in [`PointKind::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerKind<T>([T; 4]);

impl<T> PerKind<T> {
    /// Wraps values given in `[location, acceleration, rotation, direction]` order.
    pub const fn new(values: [T; 4]) -> Self {
        PerKind(values)
    }

    /// Builds each slot from its kind.
    pub fn from_fn(mut f: impl FnMut(PointKind) -> T) -> Self {
        PerKind(PointKind::ALL.map(&mut f))
    }

    /// Iterates `(kind, &value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PointKind, &T)> {
        PointKind::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PerKind<U> {
        PerKind(self.0.map(f))
    }

    pub fn into_inner(self) -> [T; 4] {
        self.0
    }
}

impl PerKind<u64> {
    /// Sum over all kinds.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl<T> Index<PointKind> for PerKind<T> {
    type Output = T;

    fn index(&self, kind: PointKind) -> &T {
        &self.0[kind.index()]
    }
}

impl<T> IndexMut<PointKind> for PerKind<T> {
    fn index_mut(&mut self, kind: PointKind) -> &mut T {
        &mut self.0[kind.index()]
    }
}
