//! # Batch Planner
//!
//! Slices a measurement's unsynced points into upload batches.
//!
//! ## Windowing
//! ```text
//! counts:  location = 3200   acceleration = 2500   rotation = 0   direction = 4100
//! limits:  location = 1500   acceleration = 2000   rotation = 2000 direction = 2000
//!
//!            location        acceleration    rotation   direction
//! batch 0:   [   0, 1500)    [   0, 2000)    -          [   0, 2000)
//! batch 1:   [1500, 3000)    [2000, 2500)    -          [2000, 4000)
//! batch 2:   [3000, 3200)    -               -          [4000, 4100)
//! ```
//!
//! Batch `i` covers `[i·L, (i+1)·L) ∩ [0, count)` for every kind. A kind
//! whose points are exhausted contributes no window. The number of batches is
//! `max over kinds of ceil(count / L)`, and zero points in every kind means
//! zero batches.
//!
//! Windows are offsets into the ordering `(timestamp ASC, row_id ASC)` of the
//! points that were unsynced when the plan was made. The planner is pure and
//! recomputed from live counts on every run.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::kind::{PerKind, PointKind};

/// Default maximum GPS fixes per batch.
pub const DEFAULT_LOCATION_LIMIT: u64 = 1500;

/// Default maximum samples per batch for each inertial kind.
pub const DEFAULT_SENSOR_LIMIT: u64 = 2000;

// =============================================================================
// Limits
// =============================================================================

/// Per-kind maximum number of points in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits(pub PerKind<u64>);

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits(PerKind::new([
            DEFAULT_LOCATION_LIMIT,
            DEFAULT_SENSOR_LIMIT,
            DEFAULT_SENSOR_LIMIT,
            DEFAULT_SENSOR_LIMIT,
        ]))
    }
}

impl BatchLimits {
    pub fn get(&self, kind: PointKind) -> u64 {
        self.0[kind]
    }

    /// Rejects a zero limit, which would never advance.
    pub fn validate(&self) -> CoreResult<()> {
        match self.0.iter().find(|(_, limit)| **limit == 0) {
            Some((kind, _)) => Err(CoreError::InvalidBatchLimit(kind)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Windows and Descriptors
// =============================================================================

/// A contiguous slice `[offset, offset + limit)` of one kind's points.
///
/// `limit` is already clamped to the remaining count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    /// One past the last offset covered.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.limit
    }
}

/// One batch: an optional window per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDescriptor {
    /// Zero-based position in the plan.
    pub index: u64,
    pub windows: PerKind<Option<Window>>,
}

impl BatchDescriptor {
    /// Total points this batch is planned to carry.
    pub fn point_count(&self) -> u64 {
        self.windows.iter().filter_map(|(_, w)| w.map(|w| w.limit)).sum()
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Plans the batches for one measurement.
///
/// ## Example
/// ```rust
/// use sensa_core::batch::{BatchLimits, BatchPlanner};
/// use sensa_core::kind::{PerKind, PointKind};
///
/// let planner = BatchPlanner::new(PerKind::new([36_000, 0, 0, 0]), BatchLimits::default()).unwrap();
/// assert_eq!(planner.batch_count(), 24);
///
/// let last = planner.iter().last().unwrap();
/// assert_eq!(last.windows[PointKind::Location].unwrap().offset, 34_500);
/// assert!(last.windows[PointKind::Rotation].is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    counts: PerKind<u64>,
    limits: BatchLimits,
}

impl BatchPlanner {
    /// Creates a planner from live unsynced counts.
    ///
    /// ## Errors
    /// [`CoreError::InvalidBatchLimit`] if any limit is zero.
    pub fn new(counts: PerKind<u64>, limits: BatchLimits) -> CoreResult<Self> {
        limits.validate()?;
        Ok(BatchPlanner { counts, limits })
    }

    pub fn counts(&self) -> PerKind<u64> {
        self.counts
    }

    /// Sum of all counts.
    pub fn total_points(&self) -> u64 {
        self.counts.total()
    }

    /// `max over kinds of ceil(count / limit)`.
    pub fn batch_count(&self) -> u64 {
        PointKind::ALL
            .into_iter()
            .map(|k| self.counts[k].div_ceil(self.limits.get(k)))
            .max()
            .unwrap_or(0)
    }

    /// The descriptor at position `index`, or `None` past the end.
    pub fn batch(&self, index: u64) -> Option<BatchDescriptor> {
        if index >= self.batch_count() {
            return None;
        }
        let windows = PerKind::from_fn(|kind| {
            let count = self.counts[kind];
            let limit = self.limits.get(kind);
            let offset = index.checked_mul(limit)?;
            (offset < count).then(|| Window {
                offset,
                limit: limit.min(count - offset),
            })
        });
        Some(BatchDescriptor { index, windows })
    }

    /// Lazily iterates every batch in order.
    pub fn iter(&self) -> BatchIter {
        BatchIter {
            planner: *self,
            next: 0,
            end: self.batch_count(),
        }
    }
}

impl IntoIterator for &BatchPlanner {
    type Item = BatchDescriptor;
    type IntoIter = BatchIter;

    fn into_iter(self) -> BatchIter {
        self.iter()
    }
}

/// Iterator over a [`BatchPlanner`]'s descriptors.
#[derive(Debug, Clone)]
pub struct BatchIter {
    planner: BatchPlanner,
    next: u64,
    end: u64,
}

impl Iterator for BatchIter {
    type Item = BatchDescriptor;

    fn next(&mut self) -> Option<BatchDescriptor> {
        if self.next >= self.end {
            return None;
        }
        let batch = self.planner.batch(self.next);
        self.next += 1;
        batch
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.end.saturating_sub(self.next)).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

impl ExactSizeIterator for BatchIter {}
