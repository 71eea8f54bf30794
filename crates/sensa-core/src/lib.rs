//! # sensa-core: Pure Measurement Logic for Sensa
//!
//! This crate holds everything about measurements that can be decided
//! without touching a disk or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sensa Data Flow                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ sensa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   kind    │  │   codec   │  │   batch   │  │   │
//! │  │   │Measurement│  │ PointKind │  │  encode   │  │  Planner  │  │   │
//! │  │   │ DataPoint │  │  PerKind  │  │  decode   │  │  Windows  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                  │                              │                       │
//! │                  ▼                              ▼                       │
//! │  ┌──────────────────────────┐   ┌──────────────────────────────────┐   │
//! │  │  sensa-db (SQLite store) │   │  sensa-sync (upload engine)      │   │
//! │  └──────────────────────────┘   └──────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Measurements, data points and sync ranges
//! - [`kind`] - The closed set of point kinds and their wire/store table
//! - [`codec`] - Point ⇄ wire record conversion
//! - [`batch`] - Per-kind batch window planning
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use sensa_core::batch::{BatchLimits, BatchPlanner};
//! use sensa_core::kind::PerKind;
//!
//! let counts = PerKind::new([2, 3, 3, 3]);
//! let planner = BatchPlanner::new(counts, BatchLimits::default()).unwrap();
//!
//! assert_eq!(planner.batch_count(), 1);
//! assert_eq!(planner.total_points(), 11);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod codec;
pub mod error;
pub mod kind;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use batch::{BatchDescriptor, BatchLimits, BatchPlanner, Window};
pub use error::{CoreError, CoreResult};
pub use kind::{PerKind, PointKind};
pub use types::*;
