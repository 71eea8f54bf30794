//! # sensa-db: Point Store for Sensa
//!
//! This crate provides database access for recorded measurements.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sensa Data Flow                                  │
//! │                                                                         │
//! │  Recorder (writes)             SyncEngine (reads + marks)              │
//! │       │                              │                                  │
//! │       ▼                              ▼                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     sensa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ Measurement-   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│   Repository   │    │ 001_init.sql │  │   │
//! │  │   │ WAL + FKs     │    │ PointRepository│    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/sensa.db                                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Measurement and point repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sensa_db::{Database, DbConfig};
//! use sensa_core::PointKind;
//!
//! let db = Database::new(DbConfig::new("sensa.db")).await?;
//!
//! let m = db.measurements().create("BICYCLE").await?;
//! db.points().insert_locations(m.id, &fixes).await?;
//! db.measurements().finish(m.id).await?;
//!
//! let pending = db.points().count_unsynced(m.id, PointKind::Location).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::measurement::MeasurementRepository;
pub use repository::point::PointRepository;
