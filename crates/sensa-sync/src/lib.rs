//! # sensa-sync: Upload Synchronization Engine for Sensa
//!
//! Transmits finished measurements from the local point store to the
//! collector, batch by batch, and marks what the collector accepted.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncEngine (Orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  One run at a time, spawned by the caller on a Tokio task        │  │
//! │  │  Failures are per measurement, never per run                     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │    ┌──────────────┬───────────┼────────────┬──────────────┐            │
//! │    ▼              ▼           ▼            ▼              ▼            │
//! │  ┌────────┐  ┌─────────┐  ┌────────┐  ┌──────────┐  ┌───────────┐     │
//! │  │ Store  │  │ Planner │  │Payload │  │Transport │  │ CloudAuth │     │
//! │  │ (trait)│  │ (core)  │  │ (JSON) │  │ (reqwest)│  │ (token)   │     │
//! │  └────────┘  └─────────┘  └────────┘  └──────────┘  └───────────┘     │
//! │                                                                         │
//! │  SIGNALS (to listeners):                                               │
//! │  • sync started / progress / finished                                  │
//! │  • transmit error / read error, each with a stable ErrorCode           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine` orchestrator and `SyncReport`
//! - [`transport`] - HTTP upload and response classification
//! - [`auth`] - Collector login, device registration, token cache
//! - [`payload`] - Combined per-batch JSON payload
//! - [`store`] - `MeasurementStore` trait over the point database
//! - [`notifier`] - Sync listeners
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types and codes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sensa_sync::{LogListener, SyncConfig, SyncEngine};
//! use sensa_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;
//!
//! let engine = SyncEngine::from_config(&config, db)?;
//! engine.add_listener(Arc::new(LogListener));
//!
//! let report = engine.run().await;
//! println!("Synced {} measurements", report.synced_count());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod payload;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_collector;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{CloudAuth, CloudAuthConfig, TokenProvider};
pub use config::SyncConfig;
pub use engine::{EngineConfig, ErrorReport, MeasurementOutcome, MeasurementResult, SyncEngine, SyncHandle, SyncReport};
pub use error::{ErrorCode, SyncError, SyncResult};
pub use notifier::{ChannelListener, LogListener, NoOpListener, SyncEvent, SyncListener};
pub use payload::UploadPayload;
pub use store::MeasurementStore;
pub use transport::{Connection, HttpUploader, UploadResponse, Uploader};
