//! # Sync Engine
//!
//! Uploads every finished measurement to the collector, one batch per
//! request, and promotes each fully transmitted measurement to `SYNCED`.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SyncEngine::run()                             │
//! │                                                                         │
//! │  Idle ──► Enumerating                                                   │
//! │            │  invalidate token                                          │
//! │            │  list FINISHED measurements (none → started(0), finished)  │
//! │            │  count unsynced points → started(total)                    │
//! │            ▼                                                            │
//! │  ┌─── for each measurement ───────────────────────────────────────┐    │
//! │  │  Slicing       BatchPlanner over the unsynced counts           │    │
//! │  │     │                                                          │    │
//! │  │     ▼  for each batch (cancel checked first)                   │    │
//! │  │  Transmitting  load 4 windows → payload → token → POST         │    │
//! │  │     │                                                          │    │
//! │  │     ▼                                                          │    │
//! │  │  Marking       mark_synced(ranges) in one transaction          │    │
//! │  │     │          progress(transmitted, total, id)                │    │
//! │  │     ▼                                                          │    │
//! │  │  advance to SYNCED (optional purge of inertial points)         │    │
//! │  │                                                                │    │
//! │  │  any error ──► Failed: report, skip rest of this measurement   │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  Idle  (finished() always emitted)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resumability
//! Counts and loads only see unsynced points. A crash between upload and
//! marking leaves the batch unsynced, so the next run sends it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use sensa_core::{
    BatchDescriptor, BatchLimits, BatchPlanner, Measurement, MeasurementId, MeasurementStatus, PerKind,
    PointKind, SyncedRange,
};
use sensa_db::Database;

use crate::auth::{CloudAuth, CloudAuthConfig, TokenProvider};
use crate::config::SyncConfig;
use crate::error::{ErrorCode, SyncError, SyncResult};
use crate::notifier::{ListenerSet, SyncListener};
use crate::payload::UploadPayload;
use crate::store::MeasurementStore;
use crate::transport::{endpoint, HttpUploader, Uploader, MEASUREMENTS_PATH};

// =============================================================================
// Engine Configuration
// =============================================================================

/// Settings the engine needs for a run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Collector base URL, e.g. `https://collector.example.org/api/v2`.
    pub base_url: Url,
    pub device_id: String,
    pub limits: BatchLimits,
    /// Gzip request bodies.
    pub compress: bool,
    /// Delete synced inertial points after a measurement reaches `SYNCED`.
    pub purge_synced_sensor_data: bool,
}

impl EngineConfig {
    /// Extracts and validates the engine settings.
    pub fn from_sync_config(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(EngineConfig {
            base_url: config.collector_url()?,
            device_id: config.device.id.clone(),
            limits: config.batch.limits(),
            compress: config.collector.compress,
            purge_synced_sensor_data: config.storage.purge_synced_sensor_data,
        })
    }
}

// =============================================================================
// Run Report
// =============================================================================

/// How a measurement left the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MeasurementResult {
    /// All points transmitted, status is now `SYNCED`.
    Synced,
    /// Stopped by a failure. Already transmitted batches stay marked.
    Failed { code: ErrorCode },
    /// Stopped by cancellation between batches.
    Cancelled,
}

/// Per-measurement summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementOutcome {
    pub measurement_id: MeasurementId,
    /// Unsynced points at the start of the run.
    pub planned_points: u64,
    pub transmitted_points: u64,
    pub batches_sent: u64,
    #[serde(flatten)]
    pub result: MeasurementResult,
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub measurement_id: Option<MeasurementId>,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ErrorReport {
    fn new(measurement_id: Option<MeasurementId>, err: &SyncError) -> Self {
        ErrorReport {
            measurement_id,
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result of one [`SyncEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Unsynced points across all eligible measurements at the start.
    pub total_points: u64,
    pub transmitted_points: u64,
    pub cancelled: bool,
    pub outcomes: Vec<MeasurementOutcome>,
    pub errors: Vec<ErrorReport>,
}

impl SyncReport {
    fn new() -> Self {
        let now = Utc::now();
        SyncReport {
            started_at: now,
            finished_at: now,
            total_points: 0,
            transmitted_points: 0,
            cancelled: false,
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of measurements promoted to `SYNCED` in this run.
    pub fn synced_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == MeasurementResult::Synced)
            .count()
    }

    pub fn outcome(&self, measurement_id: MeasurementId) -> Option<&MeasurementOutcome> {
        self.outcomes.iter().find(|o| o.measurement_id == measurement_id)
    }

    /// True if the run was turned away because another run was active.
    pub fn was_rejected(&self) -> bool {
        self.errors.iter().any(|e| e.code == ErrorCode::SyncInProgress)
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cancels a run from another task.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    cancelled: Arc<AtomicBool>,
}

impl SyncHandle {
    /// Requests cancellation. The current batch still completes, including
    /// marking its points synced. The flag is cleared when the run ends.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Clears the running flag when a run ends, even by panic.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Orchestrates one upload run at a time.
pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<dyn MeasurementStore>,
    uploader: Arc<dyn Uploader>,
    tokens: Arc<dyn TokenProvider>,
    listeners: ListenerSet,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Creates an engine from its collaborators.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MeasurementStore>,
        uploader: Arc<dyn Uploader>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        SyncEngine {
            config,
            store,
            uploader,
            tokens,
            listeners: ListenerSet::new(),
            running: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wires the HTTP uploader and collector login from `config`.
    pub fn from_config(config: &SyncConfig, db: Database) -> SyncResult<Self> {
        let engine_config = EngineConfig::from_sync_config(config)?;
        let uploader = HttpUploader::new(config.collector.connect_timeout())?;
        let auth = CloudAuth::new(CloudAuthConfig::from_sync_config(config)?)?;

        Ok(Self::new(
            engine_config,
            Arc::new(db),
            Arc::new(uploader),
            Arc::new(auth),
        ))
    }

    pub fn add_listener(&self, listener: Arc<dyn SyncListener>) {
        self.listeners.add(listener);
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one sync over all finished measurements.
    ///
    /// Never fails: every error is reported to listeners and recorded in the
    /// returned report. A call made while another run is active returns
    /// immediately with a single `SyncInProgress` error.
    pub async fn run(&self) -> SyncReport {
        let mut report = SyncReport::new();

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Sync already running");
            report.errors.push(ErrorReport::new(None, &SyncError::SyncInProgress));
            report.finished_at = Utc::now();
            return report;
        }
        let _guard = RunGuard { running: &self.running };

        info!(device_id = %self.config.device_id, "Starting sync run");
        self.run_measurements(&mut report).await;

        self.listeners.sync_finished();
        self.cancelled.store(false, Ordering::SeqCst);
        report.finished_at = Utc::now();

        info!(
            synced = report.synced_count(),
            transmitted = report.transmitted_points,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "Sync run finished"
        );
        report
    }

    async fn run_measurements(&self, report: &mut SyncReport) {
        self.tokens.invalidate().await;

        let measurements = match self.store.list_measurements(MeasurementStatus::Finished).await {
            Ok(list) => list,
            Err(err) => {
                self.record_error(report, None, &err);
                return;
            }
        };

        if measurements.is_empty() {
            debug!("No finished measurements");
            self.listeners.sync_started(0);
            return;
        }

        // Count everything first so progress has a stable denominator.
        let mut plans = Vec::with_capacity(measurements.len());
        for measurement in measurements {
            match self.count_unsynced(measurement.id).await {
                Ok(counts) => plans.push((measurement, counts)),
                Err(err) => self.record_error(report, Some(measurement.id), &err),
            }
        }
        report.total_points = plans.iter().map(|(_, counts)| counts.total()).sum();
        info!(
            measurements = plans.len(),
            total_points = report.total_points,
            "Sync started"
        );
        self.listeners.sync_started(report.total_points);

        for (measurement, counts) in plans {
            if self.is_cancelled() {
                info!("Sync cancelled");
                report.cancelled = true;
                break;
            }

            let mut outcome = MeasurementOutcome {
                measurement_id: measurement.id,
                planned_points: counts.total(),
                transmitted_points: 0,
                batches_sent: 0,
                result: MeasurementResult::Synced,
            };

            match self.sync_measurement(&measurement, counts, report, &mut outcome).await {
                Ok(true) => {}
                Ok(false) => {
                    report.cancelled = true;
                    outcome.result = MeasurementResult::Cancelled;
                }
                Err(err) => {
                    if err.invalidates_token() {
                        self.tokens.invalidate().await;
                    }
                    outcome.result = MeasurementResult::Failed { code: err.code() };
                    self.record_error(report, Some(measurement.id), &err);
                }
            }
            report.outcomes.push(outcome);
        }
    }

    async fn count_unsynced(&self, measurement_id: MeasurementId) -> SyncResult<PerKind<u64>> {
        let mut counts = PerKind::default();
        for kind in PointKind::ALL {
            counts[kind] = self.store.count_points(measurement_id, kind).await?;
        }
        Ok(counts)
    }

    /// Transmits one measurement. `Ok(false)` means cancelled between batches.
    #[instrument(skip_all, fields(measurement_id = measurement.id))]
    async fn sync_measurement(
        &self,
        measurement: &Measurement,
        counts: PerKind<u64>,
        report: &mut SyncReport,
        outcome: &mut MeasurementOutcome,
    ) -> SyncResult<bool> {
        let planner = BatchPlanner::new(counts, self.config.limits)?;

        if planner.batch_count() == 0 {
            debug!("No unsynced points, promoting without upload");
            self.store
                .advance_status(measurement.id, MeasurementStatus::Synced)
                .await?;
            return Ok(true);
        }

        debug!(batches = planner.batch_count(), points = planner.total_points(), "Planned");
        let upload_url = endpoint(&self.config.base_url, MEASUREMENTS_PATH)?;

        // Windows are planned over the counts at the start. Each marked batch
        // removes its points from the unsynced set, so later windows shift back.
        let mut marked = PerKind::<u64>::default();

        for batch in &planner {
            if self.is_cancelled() {
                info!(batch = batch.index, "Cancelled before batch");
                return Ok(false);
            }

            let (payload, ranges, loaded) = self.build_batch(measurement, &batch, &marked).await?;
            let points = loaded.total();

            let token = self.tokens.current_token().await?;
            let connection = self.uploader.open(upload_url.as_str(), &token)?;
            let response = self
                .uploader
                .post(&connection, &payload, self.config.compress)
                .await?;

            let updated = self.store.mark_synced(measurement.id, &ranges).await?;
            if updated != points {
                warn!(expected = points, updated, "Marked row count differs from batch size");
            }

            for (kind, n) in loaded.iter() {
                marked[kind] += *n;
            }
            outcome.transmitted_points += points;
            outcome.batches_sent += 1;
            report.transmitted_points += points;

            debug!(
                batch = batch.index,
                points,
                status = response.status,
                transmitted = report.transmitted_points,
                "Batch synced"
            );
            self.listeners
                .progress(report.transmitted_points, report.total_points, measurement.id);
        }

        self.store
            .advance_status(measurement.id, MeasurementStatus::Synced)
            .await?;
        info!(
            points = outcome.transmitted_points,
            batches = outcome.batches_sent,
            "Measurement synced"
        );

        // The measurement is already SYNCED; a failed purge only leaves points behind.
        if self.config.purge_synced_sensor_data {
            if let Err(e) = self.purge_sensor_points(measurement.id).await {
                warn!(code = e.code().as_u16(), error = %e, "Purge of synced sensor points failed");
            }
        }
        Ok(true)
    }

    /// Loads the batch windows and assembles the payload with its ranges.
    async fn build_batch(
        &self,
        measurement: &Measurement,
        batch: &BatchDescriptor,
        marked: &PerKind<u64>,
    ) -> SyncResult<(UploadPayload, Vec<SyncedRange>, PerKind<u64>)> {
        let mut payload = UploadPayload::new(measurement, self.config.device_id.as_str());
        let mut ranges = Vec::with_capacity(PointKind::ALL.len());
        let mut loaded = PerKind::<u64>::default();

        for (kind, window) in batch.windows.iter() {
            let Some(window) = window else { continue };
            let offset = window.offset.saturating_sub(marked[kind]);
            let points = self
                .store
                .load_points(measurement.id, kind, offset, window.limit)
                .await?;

            if let Some(range) = SyncedRange::covering(kind, &points) {
                ranges.push(range);
            }
            loaded[kind] = points.len() as u64;
            payload.extend(kind, &points);
        }

        Ok((payload, ranges, loaded))
    }

    async fn purge_sensor_points(&self, measurement_id: MeasurementId) -> SyncResult<()> {
        for kind in PointKind::ALL.into_iter().filter(|k| k.is_inertial()) {
            let removed = self.store.delete_synced_points(measurement_id, kind).await?;
            debug!(%kind, removed, "Purged synced points");
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record_error(&self, report: &mut SyncReport, measurement_id: Option<MeasurementId>, err: &SyncError) {
        let message = err.to_string();
        if err.is_local() {
            self.listeners.read_error(&message, err.code());
        } else {
            self.listeners.transmit_error(&message, err.code());
        }
        warn!(?measurement_id, code = err.code().as_u16(), error = %message, "Measurement sync failed");
        report.errors.push(ErrorReport::new(measurement_id, err));
    }
}
