//! # Upload Payload
//!
//! One JSON object per batch, combining every kind's window so a batch
//! costs exactly one round-trip.
//!
//! ## Wire Format
//! ```json
//! {
//!   "id": 17,
//!   "deviceId": "550e8400-e29b-41d4-a716-446655440000",
//!   "vehicle": "BICYCLE",
//!   "gpsPoints":           [{ "lat": .., "lon": .., "speed": .., "accuracy": .., "timestamp": .. }],
//!   "accelerationPoints":  [{ "ax": .., "ay": .., "az": .., "timestamp": .. }],
//!   "rotationPoints":      [{ "rX": .., "rY": .., "rZ": .., "timestamp": .. }],
//!   "magneticValuePoints": [{ "mX": .., "mY": .., "mZ": .., "timestamp": .. }]
//! }
//! ```
//!
//! Field names are a fixed contract with the collector. A kind with no window
//! in the batch still appears, as an empty array.

use serde::{Deserialize, Serialize};

use sensa_core::codec::{self, WireRecord};
use sensa_core::{CoreResult, DataPoint, Measurement, MeasurementId, PointKind, StoredPoint};

/// Body of `POST {base}/measurements/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    /// Measurement id.
    pub id: MeasurementId,
    pub device_id: String,
    pub vehicle: String,
    #[serde(default)]
    pub gps_points: Vec<WireRecord>,
    #[serde(default)]
    pub acceleration_points: Vec<WireRecord>,
    #[serde(default)]
    pub rotation_points: Vec<WireRecord>,
    #[serde(default)]
    pub magnetic_value_points: Vec<WireRecord>,
}

impl UploadPayload {
    /// Creates an empty payload for `measurement`.
    pub fn new(measurement: &Measurement, device_id: impl Into<String>) -> Self {
        UploadPayload {
            id: measurement.id,
            device_id: device_id.into(),
            vehicle: measurement.vehicle.clone(),
            gps_points: Vec::new(),
            acceleration_points: Vec::new(),
            rotation_points: Vec::new(),
            magnetic_value_points: Vec::new(),
        }
    }

    /// The record array carrying `kind`.
    pub fn records(&self, kind: PointKind) -> &[WireRecord] {
        match kind {
            PointKind::Location => &self.gps_points,
            PointKind::Acceleration => &self.acceleration_points,
            PointKind::Rotation => &self.rotation_points,
            PointKind::Direction => &self.magnetic_value_points,
        }
    }

    fn records_mut(&mut self, kind: PointKind) -> &mut Vec<WireRecord> {
        match kind {
            PointKind::Location => &mut self.gps_points,
            PointKind::Acceleration => &mut self.acceleration_points,
            PointKind::Rotation => &mut self.rotation_points,
            PointKind::Direction => &mut self.magnetic_value_points,
        }
    }

    /// Encodes `points` of `kind` and appends them.
    pub fn extend(&mut self, kind: PointKind, points: &[StoredPoint]) {
        self.records_mut(kind)
            .extend(points.iter().map(|p| codec::encode(&p.point)));
    }

    /// Total records across all kinds.
    pub fn point_count(&self) -> usize {
        PointKind::ALL.iter().map(|k| self.records(*k).len()).sum()
    }

    /// Decodes the records of `kind` back into points.
    pub fn decode(&self, kind: PointKind) -> CoreResult<Vec<DataPoint>> {
        self.records(kind)
            .iter()
            .map(|r| codec::decode(kind, r))
            .collect()
    }
}
