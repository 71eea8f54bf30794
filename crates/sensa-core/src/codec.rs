//! # Point Codec
//!
//! Converts [`DataPoint`]s to and from wire records, the JSON objects that
//! sit inside the per-kind arrays of an upload payload.
//!
//! ```text
//! DataPoint::Rotation(Point3D { timestamp: 17, x: 0.1, y: 0.2, z: 0.3 })
//!            │ encode                                 ▲ decode(Rotation, ..)
//!            ▼                                        │
//! { "rX": 0.1, "rY": 0.2, "rZ": 0.3, "timestamp": 17 }
//! ```
//!
//! Field names come from [`PointKind::value_fields`]. Location altitude and
//! vertical accuracy are local-only and never reach the wire.

use serde_json::{Map, Number, Value};

use crate::error::{CoreError, CoreResult};
use crate::kind::PointKind;
use crate::types::{DataPoint, GeoLocation, Point3D};

/// A single encoded point.
pub type WireRecord = Map<String, Value>;

const TIMESTAMP: &str = "timestamp";

// =============================================================================
// Encode
// =============================================================================

/// Encodes a point into its wire record.
pub fn encode(point: &DataPoint) -> WireRecord {
    let kind = point.kind();
    let values: Vec<f64> = match point {
        DataPoint::Location(l) => vec![l.lat, l.lon, l.speed, l.accuracy],
        DataPoint::Acceleration(p) | DataPoint::Rotation(p) | DataPoint::Direction(p) => {
            vec![p.x, p.y, p.z]
        }
    };

    let mut record = WireRecord::new();
    for (field, value) in kind.value_fields().iter().zip(values) {
        // Non-finite doubles have no JSON form and become null.
        let v = Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null);
        record.insert((*field).to_string(), v);
    }
    record.insert(TIMESTAMP.to_string(), Value::from(point.timestamp()));
    record
}

// =============================================================================
// Decode
// =============================================================================

/// Decodes a wire record of the given kind.
///
/// Integer-valued JSON numbers are accepted for double fields. The timestamp
/// must be an integer.
pub fn decode(kind: PointKind, record: &WireRecord) -> CoreResult<DataPoint> {
    let timestamp = record
        .get(TIMESTAMP)
        .and_then(Value::as_i64)
        .ok_or_else(|| CoreError::malformed(kind, TIMESTAMP))?;

    let field = |name: &str| -> CoreResult<f64> {
        record
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| CoreError::malformed(kind, name))
    };
    let names = kind.value_fields();

    match kind {
        PointKind::Location => Ok(DataPoint::Location(GeoLocation {
            timestamp,
            lat: field(names[0])?,
            lon: field(names[1])?,
            speed: field(names[2])?,
            accuracy: field(names[3])?,
            altitude: None,
            vertical_accuracy: None,
        })),
        PointKind::Acceleration | PointKind::Rotation | PointKind::Direction => {
            let p = Point3D::new(timestamp, field(names[0])?, field(names[1])?, field(names[2])?);
            DataPoint::inertial(kind, p).ok_or_else(|| CoreError::UnknownKind(kind.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= EPS, "{a} != {b}");
    }

    #[test]
    fn test_location_wire_fields() {
        let loc = DataPoint::Location(GeoLocation {
            timestamp: 1_700_000_000_123,
            lat: 51.05,
            lon: 13.73,
            speed: 4.2,
            accuracy: 8.0,
            altitude: Some(112.0),
            vertical_accuracy: Some(3.0),
        });
        let record = encode(&loc);

        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["accuracy", "lat", "lon", "speed", "timestamp"]);
        assert_eq!(record["timestamp"], json!(1_700_000_000_123_i64));

        let back = decode(PointKind::Location, &record).unwrap();
        let DataPoint::Location(l) = back else {
            panic!("expected location, got {back:?}");
        };
        assert_eq!(l.timestamp, 1_700_000_000_123);
        assert_close(l.lat, 51.05);
        assert_close(l.lon, 13.73);
        assert_close(l.speed, 4.2);
        assert_close(l.accuracy, 8.0);
        assert_eq!(l.altitude, None);
    }

    #[test]
    fn test_inertial_round_trip_per_kind() {
        for kind in [PointKind::Acceleration, PointKind::Rotation, PointKind::Direction] {
            let point = DataPoint::inertial(kind, Point3D::new(-5, 0.1, -9.81, 1e-7)).unwrap();
            let record = encode(&point);
            for name in kind.value_fields() {
                assert!(record.contains_key(*name), "{kind}: missing {name}");
            }
            assert_eq!(decode(kind, &record).unwrap(), point);
        }
    }

    #[test]
    fn test_decode_accepts_integer_values() {
        let record = json!({ "ax": 1, "ay": 0, "az": -2, "timestamp": 10 });
        let record = record.as_object().unwrap();
        let point = decode(PointKind::Acceleration, record).unwrap();
        assert_eq!(point, DataPoint::Acceleration(Point3D::new(10, 1.0, 0.0, -2.0)));
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        let missing = json!({ "rX": 1.0, "rY": 2.0, "timestamp": 1 });
        let err = decode(PointKind::Rotation, missing.as_object().unwrap()).unwrap_err();
        assert_eq!(err, CoreError::malformed(PointKind::Rotation, "rZ"));

        let bad_ts = json!({ "mX": 1.0, "mY": 2.0, "mZ": 3.0, "timestamp": "now" });
        let err = decode(PointKind::Direction, bad_ts.as_object().unwrap()).unwrap_err();
        assert_eq!(err, CoreError::malformed(PointKind::Direction, "timestamp"));
    }

    #[test]
    fn test_non_finite_becomes_null() {
        let record = encode(&DataPoint::Rotation(Point3D::new(1, f64::NAN, 0.0, 0.0)));
        assert_eq!(record["rX"], Value::Null);
        assert!(decode(PointKind::Rotation, &record).is_err());
    }
}
