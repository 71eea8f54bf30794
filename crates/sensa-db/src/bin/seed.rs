//! # Seed Data Generator
//!
//! Populates the database with synthetic finished measurements for
//! development and for exercising the uploader against a test collector.
//!
//! ## Usage
//! ```bash
//! # Three rides of 10 minutes each (default)
//! cargo run -p sensa-db --bin seed
//!
//! # One long ride: 36,000 GPS fixes at 1 Hz
//! cargo run -p sensa-db --bin seed -- --measurements 1 --minutes 600
//!
//! # Specify database path
//! cargo run -p sensa-db --bin seed -- --db ./data/sensa.db
//! ```
//!
//! ## Generated Data
//! Each measurement gets:
//! - GPS fixes at 1 Hz along a slow circle around Dresden
//! - Accelerometer, gyroscope and magnetometer samples at `--sensor-hz`
//! - A vehicle label cycled from [`VEHICLES`]
//! - Status `FINISHED`, so it is picked up by the next sync run

use clap::Parser;
use sensa_core::{GeoLocation, Point3D, PointKind};
use sensa_db::{Database, DbConfig};

/// Transport mode labels cycled across generated measurements.
const VEHICLES: &[&str] = &["BICYCLE", "CAR", "WALKING", "BUS", "TRAIN"];

/// Samples are inserted in chunks of this size (one transaction each).
const CHUNK: usize = 5_000;

/// 2024-01-01T00:00:00Z in milliseconds.
const START_MS: i64 = 1_704_067_200_000;

#[derive(Debug, Parser)]
#[command(name = "seed", about = "Sensa seed data generator")]
struct Args {
    /// Number of measurements to generate
    #[arg(short = 'n', long, default_value_t = 3)]
    measurements: u32,

    /// Recording length of each measurement in minutes
    #[arg(short, long, default_value_t = 10)]
    minutes: u32,

    /// Inertial sampling rate in Hz
    #[arg(long, default_value_t = 10)]
    sensor_hz: u32,

    /// Database file path
    #[arg(short, long, default_value = "./sensa_dev.db")]
    db: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("🌱 Sensa Seed Data Generator");
    println!("============================");
    println!("Database:     {}", args.db);
    println!("Measurements: {}", args.measurements);
    println!("Length:       {} min", args.minutes);
    println!();

    let db = Database::new(DbConfig::new(&args.db)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");
    println!();

    let start = std::time::Instant::now();
    let seconds = i64::from(args.minutes) * 60;
    let mut total_points: u64 = 0;

    for n in 0..args.measurements {
        let vehicle = VEHICLES[n as usize % VEHICLES.len()];
        let m = db.measurements().create(vehicle).await?;
        let begin = START_MS + i64::from(n) * seconds * 1000;

        let fixes: Vec<GeoLocation> = (0..seconds).map(|s| generate_fix(begin, s)).collect();
        for chunk in fixes.chunks(CHUNK) {
            total_points += db.points().insert_locations(m.id, chunk).await?;
        }

        let sample_count = seconds * i64::from(args.sensor_hz);
        for kind in PointKind::ALL.into_iter().filter(|k| k.is_inertial()) {
            let samples: Vec<Point3D> = (0..sample_count)
                .map(|i| generate_sample(kind, begin, i, args.sensor_hz))
                .collect();
            for chunk in samples.chunks(CHUNK) {
                total_points += db.points().insert_sensor_points(m.id, kind, chunk).await?;
            }
        }

        db.measurements().finish(m.id).await?;
        println!("  Measurement {} ({}) finished", m.id, vehicle);
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} points in {:?}", total_points, elapsed);
    println!(
        "  Rate: {:.0} points/second",
        total_points as f64 / elapsed.as_secs_f64()
    );
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// One GPS fix per second on a ~500 m circle.
fn generate_fix(begin_ms: i64, second: i64) -> GeoLocation {
    let angle = second as f64 / 300.0;
    GeoLocation {
        timestamp: begin_ms + second * 1000,
        lat: 51.0504 + 0.0045 * angle.sin(),
        lon: 13.7373 + 0.0072 * angle.cos(),
        speed: 4.0 + (second % 7) as f64 * 0.25,
        accuracy: 3.0 + (second % 5) as f64,
        altitude: Some(112.0 + (second % 11) as f64 * 0.1),
        vertical_accuracy: Some(6.0),
    }
}

/// Smooth pseudo-signal per kind.
fn generate_sample(kind: PointKind, begin_ms: i64, index: i64, hz: u32) -> Point3D {
    let t = index as f64 / f64::from(hz.max(1));
    let timestamp = begin_ms + index * 1000 / i64::from(hz.max(1));
    match kind {
        PointKind::Acceleration => Point3D::new(timestamp, 0.2 * t.sin(), 0.1 * t.cos(), 9.81),
        PointKind::Rotation => Point3D::new(timestamp, 0.01 * t.cos(), 0.02 * t.sin(), 0.0),
        _ => Point3D::new(timestamp, 20.0 + t.sin(), -3.0, 42.0 + t.cos()),
    }
}
