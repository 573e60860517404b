//! Synthesized sample metrics, used when no data file is available.
//!
//! The document written to disk mirrors what the loader expects from a
//! structured source: a `metadata` block plus a `metrics` array of records.

use chrono::{DateTime, Duration, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Number of daily records in a synthesized sample.
pub const SAMPLE_ROWS: usize = 30;

pub const SAMPLE_SOURCE: &str = "Sample Dashboard Data";
pub const SAMPLE_DESCRIPTION: &str = "Sample metrics for dashboard demonstration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDocument {
    pub metadata: SampleMetadata,
    pub metrics: Vec<SampleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub source: String,
    pub generated: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub date: String,
    pub revenue: f64,
    pub users: i64,
    pub conversion_rate: f64,
    pub page_views: i64,
    pub bounce_rate: f64,
}

/// Generate `SAMPLE_ROWS` consecutive days ending on `now`'s date.
/// The same `seed` always yields the same values.
pub fn generate(now: DateTime<Local>, seed: u64) -> SampleDocument {
    let mut rng = StdRng::seed_from_u64(seed);
    let today = now.date_naive();

    let metrics = (0..SAMPLE_ROWS)
        .rev()
        .map(|days_back| {
            let date = today - Duration::days(days_back as i64);
            SampleRecord {
                date: date.format("%Y-%m-%d").to_string(),
                revenue: round_to(normal(&mut rng, 10_000.0, 2_000.0), 2),
                users: normal(&mut rng, 500.0, 100.0) as i64,
                conversion_rate: round_to(normal(&mut rng, 0.15, 0.05), 3),
                page_views: normal(&mut rng, 5_000.0, 1_000.0) as i64,
                bounce_rate: round_to(normal(&mut rng, 0.4, 0.1), 3),
            }
        })
        .collect();

    SampleDocument {
        metadata: SampleMetadata {
            source: SAMPLE_SOURCE.to_string(),
            generated: now.to_rfc3339(),
            description: SAMPLE_DESCRIPTION.to_string(),
        },
        metrics,
    }
}

/// Box-Muller draw from N(mean, std_dev).
fn normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z * std_dev
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
