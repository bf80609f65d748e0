use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::models::SensorEvent;

/// One timestamped numeric sample for a single channel.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
}

/// Windowed statistics for one sensor channel.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    /// Arithmetic mean, unrounded — display formatting is the client's job.
    pub average: f64,
    /// Lower median: the element at index `n / 2` of the ascending sort.
    pub median: f64,
    /// Value of the most recently recorded sample in the window.
    pub latest: f64,
}

/// Per-channel statistics over a window of readings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsReport {
    pub temperature: ChannelStats,
    pub humidity: ChannelStats,
    pub soil_moisture: ChannelStats,
    /// `None` when no reading in the window carried a CO2 sample.
    pub co2_level: Option<ChannelStats>,
    /// `None` when no reading in the window carried a light sample.
    pub light_intensity: Option<ChannelStats>,
    pub total_readings: usize,
}

/// Compute stats over one channel's samples. Empty input means "no data",
/// never a zeroed result.
pub fn channel_stats(samples: &[Sample]) -> Option<ChannelStats> {
    if samples.is_empty() {
        return None;
    }

    let latest = samples
        .iter()
        .max_by_key(|s| s.recorded_at)
        .map(|s| s.value)?;

    let mut sorted: Vec<f64> = samples.iter().map(|s| s.value).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let average = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let median = sorted[sorted.len() / 2];

    Some(ChannelStats {
        min,
        max,
        average,
        median,
        latest,
    })
}

/// Build the per-channel report for a set of readings. Optional channels
/// (CO2, light) use whatever samples exist; a reading set with none of them
/// still reports the required channels.
pub fn compute(readings: &[SensorEvent]) -> Option<StatsReport> {
    if readings.is_empty() {
        return None;
    }

    let required = |pick: fn(&SensorEvent) -> f64| -> Vec<Sample> {
        readings
            .iter()
            .map(|r| Sample {
                recorded_at: r.timestamp,
                value: pick(r),
            })
            .collect()
    };
    let optional = |pick: fn(&SensorEvent) -> Option<f64>| -> Vec<Sample> {
        readings
            .iter()
            .filter_map(|r| {
                pick(r).map(|value| Sample {
                    recorded_at: r.timestamp,
                    value,
                })
            })
            .collect()
    };

    Some(StatsReport {
        temperature: channel_stats(&required(|r| r.temperature))?,
        humidity: channel_stats(&required(|r| r.humidity))?,
        soil_moisture: channel_stats(&required(|r| r.soil_moisture))?,
        co2_level: channel_stats(&optional(|r| r.co2_level)),
        light_intensity: channel_stats(&optional(|r| r.light_intensity)),
        total_readings: readings.len(),
    })
}
