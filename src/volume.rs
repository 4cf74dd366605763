//! Rolling volume profile for one token.

use serde::{Deserialize, Serialize};

use crate::domain::Sample;
use crate::ring::Ring;

pub const VOLUME_WINDOW: usize = 10;
const RECENT_SAMPLES: usize = 5;
const SPIKE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Percent change of the recent volume mean over the older mean.
    pub volume_trend: f64,
    pub volume_spikes: usize,
    pub average_volume: f64,
    pub recent_volume: f64,
    pub previous_price: f64,
    pub current_price: f64,
}

impl VolumeProfile {
    /// Trend with non-finite values folded to zero.
    pub fn trend(&self) -> f64 {
        finite_or_zero(self.volume_trend)
    }

    pub fn spikes(&self) -> usize {
        self.volume_spikes
    }
}

pub(crate) fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeTracker {
    window: Ring<Sample, VOLUME_WINDOW>,
}

impl VolumeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: Sample) -> VolumeProfile {
        self.window.push(sample);
        self.profile()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.window.iter().map(|s| s.price).collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// The middle of the last three prices, if it is a strict local maximum.
    pub fn local_top(&self) -> Option<f64> {
        if self.window.len() < 3 {
            return None;
        }
        let last: Vec<f64> = self.window.last_n(3).map(|s| s.price).collect();
        (last[1] > last[0] && last[1] > last[2]).then_some(last[1])
    }

    pub fn profile(&self) -> VolumeProfile {
        profile_of(&self.window.iter().copied().collect::<Vec<_>>())
    }
}

/// Derive a profile from samples ordered oldest first.
pub fn profile_of(samples: &[Sample]) -> VolumeProfile {
    let Some(newest) = samples.last() else {
        return VolumeProfile::default();
    };

    let volumes: Vec<f64> = samples.iter().map(|s| s.volume).collect();
    let average_volume = mean(&volumes);

    let split = volumes.len().saturating_sub(RECENT_SAMPLES);
    let (older, recent) = volumes.split_at(split);
    let recent_mean = mean(recent);
    // Cold start: no older samples compares recent with itself, i.e. 0% trend.
    let old_mean = if older.is_empty() { recent_mean } else { mean(older) };
    let volume_trend = if old_mean > 0.0 {
        finite_or_zero((recent_mean - old_mean) / old_mean * 100.0)
    } else {
        0.0
    };

    let volume_spikes = volumes
        .iter()
        .filter(|v| **v > average_volume * SPIKE_MULTIPLIER)
        .count();

    let previous_price = if samples.len() >= 2 {
        samples[samples.len() - 2].price
    } else {
        newest.price
    };

    VolumeProfile {
        volume_trend,
        volume_spikes,
        average_volume,
        recent_volume: newest.volume,
        previous_price,
        current_price: newest.price,
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}
