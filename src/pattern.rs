//! Short-horizon pattern signals over the last few ticks of a position.

use serde::{Deserialize, Serialize};

use crate::ring::Ring;
use crate::volume::{finite_or_zero, VolumeProfile};

pub const PATTERN_HISTORY: usize = 5;
const LOOKBACK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSample {
    /// Volume trend at the time of the tick.
    pub volume_spike: f64,
    pub momentum_peak: f64,
    pub price_swing: f64,
}

pub type PatternHistory = Ring<PatternSample, PATTERN_HISTORY>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternThresholds {
    pub dry_up_trend: f64,
    pub spike_trend: f64,
    pub climax_trend: f64,
    pub peaking_trend: f64,
    pub climax_momentum: f64,
    pub strong_momentum: f64,
    pub tight_range_pct: f64,
    pub low_volatility_momentum: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            dry_up_trend: -70.0,
            spike_trend: 150.0,
            climax_trend: 300.0,
            peaking_trend: 200.0,
            climax_momentum: 70.0,
            strong_momentum: 60.0,
            tight_range_pct: 3.0,
            low_volatility_momentum: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSignals {
    pub volume_dry_up: bool,
    pub volume_spikes: usize,
    pub rising_volume: bool,
    pub volume_climaxing: bool,
    pub volume_distribution: bool,
    pub strong_momentum: bool,
    pub momentum_divergence: bool,
    pub peaking_volume: bool,
    pub climaxing: bool,
    pub tight_range: bool,
    pub low_volatility: bool,
    pub confirmed: bool,
}

/// Pure function of the supplied history. `history` is expected to already
/// hold the sample for the current tick as its newest entry.
pub fn analyze(
    history: &PatternHistory,
    price: f64,
    momentum: f64,
    profile: &VolumeProfile,
    th: &PatternThresholds,
) -> PatternSignals {
    let recent: Vec<PatternSample> = history.last_n(LOOKBACK).copied().collect();
    if recent.is_empty() {
        return PatternSignals::default();
    }

    let trends: Vec<f64> = recent.iter().map(|s| finite_or_zero(s.volume_spike)).collect();
    let momenta: Vec<f64> = recent.iter().map(|s| finite_or_zero(s.momentum_peak)).collect();
    let prices: Vec<f64> = recent.iter().map(|s| finite_or_zero(s.price_swing)).collect();

    let latest = trends[trends.len() - 1];
    let prior = (trends.len() >= 2).then(|| trends[trends.len() - 2]);

    let earlier_momentum = max_of(&momenta[..momenta.len() - 1]);
    let earlier_price = max_of(&prices[..prices.len() - 1]);

    let trend = profile.trend();
    let volume_spikes = trends.iter().filter(|t| **t > th.spike_trend).count();

    let volume_climaxing = match prior {
        Some(p) => latest > th.climax_trend && latest > 2.0 * p,
        None => false,
    };
    let volume_distribution = prior.is_some_and(|p| latest < p) && profile.spikes() > 2;

    let strong_momentum = momentum > th.strong_momentum
        && earlier_momentum.map_or(true, |m| momentum > m);
    let momentum_divergence = match (earlier_price, earlier_momentum) {
        (Some(p), Some(m)) => price > p && momentum <= m,
        _ => false,
    };

    let tight_range = prices.len() >= 2 && {
        let lo = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        lo > 0.0 && (hi - lo) / lo * 100.0 < th.tight_range_pct
    };
    let low_volatility = {
        let lo = momenta.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = momenta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        hi - lo < th.low_volatility_momentum
    };

    PatternSignals {
        volume_dry_up: trends.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            < th.dry_up_trend,
        volume_spikes,
        rising_volume: trends.len() == LOOKBACK && trends[0] < trends[1] && trends[1] < trends[2],
        volume_climaxing,
        volume_distribution,
        strong_momentum,
        momentum_divergence,
        peaking_volume: trend > th.peaking_trend,
        climaxing: momentum > th.climax_momentum && trend > th.climax_trend,
        tight_range,
        low_volatility,
        confirmed: history.len() >= LOOKBACK && profile.spikes() > 1,
    }
}

fn max_of(xs: &[f64]) -> Option<f64> {
    xs.iter().copied().reduce(f64::max)
}
