//! Trailing-stop distance.
//!
//! The distance starts from a momentum-scaled base, is tightened by the
//! profit tier the position sits in, then by every institutional pattern that
//! matches, then by any momentum shift since the peak. The result is clamped
//! between a profit-dependent floor and a fixed cap.

use serde::{Deserialize, Serialize};

use crate::volume::{finite_or_zero, VolumeProfile};

pub const BASE_STOP: f64 = 0.05;
pub const MAX_STOP_RATIO: f64 = 0.55;
const MOMENTUM_REDUCTION: f64 = 0.8;
const TIER_VOLUME_TIGHTEN: f64 = 0.9;
const MOMENTUM_SHIFT_MIN_DROP: f64 = 20.0;
const MOMENTUM_SHIFT_CAP: f64 = 0.05;
const MOMENTUM_SHIFT_FULL_PROFIT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitTier {
    pub min_profit_pct: f64,
    pub factor: f64,
    pub tighten: f64,
    pub volume_threshold: f64,
}

/// Ascending by `min_profit_pct`; the highest matching tier applies.
pub const PROFIT_TIERS: [ProfitTier; 5] = [
    ProfitTier { min_profit_pct: 10.0, factor: 0.85, tighten: 0.0010, volume_threshold: 100.0 },
    ProfitTier { min_profit_pct: 15.0, factor: 0.75, tighten: 0.0015, volume_threshold: 120.0 },
    ProfitTier { min_profit_pct: 25.0, factor: 0.65, tighten: 0.0020, volume_threshold: 150.0 },
    ProfitTier { min_profit_pct: 50.0, factor: 0.55, tighten: 0.0025, volume_threshold: 200.0 },
    ProfitTier { min_profit_pct: 75.0, factor: 0.45, tighten: 0.0030, volume_threshold: 250.0 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionalPattern {
    LowFloatPump,
    Distribution,
    Accumulation,
    Cascade,
    Climax,
}

/// Open bounds; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternRule {
    pub pattern: InstitutionalPattern,
    pub trend_above: Option<f64>,
    pub trend_below: Option<f64>,
    pub momentum_above: Option<f64>,
    pub momentum_below: Option<f64>,
    pub factor: f64,
}

impl PatternRule {
    pub fn matches(&self, trend: f64, momentum: f64) -> bool {
        self.trend_above.map_or(true, |t| trend > t)
            && self.trend_below.map_or(true, |t| trend < t)
            && self.momentum_above.map_or(true, |m| momentum > m)
            && self.momentum_below.map_or(true, |m| momentum < m)
    }
}

pub const INSTITUTIONAL_RULES: [PatternRule; 5] = [
    PatternRule {
        pattern: InstitutionalPattern::LowFloatPump,
        trend_above: Some(250.0),
        trend_below: None,
        momentum_above: Some(60.0),
        momentum_below: None,
        factor: 0.50,
    },
    PatternRule {
        pattern: InstitutionalPattern::Distribution,
        trend_above: None,
        trend_below: Some(-40.0),
        momentum_above: None,
        momentum_below: Some(30.0),
        factor: 0.50,
    },
    PatternRule {
        pattern: InstitutionalPattern::Accumulation,
        trend_above: Some(100.0),
        trend_below: None,
        momentum_above: None,
        momentum_below: Some(25.0),
        factor: 0.55,
    },
    PatternRule {
        pattern: InstitutionalPattern::Cascade,
        trend_above: Some(300.0),
        trend_below: None,
        momentum_above: None,
        momentum_below: None,
        factor: 0.50,
    },
    PatternRule {
        pattern: InstitutionalPattern::Climax,
        trend_above: Some(400.0),
        trend_below: None,
        momentum_above: Some(80.0),
        momentum_below: None,
        factor: 0.45,
    },
];

/// Current momentum plus the running peak for the position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumReading {
    pub current: f64,
    pub peak: f64,
}

impl MomentumReading {
    pub fn new(current: f64, peak: f64) -> Self {
        Self { current, peak }
    }

    pub fn drop_from_peak(&self) -> f64 {
        (finite_or_zero(self.peak) - finite_or_zero(self.current)).max(0.0)
    }
}

/// Percent gain over entry, or `None` when it can't be computed.
pub fn profit_pct(price: f64, entry_price: f64) -> Option<f64> {
    if entry_price.is_nan() || entry_price <= 0.0 || !price.is_finite() {
        return None;
    }
    let pct = (price - entry_price) / entry_price * 100.0;
    pct.is_finite().then_some(pct)
}

pub fn min_stop(profit_pct: f64) -> f64 {
    if profit_pct >= 50.0 {
        0.01
    } else if profit_pct >= 20.0 {
        0.015
    } else {
        0.02
    }
}

pub fn max_stop() -> f64 {
    BASE_STOP * MAX_STOP_RATIO
}

pub fn tier_for(profit_pct: f64) -> Option<&'static ProfitTier> {
    PROFIT_TIERS
        .iter()
        .rev()
        .find(|t| profit_pct >= t.min_profit_pct)
}

pub fn matching_patterns(trend: f64, momentum: f64) -> impl Iterator<Item = &'static PatternRule> {
    INSTITUTIONAL_RULES
        .iter()
        .filter(move |r| r.matches(trend, momentum))
}

pub fn stop_distance(
    price: f64,
    entry_price: f64,
    momentum: MomentumReading,
    profile: &VolumeProfile,
) -> f64 {
    let profit = profit_pct(price, entry_price).unwrap_or(0.0);
    let current = finite_or_zero(momentum.current);
    let trend = profile.trend();

    let mut d = BASE_STOP * (1.0 - MOMENTUM_REDUCTION * current.clamp(0.0, 100.0) / 100.0);

    if let Some(tier) = tier_for(profit) {
        d = d * tier.factor - tier.tighten;
        if trend.max(0.0) > tier.volume_threshold {
            d *= TIER_VOLUME_TIGHTEN;
        }
    }

    for rule in matching_patterns(trend, current) {
        d *= rule.factor;
    }

    let drop = momentum.drop_from_peak();
    if drop > MOMENTUM_SHIFT_MIN_DROP {
        let profit_scale = (profit / MOMENTUM_SHIFT_FULL_PROFIT).clamp(0.0, 1.0);
        d -= (d * drop / 100.0 * profit_scale).min(MOMENTUM_SHIFT_CAP);
    }

    let floor = min_stop(profit);
    if !d.is_finite() {
        return floor;
    }
    d.clamp(floor, max_stop())
}
