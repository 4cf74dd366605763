//! Exit triggers. Any trigger firing closes the position.

use crate::domain::ReasonTag;
use crate::pattern::PatternSignals;
use crate::position::Position;
use crate::volume::{finite_or_zero, VolumeProfile};

const STOP_TOLERANCE: f64 = 0.003;
const TOLERANCE_ZERO_PROFIT: f64 = 50.0;

const CASCADE_TREND: f64 = 300.0;
const MOMENTUM_LOSS_BASE: f64 = 40.0;
const MOMENTUM_LOSS_PROFIT_SLOPE: f64 = 0.2;

const DIVERGENCE_NEAR_HIGH: f64 = 0.97;
const DIVERGENCE_BASE_TREND: f64 = 60.0;
const DIVERGENCE_PROFIT_SLOPE: f64 = 0.4;

const CLIMAX_MIN_PROFIT: f64 = 25.0;

/// Momentum/volume-trend thresholds for the named trap detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapThresholds {
    pub extreme_momentum: f64,
    pub extreme_trend: f64,
    pub crisis_trend: f64,
    pub crisis_momentum: f64,
    pub hunt_price_drop: f64,
    pub hunt_trend: f64,
    pub hunt_momentum: f64,
    pub whale_trend: f64,
    pub whale_momentum: f64,
    pub whale_off_high: f64,
    pub wave_momentum: f64,
    pub wave_trend: f64,
    pub range_momentum: f64,
    pub range_trend: f64,
    pub range_off_high: f64,
    pub low_float_trend: f64,
    pub low_float_momentum: f64,
    pub cascade_trend: f64,
    pub cascade_momentum: f64,
}

impl Default for TrapThresholds {
    fn default() -> Self {
        Self {
            extreme_momentum: 90.0,
            extreme_trend: 500.0,
            crisis_trend: -80.0,
            crisis_momentum: 20.0,
            hunt_price_drop: 0.93,
            hunt_trend: 200.0,
            hunt_momentum: 30.0,
            whale_trend: 250.0,
            whale_momentum: 35.0,
            whale_off_high: 0.95,
            wave_momentum: 50.0,
            wave_trend: 50.0,
            range_momentum: 25.0,
            range_trend: 150.0,
            range_off_high: 0.97,
            low_float_trend: 350.0,
            low_float_momentum: 40.0,
            cascade_trend: -60.0,
            cascade_momentum: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExitInputs<'a> {
    pub price: f64,
    pub momentum: f64,
    pub profile: &'a VolumeProfile,
    pub signals: &'a PatternSignals,
    /// A FOMO tier is about to be taken on this tick.
    pub fomo_pending: bool,
}

/// Every trigger that fired, in reporting order. Empty means hold.
pub fn evaluate(pos: &Position, inp: &ExitInputs<'_>, th: &TrapThresholds) -> Vec<ReasonTag> {
    let price = inp.price;
    let momentum = finite_or_zero(inp.momentum);
    let trend = inp.profile.trend();
    let profit = pos.profit_pct().unwrap_or(0.0).max(0.0);
    let highest = pos.highest_price();
    let previous = inp.profile.previous_price;

    if !price.is_finite() || price <= 0.0 {
        return Vec::new();
    }

    let tolerance = STOP_TOLERANCE * (1.0 - (profit / TOLERANCE_ZERO_PROFIT).clamp(0.0, 1.0));
    let momentum_loss_threshold = MOMENTUM_LOSS_BASE - MOMENTUM_LOSS_PROFIT_SLOPE * profit.min(100.0);
    let divergence_trend = -(DIVERGENCE_BASE_TREND - DIVERGENCE_PROFIT_SLOPE * profit.min(50.0));
    let drop = (pos.peak_momentum() - momentum).max(0.0);

    let checks = [
        (
            ReasonTag::StopBreach,
            pos.trailing_stop() > 0.0 && price <= pos.trailing_stop() * (1.0 + tolerance),
        ),
        (
            ReasonTag::MomentumLoss,
            drop > momentum_loss_threshold && trend > CASCADE_TREND / 2.0,
        ),
        (
            ReasonTag::VolumeDivergence,
            price >= highest * DIVERGENCE_NEAR_HIGH && trend < divergence_trend,
        ),
        (
            ReasonTag::VolumeClimax,
            inp.signals.volume_climaxing && profit > CLIMAX_MIN_PROFIT && !inp.fomo_pending,
        ),
        (
            ReasonTag::ExtremeSignals,
            momentum > th.extreme_momentum && trend > th.extreme_trend,
        ),
        (
            ReasonTag::LiquidityCrisis,
            trend < th.crisis_trend && momentum < th.crisis_momentum,
        ),
        (
            ReasonTag::StopHunt,
            previous > 0.0
                && price < previous * th.hunt_price_drop
                && trend > th.hunt_trend
                && momentum < th.hunt_momentum,
        ),
        (
            ReasonTag::WhaleDistribution,
            trend > th.whale_trend && momentum < th.whale_momentum && price < highest * th.whale_off_high,
        ),
        (
            ReasonTag::MultiWaveTrap,
            pos.descending_highs() && momentum < th.wave_momentum && trend < th.wave_trend,
        ),
        (
            ReasonTag::RangeBreakTrap,
            momentum < th.range_momentum && trend > th.range_trend && price < highest * th.range_off_high,
        ),
        (
            ReasonTag::LowFloatPump,
            trend > th.low_float_trend && momentum < th.low_float_momentum,
        ),
        (
            ReasonTag::LiquidityCascade,
            pos.recent_highs.len() >= 2 && trend < th.cascade_trend && momentum < th.cascade_momentum,
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(tag, hit)| hit.then_some(tag))
        .collect()
}
