//! Tiered take-profit and the dark-pool moon bag.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Decision, ReasonTag};
use crate::position::{Position, ProfitLevel};
use crate::volume::{finite_or_zero, VolumeProfile};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitBand {
    pub tag: ReasonTag,
    pub min_profit_pct: f64,
    /// Fires when momentum drops below this.
    pub momentum_below: f64,
    pub take: f64,
    pub level: ProfitLevel,
}

/// Highest band first.
pub const PROFIT_BANDS: [ProfitBand; 3] = [
    ProfitBand {
        tag: ReasonTag::MajorGains,
        min_profit_pct: 40.0,
        momentum_below: 40.0,
        take: 0.75,
        level: ProfitLevel::Level3,
    },
    ProfitBand {
        tag: ReasonTag::SolidLock,
        min_profit_pct: 20.0,
        momentum_below: 30.0,
        take: 0.45,
        level: ProfitLevel::Level2,
    },
    ProfitBand {
        tag: ReasonTag::QuickSecure,
        min_profit_pct: 12.0,
        momentum_below: 20.0,
        take: 0.25,
        level: ProfitLevel::Level1,
    },
];

pub const MOON_BAG_FRACTION: f64 = 0.15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergencePatterns {
    pub smart_money: bool,
    pub range_game: bool,
    pub liquidity_hunt: bool,
    pub dark_pool: bool,
}

impl DivergencePatterns {
    pub fn any(&self) -> bool {
        self.smart_money || self.range_game || self.liquidity_hunt || self.dark_pool
    }
}

/// Compares the tick against the position's peak price and momentum.
pub fn detect(pos: &Position, price: f64, momentum: f64, profile: &VolumeProfile) -> DivergencePatterns {
    let momentum = finite_or_zero(momentum);
    let trend = profile.trend();
    let high = pos.highest_price();
    let peak = pos.peak_momentum();
    let previous = profile.previous_price;

    DivergencePatterns {
        smart_money: price >= high * 0.97 && momentum < peak * 0.6 && trend < 0.0,
        range_game: price >= high * 0.95 && price < high && trend < -30.0 && profile.spikes() >= 2,
        liquidity_hunt: previous > 0.0 && price < previous * 0.95 && trend > 100.0,
        dark_pool: peak > 40.0 && price >= high * 0.98 && trend < -50.0 && momentum < peak * 0.5,
    }
}

pub fn step(
    pos: &mut Position,
    price: f64,
    momentum: f64,
    profile: &VolumeProfile,
    timestamp_ms: i64,
) -> Vec<Decision> {
    let mut out = Vec::new();
    let Some(profit) = pos.profit_pct() else {
        return out;
    };
    let patterns = detect(pos, price, momentum, profile);

    let band = PROFIT_BANDS.iter().find(|b| {
        profit >= b.min_profit_pct
            && !pos.profit_taking().is_taken(b.level)
            && (momentum < b.momentum_below || patterns.any())
    });
    if let Some(band) = band {
        let sold = pos.reduce_by(band.take, price, band.tag, timestamp_ms);
        pos.take_profit_level(band.level);
        info!(
            token = %pos.token_id,
            band = ?band.tag,
            profit_pct = profit,
            momentum,
            sold,
            remaining = pos.token_amount(),
            "protection.take_profit"
        );
        out.push(exit_decision(pos, sold, band.tag));
    }

    if patterns.dark_pool && !pos.moon_bag && !pos.is_closed() {
        let sold = pos.reduce_to(MOON_BAG_FRACTION, price, ReasonTag::MoonBag, timestamp_ms);
        pos.moon_bag = true;
        info!(token = %pos.token_id, sold, remaining = pos.token_amount(), "protection.moon_bag");
        out.push(exit_decision(pos, sold, ReasonTag::MoonBag));
    }

    out
}

fn exit_decision(pos: &Position, sold: f64, tag: ReasonTag) -> Decision {
    if pos.is_closed() {
        Decision::FullExit {
            token_id: pos.token_id.clone(),
            reason_tag: tag,
        }
    } else {
        Decision::PartialExit {
            token_id: pos.token_id.clone(),
            amount_reduced: sold,
            reason_tag: tag,
        }
    }
}
