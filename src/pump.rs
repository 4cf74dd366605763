//! Pump-phase classification, scale-in and phase-gated profit taking.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Decision, ReasonTag};
use crate::pattern::PatternSignals;
use crate::position::{Position, ProfitLevel, PumpPhase};
use crate::volume::VolumeProfile;

/// Requirements for entering a phase, plus the scale-in applied on entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub phase: PumpPhase,
    pub min_trend: Option<f64>,
    pub min_momentum: Option<f64>,
    /// Price as a multiple of the entry price.
    pub min_price_ratio: Option<f64>,
    pub require_dry_up: bool,
    pub require_tight_range: bool,
    pub require_rising_volume: bool,
    /// Consecutive qualifying ticks before the phase is entered.
    pub sustain_ticks: u32,
    pub scale_in: f64,
}

pub const PHASE_RULES: [PhaseRule; 3] = [
    PhaseRule {
        phase: PumpPhase::Stealth,
        min_trend: None,
        min_momentum: None,
        min_price_ratio: None,
        require_dry_up: true,
        require_tight_range: true,
        require_rising_volume: false,
        sustain_ticks: 3,
        scale_in: 0.30,
    },
    PhaseRule {
        phase: PumpPhase::Early,
        min_trend: Some(50.0),
        min_momentum: Some(25.0),
        min_price_ratio: Some(1.05),
        require_dry_up: false,
        require_tight_range: false,
        require_rising_volume: false,
        sustain_ticks: 1,
        scale_in: 0.30,
    },
    PhaseRule {
        phase: PumpPhase::Acceleration,
        min_trend: None,
        min_momentum: Some(40.0),
        min_price_ratio: Some(1.15),
        require_dry_up: false,
        require_tight_range: false,
        require_rising_volume: true,
        sustain_ticks: 1,
        scale_in: 0.40,
    },
];

impl PhaseRule {
    pub fn for_phase(phase: PumpPhase) -> Option<&'static PhaseRule> {
        PHASE_RULES.iter().find(|r| r.phase == phase)
    }

    fn holds(&self, price_ratio: f64, momentum: f64, trend: f64, signals: &PatternSignals) -> bool {
        // Stealth is quiet accumulation: dry volume, tight price, flat momentum.
        let quiet = !self.require_tight_range || (signals.tight_range && signals.low_volatility);
        self.min_trend.map_or(true, |t| trend > t)
            && self.min_momentum.map_or(true, |m| momentum >= m)
            && self.min_price_ratio.map_or(true, |r| price_ratio >= r)
            && (!self.require_dry_up || signals.volume_dry_up)
            && quiet
            && (!self.require_rising_volume || signals.rising_volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FomoTier {
    pub level: ProfitLevel,
    pub take: f64,
}

/// Taken in order, one per qualifying tick.
pub const FOMO_TIERS: [FomoTier; 3] = [
    FomoTier { level: ProfitLevel::Level1, take: 0.20 },
    FomoTier { level: ProfitLevel::Level2, take: 0.30 },
    FomoTier { level: ProfitLevel::Level3, take: 0.30 },
];

impl FomoTier {
    fn gate(&self, signals: &PatternSignals) -> bool {
        match self.level {
            ProfitLevel::Level1 => signals.peaking_volume,
            ProfitLevel::Level2 => signals.climaxing,
            ProfitLevel::Level3 => signals.volume_distribution || signals.momentum_divergence,
        }
    }
}

const FOMO_PRICE_RATIO: f64 = 1.5;
const FOMO_MOMENTUM: f64 = 70.0;
const EXHAUSTION_MOMENTUM_DROP: f64 = 25.0;
const EXHAUSTION_NEAR_HIGH: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
pub struct PumpContext<'a> {
    pub price: f64,
    pub momentum: f64,
    pub profile: &'a VolumeProfile,
    pub signals: &'a PatternSignals,
    /// Volume trend of the sample before this tick, if any.
    pub prior_trend: Option<f64>,
    pub timestamp_ms: i64,
}

pub fn is_fomo(pos: &Position, ctx: &PumpContext<'_>) -> bool {
    pos.pump_phase >= PumpPhase::Acceleration
        && ctx.signals.volume_climaxing
        && (ctx.signals.strong_momentum || ctx.momentum >= FOMO_MOMENTUM)
        && ctx.price >= pos.entry_price * FOMO_PRICE_RATIO
}

pub fn is_exhausted(pos: &Position, ctx: &PumpContext<'_>) -> bool {
    if pos.pump_phase != PumpPhase::Acceleration || !ctx.signals.confirmed {
        return false;
    }
    let trend = ctx.profile.trend();
    let volume_fading = trend < 0.0 || ctx.prior_trend.is_some_and(|p| trend < p);
    let volume_weak = volume_fading || ctx.signals.volume_distribution;
    let momentum_weak = pos.peak_momentum() - ctx.momentum > EXHAUSTION_MOMENTUM_DROP
        || ctx.signals.momentum_divergence;
    let stalling = ctx.price >= pos.highest_price() * EXHAUSTION_NEAR_HIGH;
    volume_weak && momentum_weak && stalling
}

/// The FOMO tier this tick would take, if any. While one is pending the
/// climax is sold down in tiers rather than closed outright.
pub fn pending_fomo_tier(pos: &Position, ctx: &PumpContext<'_>) -> Option<&'static FomoTier> {
    if !is_fomo(pos, ctx) {
        return None;
    }
    let taken = pos.profit_taking();
    FOMO_TIERS
        .iter()
        .find(|t| !taken.is_taken(t.level) && t.gate(ctx.signals))
}

/// Runs exhaustion, FOMO profit taking, then phase advancement, in that order.
/// Exhaustion closes the position and ends the step.
pub fn step(pos: &mut Position, ctx: &PumpContext<'_>) -> Vec<Decision> {
    let mut out = Vec::new();

    if is_exhausted(pos, ctx) {
        let sold = pos.close(ctx.price, ReasonTag::PumpExhaustion, ctx.timestamp_ms);
        info!(token = %pos.token_id, sold, price = ctx.price, "pump.exhaustion");
        out.push(Decision::FullExit {
            token_id: pos.token_id.clone(),
            reason_tag: ReasonTag::PumpExhaustion,
        });
        return out;
    }

    if let Some(tier) = pending_fomo_tier(pos, ctx) {
        let sold = pos.reduce_by(tier.take, ctx.price, ReasonTag::FomoTake, ctx.timestamp_ms);
        pos.take_profit_level(tier.level);
        info!(token = %pos.token_id, level = ?tier.level, sold, "pump.fomo_take");
        out.push(Decision::PartialExit {
            token_id: pos.token_id.clone(),
            amount_reduced: sold,
            reason_tag: ReasonTag::FomoTake,
        });
    }

    if let Some(decision) = advance(pos, ctx) {
        out.push(decision);
    }
    out
}

fn advance(pos: &mut Position, ctx: &PumpContext<'_>) -> Option<Decision> {
    let target = pos.pump_phase.next()?;
    let rule = PhaseRule::for_phase(target)?;

    let ratio = if pos.entry_price > 0.0 { ctx.price / pos.entry_price } else { 0.0 };
    let holds = rule.holds(ratio, ctx.momentum, ctx.profile.trend(), ctx.signals);

    if rule.sustain_ticks > 1 {
        pos.stealth_streak = if holds { pos.stealth_streak + 1 } else { 0 };
        if pos.stealth_streak < rule.sustain_ticks {
            return None;
        }
    } else if !holds {
        return None;
    }

    let from = pos.pump_phase;
    pos.pump_phase = target;
    pos.stealth_streak = 0;
    let added = pos.scale_in(rule.scale_in, ctx.price, target, ctx.timestamp_ms);
    info!(
        token = %pos.token_id,
        from = ?from,
        to = ?target,
        added,
        new_amount = pos.token_amount(),
        "pump.phase_advance"
    );
    debug!(token = %pos.token_id, signals = ?ctx.signals, "pump.phase_signals");

    Some(Decision::ScaleUp {
        token_id: pos.token_id.clone(),
        new_amount: pos.token_amount(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntryRequest;

    fn position() -> Position {
        Position::open(
            &EntryRequest {
                token_id: "MINT".into(),
                entry_price: 1.0,
                token_amount: 1000.0,
                usd_amount: 1000.0,
                confidence: None,
                timestamp_ms: 0,
            },
            0.10,
        )
    }

    fn ctx<'a>(
        price: f64,
        momentum: f64,
        profile: &'a VolumeProfile,
        signals: &'a PatternSignals,
    ) -> PumpContext<'a> {
        PumpContext {
            price,
            momentum,
            profile,
            signals,
            prior_trend: None,
            timestamp_ms: 1,
        }
    }

    fn trend(t: f64) -> VolumeProfile {
        VolumeProfile {
            volume_trend: t,
            ..Default::default()
        }
    }

    #[test]
    fn stealth_needs_three_quiet_ticks() {
        let mut p = position();
        let profile = trend(-80.0);
        let quiet = PatternSignals {
            volume_dry_up: true,
            tight_range: true,
            low_volatility: true,
            ..Default::default()
        };
        assert!(step(&mut p, &ctx(1.0, 5.0, &profile, &quiet)).is_empty());
        assert!(step(&mut p, &ctx(1.0, 5.0, &profile, &quiet)).is_empty());
        let out = step(&mut p, &ctx(1.0, 5.0, &profile, &quiet));
        assert_eq!(p.pump_phase, PumpPhase::Stealth);
        assert!((p.token_amount() - 1300.0).abs() < 1e-9);
        assert!(matches!(out[0], Decision::ScaleUp { new_amount, .. } if (new_amount - 1300.0).abs() < 1e-9));
    }

    #[test]
    fn streak_resets_when_quiet_breaks() {
        let mut p = position();
        let profile = trend(-80.0);
        let quiet = PatternSignals {
            volume_dry_up: true,
            tight_range: true,
            low_volatility: true,
            ..Default::default()
        };
        let noisy = PatternSignals::default();
        step(&mut p, &ctx(1.0, 5.0, &profile, &quiet));
        step(&mut p, &ctx(1.0, 5.0, &profile, &quiet));
        step(&mut p, &ctx(1.0, 5.0, &profile, &noisy));
        step(&mut p, &ctx(1.0, 5.0, &profile, &quiet));
        assert_eq!(p.pump_phase, PumpPhase::None);
    }

    #[test]
    fn full_ladder_scales_thirty_thirty_forty() {
        let mut p = position();
        p.pump_phase = PumpPhase::Stealth;

        let early_profile = trend(80.0);
        let none = PatternSignals::default();
        step(&mut p, &ctx(1.06, 30.0, &early_profile, &none));
        assert_eq!(p.pump_phase, PumpPhase::Early);
        assert!((p.token_amount() - 1300.0).abs() < 1e-9);

        let rising = PatternSignals {
            rising_volume: true,
            ..Default::default()
        };
        // price too low for acceleration
        step(&mut p, &ctx(1.10, 45.0, &early_profile, &rising));
        assert_eq!(p.pump_phase, PumpPhase::Early);

        step(&mut p, &ctx(1.20, 45.0, &early_profile, &rising));
        assert_eq!(p.pump_phase, PumpPhase::Acceleration);
        assert!((p.token_amount() - 1820.0).abs() < 1e-9);

        // no phase after acceleration
        assert!(step(&mut p, &ctx(1.25, 45.0, &early_profile, &rising)).is_empty());
    }

    #[test]
    fn fomo_takes_gated_tiers_in_order() {
        let mut p = position();
        p.pump_phase = PumpPhase::Acceleration;
        let profile = trend(350.0);
        let signals = PatternSignals {
            volume_climaxing: true,
            strong_momentum: true,
            peaking_volume: true,
            climaxing: true,
            ..Default::default()
        };

        let out = step(&mut p, &ctx(1.6, 80.0, &profile, &signals));
        assert!(p.profit_taking().level1);
        assert!((p.token_amount() - 800.0).abs() < 1e-9);
        assert!(matches!(out[0], Decision::PartialExit { reason_tag: ReasonTag::FomoTake, .. }));

        step(&mut p, &ctx(1.7, 85.0, &profile, &signals));
        assert!(p.profit_taking().level2);
        assert!((p.token_amount() - 560.0).abs() < 1e-9);

        // level3 gate not met
        assert!(step(&mut p, &ctx(1.8, 90.0, &profile, &signals)).is_empty());
        assert!(!p.profit_taking().level3);
    }

    #[test]
    fn fomo_level3_sells_into_divergence() {
        let mut p = position();
        p.pump_phase = PumpPhase::Acceleration;
        p.take_profit_level(ProfitLevel::Level1);
        p.take_profit_level(ProfitLevel::Level2);
        let profile = trend(350.0);
        let signals = PatternSignals {
            volume_climaxing: true,
            strong_momentum: true,
            momentum_divergence: true,
            ..Default::default()
        };
        let c = ctx(1.8, 90.0, &profile, &signals);
        assert_eq!(pending_fomo_tier(&p, &c).map(|t| t.level), Some(ProfitLevel::Level3));

        let out = step(&mut p, &c);
        assert!(p.profit_taking().level3);
        assert!((p.token_amount() - 700.0).abs() < 1e-9);
        assert!(matches!(
            out[0],
            Decision::PartialExit { amount_reduced, reason_tag: ReasonTag::FomoTake, .. }
                if (amount_reduced - 300.0).abs() < 1e-9
        ));
        // every tier taken
        assert!(pending_fomo_tier(&p, &c).is_none());
    }

    #[test]
    fn fomo_ignored_before_acceleration() {
        let mut p = position();
        p.pump_phase = PumpPhase::Early;
        let profile = trend(0.0);
        let signals = PatternSignals {
            volume_climaxing: true,
            strong_momentum: true,
            peaking_volume: true,
            ..Default::default()
        };
        assert!(!is_fomo(&p, &ctx(2.0, 90.0, &profile, &signals)));
    }

    #[test]
    fn exhaustion_closes_runner() {
        let mut p = position();
        p.pump_phase = PumpPhase::Acceleration;
        p.observe_price(2.0, 1);
        p.observe_momentum(85.0);
        let profile = trend(-20.0);
        let signals = PatternSignals {
            confirmed: true,
            ..Default::default()
        };
        let out = step(&mut p, &ctx(1.95, 50.0, &profile, &signals));
        assert!(p.is_closed());
        assert_eq!(
            out,
            vec![Decision::FullExit {
                token_id: "MINT".into(),
                reason_tag: ReasonTag::PumpExhaustion
            }]
        );
    }

    #[test]
    fn exhaustion_needs_confirmation() {
        let mut p = position();
        p.pump_phase = PumpPhase::Acceleration;
        p.observe_price(2.0, 1);
        p.observe_momentum(85.0);
        let profile = trend(-20.0);
        let signals = PatternSignals::default();
        assert!(!is_exhausted(&p, &ctx(1.95, 50.0, &profile, &signals)));
    }
}
