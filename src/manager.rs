//! Position lifecycle: the only owner of open positions.
//!
//! Each tick for a held token runs the full pipeline in order: volume
//! profile, momentum, price extremes and trailing stop, pattern history,
//! exit triggers, pump phase, then profit protection. A token that is not
//! held ignores its ticks.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::domain::{Decision, EntryRequest, Tick};
use crate::exit::{self, ExitInputs, TrapThresholds};
use crate::pattern::{self, PatternSample, PatternThresholds};
use crate::position::{AmountEvent, Position, PumpPhase};
use crate::protection;
use crate::pump::{self, PumpContext};
use crate::risk::{BotMode, PortfolioGuard, SharedGuard};
use crate::stop::{stop_distance, MomentumReading};
use crate::strategy::{build_model, MomentumModel};
use crate::time::{day_key_at, parse_tz};
use crate::volume::{finite_or_zero, VolumeTracker};

const RECENT_HIGH_BAND: f64 = 0.9;
const TIGHTEN_MOMENTUM_DROP: f64 = 25.0;
const TIGHTEN_WEAK_TREND: f64 = -50.0;
const TIGHTEN_PRICE_JUMP: f64 = 0.10;

#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    #[error("invalid entry price: {0}")]
    InvalidPrice(f64),
    #[error("invalid amount: tokens={tokens} usd={usd}")]
    InvalidAmount { tokens: f64, usd: f64 },
    #[error("position already open for {0}")]
    AlreadyOpen(String),
    #[error("entries blocked: bot mode {0:?}")]
    Blocked(BotMode),
    #[error("no free position slots ({0} open)")]
    NoSlots(usize),
}

#[derive(Debug)]
struct Tracked {
    position: Position,
    volume: VolumeTracker,
}

/// Read-only view handed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub token_id: String,
    pub token_amount: f64,
    pub usd_amount: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub highest_price: f64,
    pub trailing_stop: f64,
    pub peak_momentum: f64,
    pub pump_phase: PumpPhase,
    pub unrealized_value: f64,
    pub unrealized_pnl: f64,
    pub max_drawdown_pct: f64,
    pub profit_factor: Option<f64>,
}

impl From<&Position> for PositionSnapshot {
    fn from(p: &Position) -> Self {
        Self {
            token_id: p.token_id.clone(),
            token_amount: p.token_amount(),
            usd_amount: p.usd_amount(),
            entry_price: p.entry_price,
            current_price: p.current_price,
            highest_price: p.highest_price(),
            trailing_stop: p.trailing_stop(),
            peak_momentum: p.peak_momentum(),
            pump_phase: p.pump_phase,
            unrealized_value: p.unrealized_value(),
            unrealized_pnl: p.unrealized_pnl(),
            max_drawdown_pct: p.max_drawdown_pct,
            profit_factor: p.profit_factor(),
        }
    }
}

pub struct PositionManager {
    settings: EngineSettings,
    tz: chrono_tz::Tz,
    momentum: Box<dyn MomentumModel>,
    pattern_thresholds: PatternThresholds,
    trap_thresholds: TrapThresholds,
    guard: SharedGuard,
    positions: HashMap<String, Tracked>,
    closed: HashMap<String, Position>,
}

impl PositionManager {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        let model = build_model(settings.momentum_model, settings.momentum_period);
        Self::with_model(settings, model)
    }

    pub fn with_model(settings: EngineSettings, momentum: Box<dyn MomentumModel>) -> Result<Self> {
        let guard = PortfolioGuard::shared(settings.risk.clone());
        Self::with_guard(settings, momentum, guard)
    }

    /// Entry gating and realized P&L go through `guard`, which may be shared
    /// with other managers; `settings.risk` is then ignored.
    pub fn with_guard(
        settings: EngineSettings,
        momentum: Box<dyn MomentumModel>,
        guard: SharedGuard,
    ) -> Result<Self> {
        let tz = parse_tz(&settings.tz)?;
        Ok(Self {
            settings,
            tz,
            momentum,
            pattern_thresholds: PatternThresholds::default(),
            trap_thresholds: TrapThresholds::default(),
            guard,
            positions: HashMap::new(),
            closed: HashMap::new(),
        })
    }

    pub fn open(&mut self, req: &EntryRequest) -> Result<Decision, EntryError> {
        if !req.entry_price.is_finite() || req.entry_price <= 0.0 {
            return Err(EntryError::InvalidPrice(req.entry_price));
        }
        let amounts_ok = req.token_amount.is_finite()
            && req.token_amount > 0.0
            && req.usd_amount.is_finite()
            && req.usd_amount > 0.0;
        if !amounts_ok {
            return Err(EntryError::InvalidAmount {
                tokens: req.token_amount,
                usd: req.usd_amount,
            });
        }
        if self.positions.contains_key(&req.token_id) {
            return Err(EntryError::AlreadyOpen(req.token_id.clone()));
        }
        {
            let mut guard = self.guard.lock();
            if guard.mode != BotMode::Trading {
                return Err(EntryError::Blocked(guard.mode));
            }
            if !guard.can_open_new_position() {
                return Err(EntryError::NoSlots(guard.open_positions));
            }
            guard.position_opened();
        }

        let position = Position::open(req, self.settings.stop_loss_pct);
        info!(
            token = %req.token_id,
            entry_price = req.entry_price,
            tokens = req.token_amount,
            usd = req.usd_amount,
            stop = position.trailing_stop(),
            "position.open"
        );
        self.closed.remove(&req.token_id);
        self.positions.insert(
            req.token_id.clone(),
            Tracked {
                position,
                volume: VolumeTracker::new(),
            },
        );

        let confidence = req
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        Ok(Decision::EntrySignal {
            token_id: req.token_id.clone(),
            confidence,
        })
    }

    /// Momentum comes from the configured model.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<Decision> {
        self.process(tick, None)
    }

    /// Momentum supplied by the caller instead of the model.
    pub fn on_tick_with_momentum(&mut self, tick: &Tick, momentum: f64) -> Vec<Decision> {
        self.process(tick, Some(momentum))
    }

    fn process(&mut self, tick: &Tick, momentum_override: Option<f64>) -> Vec<Decision> {
        if !tick.is_valid() {
            debug!(token = %tick.token_id, price = tick.price, volume = tick.volume, "tick.skip_invalid");
            return Vec::new();
        }
        let Some(tracked) = self.positions.get_mut(&tick.token_id) else {
            return Vec::new();
        };
        let pos = &mut tracked.position;
        if tick.timestamp_ms < pos.last_tick_ms {
            debug!(token = %tick.token_id, ts = tick.timestamp_ms, last = pos.last_tick_ms, "tick.skip_stale");
            return Vec::new();
        }
        let ledger_mark = pos.ledger().len();
        let price = tick.price;
        let ts = tick.timestamp_ms;

        let profile = tracked.volume.record(tick.sample());
        let momentum = momentum_override
            .or_else(|| self.momentum.momentum(&tracked.volume.prices()))
            .map(|m| finite_or_zero(m).clamp(0.0, 100.0))
            .unwrap_or(pos.momentum);
        pos.observe_momentum(momentum);

        let new_high = pos.observe_price(price, ts);
        if let Some(top) = tracked.volume.local_top() {
            if top >= pos.highest_price() * RECENT_HIGH_BAND {
                pos.record_recent_high(top);
            }
        }

        let reading = MomentumReading::new(momentum, pos.peak_momentum());
        let distance = stop_distance(price, pos.entry_price, reading, &profile);
        let candidate = pos.highest_price() * (1.0 - distance);
        let jumped = profile.previous_price > 0.0
            && ((price - profile.previous_price) / profile.previous_price).abs() > TIGHTEN_PRICE_JUMP;
        // Forced tightening only protects gains; a position under water keeps its stop.
        let in_profit = price > pos.entry_price;
        let tighten = in_profit
            && (reading.drop_from_peak() > TIGHTEN_MOMENTUM_DROP
                || profile.trend() < TIGHTEN_WEAK_TREND
                || jumped);
        if new_high || tighten {
            let from = pos.trailing_stop();
            if pos.raise_stop(candidate) {
                debug!(token = %pos.token_id, from, to = candidate, distance, new_high, "stop.raise");
            }
        }

        let prior_trend = pos.pattern_history.newest().map(|s| s.volume_spike);
        pos.pattern_history.push(PatternSample {
            volume_spike: profile.trend(),
            momentum_peak: momentum,
            price_swing: price,
        });
        let signals = pattern::analyze(
            &pos.pattern_history,
            price,
            momentum,
            &profile,
            &self.pattern_thresholds,
        );

        let ctx = PumpContext {
            price,
            momentum,
            profile: &profile,
            signals: &signals,
            prior_trend,
            timestamp_ms: ts,
        };
        let fomo_pending = pump::pending_fomo_tier(pos, &ctx).is_some();

        let mut out = Vec::new();
        let triggers = exit::evaluate(
            pos,
            &ExitInputs {
                price,
                momentum,
                profile: &profile,
                signals: &signals,
                fomo_pending,
            },
            &self.trap_thresholds,
        );
        if let Some(&reason) = triggers.first() {
            let sold = pos.close(price, reason, ts);
            info!(
                token = %pos.token_id,
                reason = ?reason,
                triggers = ?triggers,
                price,
                sold,
                highest = pos.highest_price(),
                stop = pos.trailing_stop(),
                "exit.fire"
            );
            out.push(Decision::FullExit {
                token_id: pos.token_id.clone(),
                reason_tag: reason,
            });
        } else {
            out.extend(pump::step(pos, &ctx));
            if !pos.is_closed() {
                out.extend(protection::step(pos, price, momentum, &profile, ts));
            }
        }

        let realized = pos.ledger()[ledger_mark..]
            .iter()
            .filter_map(|e| match e {
                AmountEvent::Reduction { realized_usd, .. } => Some(*realized_usd),
                _ => None,
            })
            .reduce(|a, b| a + b);
        let closed = pos.is_closed();

        if let Some(pnl) = realized {
            let day = day_key_at(&self.tz, ts);
            self.guard.lock().register_realized_pnl(&day, pnl);
        }
        if closed {
            self.finalize(&tick.token_id);
        }
        out
    }

    fn finalize(&mut self, token_id: &str) {
        if let Some(tracked) = self.positions.remove(token_id) {
            self.guard.lock().position_closed();
            let p = tracked.position;
            info!(
                token = %token_id,
                realized_profit = p.realized_profit_usd,
                realized_loss = p.realized_loss_usd,
                max_drawdown_pct = p.max_drawdown_pct,
                phase = ?p.pump_phase,
                "position.closed"
            );
            self.closed.insert(token_id.to_string(), p);
        }
    }

    pub fn position(&self, token_id: &str) -> Option<&Position> {
        self.positions.get(token_id).map(|t| &t.position)
    }

    /// Last state of the most recently closed position for the token.
    pub fn closed_position(&self, token_id: &str) -> Option<&Position> {
        self.closed.get(token_id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> + '_ {
        self.positions.values().map(|t| &t.position)
    }

    pub fn snapshot(&self, token_id: &str) -> Option<PositionSnapshot> {
        self.position(token_id).map(PositionSnapshot::from)
    }

    pub fn snapshots(&self) -> Vec<PositionSnapshot> {
        let mut all: Vec<_> = self
            .positions
            .values()
            .map(|t| PositionSnapshot::from(&t.position))
            .collect();
        all.sort_by(|a, b| a.token_id.cmp(&b.token_id));
        all
    }

    pub fn unrealized_value(&self, token_id: &str) -> Option<f64> {
        self.position(token_id).map(Position::unrealized_value)
    }

    pub fn max_drawdown(&self, token_id: &str) -> Option<f64> {
        self.position(token_id).map(|p| p.max_drawdown_pct)
    }

    pub fn profit_factor(&self, token_id: &str) -> Option<f64> {
        self.position(token_id).and_then(Position::profit_factor)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Copy of the guard state as of now.
    pub fn guard(&self) -> PortfolioGuard {
        self.guard.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReasonTag;

    fn manager() -> PositionManager {
        PositionManager::new(EngineSettings::default()).unwrap()
    }

    fn entry(token: &str) -> EntryRequest {
        EntryRequest {
            token_id: token.into(),
            entry_price: 1.0,
            token_amount: 1000.0,
            usd_amount: 1000.0,
            confidence: Some(0.7),
            timestamp_ms: 0,
        }
    }

    fn tick(token: &str, price: f64, volume: f64, ts: i64) -> Tick {
        Tick {
            token_id: token.into(),
            price,
            volume,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn open_emits_entry_signal() {
        let mut m = manager();
        let d = m.open(&entry("A")).unwrap();
        assert_eq!(
            d,
            Decision::EntrySignal {
                token_id: "A".into(),
                confidence: 0.7
            }
        );
        assert_eq!(m.open_count(), 1);
        assert_eq!(m.open(&entry("A")), Err(EntryError::AlreadyOpen("A".into())));
    }

    #[test]
    fn open_rejects_bad_entries() {
        let mut m = manager();
        let mut e = entry("A");
        e.entry_price = 0.0;
        assert!(matches!(m.open(&e), Err(EntryError::InvalidPrice(_))));
        let mut e = entry("A");
        e.token_amount = -1.0;
        assert!(matches!(m.open(&e), Err(EntryError::InvalidAmount { .. })));
        assert_eq!(m.open_count(), 0);
    }

    #[test]
    fn slots_are_enforced() {
        let mut settings = EngineSettings::default();
        settings.risk.max_open_positions = 1;
        let mut m = PositionManager::new(settings).unwrap();
        m.open(&entry("A")).unwrap();
        assert_eq!(m.open(&entry("B")), Err(EntryError::NoSlots(1)));
    }

    #[test]
    fn ticks_for_unknown_tokens_are_noops() {
        let mut m = manager();
        assert!(m.on_tick(&tick("NOPE", 1.0, 10.0, 1)).is_empty());
    }

    #[test]
    fn invalid_tick_leaves_position_untouched() {
        let mut m = manager();
        m.open(&entry("A")).unwrap();
        let before = m.snapshot("A").unwrap();
        assert!(m.on_tick(&tick("A", f64::NAN, 10.0, 1)).is_empty());
        assert!(m.on_tick(&tick("A", -1.0, 10.0, 2)).is_empty());
        assert!(m.on_tick(&tick("A", 1.0, -3.0, 3)).is_empty());
        assert_eq!(m.snapshot("A").unwrap(), before);
    }

    #[test]
    fn new_high_raises_stop_below_price() {
        let mut m = manager();
        m.open(&entry("A")).unwrap();
        m.on_tick_with_momentum(&tick("A", 1.05, 100.0, 1), 50.0);
        let p = m.position("A").unwrap();
        assert_eq!(p.highest_price(), 1.05);
        assert!(p.trailing_stop() < 1.05);
        assert!(p.trailing_stop() > 0.9);
    }

    #[test]
    fn stop_breach_closes_and_keeps_history() {
        let mut m = manager();
        m.open(&entry("A")).unwrap();
        m.on_tick_with_momentum(&tick("A", 1.05, 100.0, 1), 50.0);
        m.on_tick_with_momentum(&tick("A", 1.10, 100.0, 2), 45.0);
        let out = m.on_tick_with_momentum(&tick("A", 1.00, 100.0, 3), 30.0);
        assert_eq!(
            out,
            vec![Decision::FullExit {
                token_id: "A".into(),
                reason_tag: ReasonTag::StopBreach
            }]
        );
        assert!(m.position("A").is_none());
        let closed = m.closed_position("A").unwrap();
        assert_eq!(closed.highest_price(), 1.10);
        assert!(closed.is_closed());

        // later ticks are no-ops until re-entry
        assert!(m.on_tick(&tick("A", 1.2, 100.0, 4)).is_empty());
        m.open(&entry("A")).unwrap();
        assert!(m.closed_position("A").is_none());
    }

    #[test]
    fn profit_protection_feeds_guard_and_queries() {
        let mut m = manager();
        m.open(&entry("A")).unwrap();
        // climb with strong momentum, no exits
        m.on_tick_with_momentum(&tick("A", 1.3, 100.0, 1), 80.0);
        m.on_tick_with_momentum(&tick("A", 1.6, 100.0, 2), 80.0);
        assert_eq!(m.position("A").unwrap().token_amount(), 1000.0);

        // momentum fades at +60%: major gains band
        let out = m.on_tick_with_momentum(&tick("A", 1.6, 100.0, 3), 30.0);
        assert!(out.iter().any(|d| matches!(
            d,
            Decision::PartialExit { reason_tag: ReasonTag::MajorGains, .. }
        )));
        let p = m.position("A").unwrap();
        assert!((p.token_amount() - 250.0).abs() < 1e-9);
        assert!(p.profit_taking().level3);
        assert!((m.unrealized_value("A").unwrap() - 400.0).abs() < 1e-9);
        assert_eq!(m.profit_factor("A"), None);
        assert!(m.guard().current_balance_usd > m.guard().params.starting_balance_usd);
    }

    #[test]
    fn stale_ticks_are_skipped() {
        let mut m = manager();
        m.open(&entry("A")).unwrap();
        m.on_tick_with_momentum(&tick("A", 1.05, 100.0, 10), 50.0);
        assert!(m.on_tick_with_momentum(&tick("A", 2.0, 100.0, 5), 50.0).is_empty());
        assert_eq!(m.position("A").unwrap().highest_price(), 1.05);
    }
}
