use serde::{Deserialize, Serialize};

use crate::domain::{EntryRequest, ReasonTag};
use crate::pattern::PatternHistory;
use crate::ring::Ring;
use crate::stop::profit_pct;

pub const RECENT_HIGHS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpPhase {
    #[default]
    None,
    Stealth,
    Early,
    Acceleration,
}

impl PumpPhase {
    pub fn next(self) -> Option<PumpPhase> {
        match self {
            PumpPhase::None => Some(PumpPhase::Stealth),
            PumpPhase::Stealth => Some(PumpPhase::Early),
            PumpPhase::Early => Some(PumpPhase::Acceleration),
            PumpPhase::Acceleration => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitTaking {
    pub level1: bool,
    pub level2: bool,
    pub level3: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitLevel {
    Level1,
    Level2,
    Level3,
}

impl ProfitTaking {
    pub fn is_taken(&self, level: ProfitLevel) -> bool {
        match level {
            ProfitLevel::Level1 => self.level1,
            ProfitLevel::Level2 => self.level2,
            ProfitLevel::Level3 => self.level3,
        }
    }

    /// One-way: there is no way to clear a level.
    pub fn take(&mut self, level: ProfitLevel) {
        match level {
            ProfitLevel::Level1 => self.level1 = true,
            ProfitLevel::Level2 => self.level2 = true,
            ProfitLevel::Level3 => self.level3 = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountEvent {
    Open {
        amount: f64,
        price: f64,
        timestamp_ms: i64,
    },
    ScaleIn {
        added: f64,
        price: f64,
        phase: PumpPhase,
        timestamp_ms: i64,
    },
    Reduction {
        removed: f64,
        price: f64,
        reason: ReasonTag,
        realized_usd: f64,
        timestamp_ms: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,

    token_amount: f64,
    usd_amount: f64,

    pub entry_price: f64,
    pub current_price: f64,
    highest_price: f64,
    trailing_stop: f64,
    peak_momentum: f64,
    pub momentum: f64,

    profit_taking: ProfitTaking,
    pub moon_bag: bool,
    pub recent_highs: Ring<f64, RECENT_HIGHS>,
    pub pump_phase: PumpPhase,
    pub stealth_streak: u32,
    pub pattern_history: PatternHistory,

    pub max_drawdown_pct: f64,
    pub realized_profit_usd: f64,
    pub realized_loss_usd: f64,

    pub opened_at_ms: i64,
    pub last_tick_ms: i64,

    ledger: Vec<AmountEvent>,
}

impl Position {
    pub fn open(req: &EntryRequest, stop_loss_pct: f64) -> Self {
        Self {
            token_id: req.token_id.clone(),
            token_amount: req.token_amount,
            usd_amount: req.usd_amount,
            entry_price: req.entry_price,
            current_price: req.entry_price,
            highest_price: req.entry_price,
            trailing_stop: req.entry_price * (1.0 - stop_loss_pct.clamp(0.0, 1.0)),
            peak_momentum: 0.0,
            momentum: 0.0,
            profit_taking: ProfitTaking::default(),
            moon_bag: false,
            recent_highs: Ring::new(),
            pump_phase: PumpPhase::None,
            stealth_streak: 0,
            pattern_history: PatternHistory::new(),
            max_drawdown_pct: 0.0,
            realized_profit_usd: 0.0,
            realized_loss_usd: 0.0,
            opened_at_ms: req.timestamp_ms,
            last_tick_ms: req.timestamp_ms,
            ledger: vec![AmountEvent::Open {
                amount: req.token_amount,
                price: req.entry_price,
                timestamp_ms: req.timestamp_ms,
            }],
        }
    }

    pub fn token_amount(&self) -> f64 {
        self.token_amount
    }

    pub fn usd_amount(&self) -> f64 {
        self.usd_amount
    }

    /// Never decreases while the position is open.
    pub fn highest_price(&self) -> f64 {
        self.highest_price
    }

    pub fn trailing_stop(&self) -> f64 {
        self.trailing_stop
    }

    pub fn peak_momentum(&self) -> f64 {
        self.peak_momentum
    }

    pub fn profit_taking(&self) -> ProfitTaking {
        self.profit_taking
    }

    pub fn ledger(&self) -> &[AmountEvent] {
        &self.ledger
    }

    pub fn is_closed(&self) -> bool {
        self.token_amount <= 0.0
    }

    pub fn profit_pct(&self) -> Option<f64> {
        profit_pct(self.current_price, self.entry_price)
    }

    /// Average cost per token of what is still held.
    pub fn cost_per_token(&self) -> f64 {
        if self.token_amount > 0.0 {
            self.usd_amount / self.token_amount
        } else {
            self.entry_price
        }
    }

    pub fn unrealized_value(&self) -> f64 {
        self.token_amount * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_value() - self.usd_amount
    }

    /// Gross realized profit over gross realized loss; `None` before any loss.
    pub fn profit_factor(&self) -> Option<f64> {
        (self.realized_loss_usd > 0.0).then(|| self.realized_profit_usd / self.realized_loss_usd)
    }

    /// Updates price extremes. Returns true when the price set a new high.
    pub fn observe_price(&mut self, price: f64, timestamp_ms: i64) -> bool {
        self.current_price = price;
        self.last_tick_ms = timestamp_ms;
        let new_high = price > self.highest_price;
        if new_high {
            self.highest_price = price;
        }
        if self.highest_price > 0.0 {
            let dd = (self.highest_price - price) / self.highest_price * 100.0;
            if dd > self.max_drawdown_pct {
                self.max_drawdown_pct = dd;
            }
        }
        new_high
    }

    pub fn observe_momentum(&mut self, momentum: f64) {
        self.momentum = momentum;
        if momentum > self.peak_momentum {
            self.peak_momentum = momentum;
        }
    }

    /// Moves the stop up to `candidate`. A lower or non-finite candidate is
    /// ignored; returns whether the stop moved.
    pub fn raise_stop(&mut self, candidate: f64) -> bool {
        if candidate.is_finite() && candidate > self.trailing_stop {
            self.trailing_stop = candidate;
            true
        } else {
            false
        }
    }

    pub fn take_profit_level(&mut self, level: ProfitLevel) {
        self.profit_taking.take(level);
    }

    /// The only way the held amount grows.
    pub fn scale_in(&mut self, fraction: f64, price: f64, phase: PumpPhase, timestamp_ms: i64) -> f64 {
        let added = self.token_amount * fraction.max(0.0);
        self.token_amount += added;
        self.usd_amount += added * price;
        self.ledger.push(AmountEvent::ScaleIn {
            added,
            price,
            phase,
            timestamp_ms,
        });
        added
    }

    /// Sells `fraction` of what is held. Returns the amount removed.
    pub fn reduce_by(&mut self, fraction: f64, price: f64, reason: ReasonTag, timestamp_ms: i64) -> f64 {
        let removed = self.token_amount * fraction.clamp(0.0, 1.0);
        self.remove(removed, price, reason, timestamp_ms)
    }

    /// Reduces the position so only `fraction` of it remains.
    pub fn reduce_to(&mut self, fraction: f64, price: f64, reason: ReasonTag, timestamp_ms: i64) -> f64 {
        self.reduce_by(1.0 - fraction.clamp(0.0, 1.0), price, reason, timestamp_ms)
    }

    pub fn close(&mut self, price: f64, reason: ReasonTag, timestamp_ms: i64) -> f64 {
        self.remove(self.token_amount, price, reason, timestamp_ms)
    }

    fn remove(&mut self, removed: f64, price: f64, reason: ReasonTag, timestamp_ms: i64) -> f64 {
        if removed <= 0.0 {
            return 0.0;
        }
        let cost = self.cost_per_token() * removed;
        let realized_usd = removed * price - cost;
        if realized_usd >= 0.0 {
            self.realized_profit_usd += realized_usd;
        } else {
            self.realized_loss_usd += -realized_usd;
        }

        self.token_amount -= removed;
        self.usd_amount -= cost;
        // Avoid dust from float subtraction.
        if self.token_amount <= f64::EPSILON * removed.max(1.0) {
            self.token_amount = 0.0;
            self.usd_amount = 0.0;
        }

        self.ledger.push(AmountEvent::Reduction {
            removed,
            price,
            reason,
            realized_usd,
            timestamp_ms,
        });
        removed
    }

    pub fn record_recent_high(&mut self, price: f64) {
        if self.recent_highs.newest() != Some(&price) {
            self.recent_highs.push(price);
        }
    }

    /// At least two recorded highs, each lower than the one before.
    pub fn descending_highs(&self) -> bool {
        let highs: Vec<f64> = self.recent_highs.iter().copied().collect();
        highs.len() >= 2 && highs.windows(2).all(|w| w[1] < w[0])
    }
}
