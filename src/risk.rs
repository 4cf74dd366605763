use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParams {
    pub starting_balance_usd: f64,
    pub max_open_positions: usize,

    // Daily loss guard
    pub max_daily_loss_pct: f64, // 0.03 => 3% of starting balance

    // Portfolio emergency
    pub portfolio_hard_stop_pct: f64, // 0.20 => 20%
}

impl RiskParams {
    pub fn daily_loss_limit_usd(&self) -> f64 {
        self.max_daily_loss_pct * self.starting_balance_usd
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            starting_balance_usd: 1_000.0,
            max_open_positions: 5,
            max_daily_loss_pct: 0.03,
            portfolio_hard_stop_pct: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BotMode {
    Trading,
    ReadOnly,
    EmergencyStop,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DailyPnl {
    pub day_key: String, // e.g. 2026-02-20 in configured TZ
    pub realized_pnl_usd: f64,
}

/// Gates new entries. Existing positions are always managed regardless of mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioGuard {
    pub params: RiskParams,
    pub mode: BotMode,
    pub daily: DailyPnl,
    pub current_balance_usd: f64,
    pub open_positions: usize,
}

/// One guard for the whole portfolio, shared by every worker shard.
pub type SharedGuard = Arc<Mutex<PortfolioGuard>>;

impl PortfolioGuard {
    pub fn new(params: RiskParams) -> Self {
        let current_balance_usd = params.starting_balance_usd;
        Self {
            params,
            mode: BotMode::Trading,
            daily: DailyPnl::default(),
            current_balance_usd,
            open_positions: 0,
        }
    }

    pub fn shared(params: RiskParams) -> SharedGuard {
        Arc::new(Mutex::new(Self::new(params)))
    }

    pub fn position_opened(&mut self) {
        self.open_positions += 1;
    }

    pub fn position_closed(&mut self) {
        self.open_positions = self.open_positions.saturating_sub(1);
    }

    pub fn register_realized_pnl(&mut self, day_key: &str, pnl_usd: f64) {
        if !pnl_usd.is_finite() {
            return;
        }
        if self.daily.day_key != day_key {
            self.daily = DailyPnl {
                day_key: day_key.to_string(),
                realized_pnl_usd: 0.0,
            };
            // A new day lifts the daily guard, never the hard stop.
            if self.mode == BotMode::ReadOnly {
                self.mode = BotMode::Trading;
            }
        }

        self.daily.realized_pnl_usd += pnl_usd;
        self.current_balance_usd += pnl_usd;

        let max_loss = -self.params.daily_loss_limit_usd();
        if self.daily.realized_pnl_usd <= max_loss && self.mode == BotMode::Trading {
            warn!(
                day = %self.daily.day_key,
                realized = self.daily.realized_pnl_usd,
                limit = max_loss,
                "risk.daily_loss_limit"
            );
            self.mode = BotMode::ReadOnly;
        }

        // Hard stop based on total balance drawdown vs starting balance.
        if self.params.starting_balance_usd > 0.0 {
            let dd = (self.current_balance_usd - self.params.starting_balance_usd)
                / self.params.starting_balance_usd;
            if dd <= -self.params.portfolio_hard_stop_pct && self.mode != BotMode::EmergencyStop {
                warn!(drawdown = dd, balance = self.current_balance_usd, "risk.hard_stop");
                self.mode = BotMode::EmergencyStop;
            }
        }
    }

    pub fn can_open_new_position(&self) -> bool {
        matches!(self.mode, BotMode::Trading) && self.open_positions < self.params.max_open_positions
    }
}
