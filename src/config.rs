use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::risk::RiskParams;
use crate::strategy::MomentumKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Runtime
    pub tz: String,
    pub log_json: bool,
    pub shards: usize,
    pub channel_capacity: usize,

    // Risk (portfolio guard)
    pub starting_balance_usd: f64,
    pub max_open_positions: usize,
    pub max_daily_loss_pct: f64,
    pub portfolio_hard_stop_pct: f64,

    // Per-position engine
    pub stop_loss_pct: f64,
    pub momentum_model: MomentumKind,
    pub momentum_period: usize,

    // Replay I/O; None means stdin / stdout
    pub feed_path: Option<String>,
    pub decisions_path: Option<String>,
}

/// Knobs the position manager needs, split out of the process config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub tz: String,
    pub stop_loss_pct: f64,
    pub momentum_model: MomentumKind,
    pub momentum_period: usize,
    pub risk: RiskParams,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tz: "UTC".to_string(),
            stop_loss_pct: 0.10,
            momentum_model: MomentumKind::Rsi,
            momentum_period: 5,
            risk: RiskParams::default(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|x| x.parse().ok())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Runtime
        let tz = std::env::var("SIE_TZ").unwrap_or_else(|_| "America/Buenos_Aires".to_string());
        crate::time::parse_tz(&tz)?;
        let log_json = env_bool("SIE_LOG_JSON", false);
        let shards = env_parse::<usize>("SIE_SHARDS").unwrap_or(1);
        let channel_capacity = env_parse::<usize>("SIE_CHANNEL_CAPACITY").unwrap_or(1024);
        if shards == 0 || channel_capacity == 0 {
            return Err(anyhow!("SIE_SHARDS and SIE_CHANNEL_CAPACITY must be positive"));
        }

        // Risk
        let risk = RiskParams::default();
        let starting_balance_usd =
            env_parse::<f64>("SIE_CAPITAL_USD").unwrap_or(risk.starting_balance_usd);
        let max_open_positions =
            env_parse::<usize>("MAX_OPEN_POSITIONS").unwrap_or(risk.max_open_positions);
        let max_daily_loss_pct =
            env_parse::<f64>("SIE_MAX_DAILY_LOSS_PCT").unwrap_or(risk.max_daily_loss_pct);
        let portfolio_hard_stop_pct =
            env_parse::<f64>("SIE_PORTFOLIO_HARD_STOP_PCT").unwrap_or(risk.portfolio_hard_stop_pct);
        if starting_balance_usd <= 0.0 {
            return Err(anyhow!("invalid capital"));
        }

        // Engine
        let stop_loss_pct = env_parse::<f64>("SIE_STOP_LOSS_PCT").unwrap_or(0.10);
        if !(0.0..1.0).contains(&stop_loss_pct) {
            return Err(anyhow!("SIE_STOP_LOSS_PCT must be in [0, 1)"));
        }
        let momentum_model = match env_opt("SIE_MOMENTUM_MODEL") {
            Some(raw) => raw.parse()?,
            None => MomentumKind::Rsi,
        };
        let momentum_period = env_parse::<usize>("SIE_MOMENTUM_PERIOD").unwrap_or(5);
        if momentum_period == 0 || momentum_period >= crate::volume::VOLUME_WINDOW {
            return Err(anyhow!(
                "SIE_MOMENTUM_PERIOD must be in 1..{}",
                crate::volume::VOLUME_WINDOW
            ));
        }

        let feed_path = env_opt("SIE_FEED_PATH");
        let decisions_path = env_opt("SIE_DECISIONS_PATH");

        Ok(Self {
            tz,
            log_json,
            shards,
            channel_capacity,
            starting_balance_usd,
            max_open_positions,
            max_daily_loss_pct,
            portfolio_hard_stop_pct,
            stop_loss_pct,
            momentum_model,
            momentum_period,
            feed_path,
            decisions_path,
        })
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            starting_balance_usd: self.starting_balance_usd,
            max_open_positions: self.max_open_positions,
            max_daily_loss_pct: self.max_daily_loss_pct,
            portfolio_hard_stop_pct: self.portfolio_hard_stop_pct,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tz: self.tz.clone(),
            stop_loss_pct: self.stop_loss_pct,
            momentum_model: self.momentum_model,
            momentum_period: self.momentum_period,
            risk: self.risk_params(),
        }
    }
}
