pub mod momentum;

use serde::{Deserialize, Serialize};

pub use momentum::{RateOfChange, Rsi};

/// Maps a token's recent prices (oldest first) to a 0..=100 momentum score.
///
/// `None` means not enough data; the caller keeps the last known value.
pub trait MomentumModel: Send + Sync {
    fn name(&self) -> &'static str;
    fn momentum(&self, prices: &[f64]) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumKind {
    Rsi,
    RateOfChange,
}

impl std::str::FromStr for MomentumKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rsi" => Ok(MomentumKind::Rsi),
            "roc" | "rate_of_change" => Ok(MomentumKind::RateOfChange),
            other => Err(anyhow::anyhow!("unknown momentum model: {other}")),
        }
    }
}

pub fn build_model(kind: MomentumKind, period: usize) -> Box<dyn MomentumModel> {
    match kind {
        MomentumKind::Rsi => Box::new(Rsi::new(period)),
        MomentumKind::RateOfChange => Box::new(RateOfChange::new(period)),
    }
}
