use serde::{Deserialize, Serialize};

/// One price/volume observation for a token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub price: f64,
    pub volume: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub token_id: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp_ms: i64,
}

impl Tick {
    /// Price must be finite and positive, volume finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.volume.is_finite() && self.volume >= 0.0
    }

    pub fn sample(&self) -> Sample {
        Sample {
            price: self.price,
            volume: self.volume,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRequest {
    pub token_id: String,
    pub entry_price: f64,
    pub token_amount: f64,
    pub usd_amount: f64,

    /// Upstream signal confidence in [0, 1]. Missing means full confidence.
    #[serde(default)]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub timestamp_ms: i64,
}

/// Input stream of the replay binary and the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    Entry(EntryRequest),
    Tick(Tick),
}

impl FeedEvent {
    pub fn token_id(&self) -> &str {
        match self {
            FeedEvent::Entry(e) => &e.token_id,
            FeedEvent::Tick(t) => &t.token_id,
        }
    }
}

/// Why an amount was reduced or a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonTag {
    // exit evaluator
    StopBreach,
    MomentumLoss,
    VolumeDivergence,
    VolumeClimax,
    ExtremeSignals,
    LiquidityCrisis,
    StopHunt,
    WhaleDistribution,
    MultiWaveTrap,
    RangeBreakTrap,
    LowFloatPump,
    LiquidityCascade,

    // profit protection
    QuickSecure,
    SolidLock,
    MajorGains,
    MoonBag,

    // pump phase
    FomoTake,
    PumpExhaustion,
}

/// Events surfaced to the order-execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decision {
    EntrySignal {
        token_id: String,
        confidence: f64,
    },
    ScaleUp {
        token_id: String,
        new_amount: f64,
    },
    PartialExit {
        token_id: String,
        amount_reduced: f64,
        reason_tag: ReasonTag,
    },
    FullExit {
        token_id: String,
        reason_tag: ReasonTag,
    },
}

impl Decision {
    pub fn token_id(&self) -> &str {
        match self {
            Decision::EntrySignal { token_id, .. }
            | Decision::ScaleUp { token_id, .. }
            | Decision::PartialExit { token_id, .. }
            | Decision::FullExit { token_id, .. } => token_id,
        }
    }

    pub fn is_full_exit(&self) -> bool {
        matches!(self, Decision::FullExit { .. })
    }
}
