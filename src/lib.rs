pub mod config;
pub mod domain;
pub mod exit;
pub mod manager;
pub mod monitoring;
pub mod pattern;
pub mod position;
pub mod protection;
pub mod pump;
pub mod ring;
pub mod risk;
pub mod router;
pub mod stop;
pub mod strategy;
pub mod time;
pub mod volume;

pub use domain::{Decision, EntryRequest, FeedEvent, ReasonTag, Tick};
pub use manager::{EntryError, PositionManager, PositionSnapshot};
