//! Market state: sentiment, board ladder, cycle phase and theme heat.

mod cycle;
mod ladder;
mod sentiment;
mod theme;

pub use cycle::{CycleConfig, CycleManager, DailyScore, MarketPhase};
pub use ladder::{BoardLadder, LadderEntry};
pub use sentiment::{MarketSentiment, SentimentAnalyzer, NEUTRAL_SCORE};
pub use theme::{DragonStock, RotationReport, SectorHeat, ThemeConfig, ThemeTracker};
