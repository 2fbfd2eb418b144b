//! Strategy arbitration.
//!
//! The orchestrator turns detector output plus market state into a single
//! [`Decision`] per symbol. Vetoes always win: any veto yields `Wait` with
//! the vetoes listed, whatever the scores say.

mod position;

pub use position::{ClosedTrade, Holding, PositionBook, PositionError, LOT_SIZE};

use aquant_common::config::Config;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::detector::{DetectorSignal, SignalKind};
use crate::market::{CycleManager, MarketPhase, MarketSentiment, ThemeTracker};
use crate::data::Tick;

// ============================================================================
// Decision Types
// ============================================================================

/// What to do with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Wait,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "买入"),
            Self::Sell => write!(f, "卖出"),
            Self::Wait => write!(f, "观望"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            "wait" => Ok(Self::Wait),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// A hard reason not to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Veto {
    InvalidTick,
    StStock,
    /// Sealed at limit-up, no sellers
    LimitUpSealed,
    NearLimitDown,
    ColdMarket(MarketPhase),
    LowSentiment,
    ColdTheme,
    PositionCapReached,
    DailyBuyLimit,
    /// Bought today, cannot sell until the next trading day
    T1Locked,
    AlreadyHolding,
}

impl std::fmt::Display for Veto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTick => write!(f, "行情无效"),
            Self::StStock => write!(f, "ST股"),
            Self::LimitUpSealed => write!(f, "涨停封板"),
            Self::NearLimitDown => write!(f, "接近跌停"),
            Self::ColdMarket(phase) => write!(f, "情绪{}", phase),
            Self::LowSentiment => write!(f, "情绪过低"),
            Self::ColdTheme => write!(f, "题材不热"),
            Self::PositionCapReached => write!(f, "仓位已满"),
            Self::DailyBuyLimit => write!(f, "当日买入次数已满"),
            Self::T1Locked => write!(f, "T+1锁定"),
            Self::AlreadyHolding => write!(f, "已持仓"),
        }
    }
}

/// Orchestrator output for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub symbol: String,
    pub action: Action,
    /// Composite score (entries) or exit urgency (exits), 0-100
    pub score: f64,
    /// Fraction of capital to buy, or of the position to sell
    pub position_fraction: f64,
    pub vetoes: Vec<Veto>,
    pub reasons: Vec<String>,
    /// Detectors that triggered for this decision
    #[serde(default)]
    pub triggers: Vec<SignalKind>,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    fn new(tick: &Tick, action: Action) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: tick.symbol.clone(),
            action,
            score: 0.0,
            position_fraction: 0.0,
            vetoes: Vec::new(),
            reasons: Vec::new(),
            triggers: Vec::new(),
            price: tick.price,
            timestamp: tick.timestamp,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Wait
    }
}

// ============================================================================
// Market Context
// ============================================================================

/// Market state the orchestrator needs for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub sentiment: MarketSentiment,
    pub phase: MarketPhase,
    pub multiplier: f64,
    pub allows_new_positions: bool,
    pub hot_sectors: Vec<String>,
    /// Heat by sector name
    pub sector_heat: HashMap<String, f64>,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            sentiment: MarketSentiment::default(),
            phase: MarketPhase::Recovery,
            multiplier: MarketPhase::Recovery.position_multiplier(),
            allows_new_positions: true,
            hot_sectors: Vec::new(),
            sector_heat: HashMap::new(),
        }
    }
}

impl MarketContext {
    pub fn new(sentiment: MarketSentiment, cycle: &CycleManager, themes: &ThemeTracker) -> Self {
        Self {
            sentiment,
            phase: cycle.phase(),
            multiplier: cycle.position_multiplier(),
            allows_new_positions: cycle.allows_new_positions(),
            hot_sectors: themes.hot_sectors(),
            sector_heat: themes
                .current()
                .iter()
                .map(|s| (s.sector.clone(), s.heat))
                .collect(),
        }
    }

    pub fn is_hot(&self, sector: Option<&str>) -> bool {
        sector.is_some_and(|s| self.hot_sectors.iter().any(|h| h == s))
    }

    /// Heat of a sector, 0 when unknown.
    pub fn heat(&self, sector: Option<&str>) -> f64 {
        sector
            .and_then(|s| self.sector_heat.get(s))
            .copied()
            .unwrap_or(0.0)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Orchestrator thresholds and weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub buy_threshold: f64,
    /// Base position as a fraction of capital
    pub base_position: f64,
    pub max_single_position: f64,
    pub max_total_exposure: f64,
    pub max_daily_buys: usize,
    /// Sentiment score below which entries are vetoed
    pub min_sentiment: f64,
    pub require_hot_theme: bool,
    /// Vetoed when price is within this % above limit-down
    pub near_limit_down_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Trailing stop distance from the high; arms once the high is this far in profit
    pub trailing_stop_pct: f64,
    pub halfway_weight: f64,
    pub dip_weight: f64,
    pub sentiment_weight: f64,
    pub theme_weight: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 65.0,
            base_position: 0.2,
            max_single_position: 0.3,
            max_total_exposure: 0.8,
            max_daily_buys: 3,
            min_sentiment: 30.0,
            require_hot_theme: false,
            near_limit_down_pct: 2.0,
            stop_loss_pct: 5.0,
            take_profit_pct: 10.0,
            trailing_stop_pct: 4.0,
            halfway_weight: 0.4,
            dip_weight: 0.35,
            sentiment_weight: 0.15,
            theme_weight: 0.10,
        }
    }
}

impl OrchestratorConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let d = Self::default();
        let o = &config.trading.orchestrator;
        Self {
            buy_threshold: o.buy_threshold.unwrap_or(d.buy_threshold),
            base_position: o.base_position.unwrap_or(d.base_position),
            max_single_position: o.max_single_position.unwrap_or(d.max_single_position),
            max_total_exposure: o.max_total_exposure.unwrap_or(d.max_total_exposure),
            max_daily_buys: o.max_daily_buys.unwrap_or(d.max_daily_buys),
            min_sentiment: o.min_sentiment.unwrap_or(d.min_sentiment),
            require_hot_theme: o.require_hot_theme.unwrap_or(d.require_hot_theme),
            near_limit_down_pct: o.near_limit_down_pct.unwrap_or(d.near_limit_down_pct),
            stop_loss_pct: o.stop_loss_pct.unwrap_or(d.stop_loss_pct),
            take_profit_pct: o.take_profit_pct.unwrap_or(d.take_profit_pct),
            trailing_stop_pct: o.trailing_stop_pct.unwrap_or(d.trailing_stop_pct),
            halfway_weight: o.halfway_weight.unwrap_or(d.halfway_weight),
            dip_weight: o.dip_weight.unwrap_or(d.dip_weight),
            sentiment_weight: o.sentiment_weight.unwrap_or(d.sentiment_weight),
            theme_weight: o.theme_weight.unwrap_or(d.theme_weight),
        }
    }

    fn detector_weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::HalfwayBreakout => self.halfway_weight,
            SignalKind::DipBuy => self.dip_weight,
        }
    }
}

/// Smallest position worth reporting.
const MIN_POSITION_FRACTION: f64 = 0.005;

/// Combines detectors, market state and the position book into decisions.
#[derive(Debug, Clone, Default)]
pub struct StrategyOrchestrator {
    config: OrchestratorConfig,
}

impl StrategyOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn entry_vetoes(&self, tick: &Tick, ctx: &MarketContext, book: &PositionBook) -> Vec<Veto> {
        let cfg = &self.config;
        let mut vetoes = Vec::new();

        if tick.validate().is_err() {
            vetoes.push(Veto::InvalidTick);
            return vetoes;
        }
        if tick.board() == crate::data::Board::St {
            vetoes.push(Veto::StStock);
        }
        if tick.is_limit_up() {
            vetoes.push(Veto::LimitUpSealed);
        }
        if tick.price <= tick.limit_down_price() * (1.0 + cfg.near_limit_down_pct / 100.0) {
            vetoes.push(Veto::NearLimitDown);
        }
        if !ctx.allows_new_positions {
            vetoes.push(Veto::ColdMarket(ctx.phase));
        }
        if ctx.sentiment.score < cfg.min_sentiment {
            vetoes.push(Veto::LowSentiment);
        }
        if cfg.require_hot_theme && !ctx.is_hot(tick.sector.as_deref()) {
            vetoes.push(Veto::ColdTheme);
        }
        if book.is_holding(&tick.symbol) {
            vetoes.push(Veto::AlreadyHolding);
        }
        if book.remaining_capacity() < MIN_POSITION_FRACTION {
            vetoes.push(Veto::PositionCapReached);
        }
        if book.buys_today() >= cfg.max_daily_buys {
            vetoes.push(Veto::DailyBuyLimit);
        }

        vetoes
    }

    /// Composite entry score, 0-100.
    ///
    /// Detector weights count only for triggered detectors (all detectors
    /// when none triggered), and the sum is normalised by the weights used.
    fn composite(&self, tick: &Tick, signals: &[DetectorSignal], ctx: &MarketContext) -> f64 {
        let cfg = &self.config;
        let mine: Vec<&DetectorSignal> = signals.iter().filter(|s| s.symbol == tick.symbol).collect();
        let any_triggered = mine.iter().any(|s| s.triggered);

        // Best score per detector kind
        let mut best: HashMap<SignalKind, f64> = HashMap::new();
        for s in mine.iter().filter(|s| s.triggered || !any_triggered) {
            let entry = best.entry(s.kind).or_insert(0.0);
            *entry = entry.max(s.score);
        }

        let mut weighted = cfg.sentiment_weight * ctx.sentiment.score
            + cfg.theme_weight * ctx.heat(tick.sector.as_deref());
        let mut weights = cfg.sentiment_weight + cfg.theme_weight;
        for (kind, score) in &best {
            let w = cfg.detector_weight(*kind);
            weighted += w * score;
            weights += w;
        }

        if weights > 0.0 {
            (weighted / weights).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Decide whether to open a position in `tick.symbol`.
    pub fn evaluate_entry(
        &self,
        tick: &Tick,
        signals: &[DetectorSignal],
        ctx: &MarketContext,
        book: &PositionBook,
    ) -> Decision {
        let cfg = &self.config;
        let mut decision = Decision::new(tick, Action::Wait);

        let triggered: Vec<&DetectorSignal> = signals
            .iter()
            .filter(|s| s.symbol == tick.symbol && s.triggered)
            .collect();
        decision.triggers = triggered.iter().map(|s| s.kind).collect();
        for s in &triggered {
            decision
                .reasons
                .push(format!("{} {:.1}: {}", s.kind, s.score, s.reasons.join("; ")));
        }

        decision.vetoes = self.entry_vetoes(tick, ctx, book);
        if decision.vetoes.contains(&Veto::InvalidTick) {
            return decision;
        }

        decision.score = self.composite(tick, signals, ctx);
        if !decision.vetoes.is_empty() {
            return decision;
        }

        if triggered.is_empty() {
            decision.reasons.push("no detector triggered".into());
            return decision;
        }
        if decision.score < cfg.buy_threshold {
            decision.reasons.push(format!(
                "composite {:.1} below {:.0}",
                decision.score, cfg.buy_threshold
            ));
            return decision;
        }

        let size = (cfg.base_position * ctx.multiplier * decision.score / 100.0)
            .min(cfg.max_single_position)
            .min(book.remaining_capacity());
        if size < MIN_POSITION_FRACTION {
            decision.reasons.push("position size rounds to zero".into());
            return decision;
        }

        decision.action = Action::Buy;
        decision.position_fraction = size;
        decision.reasons.push(format!(
            "composite {:.1}, phase {} x{:.1}, size {:.1}%",
            decision.score,
            ctx.phase,
            ctx.multiplier,
            size * 100.0
        ));
        decision
    }

    /// Decide whether to exit `holding` at the current tick.
    pub fn evaluate_exit(
        &self,
        tick: &Tick,
        holding: &Holding,
        ctx: &MarketContext,
        today: NaiveDate,
    ) -> Decision {
        let cfg = &self.config;
        let mut decision = Decision::new(tick, Action::Wait);

        if !holding.can_sell_on(today) {
            decision.vetoes.push(Veto::T1Locked);
            return decision;
        }

        let ret = holding.return_pct(tick.price);
        let peak_return = holding.return_pct(holding.highest_price.max(tick.price));
        let drawdown = holding.drawdown_from_high(tick.price);

        let exit_reason = if tick.is_limit_down() {
            Some("limit-down".to_string())
        } else if ret <= -cfg.stop_loss_pct {
            Some(format!("stop loss {:.2}%", ret))
        } else if ret >= cfg.take_profit_pct {
            Some(format!("take profit {:.2}%", ret))
        } else if peak_return >= cfg.trailing_stop_pct && drawdown >= cfg.trailing_stop_pct {
            Some(format!(
                "trailing stop: {:.2}% off high {:.2}",
                drawdown,
                holding.highest_price.max(tick.price)
            ))
        } else if ctx.phase.is_cold() && tick.price < tick.vwap() {
            Some(format!("below VWAP {:.2} during {}", tick.vwap(), ctx.phase))
        } else {
            None
        };

        match exit_reason {
            Some(reason) => {
                decision.action = Action::Sell;
                decision.score = 100.0;
                decision.position_fraction = 1.0;
                decision.reasons.push(reason);
            }
            None => {
                decision.reasons.push(format!("holding, return {:.2}%", ret));
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SignalKind;
    use crate::market::MarketSentiment;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn tick() -> Tick {
        Tick::new("600000", 10.0, 10.5)
            .with_sector("半导体")
            .with_volume(100_000.0, 1_030_000.0)
    }

    fn signal(kind: SignalKind, triggered: bool, score: f64) -> DetectorSignal {
        DetectorSignal {
            symbol: "600000".into(),
            kind,
            triggered,
            score,
            price: 10.5,
            reasons: vec!["test".into()],
            timestamp: Utc::now(),
        }
    }

    fn context(score: f64, phase: MarketPhase) -> MarketContext {
        let mut sentiment = MarketSentiment::default();
        sentiment.score = score;
        MarketContext {
            sentiment,
            phase,
            multiplier: phase.position_multiplier(),
            allows_new_positions: !phase.is_cold(),
            hot_sectors: vec!["半导体".into()],
            sector_heat: [("半导体".to_string(), 80.0)].into_iter().collect(),
        }
    }

    fn book() -> PositionBook {
        PositionBook::new(1_000_000.0, 0.8)
    }

    #[test]
    fn test_buy_on_triggered_detector() {
        let orch = StrategyOrchestrator::default();
        let signals = vec![
            signal(SignalKind::HalfwayBreakout, true, 80.0),
            signal(SignalKind::DipBuy, false, 20.0),
        ];
        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &book());

        assert_eq!(decision.action, Action::Buy, "{:?}", decision);
        // (0.4*80 + 0.15*60 + 0.1*80) / 0.65
        assert!((decision.score - 75.3846).abs() < 1e-3);
        // 0.2 * 1.0 * 0.7538
        assert!((decision.position_fraction - 0.150769).abs() < 1e-5);
        assert_eq!(decision.triggers, vec![SignalKind::HalfwayBreakout]);
        assert!(decision.vetoes.is_empty());
    }

    #[test]
    fn test_no_trigger_means_wait() {
        let orch = StrategyOrchestrator::default();
        let signals = vec![signal(SignalKind::HalfwayBreakout, false, 90.0)];
        let decision = orch.evaluate_entry(&tick(), &signals, &context(90.0, MarketPhase::Climax), &book());
        assert_eq!(decision.action, Action::Wait);
        assert!(decision.score > 65.0);
    }

    #[test]
    fn test_vetoes_override_scores() {
        let orch = StrategyOrchestrator::default();
        let signals = vec![signal(SignalKind::HalfwayBreakout, true, 95.0)];

        let cold = orch.evaluate_entry(&tick(), &signals, &context(20.0, MarketPhase::Ice), &book());
        assert_eq!(cold.action, Action::Wait);
        assert!(cold.vetoes.contains(&Veto::ColdMarket(MarketPhase::Ice)));
        assert!(cold.vetoes.contains(&Veto::LowSentiment));

        let st = tick().with_name("*ST样本");
        let decision = orch.evaluate_entry(&st, &signals, &context(60.0, MarketPhase::Fermentation), &book());
        assert_eq!(decision.vetoes, vec![Veto::StStock]);

        let mut held = book();
        held.open("600000", "", 10.0, 0.1, day(9)).unwrap();
        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &held);
        assert!(decision.vetoes.contains(&Veto::AlreadyHolding));

        let invalid = Tick::new("600000", 10.0, 0.0);
        let decision = orch.evaluate_entry(&invalid, &signals, &context(60.0, MarketPhase::Fermentation), &book());
        assert_eq!(decision.vetoes, vec![Veto::InvalidTick]);
    }

    #[test]
    fn test_daily_buy_limit_and_capacity() {
        let orch = StrategyOrchestrator::new(OrchestratorConfig {
            max_daily_buys: 1,
            ..OrchestratorConfig::default()
        });
        let signals = vec![signal(SignalKind::HalfwayBreakout, true, 95.0)];
        let mut b = book();
        b.open("600001", "", 10.0, 0.1, day(10)).unwrap();

        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &b);
        assert!(decision.vetoes.contains(&Veto::DailyBuyLimit));

        let mut full = PositionBook::new(100_000.0, 0.2);
        full.open("600001", "", 10.0, 0.2, day(9)).unwrap();
        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &full);
        assert!(decision.vetoes.contains(&Veto::PositionCapReached));
    }

    #[test]
    fn test_size_clamped_to_remaining_capacity() {
        let orch = StrategyOrchestrator::default();
        let signals = vec![signal(SignalKind::HalfwayBreakout, true, 95.0)];
        let mut b = PositionBook::new(100_000.0, 0.3);
        b.open("600001", "", 10.0, 0.25, day(9)).unwrap();

        let decision = orch.evaluate_entry(&tick(), &signals, &context(70.0, MarketPhase::Fermentation), &b);
        assert_eq!(decision.action, Action::Buy);
        assert!((decision.position_fraction - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_configured_weights_and_limit_down_margin() {
        let mut config = Config::default();
        config.trading.orchestrator.halfway_weight = Some(1.0);
        config.trading.orchestrator.sentiment_weight = Some(0.0);
        config.trading.orchestrator.theme_weight = Some(0.0);
        let orch = StrategyOrchestrator::new(OrchestratorConfig::from_config(&config));
        let signals = vec![signal(SignalKind::HalfwayBreakout, true, 80.0)];

        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &book());
        assert!((decision.score - 80.0).abs() < 1e-9);

        // Limit-down 9.00; a 20% margin reaches 10.80, above the 10.50 price
        config.trading.orchestrator.near_limit_down_pct = Some(20.0);
        let orch = StrategyOrchestrator::new(OrchestratorConfig::from_config(&config));
        let decision = orch.evaluate_entry(&tick(), &signals, &context(60.0, MarketPhase::Fermentation), &book());
        assert_eq!(decision.action, Action::Wait);
        assert_eq!(decision.vetoes, vec![Veto::NearLimitDown]);
    }

    #[test]
    fn test_require_hot_theme() {
        let orch = StrategyOrchestrator::new(OrchestratorConfig {
            require_hot_theme: true,
            ..OrchestratorConfig::default()
        });
        let signals = vec![signal(SignalKind::HalfwayBreakout, true, 95.0)];
        let cold_sector = tick().with_sector("地产");
        let decision = orch.evaluate_entry(&cold_sector, &signals, &context(60.0, MarketPhase::Fermentation), &book());
        assert_eq!(decision.vetoes, vec![Veto::ColdTheme]);
    }

    #[test]
    fn test_exit_rules() {
        let orch = StrategyOrchestrator::default();
        let ctx = context(60.0, MarketPhase::Fermentation);
        let holding = Holding::new("600000", 10.0, 1000.0, day(9));

        // T+1
        let locked = orch.evaluate_exit(&Tick::new("600000", 10.0, 9.0), &holding, &ctx, day(9));
        assert_eq!(locked.action, Action::Wait);
        assert_eq!(locked.vetoes, vec![Veto::T1Locked]);

        let stop = orch.evaluate_exit(&Tick::new("600000", 10.0, 9.45), &holding, &ctx, day(10));
        assert_eq!(stop.action, Action::Sell);
        assert!(stop.reasons[0].contains("stop loss"));

        let profit = orch.evaluate_exit(&Tick::new("600000", 10.5, 11.05), &holding, &ctx, day(10));
        assert_eq!(profit.action, Action::Sell);
        assert!(profit.reasons[0].contains("take profit"));

        let limit_down = orch.evaluate_exit(&Tick::new("600000", 10.2, 9.18), &holding, &ctx, day(10));
        assert!(limit_down.reasons[0].contains("limit-down"));

        let mut ran = holding.clone();
        ran.update_high(10.8);
        let trail = orch.evaluate_exit(&Tick::new("600000", 10.6, 10.35), &ran, &ctx, day(10));
        assert_eq!(trail.action, Action::Sell);
        assert!(trail.reasons[0].contains("trailing"));

        let hold = orch.evaluate_exit(&Tick::new("600000", 10.1, 10.2), &holding, &ctx, day(10));
        assert_eq!(hold.action, Action::Wait);
    }

    #[test]
    fn test_exit_below_vwap_in_ebb() {
        let orch = StrategyOrchestrator::default();
        let holding = Holding::new("600000", 10.0, 1000.0, day(9));
        let tick = Tick::new("600000", 10.0, 10.1).with_volume(1000.0, 10_250.0);

        let calm = orch.evaluate_exit(&tick, &holding, &context(60.0, MarketPhase::Fermentation), day(10));
        assert_eq!(calm.action, Action::Wait);

        let ebb = orch.evaluate_exit(&tick, &holding, &context(40.0, MarketPhase::Ebb), day(10));
        assert_eq!(ebb.action, Action::Sell);
        assert!(ebb.reasons[0].contains("VWAP"));
    }

    #[test]
    fn test_action_round_trip_str() {
        for action in [Action::Buy, Action::Sell, Action::Wait] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }
}
