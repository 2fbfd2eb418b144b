//! Configuration validation.
//!
//! Checks that configured values are inside the ranges the engine can work
//! with. Unset (`None`) trading overrides are always valid; defaults are
//! supplied by the trading crate.

use thiserror::Error;

use crate::config::{
    Config, CycleSection, DipSection, HalfwaySection, ObservabilityConfig, OrchestratorSection,
    ServerConfig, TradingConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port} for {field}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Collapse a list of errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// A fraction of capital must be in (0, 1].
fn check_fraction(errors: &mut Vec<ValidationError>, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if !(v > 0.0 && v <= 1.0) {
            errors.push(invalid(field, format!("{} is not in (0, 1]", v)));
        }
    }
}

/// A 0-100 score threshold.
fn check_score(errors: &mut Vec<ValidationError>, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if !(0.0..=100.0).contains(&v) {
            errors.push(invalid(field, format!("{} is not in [0, 100]", v)));
        }
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if v <= 0.0 {
            errors.push(invalid(field, format!("{} must be positive", v)));
        }
    }
}

fn check_non_negative(errors: &mut Vec<ValidationError>, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        if !(v >= 0.0) {
            errors.push(invalid(field, format!("{} must not be negative", v)));
        }
    }
}

fn check_hhmm(errors: &mut Vec<ValidationError>, field: &str, value: Option<&String>) {
    if let Some(s) = value {
        let ok = s
            .split_once(':')
            .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
            .map(|(h, m)| h < 24 && m < 60)
            .unwrap_or(false);
        if !ok {
            errors.push(invalid(field, format!("'{}' is not HH:MM", s)));
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(invalid("server.host", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let level = self.log_level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(invalid(
                "observability.log_level",
                format!("unknown level '{}'", self.log_level),
            ));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            errors.push(invalid(
                "observability.log_format",
                format!("unknown format '{}', expected json or pretty", self.log_format),
            ));
        }

        collect(errors)
    }
}

impl Validate for HalfwaySection {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        check_fraction(&mut errors, "trading.halfway.min_band_fraction", self.min_band_fraction);
        check_fraction(&mut errors, "trading.halfway.max_band_fraction", self.max_band_fraction);
        if let (Some(lo), Some(hi)) = (self.min_band_fraction, self.max_band_fraction) {
            if lo >= hi {
                errors.push(ValidationError::Conflict {
                    reason: format!(
                        "trading.halfway.min_band_fraction ({}) must be below max_band_fraction ({})",
                        lo, hi
                    ),
                });
            }
        }
        check_positive(&mut errors, "trading.halfway.min_volume_ratio", self.min_volume_ratio);
        check_non_negative(&mut errors, "trading.halfway.vwap_premium_pct", self.vwap_premium_pct);
        check_non_negative(
            &mut errors,
            "trading.halfway.min_room_to_limit_pct",
            self.min_room_to_limit_pct,
        );
        check_score(&mut errors, "trading.halfway.min_score", self.min_score);
        check_hhmm(&mut errors, "trading.halfway.latest_time", self.latest_time.as_ref());
        if self.momentum_ticks == Some(0) {
            errors.push(invalid("trading.halfway.momentum_ticks", "must be at least 1"));
        }
        collect(errors)
    }
}

impl Validate for DipSection {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        check_positive(&mut errors, "trading.dip.min_pullback_pct", self.min_pullback_pct);
        check_positive(&mut errors, "trading.dip.support_tolerance_pct", self.support_tolerance_pct);
        check_fraction(&mut errors, "trading.dip.shrink_ratio", self.shrink_ratio);
        check_score(&mut errors, "trading.dip.min_score", self.min_score);
        if let Some(v) = self.max_dde_outflow_ratio {
            if !(-100.0..=0.0).contains(&v) {
                errors.push(invalid(
                    "trading.dip.max_dde_outflow_ratio",
                    format!("{} is not in [-100, 0]", v),
                ));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_change_pct, self.max_change_pct) {
            if lo >= hi {
                errors.push(ValidationError::Conflict {
                    reason: format!(
                        "trading.dip.min_change_pct ({}) must be below max_change_pct ({})",
                        lo, hi
                    ),
                });
            }
        }
        collect(errors)
    }
}

impl Validate for CycleSection {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        check_score(&mut errors, "trading.cycle.ice_threshold", self.ice_threshold);
        check_score(&mut errors, "trading.cycle.ferment_threshold", self.ferment_threshold);
        check_score(&mut errors, "trading.cycle.climax_threshold", self.climax_threshold);
        check_positive(&mut errors, "trading.cycle.ebb_drop", self.ebb_drop);

        let ordered = [self.ice_threshold, self.ferment_threshold, self.climax_threshold];
        if let [Some(ice), Some(ferment), Some(climax)] = ordered {
            if !(ice < ferment && ferment < climax) {
                errors.push(ValidationError::Conflict {
                    reason: "cycle thresholds must satisfy ice < ferment < climax".into(),
                });
            }
        }
        collect(errors)
    }
}

impl Validate for OrchestratorSection {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        check_score(&mut errors, "trading.orchestrator.buy_threshold", self.buy_threshold);
        check_score(&mut errors, "trading.orchestrator.min_sentiment", self.min_sentiment);
        check_fraction(&mut errors, "trading.orchestrator.base_position", self.base_position);
        check_fraction(
            &mut errors,
            "trading.orchestrator.max_single_position",
            self.max_single_position,
        );
        check_fraction(
            &mut errors,
            "trading.orchestrator.max_total_exposure",
            self.max_total_exposure,
        );
        check_positive(&mut errors, "trading.orchestrator.stop_loss_pct", self.stop_loss_pct);
        check_positive(&mut errors, "trading.orchestrator.take_profit_pct", self.take_profit_pct);
        check_positive(
            &mut errors,
            "trading.orchestrator.trailing_stop_pct",
            self.trailing_stop_pct,
        );
        check_non_negative(
            &mut errors,
            "trading.orchestrator.near_limit_down_pct",
            self.near_limit_down_pct,
        );

        let weights = [
            ("trading.orchestrator.halfway_weight", self.halfway_weight),
            ("trading.orchestrator.dip_weight", self.dip_weight),
            ("trading.orchestrator.sentiment_weight", self.sentiment_weight),
            ("trading.orchestrator.theme_weight", self.theme_weight),
        ];
        for (field, value) in weights {
            check_non_negative(&mut errors, field, value);
        }
        if weights.iter().all(|(_, w)| *w == Some(0.0)) {
            errors.push(ValidationError::Conflict {
                reason: "orchestrator weights must not all be zero".into(),
            });
        }

        if let (Some(single), Some(total)) = (self.max_single_position, self.max_total_exposure) {
            if single > total {
                errors.push(ValidationError::Conflict {
                    reason: format!(
                        "max_single_position ({}) exceeds max_total_exposure ({})",
                        single, total
                    ),
                });
            }
        }
        collect(errors)
    }
}

impl Validate for TradingConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        check_positive(&mut errors, "trading.capital", self.capital);
        if self.monitor.interval_secs == Some(0) {
            errors.push(invalid("trading.monitor.interval_secs", "must be at least 1"));
        }
        for (field, value) in [
            ("trading.monitor.morning_start", self.monitor.morning_start.as_ref()),
            ("trading.monitor.morning_end", self.monitor.morning_end.as_ref()),
            ("trading.monitor.afternoon_start", self.monitor.afternoon_start.as_ref()),
            ("trading.monitor.afternoon_end", self.monitor.afternoon_end.as_ref()),
        ] {
            check_hhmm(&mut errors, field, value);
        }
        check_score(&mut errors, "trading.theme.hot_threshold", self.theme.hot_threshold);

        for result in [
            self.halfway.validate(),
            self.dip.validate(),
            self.cycle.validate(),
            self.orchestrator.validate(),
        ] {
            if let Err(e) = result {
                errors.push(e);
            }
        }

        collect(errors)
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for result in [
            self.server.validate(),
            self.observability.validate(),
            self.trading.validate(),
        ] {
            if let Err(e) = result {
                errors.push(e);
            }
        }

        if self.data.sample_size == 0 {
            errors.push(invalid("data.sample_size", "must be at least 1"));
        }

        collect(errors)
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.observability.log_format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fraction_out_of_range() {
        let mut config = Config::default();
        config.trading.orchestrator.base_position = Some(1.5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_position"));
    }

    #[test]
    fn test_band_order_conflict() {
        let section = HalfwaySection {
            min_band_fraction: Some(0.8),
            max_band_fraction: Some(0.5),
            ..Default::default()
        };
        assert!(matches!(
            section.validate(),
            Err(ValidationError::Conflict { .. })
        ));
    }

    #[test]
    fn test_bad_time_string() {
        let section = HalfwaySection {
            latest_time: Some("25:99".into()),
            ..Default::default()
        };
        assert!(section.validate().is_err());

        let section = HalfwaySection {
            latest_time: Some("14:30".into()),
            ..Default::default()
        };
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_cycle_threshold_order() {
        let section = CycleSection {
            ice_threshold: Some(60.0),
            ferment_threshold: Some(50.0),
            climax_threshold: Some(80.0),
            ..Default::default()
        };
        assert!(section.validate().is_err());
    }

    #[test]
    fn test_detector_gate_ranges() {
        let section = HalfwaySection {
            vwap_premium_pct: Some(-0.5),
            min_room_to_limit_pct: Some(1.0),
            ..Default::default()
        };
        let err = section.validate().unwrap_err();
        assert!(err.to_string().contains("vwap_premium_pct"));

        let section = DipSection {
            max_dde_outflow_ratio: Some(3.0),
            ..Default::default()
        };
        assert!(section.validate().is_err());
        let section = DipSection {
            max_dde_outflow_ratio: Some(-8.0),
            ..Default::default()
        };
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_orchestrator_weights_and_margin() {
        let section = OrchestratorSection {
            theme_weight: Some(-0.1),
            ..Default::default()
        };
        assert!(section.validate().unwrap_err().to_string().contains("theme_weight"));

        let section = OrchestratorSection {
            halfway_weight: Some(0.0),
            dip_weight: Some(0.0),
            sentiment_weight: Some(0.0),
            theme_weight: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(section.validate(), Err(ValidationError::Conflict { .. })));

        let section = OrchestratorSection {
            near_limit_down_pct: Some(-1.0),
            ..Default::default()
        };
        assert!(section.validate().is_err());

        let section = OrchestratorSection {
            near_limit_down_pct: Some(0.0),
            halfway_weight: Some(0.6),
            ..Default::default()
        };
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.server.port = 0;
        config.observability.log_level = "loud".into();
        assert!(matches!(config.validate(), Err(ValidationError::Multiple(v)) if v.len() == 2));
    }
}
