use crate::engine::{AdditiveSeasonalModel, DEFAULT_HORIZON_DAYS};
use crate::error::{Result, SalesForecastError};
use crate::schema::{CoercionPolicy, HeaderMatching};
use crate::seasonality::MAX_SEASONAL_PERIOD_DAYS;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}

fn default_confidence_level() -> f64 {
    0.8
}

fn default_seasonal_period_days() -> usize {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default = "default_horizon_days")]
    #[schemars(description = "Number of future calendar days projected past the last observed date")]
    pub horizon_days: u32,

    #[serde(default = "default_confidence_level")]
    #[schemars(
        description = "Width of the forecast uncertainty interval, between 0 and 1 exclusive (0.8 = 80%)"
    )]
    pub confidence_level: f64,

    #[serde(default = "default_seasonal_period_days")]
    #[schemars(
        description = "Length in days of the repeating seasonal cycle, from 2 to 366. 7 captures day-of-week effects."
    )]
    pub seasonal_period_days: usize,

    #[serde(default)]
    #[schemars(description = "How rows with unparseable volume values are handled")]
    pub coercion: CoercionPolicy,

    #[serde(default)]
    #[schemars(description = "Which header spellings resolve to the volume column")]
    pub header_matching: HeaderMatching,

    /// When a fit exceeds the budget the pipeline returns `FitTimeout`, but the
    /// worker thread is not cancelled and keeps running until the fit ends.
    /// Re-running the same dataset right after a timeout can therefore leave
    /// more than one fit of it in flight.
    #[serde(default)]
    #[schemars(
        description = "Optional budget in milliseconds for model fitting. When unset the fit runs inline without a limit. A timed-out fit is abandoned, not cancelled."
    )]
    pub fit_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            confidence_level: default_confidence_level(),
            seasonal_period_days: default_seasonal_period_days(),
            coercion: CoercionPolicy::default(),
            header_matching: HeaderMatching::default(),
            fit_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon_days == 0 {
            return Err(SalesForecastError::InvalidConfig(
                "horizon_days must be at least 1".to_string(),
            ));
        }

        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SalesForecastError::InvalidConfig(format!(
                "confidence_level {} must be between 0 and 1",
                self.confidence_level
            )));
        }

        if !(2..=MAX_SEASONAL_PERIOD_DAYS).contains(&self.seasonal_period_days) {
            return Err(SalesForecastError::InvalidConfig(format!(
                "seasonal_period_days {} must be between 2 and {}",
                self.seasonal_period_days, MAX_SEASONAL_PERIOD_DAYS
            )));
        }

        if self.fit_timeout_ms == Some(0) {
            return Err(SalesForecastError::InvalidConfig(
                "fit_timeout_ms must be positive when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn model(&self) -> AdditiveSeasonalModel {
        AdditiveSeasonalModel {
            seasonal_period_days: self.seasonal_period_days,
            confidence_level: self.confidence_level,
        }
    }

    pub fn fit_timeout(&self) -> Option<Duration> {
        self.fit_timeout_ms.map(Duration::from_millis)
    }

    pub fn json_schema() -> serde_json::Result<String> {
        let schema = schemars::schema_for!(PipelineConfig);
        serde_json::to_string_pretty(&schema)
    }
}
