//! # Sales Forecast Tracker
//!
//! A library for turning loosely structured sales exports (CSV or spreadsheet)
//! into a short-horizon daily volume forecast and a progress report against a
//! monthly or yearly sales target.
//!
//! ## Pipeline
//!
//! - **Schema resolution**: variant headers ("Delivered Vol.", "Qty", "Sales
//!   Territory") are mapped onto canonical fields (`date`, `volume`, `region`,
//!   `product`, `rep`)
//! - **Normalization**: cells are coerced to dates and non-negative volumes;
//!   invalid rows are dropped
//! - **Forecasting**: daily totals are fitted with an additive trend +
//!   seasonal model and projected 30 days ahead with uncertainty bounds
//! - **Target analysis**: realized sales and forecast sales are reconciled
//!   against the target to give percent-of-target and the daily pace required
//! - **Recommendation**: a one-line message for the user
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_forecast_tracker::*;
//! use chrono::NaiveDate;
//!
//! let raw = load_table("sales.csv")?;
//! let pipeline = SalesForecastPipeline::new(PipelineConfig::default())?;
//! let output = pipeline.run(
//!     &raw,
//!     &DimensionFilter::new().with(CanonicalField::Region, "North"),
//!     Some(SalesTarget {
//!         value: 5_000.0,
//!         period: TargetPeriod::Monthly,
//!         as_of: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
//!     }),
//! )?;
//!
//! println!("{}", output.recommendation.unwrap_or_default());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod normalizer;
pub mod recommendation;
pub mod resolver;
pub mod schema;
pub mod seasonality;
pub mod target;
pub mod utils;

pub use config::PipelineConfig;
pub use engine::{
    aggregate_daily, forecast, AdditiveSeasonalModel, FittedSeasonalModel, ForecastEngine,
    SeasonalForecastModel, DEFAULT_HORIZON_DAYS, MIN_HISTORY_DATES,
};
pub use error::{Result, SalesForecastError};
pub use ingestion::{load_csv_reader, load_spreadsheet, load_table, TableFormat};
pub use normalizer::{normalize, DatasetNormalizer, NormalizationStats};
pub use recommendation::{recommend, Recommendation};
pub use resolver::{clean_header, resolve_schema, SchemaResolver};
pub use schema::*;
pub use target::{analyze_target, SalesTarget, TargetAnalysisResult, TargetAnalyzer, TargetPeriod};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything one pipeline invocation produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub mapping: ColumnMapping,
    pub stats: NormalizationStats,
    /// The normalized dataset before any dimension filter.
    pub dataset: CanonicalDataset,
    /// The dataset the forecast and analysis were computed on.
    pub filtered: CanonicalDataset,
    pub forecast: ForecastSeries,
    pub analysis: Option<TargetAnalysisResult>,
    pub recommendation: Option<String>,
}

pub struct SalesForecastPipeline {
    config: PipelineConfig,
}

impl SalesForecastPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(
        &self,
        raw: &RawTable,
        filter: &DimensionFilter,
        target: Option<SalesTarget>,
    ) -> Result<PipelineOutput> {
        info!(
            "Running sales forecast pipeline on {} rows ({} columns)",
            raw.len(),
            raw.headers.len()
        );

        let mapping = SchemaResolver::new(self.config.header_matching).resolve(&raw.headers)?;
        let (dataset, stats) =
            DatasetNormalizer::new(&mapping, self.config.coercion).normalize_with_stats(raw)?;

        let filtered = dataset.filter(filter);
        if !filter.is_empty() {
            debug!(
                "Filter kept {} of {} records",
                filtered.len(),
                dataset.len()
            );
        }

        let forecast = self.forecast(&filtered)?;

        let analysis = target
            .map(|t| TargetAnalyzer::new(&filtered, &forecast).analyze(&t))
            .transpose()?;
        let recommendation = analysis.as_ref().map(recommend);

        Ok(PipelineOutput {
            mapping,
            stats,
            dataset,
            filtered,
            forecast,
            analysis,
            recommendation,
        })
    }

    fn forecast(&self, dataset: &CanonicalDataset) -> Result<ForecastSeries> {
        let engine = ForecastEngine::new(self.config.model());
        match self.config.fit_timeout() {
            Some(timeout) => engine.forecast_with_timeout(dataset, self.config.horizon_days, timeout),
            None => engine.fit_and_forecast(dataset, self.config.horizon_days),
        }
    }
}
