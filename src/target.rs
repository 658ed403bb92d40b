use crate::error::{Result, SalesForecastError};
use crate::schema::{CanonicalDataset, ForecastSeries};
use crate::utils::round2;
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TargetPeriod {
    #[schemars(
        description = "Realized sales are those in the same calendar month as the as-of date, in any year"
    )]
    Monthly,

    #[schemars(description = "Realized sales are all sales in the dataset")]
    Yearly,
}

impl fmt::Display for TargetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPeriod::Monthly => f.write_str("Monthly"),
            TargetPeriod::Yearly => f.write_str("Yearly"),
        }
    }
}

/// A sales target for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesTarget {
    pub value: f64,
    pub period: TargetPeriod,
    /// Reference "today" splitting realized from forecast sales.
    pub as_of: NaiveDate,
}

/// Progress against a target. All numbers are rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TargetAnalysisResult {
    pub target_value: f64,
    pub target_period: TargetPeriod,
    pub as_of: NaiveDate,
    pub current_sales: f64,
    pub forecasted_remaining: f64,
    pub projected_total: f64,
    pub remaining_to_target: f64,
    /// Whole days from `as_of` to the last forecast date; may be negative.
    pub days_left: i64,
    pub required_per_day: f64,
    pub projected_percent_of_target: f64,
}

impl TargetAnalysisResult {
    pub fn is_on_track(&self) -> bool {
        self.projected_percent_of_target >= 100.0
    }

    /// Label to value pairs as shown to the user.
    pub fn to_display_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("Target", self.target_value),
            ("Current Sales", self.current_sales),
            ("Forecasted", self.forecasted_remaining),
            ("Projected Total", self.projected_total),
            ("Required per Day", self.required_per_day),
            ("Projected % of Target", self.projected_percent_of_target),
        ])
    }
}

pub struct TargetAnalyzer<'a> {
    dataset: &'a CanonicalDataset,
    forecast: &'a ForecastSeries,
}

impl<'a> TargetAnalyzer<'a> {
    pub fn new(dataset: &'a CanonicalDataset, forecast: &'a ForecastSeries) -> Self {
        Self { dataset, forecast }
    }

    pub fn analyze(&self, target: &SalesTarget) -> Result<TargetAnalysisResult> {
        if !target.value.is_finite() || target.value <= 0.0 {
            return Err(SalesForecastError::InvalidTarget(target.value));
        }

        let current_sales = self.current_sales(target.period, target.as_of);
        let forecasted_remaining = self.forecasted_remaining(target.as_of);
        let projected_total = current_sales + forecasted_remaining;
        let remaining_to_target = (target.value - current_sales).max(0.0);

        let days_left = self
            .forecast
            .last_date()
            .map(|last| (last - target.as_of).num_days())
            .unwrap_or(0);

        let required_per_day = if days_left > 0 {
            remaining_to_target / days_left as f64
        } else {
            0.0
        };

        let projected_percent_of_target = 100.0 * projected_total / target.value;
        if !projected_percent_of_target.is_finite() {
            return Err(SalesForecastError::NumericOverflow(
                "Projected percent of target is not finite".to_string(),
            ));
        }

        debug!(
            "{} target {}: current {:.2}, forecast {:.2}, {} days left",
            target.period, target.value, current_sales, forecasted_remaining, days_left
        );

        Ok(TargetAnalysisResult {
            target_value: round2(target.value),
            target_period: target.period,
            as_of: target.as_of,
            current_sales: round2(current_sales),
            forecasted_remaining: round2(forecasted_remaining),
            projected_total: round2(projected_total),
            remaining_to_target: round2(remaining_to_target),
            days_left,
            required_per_day: round2(required_per_day),
            projected_percent_of_target: round2(projected_percent_of_target),
        })
    }

    /// Monthly matches on calendar month only, so the same month of earlier
    /// years is included.
    fn current_sales(&self, period: TargetPeriod, as_of: NaiveDate) -> f64 {
        match period {
            TargetPeriod::Monthly => self
                .dataset
                .iter()
                .filter(|r| r.date.month() == as_of.month())
                .map(|r| r.volume)
                .sum(),
            TargetPeriod::Yearly => self.dataset.total_volume(),
        }
    }

    fn forecasted_remaining(&self, as_of: NaiveDate) -> f64 {
        let (_, remaining) = self.forecast.split_at(as_of);
        remaining.iter().map(|p| p.point_estimate).sum()
    }
}

pub fn analyze_target(
    dataset: &CanonicalDataset,
    forecast: &ForecastSeries,
    target_value: f64,
    period: TargetPeriod,
    as_of: NaiveDate,
) -> Result<TargetAnalysisResult> {
    TargetAnalyzer::new(dataset, forecast).analyze(&SalesTarget {
        value: target_value,
        period,
        as_of,
    })
}
