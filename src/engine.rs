use crate::error::{Result, SalesForecastError};
use crate::schema::{CanonicalDataset, DailySeries, ForecastPoint, ForecastSeries};
use crate::seasonality::{estimate_profile, phase_of, spans_full_cycles};
use crate::utils::{add_days, daily_range, z_score};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_HORIZON_DAYS: u32 = 30;
pub const MIN_HISTORY_DATES: usize = 2;

/// A model that can be fitted to a daily series and then asked for
/// predictions on arbitrary dates.
pub trait SeasonalForecastModel {
    type Fitted;

    fn fit(&self, series: &DailySeries) -> Result<Self::Fitted>;

    fn predict(&self, fitted: &Self::Fitted, dates: &[NaiveDate]) -> Result<ForecastSeries>;
}

/// Additive decomposition: linear trend over the day offset plus a repeating
/// seasonal cycle, with OLS prediction intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdditiveSeasonalModel {
    pub seasonal_period_days: usize,
    pub confidence_level: f64,
}

impl Default for AdditiveSeasonalModel {
    fn default() -> Self {
        Self {
            seasonal_period_days: 7,
            confidence_level: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSeasonalModel {
    /// Day offsets are measured from this date.
    pub origin: NaiveDate,
    pub intercept: f64,
    pub slope: f64,
    /// Empty when the history is too short to estimate a cycle.
    pub seasonal: Vec<f64>,
    pub residual_std_error: f64,
    pub observations: usize,
    pub mean_offset: f64,
    pub offset_sum_squares: f64,
}

impl FittedSeasonalModel {
    fn offset(&self, date: NaiveDate) -> i64 {
        (date - self.origin).num_days()
    }

    pub fn trend_at(&self, date: NaiveDate) -> f64 {
        self.intercept + self.slope * self.offset(date) as f64
    }

    pub fn seasonal_at(&self, date: NaiveDate) -> f64 {
        if self.seasonal.is_empty() {
            return 0.0;
        }
        self.seasonal[phase_of(self.offset(date), self.seasonal.len())]
    }

    pub fn standard_error_at(&self, date: NaiveDate) -> f64 {
        let t = self.offset(date) as f64;
        let n = self.observations as f64;
        let leverage = (t - self.mean_offset).powi(2) / self.offset_sum_squares;
        self.residual_std_error * (1.0 + 1.0 / n + leverage).sqrt()
    }
}

struct LineFit {
    intercept: f64,
    slope: f64,
    mean_offset: f64,
    offset_sum_squares: f64,
}

fn fit_line(points: &[(i64, f64)]) -> LineFit {
    let n = points.len() as f64;
    let mean_t = points.iter().map(|(t, _)| *t as f64).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(t, y) in points {
        let dt = t as f64 - mean_t;
        sxx += dt * dt;
        sxy += dt * (y - mean_y);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    LineFit {
        intercept: mean_y - slope * mean_t,
        slope,
        mean_offset: mean_t,
        offset_sum_squares: sxx,
    }
}

impl SeasonalForecastModel for AdditiveSeasonalModel {
    type Fitted = FittedSeasonalModel;

    fn fit(&self, series: &DailySeries) -> Result<FittedSeasonalModel> {
        if series.len() < MIN_HISTORY_DATES {
            return Err(SalesForecastError::InsufficientHistory {
                distinct_dates: series.len(),
                required: MIN_HISTORY_DATES,
            });
        }
        if series.values().any(|v| !v.is_finite()) {
            return Err(SalesForecastError::NumericOverflow(
                "Daily totals contain non-finite values".to_string(),
            ));
        }

        let (&origin, _) = series
            .iter()
            .next()
            .ok_or(SalesForecastError::InsufficientHistory {
                distinct_dates: 0,
                required: MIN_HISTORY_DATES,
            })?;

        let observed: Vec<(i64, f64)> = series
            .iter()
            .map(|(date, value)| ((*date - origin).num_days(), *value))
            .collect();
        let span = observed.last().map(|(t, _)| *t).unwrap_or(0);

        let mut line = fit_line(&observed);
        let mut seasonal = Vec::new();

        if spans_full_cycles(span, self.seasonal_period_days) {
            let detrended: Vec<(i64, f64)> = observed
                .iter()
                .map(|&(t, y)| (t, y - (line.intercept + line.slope * t as f64)))
                .collect();
            seasonal = estimate_profile(&detrended, self.seasonal_period_days)?;

            // refit the trend on the deseasonalized series
            let deseasonalized: Vec<(i64, f64)> = observed
                .iter()
                .map(|&(t, y)| (t, y - seasonal[phase_of(t, seasonal.len())]))
                .collect();
            line = fit_line(&deseasonalized);
        }

        let sse: f64 = observed
            .iter()
            .map(|&(t, y)| {
                let s = if seasonal.is_empty() {
                    0.0
                } else {
                    seasonal[phase_of(t, seasonal.len())]
                };
                (y - line.intercept - line.slope * t as f64 - s).powi(2)
            })
            .sum();
        let dof = observed.len().saturating_sub(2).max(1) as f64;

        let fitted = FittedSeasonalModel {
            origin,
            intercept: line.intercept,
            slope: line.slope,
            seasonal,
            residual_std_error: (sse / dof).sqrt(),
            observations: observed.len(),
            mean_offset: line.mean_offset,
            offset_sum_squares: line.offset_sum_squares,
        };

        if !(fitted.intercept.is_finite()
            && fitted.slope.is_finite()
            && fitted.residual_std_error.is_finite())
        {
            return Err(SalesForecastError::NumericOverflow(
                "Fitted trend parameters are not finite".to_string(),
            ));
        }

        debug!(
            "Fitted trend {:.4} + {:.4}·t over {} days, {} seasonal components, σ = {:.4}",
            fitted.intercept,
            fitted.slope,
            observed.len(),
            fitted.seasonal.len(),
            fitted.residual_std_error
        );

        Ok(fitted)
    }

    fn predict(&self, fitted: &FittedSeasonalModel, dates: &[NaiveDate]) -> Result<ForecastSeries> {
        let z = z_score(self.confidence_level);
        let mut points = Vec::with_capacity(dates.len());

        for &date in dates {
            let point_estimate = fitted.trend_at(date) + fitted.seasonal_at(date);
            let half_width = z * fitted.standard_error_at(date);

            if !(point_estimate.is_finite() && half_width.is_finite()) {
                return Err(SalesForecastError::NumericOverflow(format!(
                    "Prediction for {} is not finite",
                    date
                )));
            }

            points.push(ForecastPoint {
                date,
                point_estimate,
                lower_bound: point_estimate - half_width,
                upper_bound: point_estimate + half_width,
            });
        }

        Ok(ForecastSeries::new(points))
    }
}

/// Sums volume per date.
pub fn aggregate_daily(dataset: &CanonicalDataset) -> Result<DailySeries> {
    let mut daily: DailySeries = BTreeMap::new();
    for record in dataset {
        *daily.entry(record.date).or_insert(0.0) += record.volume;
    }

    if let Some((date, _)) = daily.iter().find(|(_, v)| !v.is_finite()) {
        return Err(SalesForecastError::NumericOverflow(format!(
            "Total volume on {} is not finite",
            date
        )));
    }

    Ok(daily)
}

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine<M = AdditiveSeasonalModel> {
    model: M,
}

impl<M: SeasonalForecastModel> ForecastEngine<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Fits the model to the daily totals and predicts every day from the
    /// first observation through the last observation plus `horizon_days`.
    pub fn fit_and_forecast(
        &self,
        dataset: &CanonicalDataset,
        horizon_days: u32,
    ) -> Result<ForecastSeries> {
        let daily = aggregate_daily(dataset)?;
        if daily.len() < MIN_HISTORY_DATES {
            return Err(SalesForecastError::InsufficientHistory {
                distinct_dates: daily.len(),
                required: MIN_HISTORY_DATES,
            });
        }

        let (Some((&first, _)), Some((&last, _))) = (daily.first_key_value(), daily.last_key_value())
        else {
            return Err(SalesForecastError::InsufficientHistory {
                distinct_dates: 0,
                required: MIN_HISTORY_DATES,
            });
        };
        let end = add_days(last, horizon_days).ok_or_else(|| {
            SalesForecastError::NumericOverflow(format!(
                "{} days after {} is outside the calendar range",
                horizon_days, last
            ))
        })?;

        let fitted = self.model.fit(&daily)?;
        let dates = daily_range(first, end);
        let forecast = self.model.predict(&fitted, &dates)?;

        info!(
            "Forecast {} days ({} observed dates, horizon {} days through {})",
            forecast.len(),
            daily.len(),
            horizon_days,
            end
        );

        Ok(forecast)
    }
}

impl<M> ForecastEngine<M>
where
    M: SeasonalForecastModel + Clone + Send + 'static,
{
    /// Runs [`fit_and_forecast`](Self::fit_and_forecast) on a worker thread.
    /// On timeout the worker is left to finish on its own; its result is
    /// discarded.
    pub fn forecast_with_timeout(
        &self,
        dataset: &CanonicalDataset,
        horizon_days: u32,
        timeout: Duration,
    ) -> Result<ForecastSeries> {
        let engine = ForecastEngine::new(self.model.clone());
        let dataset = dataset.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let _ = tx.send(engine.fit_and_forecast(&dataset, horizon_days));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SalesForecastError::FitTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(SalesForecastError::ModelError(
                "Forecast worker stopped without a result".to_string(),
            )),
        }
    }
}

/// Forecasts with the default additive seasonal model.
pub fn forecast(dataset: &CanonicalDataset, horizon_days: u32) -> Result<ForecastSeries> {
    ForecastEngine::<AdditiveSeasonalModel>::default().fit_and_forecast(dataset, horizon_days)
}
