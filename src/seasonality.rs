use crate::error::{Result, SalesForecastError};

/// Minimum number of complete cycles the history must span before a
/// seasonal profile is estimated.
pub const MIN_SEASONAL_CYCLES: i64 = 2;

/// Longest seasonal cycle accepted by configuration.
pub const MAX_SEASONAL_PERIOD_DAYS: usize = 366;

/// Position of a day offset within the seasonal cycle.
pub fn phase_of(offset_days: i64, period: usize) -> usize {
    offset_days.rem_euclid(period as i64) as usize
}

/// Whether the history covers enough whole cycles to estimate a profile.
/// Periods too large to represent as a day count never qualify.
pub fn spans_full_cycles(span_days: i64, period: usize) -> bool {
    if period < 2 {
        return false;
    }
    i64::try_from(period)
        .ok()
        .and_then(|p| p.checked_mul(MIN_SEASONAL_CYCLES))
        .is_some_and(|required| span_days >= required)
}

/// Estimates an additive seasonal profile from detrended observations given as
/// `(day offset, value)` pairs.
///
/// Each phase receives the mean of its observations; phases never observed get
/// zero. The profile is then centered so the observed phases sum to zero and
/// the trend keeps the level of the series.
pub fn estimate_profile(detrended: &[(i64, f64)], period: usize) -> Result<Vec<f64>> {
    if period < 2 {
        return Err(SalesForecastError::ModelError(format!(
            "Seasonal period must be at least 2 days, got {}",
            period
        )));
    }

    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for &(offset, value) in detrended {
        let phase = phase_of(offset, period);
        sums[phase] += value;
        counts[phase] += 1;
    }

    let means: Vec<Option<f64>> = sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &count)| (count > 0).then(|| sum / count as f64))
        .collect();

    let profile = center_profile(&means);
    validate_profile(&profile, period)?;
    Ok(profile)
}

fn center_profile(means: &[Option<f64>]) -> Vec<f64> {
    let observed: Vec<f64> = means.iter().flatten().copied().collect();
    if observed.is_empty() {
        return vec![0.0; means.len()];
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    means
        .iter()
        .map(|m| m.map(|v| v - mean).unwrap_or(0.0))
        .collect()
}

fn validate_profile(profile: &[f64], period: usize) -> Result<()> {
    if profile.len() != period {
        return Err(SalesForecastError::ModelError(format!(
            "Expected {} seasonal components, got {}",
            period,
            profile.len()
        )));
    }

    if profile.iter().any(|c| !c.is_finite()) {
        return Err(SalesForecastError::NumericOverflow(
            "Seasonal component is not finite".to_string(),
        ));
    }

    Ok(())
}
