use crate::error::{Result, SalesForecastError};
use crate::schema::{
    CanonicalDataset, CanonicalField, CanonicalRecord, CellValue, CoercionPolicy, ColumnMapping,
    RawTable,
};
use crate::utils::parse_date;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts of rows dropped during normalization, by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub total_rows: usize,
    pub kept: usize,
    pub invalid_date: usize,
    pub invalid_volume: usize,
    pub volume_zeroed: usize,
}

pub struct DatasetNormalizer<'a> {
    mapping: &'a ColumnMapping,
    policy: CoercionPolicy,
}

impl<'a> DatasetNormalizer<'a> {
    pub fn new(mapping: &'a ColumnMapping, policy: CoercionPolicy) -> Self {
        Self { mapping, policy }
    }

    pub fn normalize(&self, raw: &RawTable) -> Result<CanonicalDataset> {
        self.normalize_with_stats(raw).map(|(dataset, _)| dataset)
    }

    pub fn normalize_with_stats(
        &self,
        raw: &RawTable,
    ) -> Result<(CanonicalDataset, NormalizationStats)> {
        let missing = self.mapping.missing_required();
        if !missing.is_empty() {
            return Err(SalesForecastError::SchemaError { missing });
        }

        let mut stats = NormalizationStats {
            total_rows: raw.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(raw.len());

        for row in 0..raw.len() {
            let Some(date) = self.coerce_date(raw, row) else {
                stats.invalid_date += 1;
                continue;
            };

            let volume = match (self.coerce_volume(raw, row), self.policy) {
                (Some(v), _) => v,
                (None, CoercionPolicy::Lenient) => {
                    stats.volume_zeroed += 1;
                    0.0
                }
                (None, CoercionPolicy::Strict) => {
                    stats.invalid_volume += 1;
                    continue;
                }
            };

            let dimensions: BTreeMap<CanonicalField, String> = self
                .mapping
                .dimensions()
                .filter_map(|(field, column)| {
                    raw.cell(row, column.index)
                        .and_then(CellValue::to_text)
                        .map(|value| (field, value))
                })
                .collect();

            records.push(CanonicalRecord {
                date,
                volume,
                dimensions,
            });
        }

        stats.kept = records.len();

        let dropped = stats.invalid_date + stats.invalid_volume;
        if dropped > 0 {
            warn!(
                "Dropped {} of {} rows ({} unparseable dates, {} unparseable volumes)",
                dropped, stats.total_rows, stats.invalid_date, stats.invalid_volume
            );
        }
        if stats.volume_zeroed > 0 {
            debug!(
                "Replaced {} unparseable volumes with zero",
                stats.volume_zeroed
            );
        }

        if records.is_empty() {
            return Err(SalesForecastError::EmptyDataset {
                total_rows: stats.total_rows,
            });
        }

        info!(
            "Normalized {} of {} rows into canonical records",
            stats.kept, stats.total_rows
        );

        Ok((CanonicalDataset::new(records), stats))
    }

    fn coerce_date(&self, raw: &RawTable, row: usize) -> Option<NaiveDate> {
        let column = self.mapping.get(CanonicalField::Date)?;
        match raw.cell(row, column.index)? {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date(s),
            CellValue::Number(_) | CellValue::Empty => None,
        }
    }

    fn coerce_volume(&self, raw: &RawTable, row: usize) -> Option<f64> {
        let column = self.mapping.get(CanonicalField::Volume)?;
        let value = match raw.cell(row, column.index)? {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Date(_) | CellValue::Empty => return None,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

pub fn normalize(
    raw: &RawTable,
    mapping: &ColumnMapping,
    policy: CoercionPolicy,
) -> Result<CanonicalDataset> {
    DatasetNormalizer::new(mapping, policy).normalize(raw)
}
