use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Fixed semantic column names that every input header is mapped onto.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    #[schemars(description = "Calendar date of the sale (day granularity)")]
    Date,

    #[schemars(description = "Quantity sold or delivered; the value being forecast")]
    Volume,

    #[schemars(description = "Sales region, territory or area (filter only)")]
    Region,

    #[schemars(description = "Product name or code (filter only)")]
    Product,

    #[schemars(description = "Sales representative (filter only)")]
    Rep,
}

impl CanonicalField {
    pub const REQUIRED: [CanonicalField; 2] = [CanonicalField::Date, CanonicalField::Volume];

    pub const DIMENSIONS: [CanonicalField; 3] = [
        CanonicalField::Region,
        CanonicalField::Product,
        CanonicalField::Rep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Volume => "volume",
            CanonicalField::Region => "region",
            CanonicalField::Product => "product",
            CanonicalField::Rep => "rep",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn is_dimension(&self) -> bool {
        Self::DIMENSIONS.contains(self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How unparseable volume cells are handled during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum CoercionPolicy {
    #[schemars(description = "Rows whose volume cannot be parsed are dropped")]
    #[default]
    Strict,

    #[schemars(
        description = "Unparseable volumes become zero. Use when the volume column is a known quantity field such as 'qty'."
    )]
    Lenient,
}

/// Which header spellings are accepted for the volume field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum HeaderMatching {
    #[schemars(description = "Only descriptive headers: 'Delivered Vol...' or containing the word 'volume'")]
    Descriptive,

    #[schemars(description = "Descriptive headers plus literal 'qty' / 'quantity' headers")]
    #[default]
    Extended,
}

/// An untyped cell as read from a delimited file or spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way it would appear in a text file.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// A header row plus data rows, addressed by column position so duplicate
/// headers remain distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Missing trailing cells of short rows read as `None`.
    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

/// The raw header selected for a canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedColumn {
    pub header: String,
    pub index: usize,
    /// Name of the resolver rule that matched this header.
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Winning header per canonical field.
    pub columns: BTreeMap<CanonicalField, ResolvedColumn>,
    /// Every header that matched each field, in header order. The winner is
    /// always the last entry.
    pub candidates: BTreeMap<CanonicalField, Vec<ResolvedColumn>>,
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> Option<&ResolvedColumn> {
        self.columns.get(&field)
    }

    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(|c| c.header.as_str())
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (CanonicalField, &ResolvedColumn)> {
        self.columns
            .iter()
            .filter(|(field, _)| field.is_dimension())
            .map(|(field, column)| (*field, column))
    }

    pub fn missing_required(&self) -> Vec<CanonicalField> {
        CanonicalField::REQUIRED
            .iter()
            .filter(|f| !self.columns.contains_key(f))
            .copied()
            .collect()
    }

    /// Fields where more than one header matched.
    pub fn collisions(&self) -> impl Iterator<Item = (CanonicalField, &[ResolvedColumn])> {
        self.candidates
            .iter()
            .filter(|(_, c)| c.len() > 1)
            .map(|(field, c)| (*field, c.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub date: NaiveDate,
    pub volume: f64,
    pub dimensions: BTreeMap<CanonicalField, String>,
}

/// Sales records in canonical form. Never mutated once built; filtering
/// produces a new dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDataset {
    records: Vec<CanonicalRecord>,
}

impl CanonicalDataset {
    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_volume(&self) -> f64 {
        self.records.iter().map(|r| r.volume).sum()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.records.iter().map(|r| r.date).min()?;
        let end = self.records.iter().map(|r| r.date).max()?;
        Some((start, end))
    }

    /// Sorted distinct values of a dimension, for building filter choices.
    pub fn dimension_values(&self, field: CanonicalField) -> BTreeSet<String> {
        self.records
            .iter()
            .filter_map(|r| r.dimensions.get(&field).cloned())
            .collect()
    }

    pub fn filter(&self, filter: &DimensionFilter) -> CanonicalDataset {
        if filter.is_empty() {
            return self.clone();
        }
        CanonicalDataset::new(
            self.records
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect(),
        )
    }

    /// Renders the dataset back into a table with canonical headers.
    pub fn to_raw_table(&self) -> RawTable {
        let dims: BTreeSet<CanonicalField> = self
            .records
            .iter()
            .flat_map(|r| r.dimensions.keys().copied())
            .collect();

        let mut headers = vec![
            CanonicalField::Date.as_str().to_string(),
            CanonicalField::Volume.as_str().to_string(),
        ];
        headers.extend(dims.iter().map(|d| d.as_str().to_string()));

        let mut table = RawTable::new(headers);
        for record in &self.records {
            let mut row = vec![CellValue::Date(record.date), CellValue::Number(record.volume)];
            for dim in &dims {
                row.push(match record.dimensions.get(dim) {
                    Some(value) => CellValue::Text(value.clone()),
                    None => CellValue::Empty,
                });
            }
            table.push_row(row);
        }
        table
    }
}

impl<'a> IntoIterator for &'a CanonicalDataset {
    type Item = &'a CanonicalRecord;
    type IntoIter = std::slice::Iter<'a, CanonicalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Required dimension values. A dimension without a selection matches all
/// records ("All").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub selections: BTreeMap<CanonicalField, String>,
}

impl DimensionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: CanonicalField, value: impl Into<String>) -> Self {
        self.selections.insert(field, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        self.selections
            .iter()
            .all(|(field, wanted)| record.dimensions.get(field) == Some(wanted))
    }
}

/// Daily volume totals. Dates are unique; calendar gaps are allowed.
pub type DailySeries = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point_estimate: f64,
    /// Not guaranteed to be at or below `point_estimate` for every model.
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Aligned columns for chart rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastColumns {
    pub dates: Vec<NaiveDate>,
    pub point_estimate: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Points are sorted ascending by date.
    pub fn new(mut points: Vec<ForecastPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&ForecastPoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| &self.points[idx])
    }

    /// Points before `as_of`, and points on or after it.
    pub fn split_at(&self, as_of: NaiveDate) -> (&[ForecastPoint], &[ForecastPoint]) {
        let idx = self.points.partition_point(|p| p.date < as_of);
        self.points.split_at(idx)
    }

    pub fn columns(&self) -> ForecastColumns {
        let mut columns = ForecastColumns::default();
        for p in &self.points {
            columns.dates.push(p.date);
            columns.point_estimate.push(p.point_estimate);
            columns.lower_bound.push(p.lower_bound);
            columns.upper_bound.push(p.upper_bound);
        }
        columns
    }
}
