//! Header resolution: maps arbitrary column headers onto canonical fields.
//!
//! Resolution is driven by an ordered list of [`MatchRule`]s. Each raw header
//! is cleaned with [`clean_header`] and tested against every rule; a header
//! may be a candidate for several fields. When more than one header matches
//! the same field, the last one in header order wins and the others are kept
//! on the [`ColumnMapping`] as candidates.

use crate::error::{Result, SalesForecastError};
use crate::schema::{CanonicalField, ColumnMapping, HeaderMatching, ResolvedColumn};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

pub struct MatchRule {
    pub name: &'static str,
    pub field: CanonicalField,
    include: Regex,
    exclude: Option<Regex>,
    extended_only: bool,
}

impl MatchRule {
    fn new(name: &'static str, field: CanonicalField, include: &str) -> Self {
        Self {
            name,
            field,
            include: Regex::new(include).expect("static resolver pattern"),
            exclude: None,
            extended_only: false,
        }
    }

    fn excluding(mut self, pattern: &str) -> Self {
        self.exclude = Some(Regex::new(pattern).expect("static resolver pattern"));
        self
    }

    fn extended_only(mut self) -> Self {
        self.extended_only = true;
        self
    }

    pub fn applies_to(&self, matching: HeaderMatching) -> bool {
        !self.extended_only || matching == HeaderMatching::Extended
    }

    /// Tests an already cleaned header.
    pub fn matches(&self, cleaned: &str) -> bool {
        self.include.is_match(cleaned)
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(cleaned))
    }
}

static RULES: Lazy<Vec<MatchRule>> = Lazy::new(|| {
    vec![
        MatchRule::new("date_substring", CanonicalField::Date, "date").excluding("creation"),
        MatchRule::new("delivered_volume", CanonicalField::Volume, r"^delivered[ _]vol"),
        MatchRule::new("volume_word", CanonicalField::Volume, r"(?:\b|_)volume(?:\b|_)"),
        MatchRule::new("quantity_literal", CanonicalField::Volume, r"^(?:qty|quantity)$")
            .extended_only(),
        MatchRule::new("region_synonym", CanonicalField::Region, "region|territory|area"),
        MatchRule::new("product_substring", CanonicalField::Product, "product"),
        MatchRule::new("rep_word", CanonicalField::Rep, r"\brep(?:_name)?\b"),
    ]
});

/// Trims, lower-cases, strips everything but word characters and whitespace,
/// and collapses whitespace runs.
pub fn clean_header(raw: &str) -> String {
    let kept: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaResolver {
    matching: HeaderMatching,
}

impl SchemaResolver {
    pub fn new(matching: HeaderMatching) -> Self {
        Self { matching }
    }

    pub fn rules(&self) -> impl Iterator<Item = &'static MatchRule> + '_ {
        RULES.iter().filter(move |r| r.applies_to(self.matching))
    }

    pub fn resolve<S: AsRef<str>>(&self, headers: &[S]) -> Result<ColumnMapping> {
        let mut mapping = ColumnMapping::default();

        for (index, raw) in headers.iter().enumerate() {
            let raw = raw.as_ref();
            let cleaned = clean_header(raw);

            for field in CanonicalField::REQUIRED
                .iter()
                .chain(CanonicalField::DIMENSIONS.iter())
            {
                // first matching rule names the match; the field is decided per header
                let Some(rule) = self
                    .rules()
                    .find(|r| r.field == *field && r.matches(&cleaned))
                else {
                    continue;
                };

                let column = ResolvedColumn {
                    header: raw.to_string(),
                    index,
                    rule: rule.name.to_string(),
                };
                mapping
                    .candidates
                    .entry(*field)
                    .or_default()
                    .push(column.clone());
                mapping.columns.insert(*field, column);
            }
        }

        for (field, candidates) in mapping.collisions() {
            let headers: Vec<&str> = candidates.iter().map(|c| c.header.as_str()).collect();
            warn!(
                "Headers {:?} all match '{}'; using the last one ('{}')",
                headers,
                field,
                headers.last().copied().unwrap_or_default()
            );
        }

        let missing = mapping.missing_required();
        if !missing.is_empty() {
            return Err(SalesForecastError::SchemaError { missing });
        }

        debug!(
            "Resolved columns: {}",
            mapping
                .columns
                .iter()
                .map(|(f, c)| format!("{} <- '{}'", f, c.header))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(mapping)
    }
}

/// Resolves headers with the default (extended) matching rules.
pub fn resolve_schema<S: AsRef<str>>(headers: &[S]) -> Result<ColumnMapping> {
    SchemaResolver::default().resolve(headers)
}
