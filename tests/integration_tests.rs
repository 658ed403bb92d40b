use chrono::{Datelike, NaiveDate};
use sales_forecast_tracker::*;
use std::path::PathBuf;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sales_forecast_{}_{}", std::process::id(), name))
}

fn write_csv(name: &str, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<PathBuf> {
    let path = temp_path(name);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(path)
}

fn export_forecast_csv(series: &ForecastSeries, name: &str) -> anyhow::Result<PathBuf> {
    let path = temp_path(name);
    let columns = series.columns();
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["ds", "yhat", "yhat_lower", "yhat_upper"])?;
    for i in 0..columns.dates.len() {
        writer.write_record([
            columns.dates[i].format("%Y-%m-%d").to_string(),
            format!("{:.2}", columns.point_estimate[i]),
            format!("{:.2}", columns.lower_bound[i]),
            format!("{:.2}", columns.upper_bound[i]),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Ninety days of sales across two regions and reps, with a weekend bump.
fn regional_sales_rows() -> Vec<Vec<String>> {
    let start = date(2024, 1, 1);
    let mut rows = Vec::new();
    for (i, day) in start.iter_days().take(90).enumerate() {
        let weekend = day.weekday().number_from_monday() >= 6;
        let base = 40.0 + i as f64 * 0.5 + if weekend { 25.0 } else { 0.0 };
        rows.push(vec![
            day.format("%m/%d/%Y").to_string(),
            format!("{:.1}", base),
            "North Territory".to_string(),
            "Alice".to_string(),
            "Widget".to_string(),
        ]);
        rows.push(vec![
            day.format("%m/%d/%Y").to_string(),
            format!("{:.1}", base / 2.0),
            "South Territory".to_string(),
            "Bob".to_string(),
            "Gadget".to_string(),
        ]);
    }
    rows
}

#[test]
fn test_minimal_two_day_history() -> anyhow::Result<()> {
    let path = write_csv(
        "minimal.csv",
        &["Date", "Qty"],
        &[
            vec!["2024-01-01".to_string(), "10".to_string()],
            vec!["2024-01-02".to_string(), "20".to_string()],
        ],
    )?;

    let raw = load_table(&path)?;
    let mapping = resolve_schema(&raw.headers)?;
    assert_eq!(mapping.header(CanonicalField::Date), Some("Date"));
    assert_eq!(mapping.header(CanonicalField::Volume), Some("Qty"));

    let dataset = normalize(&raw, &mapping, CoercionPolicy::Strict)?;
    assert_eq!(dataset.len(), 2);

    let series = forecast(&dataset, 30)?;
    assert!(series.len() >= 32);
    assert_eq!(series.last_date(), Some(date(2024, 2, 1)));

    std::fs::remove_file(path)?;
    Ok(())
}

#[test]
fn test_missing_date_header() {
    let err = resolve_schema(&["Delivered Volume", "Territory"]).unwrap_err();
    match err {
        SalesForecastError::SchemaError { missing } => {
            assert!(missing.contains(&CanonicalField::Date));
            assert!(!missing.contains(&CanonicalField::Volume));
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
fn test_zero_target_rejected_regardless_of_inputs() {
    let dataset = CanonicalDataset::default();
    let series = ForecastSeries::default();
    for period in [TargetPeriod::Monthly, TargetPeriod::Yearly] {
        let err = analyze_target(&dataset, &series, 0.0, period, date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, SalesForecastError::InvalidTarget(v) if v == 0.0));
    }
}

#[test]
fn test_as_of_past_horizon() -> anyhow::Result<()> {
    let raw = load_csv_reader("date,volume\n2024-01-01,10\n2024-01-02,20\n".as_bytes(), b',')?;
    let mapping = resolve_schema(&raw.headers)?;
    let dataset = normalize(&raw, &mapping, CoercionPolicy::Strict)?;
    let series = forecast(&dataset, DEFAULT_HORIZON_DAYS)?;

    let result = analyze_target(&dataset, &series, 1_000.0, TargetPeriod::Yearly, date(2024, 6, 1))?;
    assert_eq!(result.forecasted_remaining, 0.0);
    assert!(result.days_left <= 0);
    assert_eq!(result.required_per_day, 0.0);
    assert_eq!(result.current_sales, 30.0);
    Ok(())
}

#[test]
fn test_target_already_reached() -> anyhow::Result<()> {
    let raw = load_csv_reader(
        "Sale Date,Quantity\n2024-03-01,600\n2024-03-02,500\n2024-03-03,20\n".as_bytes(),
        b',',
    )?;
    let mapping = resolve_schema(&raw.headers)?;
    let dataset = normalize(&raw, &mapping, CoercionPolicy::Strict)?;
    let series = forecast(&dataset, DEFAULT_HORIZON_DAYS)?;

    let result = analyze_target(&dataset, &series, 1_000.0, TargetPeriod::Monthly, date(2024, 3, 4))?;
    assert_eq!(result.remaining_to_target, 0.0);
    assert_eq!(result.required_per_day, 0.0);
    assert!(result.days_left > 0);
    Ok(())
}

#[test]
fn test_regional_pipeline_with_filters() -> anyhow::Result<()> {
    let path = write_csv(
        "regional.csv",
        &["Delivery Date", "Delivered Vol.", "Sales Territory", "Rep Name", "Product"],
        &regional_sales_rows(),
    )?;
    let raw = load_table(&path)?;

    let pipeline = SalesForecastPipeline::new(PipelineConfig::default())?;
    let target = SalesTarget {
        value: 3_000.0,
        period: TargetPeriod::Monthly,
        as_of: date(2024, 3, 20),
    };

    let all = pipeline.run(&raw, &DimensionFilter::new(), Some(target))?;
    assert_eq!(all.dataset.len(), 180);
    assert_eq!(
        all.dataset
            .dimension_values(CanonicalField::Region)
            .into_iter()
            .collect::<Vec<_>>(),
        vec!["North Territory".to_string(), "South Territory".to_string()]
    );
    // Jan 1 .. Mar 30, plus 30 days
    assert_eq!(all.forecast.len(), 120);

    let north = pipeline.run(
        &raw,
        &DimensionFilter::new().with(CanonicalField::Rep, "Alice"),
        Some(target),
    )?;
    assert_eq!(north.filtered.len(), 90);
    assert_eq!(north.dataset, all.dataset);

    let north_analysis = north.analysis.as_ref().unwrap();
    let all_analysis = all.analysis.as_ref().unwrap();
    assert!(north_analysis.current_sales < all_analysis.current_sales);
    assert!(north_analysis.projected_total < all_analysis.projected_total);

    for analysis in [north_analysis, all_analysis] {
        let sum = analysis.current_sales + analysis.forecasted_remaining;
        assert!((analysis.projected_total - sum).abs() <= 0.011);
        assert!(analysis.required_per_day >= 0.0);
    }

    // the weekend bump survives into the projection
    let saturday = all.forecast.get(date(2024, 4, 6)).unwrap().point_estimate;
    let wednesday = all.forecast.get(date(2024, 4, 3)).unwrap().point_estimate;
    assert!(saturday > wednesday + 20.0);

    let exported = export_forecast_csv(&all.forecast, "forecast_out.csv")?;
    let reloaded = load_table(&exported)?;
    assert_eq!(reloaded.len(), 120);
    assert_eq!(reloaded.headers, vec!["ds", "yhat", "yhat_lower", "yhat_upper"]);

    std::fs::remove_file(path)?;
    std::fs::remove_file(exported)?;
    Ok(())
}

#[test]
fn test_recommendation_matches_percent() -> anyhow::Result<()> {
    let raw = load_csv_reader("date,volume\n2024-05-01,100\n2024-05-02,100\n".as_bytes(), b',')?;
    let mapping = resolve_schema(&raw.headers)?;
    let dataset = normalize(&raw, &mapping, CoercionPolicy::Strict)?;
    let series = forecast(&dataset, 30)?;

    for target in [10.0, 1_000.0, 1_000_000.0] {
        let result = analyze_target(&dataset, &series, target, TargetPeriod::Monthly, date(2024, 5, 3))?;
        let message = recommend(&result);
        assert_eq!(
            message.contains("on track"),
            result.projected_percent_of_target >= 100.0,
            "target {target}: {message}"
        );
        if !result.is_on_track() {
            assert!(message.contains(&result.required_per_day.to_string()));
        }
    }
    Ok(())
}

#[test]
fn test_lenient_policy_keeps_rows() -> anyhow::Result<()> {
    let raw = load_csv_reader(
        "Date,Qty\n2024-01-01,5\n2024-01-02,--\n2024-01-03,7\n".as_bytes(),
        b',',
    )?;
    let mapping = resolve_schema(&raw.headers)?;

    let strict = normalize(&raw, &mapping, CoercionPolicy::Strict)?;
    let lenient = normalize(&raw, &mapping, CoercionPolicy::Lenient)?;
    assert_eq!(strict.len(), 2);
    assert_eq!(lenient.len(), 3);
    assert_eq!(lenient.total_volume(), strict.total_volume());
    Ok(())
}

#[test]
fn test_unsupported_extension() {
    let err = load_table("sales.json").unwrap_err();
    assert!(matches!(err, SalesForecastError::UnsupportedFormat(_)));
}

#[test]
fn test_config_file_round_trip() -> anyhow::Result<()> {
    let path = temp_path("config.json");
    std::fs::write(&path, r#"{"horizon_days": 7, "confidence_level": 0.95}"#)?;
    let config = PipelineConfig::from_json_file(&path)?;
    assert_eq!(config.horizon_days, 7);

    let raw = load_csv_reader("date,volume\n2024-01-01,1\n2024-01-02,2\n".as_bytes(), b',')?;
    let output = SalesForecastPipeline::new(config)?.run(&raw, &DimensionFilter::new(), None)?;
    assert_eq!(output.forecast.len(), 9);

    std::fs::remove_file(path)?;
    Ok(())
}
