use crate::error::{Result, SalesForecastError};
use crate::schema::{CellValue, RawTable};
use calamine::{open_workbook_auto, Data, Reader};
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited(u8),
    Spreadsheet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Ok(TableFormat::Delimited(b',')),
            "tsv" => Ok(TableFormat::Delimited(b'\t')),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(TableFormat::Spreadsheet),
            other => Err(SalesForecastError::UnsupportedFormat(format!(
                "'{}' (extension '{}')",
                path.display(),
                other
            ))),
        }
    }
}

/// Loads a table whose first row holds the headers. The format is chosen by
/// file extension.
pub fn load_table(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let table = match TableFormat::from_path(path)? {
        TableFormat::Delimited(delimiter) => load_csv_reader(File::open(path)?, delimiter)?,
        TableFormat::Spreadsheet => load_spreadsheet(path)?,
    };

    info!(
        "Loaded {} rows with {} columns from {}",
        table.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

pub fn load_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = RawTable::new(headers);

    for result in csv_reader.records() {
        let record = result?;
        table.push_row(record.iter().map(CellValue::from).collect());
    }

    Ok(table)
}

/// Reads the first worksheet of a spreadsheet.
pub fn load_spreadsheet(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| SalesForecastError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            SalesForecastError::Spreadsheet(format!("{} has no worksheets", path.display()))
        })?
        .map_err(|e| SalesForecastError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row.iter().map(|c| c.to_string()).collect(),
        None => Vec::new(),
    };

    let mut table = RawTable::new(headers);
    for row in rows {
        table.push_row(row.iter().map(cell_from_data).collect());
    }

    Ok(table)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| CellValue::Date(d.date()))
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;

    const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sales" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

    const SHEET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Date</t></is></c><c r="B1" t="inlineStr"><is><t>Qty</t></is></c><c r="C1" t="inlineStr"><is><t>Region</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>2024-01-01</t></is></c><c r="B2"><v>10</v></c><c r="C2" t="inlineStr"><is><t>North</t></is></c></row><row r="3"><c r="A3" t="inlineStr"><is><t>2024-01-02</t></is></c><c r="B3"><v>12.5</v></c><c r="C3" t="inlineStr"><is><t>South</t></is></c></row></sheetData></worksheet>"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sales_ingestion_{}_{}", std::process::id(), name))
    }

    fn write_workbook(path: &Path) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", WORKBOOK_XML),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet1.xml", SHEET_XML),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_load_csv_reader() {
        let data = "Date, Qty ,Region\n2024-01-01,10,North\n2024-01-02, 20 ,\n2024-01-03\n";
        let table = load_csv_reader(data.as_bytes(), b',').unwrap();

        assert_eq!(table.headers, vec!["Date", "Qty", "Region"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(0, 1), Some(&CellValue::Text("10".to_string())));
        assert_eq!(table.cell(1, 1), Some(&CellValue::Text("20".to_string())));
        assert_eq!(table.cell(1, 2), Some(&CellValue::Empty));
        // short rows are kept and simply lack trailing cells
        assert_eq!(table.cell(2, 1), None);
    }

    #[test]
    fn test_tab_delimited() {
        let data = "date\tvolume\n2024-01-01\t3.5\n";
        let table = load_csv_reader(data.as_bytes(), b'\t').unwrap();
        assert_eq!(table.headers, vec!["date", "volume"]);
        assert_eq!(table.cell(0, 1), Some(&CellValue::Text("3.5".to_string())));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            TableFormat::from_path(Path::new("sales.CSV")).unwrap(),
            TableFormat::Delimited(b',')
        );
        assert_eq!(
            TableFormat::from_path(Path::new("sales.tsv")).unwrap(),
            TableFormat::Delimited(b'\t')
        );
        assert_eq!(
            TableFormat::from_path(Path::new("sales.xlsx")).unwrap(),
            TableFormat::Spreadsheet
        );
        assert!(matches!(
            TableFormat::from_path(Path::new("sales.parquet")),
            Err(SalesForecastError::UnsupportedFormat(_))
        ));
        assert!(TableFormat::from_path(Path::new("sales")).is_err());
    }

    #[test]
    fn test_cell_from_data() {
        assert_eq!(cell_from_data(&Data::Int(4)), CellValue::Number(4.0));
        assert_eq!(cell_from_data(&Data::Float(2.5)), CellValue::Number(2.5));
        assert_eq!(
            cell_from_data(&Data::String("North".to_string())),
            CellValue::Text("North".to_string())
        );
        assert_eq!(cell_from_data(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
    }

    #[test]
    fn test_load_xlsx_workbook() {
        let path = temp_path("sales.xlsx");
        write_workbook(&path);

        let table = load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Date", "Qty", "Region"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 0), Some(&CellValue::Text("2024-01-01".to_string())));
        assert_eq!(table.cell(0, 1), Some(&CellValue::Number(10.0)));
        assert_eq!(table.cell(1, 1), Some(&CellValue::Number(12.5)));
        assert_eq!(table.cell(1, 2), Some(&CellValue::Text("South".to_string())));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_corrupt_workbook() {
        let path = temp_path("corrupt.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, SalesForecastError::Spreadsheet(_)));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_table("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, SalesForecastError::IoError(_)));
    }
}
