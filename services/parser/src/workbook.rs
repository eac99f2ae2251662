//! Adapter from on-disk artifacts to the core's `Workbook` contract.
//!
//! The parsing core only ever sees `Workbook` grids; this module is the
//! one place that knows about calamine, CSV dialects and legacy
//! encodings. CSV artifacts become a single-sheet workbook named after
//! the file stem, with all cells as text (the normalizer handles locale
//! number strings downstream).

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};

use crate::normalize::date_from_serial;
use crate::sheet::{Cell, RawSheet, Workbook};

/// Load any supported artifact into the core input contract.
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        load_csv(path)
    } else {
        load_spreadsheet(path)
    }
}

fn load_spreadsheet(path: &Path) -> Result<Workbook> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let names = workbook.sheet_names().to_vec();
    if names.is_empty() {
        anyhow::bail!("workbook has no sheets");
    }

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("failed to read sheet '{}'", name))?;
        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();
        sheets.push((name, RawSheet::new(rows)));
    }
    Ok(sheets)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        // Native dates arrive as serials; convert here so the core sees
        // a calendar date.
        Data::DateTime(dt) => date_from_serial(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

fn load_csv(path: &Path) -> Result<Workbook> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = decode_text(&bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read CSV record")?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    Ok(vec![(name, RawSheet::new(rows))])
}

/// Exports from the ERP arrive as UTF-8, older ones as Windows-1252.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Spanish exports use semicolons as often as commas; take whichever
/// dominates the first line.
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons >= commas && semicolons > 0 {
        b';'
    } else {
        b','
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(sniff_delimiter("a,b;c;d"), b';');
        assert_eq!(sniff_delimiter("plain"), b',');
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "Almacén" in Windows-1252.
        let bytes = b"Almac\xe9n";
        assert_eq!(decode_text(bytes), "Almacén");
    }

    #[test]
    fn test_decode_utf8_passthrough() {
        assert_eq!(decode_text("Almacén".as_bytes()), "Almacén");
    }

    #[test]
    fn test_convert_cell_variants() {
        assert_eq!(convert_cell(&Data::Empty), Cell::Empty);
        assert_eq!(convert_cell(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(
            convert_cell(&Data::String("Acme".into())),
            Cell::Text("Acme".into())
        );
        assert_eq!(convert_cell(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(convert_cell(&Data::Float(1.5)), Cell::Number(1.5));
        assert_eq!(convert_cell(&Data::Bool(true)), Cell::Bool(true));
    }

    #[test]
    fn test_csv_single_sheet_named_after_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("compras_test_workbook.csv");
        std::fs::write(&path, "Fecha;Proveedor;Kilos\n01/02/2024;Acme;100\n").unwrap();
        let workbook = load_workbook(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(workbook.len(), 1);
        assert_eq!(workbook[0].0, "compras_test_workbook");
        let sheet = &workbook[0].1;
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(*sheet.cell(1, 1), Cell::Text("Acme".into()));
    }
}
