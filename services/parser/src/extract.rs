//! Row extraction and validation.
//!
//! Rows after the header are coerced field by field against a `ColumnMap`.
//! Rows missing identity or value fields are dropped silently: trailing
//! blanks and subtotal lines are a fact of life in these workbooks, not a
//! data-quality event. Rows with a rejected month/year are dropped with a
//! warning naming the row; a single bad row never aborts a parse.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::columns::{Coercion, ColumnMap};
use crate::normalize;
use crate::sheet::RawSheet;

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Month(u32),
    Year(i32),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_month(&self) -> Option<u32> {
        match self {
            Value::Month(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_year(&self) -> Option<i32> {
        match self {
            Value::Year(y) => Some(*y),
            _ => None,
        }
    }
}

/// One validated data row, tagged with its 1-based source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// 1-based spreadsheet row the record came from.
    pub source_row: usize,
    pub fields: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn number(&self, field: &str) -> f64 {
        self.get(field).and_then(Value::as_number).unwrap_or(0.0)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }

    pub fn set(&mut self, field: &'static str, value: Value) {
        self.fields.insert(field, value);
    }
}

/// Extract and validate every row after `header_row`. Returns the retained
/// records and the number of rows dropped (silently or otherwise).
pub fn extract_rows(
    sheet: &RawSheet,
    header_row: usize,
    map: &ColumnMap,
    warnings: &mut Vec<String>,
) -> (Vec<Record>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;

    for row_idx in (header_row + 1)..sheet.row_count() {
        match extract_one(sheet, row_idx, map, warnings) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    (records, skipped)
}

fn extract_one(
    sheet: &RawSheet,
    row_idx: usize,
    map: &ColumnMap,
    warnings: &mut Vec<String>,
) -> Option<Record> {
    let source_row = row_idx + 1;
    let mut fields = BTreeMap::new();

    for (col, name, coercion) in map.fields {
        let cell = sheet.cell(row_idx, *col);
        match coercion {
            Coercion::Text => {
                if let Some(t) = cell.as_text() {
                    fields.insert(*name, Value::Text(t.to_string()));
                }
            }
            Coercion::Number => {
                if !cell.is_empty() {
                    let n = normalize::coerce_number(cell, source_row, name, warnings);
                    fields.insert(*name, Value::Number(n));
                }
            }
            Coercion::Date => {
                if let Some(d) = normalize::coerce_date(cell, source_row, warnings) {
                    fields.insert(*name, Value::Date(d));
                }
            }
            Coercion::Month => {
                if !cell.is_empty() {
                    match normalize::coerce_month(cell) {
                        Some(m) => {
                            fields.insert(*name, Value::Month(m));
                        }
                        None => {
                            warnings.push(format!(
                                "row {}: month out of range in '{}', row dropped",
                                source_row, name
                            ));
                            return None;
                        }
                    }
                }
            }
            Coercion::Year => {
                if !cell.is_empty() {
                    match normalize::coerce_year(cell) {
                        Some(y) => {
                            fields.insert(*name, Value::Year(y));
                        }
                        None => {
                            warnings.push(format!(
                                "row {}: year out of range in '{}', row dropped",
                                source_row, name
                            ));
                            return None;
                        }
                    }
                }
            }
        }
    }

    let record = Record { source_row, fields };
    if is_valid(&record, map) {
        Some(record)
    } else {
        // Blank or subtotal row: dropped without a warning by design.
        None
    }
}

/// The retention invariant: all identity fields present and non-empty, at
/// least one value field non-zero / non-empty.
pub fn is_valid(record: &Record, map: &ColumnMap) -> bool {
    let identity_ok = map.identity.iter().all(|f| match record.get(f) {
        Some(Value::Text(s)) => !s.trim().is_empty(),
        Some(_) => true,
        None => false,
    });
    if !identity_ok {
        return false;
    }

    map.value.iter().any(|f| match record.get(f) {
        Some(Value::Number(n)) => *n != 0.0,
        Some(Value::Text(s)) => !s.trim().is_empty(),
        Some(_) => true,
        None => false,
    })
}

/// Derive `mes`/`anio` fields from a date field, dropping (with a warning)
/// records that carry no usable date. Multi-year workbooks must group by
/// (month, year); this is where both fields come from.
pub fn derive_period(
    records: Vec<Record>,
    date_field: &str,
    warnings: &mut Vec<String>,
) -> Vec<Record> {
    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        match record.get(date_field).and_then(Value::as_date) {
            Some(date) => {
                record.set("mes", Value::Month(date.month()));
                record.set("anio", Value::Year(date.year()));
                kept.push(record);
            }
            None => {
                warnings.push(format!(
                    "row {}: no usable date in '{}', row dropped",
                    record.source_row, date_field
                ));
            }
        }
    }
    kept
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{PURCHASES, SALES};
    use crate::sheet::Cell;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn num(n: f64) -> Cell {
        Cell::Number(n)
    }

    /// A purchases-shaped sheet: title row, header at row 1 (keyword
    /// "proveedor"), then data.
    fn purchases_sheet(data_rows: Vec<Vec<Cell>>) -> RawSheet {
        let mut rows = vec![
            vec![text("COMPRAS")],
            vec![
                text("Fecha"),
                text("Proveedor"),
                text("Material"),
                text("Kilos"),
                text("Precio/kg"),
                text("Valor"),
            ],
        ];
        rows.extend(data_rows);
        RawSheet::new(rows)
    }

    fn purchase_row(fecha: &str, proveedor: &str, kilos: f64, precio: f64, valor: f64) -> Vec<Cell> {
        vec![
            text(fecha),
            text(proveedor),
            text("chatarra"),
            num(kilos),
            num(precio),
            num(valor),
        ]
    }

    // -------------------------------------------------------------------------
    // RETENTION INVARIANT TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_valid_row_retained() {
        let sheet = purchases_sheet(vec![purchase_row("01/02/2024", "Acme", 100.0, 1.3, 130.0)]);
        let mut w = Vec::new();
        let (records, skipped) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 0);
        assert_eq!(records[0].source_row, 3);
        assert_eq!(records[0].text("proveedor"), Some("Acme"));
        assert_eq!(records[0].number("valor"), 130.0);
    }

    #[test]
    fn test_blank_rows_dropped_silently() {
        let sheet = purchases_sheet(vec![
            purchase_row("01/02/2024", "Acme", 100.0, 1.3, 130.0),
            vec![],
            vec![Cell::Empty, Cell::Empty, Cell::Empty],
        ]);
        let mut w = Vec::new();
        let (records, skipped) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
        // Blank rows are normal, not warnings.
        assert!(w.is_empty());
    }

    #[test]
    fn test_subtotal_row_without_identity_dropped() {
        // A totals row has amounts but no provider name.
        let sheet = purchases_sheet(vec![
            purchase_row("01/02/2024", "Acme", 100.0, 1.3, 130.0),
            vec![text(""), text(""), text("TOTAL"), num(100.0), Cell::Empty, num(130.0)],
        ]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_row_with_zero_values_dropped() {
        let sheet = purchases_sheet(vec![purchase_row("01/02/2024", "Acme", 0.0, 0.0, 0.0)]);
        let mut w = Vec::new();
        let (records, skipped) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        assert!(records.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_any_value_field_nonzero_retains() {
        // valor missing but kilos > 0: still a purchase.
        let sheet = purchases_sheet(vec![vec![
            text("01/02/2024"),
            text("Acme"),
            text("chatarra"),
            num(50.0),
            Cell::Empty,
            Cell::Empty,
        ]]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("kilos"), 50.0);
    }

    #[test]
    fn test_retained_records_satisfy_invariant() {
        let sheet = purchases_sheet(vec![
            purchase_row("01/02/2024", "Acme", 100.0, 1.3, 130.0),
            vec![],
            purchase_row("05/02/2024", "Metalsa", 0.0, 0.0, 0.0),
            purchase_row("09/02/2024", "Hierro SA", 20.0, 2.0, 40.0),
        ]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        for r in &records {
            assert!(is_valid(r, &PURCHASES));
        }
        assert_eq!(records.len(), 2);
    }

    // -------------------------------------------------------------------------
    // MALFORMED ROW RESILIENCE
    // -------------------------------------------------------------------------

    #[test]
    fn test_corrupt_cell_warns_but_keeps_row() {
        let mut data = Vec::new();
        for i in 0..20 {
            let mut row = purchase_row("01/02/2024", &format!("Prov {}", i), 10.0, 1.0, 10.0);
            if i == 2 {
                // Row 5 of the sheet (2 preamble rows + index 2).
                row[5] = text("##ERROR##");
            }
            data.push(row);
        }
        let sheet = purchases_sheet(data);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        // The corrupt valor defaults to 0 but kilos keeps the row alive.
        assert_eq!(records.len(), 20);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("row 5"));
    }

    #[test]
    fn test_one_bad_row_of_twenty_drops_only_that_row() {
        let mut data = Vec::new();
        for i in 0..20 {
            let mut row = purchase_row("01/02/2024", &format!("Prov {}", i), 10.0, 1.0, 10.0);
            if i == 2 {
                row[0] = text("##ERROR##");
            }
            data.push(row);
        }
        let sheet = purchases_sheet(data);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        let records = derive_period(records, "fecha", &mut w);
        // 19 of 20 survive; the parse as a whole does not fail.
        assert_eq!(records.len(), 19);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("row 5"));
    }

    // -------------------------------------------------------------------------
    // PERIOD DERIVATION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_derive_period_sets_month_and_year() {
        let sheet = purchases_sheet(vec![purchase_row("15/03/2024", "Acme", 10.0, 1.0, 10.0)]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        let records = derive_period(records, "fecha", &mut w);
        assert_eq!(records[0].get("mes").and_then(Value::as_month), Some(3));
        assert_eq!(records[0].get("anio").and_then(Value::as_year), Some(2024));
    }

    #[test]
    fn test_derive_period_drops_dateless_with_warning() {
        let sheet = purchases_sheet(vec![vec![
            Cell::Empty,
            text("Acme"),
            text("chatarra"),
            num(10.0),
            num(1.0),
            num(10.0),
        ]]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &PURCHASES, &mut w);
        let records = derive_period(records, "fecha", &mut w);
        assert!(records.is_empty());
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("no usable date"));
    }

    // -------------------------------------------------------------------------
    // SALES SHAPE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_sales_locale_amounts() {
        let sheet = RawSheet::new(vec![
            vec![text("VENTAS 2024")],
            vec![
                text("Fecha"),
                text("Cliente"),
                text("Concepto"),
                text("Base"),
                text("IVA"),
                text("Total"),
            ],
            vec![
                text("07/1/25"),
                text("Cliente Uno"),
                text("venta"),
                text("2.234,00"),
                text("469,14"),
                text("2.703,14"),
            ],
        ]);
        let mut w = Vec::new();
        let (records, _) = extract_rows(&sheet, 1, &SALES, &mut w);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("total"), 2703.14);
        assert_eq!(
            records[0].get("fecha").and_then(Value::as_date),
            chrono::NaiveDate::from_ymd_opt(2025, 1, 7)
        );
    }
}
