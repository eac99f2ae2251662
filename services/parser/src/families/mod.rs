//! Family pipelines: one module per document family, each wiring
//! locate → map → extract → aggregate into a `ParseResult`.
//!
//! The dispatch function is the core's outer boundary: it always returns
//! an envelope. Expected data problems become envelope errors/warnings;
//! nothing propagates to the caller as a Rust error.

mod comercial;
mod compras;
mod inventario;
mod nomina;

use clap::ValueEnum;
use serde::Serialize;

use crate::columns::ColumnMap;
use crate::envelope::ParseResult;
use crate::extract::{extract_rows, Record};
use crate::sheet::{locate_header, RawSheet, Workbook, MIN_ROWS};

/// The document families this dashboard understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Payroll workbook: one cost sheet per month plus incident text.
    Nomina,
    /// Commercial workbook: ventas, pedidos and contratos sheets.
    Comercial,
    /// Purchases listing with weight/price/value columns.
    Compras,
    /// Stock snapshot, one of two layouts.
    Inventario,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Nomina => "nomina",
            Family::Comercial => "comercial",
            Family::Compras => "compras",
            Family::Inventario => "inventario",
        }
    }
}

/// Parse one workbook as the given family. `year` is the workbook year
/// for single-year families (nomina); multi-year families read the year
/// from each row's date.
pub fn parse(family: Family, workbook: &Workbook, year: Option<i32>) -> ParseResult {
    match family {
        Family::Nomina => nomina::parse(workbook, year),
        Family::Comercial => comercial::parse(workbook),
        Family::Compras => compras::parse(workbook),
        Family::Inventario => inventario::parse(workbook),
    }
}

/// Structural checks plus extraction for one sheet against one map.
/// Returns Err with a structural error message (insufficient rows, header
/// not found, missing columns); those are fatal for the sheet, not rows.
pub(crate) fn extract_sheet(
    sheet: &RawSheet,
    map: &ColumnMap,
    warnings: &mut Vec<String>,
) -> Result<(Vec<Record>, usize), String> {
    if sheet.row_count() < MIN_ROWS {
        return Err(format!(
            "{}: insufficient rows ({} found, at least {} needed)",
            map.name,
            sheet.row_count(),
            MIN_ROWS
        ));
    }
    let header = locate_header(sheet, map.header)
        .ok_or_else(|| format!("{}: header row not found", map.name))?;
    map.check_columns(sheet.column_count())?;
    Ok(extract_rows(sheet, header, map, warnings))
}

// =============================================================================
// TESTS - cross-family envelope behavior
// =============================================================================
