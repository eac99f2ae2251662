//! Payroll workbook: one cost sheet per month (sheets named "Enero" ..
//! "Diciembre") plus an incident sheet of free text.
//!
//! Incident lines are matched against a movement pattern (alta/baja with
//! employee, date and optional reason). Lines that do not match are kept
//! verbatim as observations; payroll text is never discarded.

use std::sync::OnceLock;

use regex::Regex;

use crate::aggregate::{aggregate, GroupSpec};
use crate::columns::{PAYROLL_COSTS, PAYROLL_OBSERVATIONS};
use crate::envelope::{
    Metadata, Movement, MovementKind, Observation, ParseResult, ParsedDocument, Section,
};
use crate::extract::Value;
use crate::normalize::{month_from_name, parse_date_string};
use crate::sheet::{find_sheet, Workbook};

use super::extract_sheet;

static COSTES_SPEC: GroupSpec = GroupSpec {
    by_year: false,
    secondary: Some("departamento"),
    sum_fields: &["salario_base", "complementos", "seguridad_social", "coste_total"],
    mean_fields: &[],
    star_field: "coste_total",
};

/// "Alta de María López el 03/02/2025: sustitución" or
/// "Baja Juan Pérez el 15/6/2025 - fin de contrato".
fn movement_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(alta|baja)\s+(?:de\s+)?(.+?)\s+el\s+(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\s*(?:[:\-]\s*(.+))?$")
            .expect("movement pattern is a valid regex")
    })
}

pub fn parse(workbook: &Workbook, year: Option<i32>) -> ParseResult {
    let mut metadata = Metadata::default();

    let Some(year) = year else {
        return ParseResult::error("nomina parsing requires the workbook year", metadata);
    };

    // Month sheets in workbook order; the sheet name is the month.
    let mut records = Vec::new();
    let mut month_sheets = 0usize;
    for (name, sheet) in workbook {
        let Some(month) = month_from_name(name) else {
            continue;
        };
        match extract_sheet(sheet, &PAYROLL_COSTS, &mut metadata.warnings) {
            Ok((mut sheet_records, skipped)) => {
                month_sheets += 1;
                metadata.sheets.push(name.clone());
                metadata.rows_skipped += skipped;
                for record in &mut sheet_records {
                    record.set("mes", Value::Month(month));
                    record.set("anio", Value::Year(year));
                }
                records.extend(sheet_records);
            }
            Err(structural) => {
                metadata.errors.push(format!("{}: {}", name, structural));
            }
        }
    }

    if month_sheets == 0 || records.is_empty() {
        return ParseResult::error("no monthly cost sheets with valid records found", metadata);
    }
    metadata.rows_parsed = records.len();

    // Incident sheet is expected but not required for the costs to be
    // usable; a missing one degrades the result to partial success.
    let mut movimientos = Vec::new();
    let mut observaciones = Vec::new();
    let incidencias = find_sheet(
        workbook,
        "Incidencias",
        &["incidencias"],
        None,
        &mut metadata.warnings,
    )
    .or_else(|| find_sheet(workbook, "Observaciones", &["observaciones"], None, &mut metadata.warnings));

    match incidencias {
        Some((name, sheet, _)) => {
            match extract_sheet(sheet, &PAYROLL_OBSERVATIONS, &mut metadata.warnings) {
                Ok((texts, skipped)) => {
                    metadata.sheets.push(name.to_string());
                    metadata.rows_skipped += skipped;
                    for record in &texts {
                        if let Some(text) = record.text("texto") {
                            match parse_movement(text, record.source_row) {
                                Some(movement) => movimientos.push(movement),
                                None => observaciones.push(Observation {
                                    text: text.to_string(),
                                    source_row: record.source_row,
                                }),
                            }
                        }
                    }
                }
                Err(structural) => metadata.errors.push(format!("{}: {}", name, structural)),
            }
        }
        None => {
            metadata.errors.push("sheet 'Incidencias' not found".to_string());
        }
    }

    let summaries = aggregate(&records, &COSTES_SPEC).into_values().collect();
    let message = format!(
        "{} month sheets, {} cost records, {} movements",
        month_sheets,
        records.len(),
        movimientos.len()
    );
    ParseResult::with_data(
        ParsedDocument::Nomina {
            year,
            costes: Section {
                rows: records.len(),
                summaries,
            },
            movimientos,
            observaciones,
        },
        metadata,
        message,
    )
}

/// Structure a free-text incident line. None means the line carries no
/// recognizable movement and stays as a generic observation.
fn parse_movement(text: &str, source_row: usize) -> Option<Movement> {
    let caps = movement_regex().captures(text.trim())?;
    let movement = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "alta" => MovementKind::Hire,
        _ => MovementKind::Termination,
    };
    let employee = caps.get(2)?.as_str().trim().to_string();
    let date = parse_date_string(caps.get(3)?.as_str());
    let reason = caps
        .get(4)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    Some(Movement {
        date,
        movement,
        employee,
        reason,
        source_row,
    })
}

// =============================================================================
// TESTS
// =============================================================================
