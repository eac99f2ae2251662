//! The parse result envelope.
//!
//! Every family pipeline returns a `ParseResult`, never an error: hard
//! failures (missing sheet, missing columns) land in `metadata.errors` and
//! drive the status, soft issues land in `metadata.warnings`. Downstream
//! consumers branch on `status` only.

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::MonthlySummary;
use crate::extract::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Success,
    PartialSuccess,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Hard failures: missing required sheet, missing columns.
    pub errors: Vec<String>,
    /// Soft issues: bad cells, fallback matches, applied corrections.
    pub warnings: Vec<String>,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    /// Worksheet names actually used, in the order they were resolved.
    pub sheets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl Metadata {
    /// Observed date range over a record set's date field.
    pub fn record_date_range(records: &[Record], field: &str) -> Option<(NaiveDate, NaiveDate)> {
        let dates: Vec<NaiveDate> = records
            .iter()
            .filter_map(|r| r.get(field).and_then(crate::extract::Value::as_date))
            .collect();
        let min = dates.iter().min()?;
        let max = dates.iter().max()?;
        Some((*min, *max))
    }
}

/// One aggregated worksheet section inside a family payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub rows: usize,
    pub summaries: Vec<MonthlySummary>,
}

/// A structured payroll movement extracted from incident free text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub movement: MovementKind,
    pub employee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub source_row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Hire,
    Termination,
}

/// Incident text that did not match the movement pattern. Kept verbatim;
/// the payroll team reads these by hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub text: String,
    pub source_row: usize,
}

/// Inventory snapshot totals (inventory has no monthly axis).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryTotals {
    pub rows: usize,
    pub total_units: f64,
    pub total_value: f64,
    /// Grouping field the totals below are keyed by (familia or almacen).
    pub group_field: String,
    pub by_group: Vec<GroupTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub name: String,
    pub units: f64,
    pub value: f64,
}

/// Family-specific payload, tagged for the API/dashboard side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ParsedDocument {
    Nomina {
        year: i32,
        costes: Section,
        movimientos: Vec<Movement>,
        observaciones: Vec<Observation>,
    },
    Comercial {
        ventas: Section,
        pedidos: Section,
        contratos: Section,
    },
    Compras {
        compras: Section,
    },
    Inventario {
        layout: String,
        totals: InventoryTotals,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub status: ParseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ParsedDocument>,
    pub metadata: Metadata,
}

impl ParseResult {
    /// Terminal failure: no usable data at all.
    pub fn error(message: impl Into<String>, mut metadata: Metadata) -> Self {
        let message = message.into();
        if !metadata.errors.contains(&message) {
            metadata.errors.push(message.clone());
        }
        Self {
            status: ParseStatus::Error,
            message,
            data: None,
            metadata,
        }
    }

    /// Success/partial-success depending on whether hard errors were
    /// recorded alongside usable data.
    pub fn with_data(data: ParsedDocument, metadata: Metadata, message: impl Into<String>) -> Self {
        let status = if metadata.errors.is_empty() {
            ParseStatus::Success
        } else {
            ParseStatus::PartialSuccess
        };
        Self {
            status,
            message: message.into(),
            data: Some(data),
            metadata,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
