//! Stock snapshot: one sheet, two layouts in circulation.
//!
//! The older valued-stock export has a fixed two-row preamble; the newer
//! per-warehouse export is found by keyword. The valued layout is tried
//! first and the warehouse layout is the fallback, with the fallback
//! recorded as a warning. Inventory has no monthly axis, so the payload
//! is snapshot totals grouped by familia or almacén.

use crate::columns::{ColumnMap, INVENTORY_VALUED, INVENTORY_WAREHOUSE};
use crate::envelope::{GroupTotal, InventoryTotals, Metadata, ParseResult, ParsedDocument};
use crate::extract::Record;
use crate::sheet::{find_sheet, Workbook};

use super::extract_sheet;

struct Layout {
    map: &'static ColumnMap,
    group_field: &'static str,
    units_field: &'static str,
    value_field: &'static str,
}

static VALUED: Layout = Layout {
    map: &INVENTORY_VALUED,
    group_field: "familia",
    units_field: "unidades",
    value_field: "valor_total",
};

static WAREHOUSE: Layout = Layout {
    map: &INVENTORY_WAREHOUSE,
    group_field: "almacen",
    units_field: "unidades",
    value_field: "valor",
};

pub fn parse(workbook: &Workbook) -> ParseResult {
    let mut metadata = Metadata::default();

    let found = find_sheet(
        workbook,
        "Inventario",
        &["inventario", "stock", "existencias"],
        Some(0),
        &mut metadata.warnings,
    );
    let Some((name, sheet, _)) = found else {
        return ParseResult::error("sheet 'Inventario' not found", metadata);
    };
    metadata.sheets.push(name.to_string());

    // Valued layout first; any structural failure or empty result falls
    // through to the warehouse layout.
    let valued = extract_sheet(sheet, VALUED.map, &mut metadata.warnings);
    let (layout, records, skipped) = match valued {
        Ok((records, skipped)) if !records.is_empty() => (&VALUED, records, skipped),
        first_attempt => {
            metadata.warnings.push(format!(
                "layout '{}' not detected, trying '{}'",
                VALUED.map.name, WAREHOUSE.map.name
            ));
            match extract_sheet(sheet, WAREHOUSE.map, &mut metadata.warnings) {
                Ok((records, skipped)) if !records.is_empty() => (&WAREHOUSE, records, skipped),
                _ => {
                    if let Err(structural) = first_attempt {
                        metadata.errors.push(structural);
                    }
                    return ParseResult::error(
                        "no valid records under either inventory layout",
                        metadata,
                    );
                }
            }
        }
    };

    metadata.rows_parsed = records.len();
    metadata.rows_skipped += skipped;

    let totals = totalize(&records, layout);
    let message = format!("{} stock lines ({})", records.len(), layout.map.name);
    ParseResult::with_data(
        ParsedDocument::Inventario {
            layout: layout.map.name.to_string(),
            totals,
        },
        metadata,
        message,
    )
}

/// Snapshot totals plus per-group breakdown, largest value first.
fn totalize(records: &[Record], layout: &Layout) -> InventoryTotals {
    let mut by_group: Vec<GroupTotal> = Vec::new();
    let mut total_units = 0.0;
    let mut total_value = 0.0;

    for record in records {
        let units = record.number(layout.units_field);
        let value = record.number(layout.value_field);
        total_units += units;
        total_value += value;

        let group = record.text(layout.group_field).unwrap_or("(sin grupo)");
        match by_group.iter_mut().find(|g| g.name == group) {
            Some(g) => {
                g.units += units;
                g.value += value;
            }
            None => by_group.push(GroupTotal {
                name: group.to_string(),
                units,
                value,
            }),
        }
    }

    // Stable sort keeps first-encountered order among equal values.
    by_group.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));

    InventoryTotals {
        rows: records.len(),
        total_units,
        total_value,
        group_field: layout.group_field.to_string(),
        by_group,
    }
}

// =============================================================================
// TESTS
// =============================================================================
