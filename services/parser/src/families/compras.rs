//! Purchases listing: a single sheet whose header is found by the
//! "proveedor" keyword. Carries the kilos/precio/valor consistency
//! heuristic: a handful of rows with a miskeyed valor get recomputed from
//! weight × price, within configurable thresholds.

use crate::aggregate::{aggregate, reconcile_derived_value, CorrectionPolicy, GroupSpec};
use crate::columns::PURCHASES;
use crate::envelope::{Metadata, ParseResult, ParsedDocument, Section};
use crate::extract::derive_period;
use crate::sheet::{find_sheet, Workbook};

use super::extract_sheet;

static COMPRAS_SPEC: GroupSpec = GroupSpec {
    by_year: true,
    secondary: Some("proveedor"),
    sum_fields: &["kilos", "valor"],
    mean_fields: &["precio_kg"],
    star_field: "valor",
};

pub fn parse(workbook: &Workbook) -> ParseResult {
    parse_with_policy(workbook, &CorrectionPolicy::default())
}

pub fn parse_with_policy(workbook: &Workbook, policy: &CorrectionPolicy) -> ParseResult {
    let mut metadata = Metadata::default();

    let found = find_sheet(
        workbook,
        "Compras",
        &["compras"],
        Some(0),
        &mut metadata.warnings,
    );
    let Some((name, sheet, _)) = found else {
        return ParseResult::error("sheet 'Compras' not found", metadata);
    };
    let name = name.to_string();

    let (records, skipped) = match extract_sheet(sheet, &PURCHASES, &mut metadata.warnings) {
        Ok(out) => out,
        Err(structural) => return ParseResult::error(structural, metadata),
    };
    metadata.sheets.push(name);
    metadata.rows_skipped += skipped;

    let mut records = derive_period(records, "fecha", &mut metadata.warnings);
    if records.is_empty() {
        return ParseResult::error("no valid records in required sheet 'Compras'", metadata);
    }

    reconcile_derived_value(
        &mut records,
        "kilos",
        "precio_kg",
        "valor",
        policy,
        &mut metadata.warnings,
    );

    metadata.rows_parsed = records.len();
    metadata.date_range = Metadata::record_date_range(&records, "fecha");

    let summaries = aggregate(&records, &COMPRAS_SPEC).into_values().collect();
    let message = format!("{} purchase records parsed", records.len());
    ParseResult::with_data(
        ParsedDocument::Compras {
            compras: Section {
                rows: records.len(),
                summaries,
            },
        },
        metadata,
        message,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ParseStatus;
    use crate::sheet::{Cell, RawSheet};

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn num(n: f64) -> Cell {
        Cell::Number(n)
    }

    fn compras_sheet(rows: Vec<Vec<Cell>>) -> RawSheet {
        let mut all = vec![
            vec![text("LISTADO DE COMPRAS")],
            vec![
                text("Fecha"),
                text("Proveedor"),
                text("Material"),
                text("Kilos"),
                text("Precio/kg"),
                text("Valor"),
            ],
        ];
        all.extend(rows);
        RawSheet::new(all)
    }

    fn compra(fecha: &str, proveedor: &str, kilos: f64, precio: f64, valor: f64) -> Vec<Cell> {
        vec![
            text(fecha),
            text(proveedor),
            text("chatarra"),
            num(kilos),
            num(precio),
            num(valor),
        ]
    }

    #[test]
    fn test_basic_parse_success() {
        let workbook: Workbook = vec![(
            "Compras".to_string(),
            compras_sheet(vec![
                compra("15/01/2024", "Acme", 100.0, 1.5, 150.0),
                compra("20/01/2024", "Metalsa", 200.0, 1.2, 240.0),
            ]),
        )];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert_eq!(result.metadata.rows_parsed, 2);
        let Some(ParsedDocument::Compras { compras }) = result.data else {
            panic!("expected compras payload");
        };
        let january = &compras.summaries[0];
        assert_eq!(january.sums["kilos"], 300.0);
        assert_eq!(january.sums["valor"], 390.0);
        assert_eq!(january.means["precio_kg"], 1.35);
        assert_eq!(january.star.as_ref().unwrap().name, "Metalsa");
    }

    #[test]
    fn test_header_found_by_keyword_scan() {
        // Two preamble rows before the header row; the keyword rule finds it.
        let sheet = RawSheet::new(vec![
            vec![text("Empresa S.L.")],
            vec![text("COMPRAS 2024")],
            vec![
                text("Fecha"),
                text("Proveedor"),
                text("Material"),
                text("Kilos"),
                text("Precio/kg"),
                text("Valor"),
            ],
            compra("15/01/2024", "Acme", 100.0, 1.5, 150.0),
        ]);
        let workbook: Workbook = vec![("Compras".to_string(), sheet)];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert_eq!(result.metadata.rows_parsed, 1);
    }

    #[test]
    fn test_missing_sheet_is_error() {
        let workbook: Workbook = vec![];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Error);
        assert!(result.metadata.errors[0].contains("Compras"));
    }

    #[test]
    fn test_positional_fallback_used_for_unnamed_sheet() {
        let workbook: Workbook = vec![(
            "Hoja1".to_string(),
            compras_sheet(vec![compra("15/01/2024", "Acme", 100.0, 1.5, 150.0)]),
        )];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert!(result
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("falling back")));
    }

    #[test]
    fn test_narrow_sheet_is_missing_columns_error() {
        let sheet = RawSheet::new(vec![
            vec![text("COMPRAS")],
            vec![text("Fecha"), text("Proveedor")],
            vec![text("15/01/2024"), text("Acme")],
        ]);
        let workbook: Workbook = vec![("Compras".to_string(), sheet)];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Error);
        assert!(result.metadata.errors[0].contains("missing columns"));
    }

    #[test]
    fn test_miskeyed_valor_corrected() {
        let mut rows: Vec<Vec<Cell>> = (0..15)
            .map(|i| compra("15/01/2024", &format!("Prov {}", i), 100.0, 1.5, 150.0))
            .collect();
        rows.push(compra("16/01/2024", "Errata SA", 100.0, 1.5, 15000.0));
        let workbook: Workbook = vec![("Compras".to_string(), compras_sheet(rows))];

        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert!(result
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("corrected to 150.00")));
        let Some(ParsedDocument::Compras { compras }) = result.data else {
            panic!("expected compras payload");
        };
        // 16 rows × 150 after correction.
        assert_eq!(compras.summaries[0].sums["valor"], 2400.0);
    }
}
