//! Commercial workbook: ventas (required), pedidos and contratos sheets.
//!
//! This workbook spans several years, so every section groups by
//! (month, year); month-only grouping would silently merge
//! January-2024 with January-2025 figures.

use crate::aggregate::{aggregate, GroupSpec};
use crate::columns::{ColumnMap, CONTRACTS, ORDERS, SALES};
use crate::envelope::{Metadata, ParseResult, ParsedDocument, Section};
use crate::extract::derive_period;
use crate::sheet::{find_sheet, MatchTier, Workbook};

use super::extract_sheet;

static VENTAS_SPEC: GroupSpec = GroupSpec {
    by_year: true,
    secondary: Some("cliente"),
    sum_fields: &["base", "iva", "total"],
    mean_fields: &[],
    star_field: "total",
};

static PEDIDOS_SPEC: GroupSpec = GroupSpec {
    by_year: true,
    secondary: Some("cliente"),
    sum_fields: &["importe"],
    mean_fields: &[],
    star_field: "importe",
};

static CONTRATOS_SPEC: GroupSpec = GroupSpec {
    by_year: true,
    secondary: Some("cliente"),
    sum_fields: &["importe_anual"],
    mean_fields: &[],
    star_field: "importe_anual",
};

struct SheetPlan {
    exact: &'static str,
    keywords: &'static [&'static str],
    /// The usual label carries extra text ("Ventas 2024"), so a keyword
    /// match is the normal path, not a degradation worth warning about.
    keyword_expected: bool,
    map: &'static ColumnMap,
    spec: &'static GroupSpec,
}

static PLANS: [SheetPlan; 3] = [
    SheetPlan {
        exact: "Ventas",
        keywords: &["ventas"],
        keyword_expected: true,
        map: &SALES,
        spec: &VENTAS_SPEC,
    },
    SheetPlan {
        exact: "Pedidos",
        keywords: &["pedidos"],
        keyword_expected: false,
        map: &ORDERS,
        spec: &PEDIDOS_SPEC,
    },
    SheetPlan {
        exact: "Contratos",
        keywords: &["contratos"],
        keyword_expected: false,
        map: &CONTRACTS,
        spec: &CONTRATOS_SPEC,
    },
];

pub fn parse(workbook: &Workbook) -> ParseResult {
    let mut metadata = Metadata::default();
    let mut sections: Vec<Section> = Vec::with_capacity(PLANS.len());

    for plan in &PLANS {
        let mut lookup_warnings = Vec::new();
        let found = find_sheet(workbook, plan.exact, plan.keywords, None, &mut lookup_warnings);
        match &found {
            Some((_, _, MatchTier::Keyword)) if plan.keyword_expected => {}
            _ => metadata.warnings.append(&mut lookup_warnings),
        }
        let Some((name, sheet, _)) = found else {
            metadata
                .errors
                .push(format!("sheet '{}' not found", plan.exact));
            sections.push(Section { rows: 0, summaries: vec![] });
            continue;
        };

        match extract_sheet(sheet, plan.map, &mut metadata.warnings) {
            Ok((records, skipped)) => {
                metadata.sheets.push(name.to_string());
                metadata.rows_skipped += skipped;
                let records = derive_period(records, "fecha", &mut metadata.warnings);
                metadata.rows_parsed += records.len();
                if metadata.date_range.is_none() {
                    metadata.date_range = Metadata::record_date_range(&records, "fecha");
                }
                let summaries = aggregate(&records, plan.spec).into_values().collect();
                sections.push(Section {
                    rows: records.len(),
                    summaries,
                });
            }
            Err(structural) => {
                metadata.errors.push(structural);
                sections.push(Section { rows: 0, summaries: vec![] });
            }
        }
    }

    let mut it = sections.into_iter();
    let (ventas, pedidos, contratos) = (
        it.next().unwrap_or(Section { rows: 0, summaries: vec![] }),
        it.next().unwrap_or(Section { rows: 0, summaries: vec![] }),
        it.next().unwrap_or(Section { rows: 0, summaries: vec![] }),
    );

    // Ventas is the required sheet: without it the document is unusable.
    if ventas.rows == 0 {
        return ParseResult::error("no valid records in required sheet 'Ventas'", metadata);
    }

    let parsed = 3 - metadata.errors.len().min(3);
    let message = format!("{} of 3 sheets parsed", parsed);
    ParseResult::with_data(
        ParsedDocument::Comercial {
            ventas,
            pedidos,
            contratos,
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

    fn ventas_sheet(rows: Vec<Vec<Cell>>) -> RawSheet {
        let mut all = vec![
            vec![text("VENTAS")],
            vec![
                text("Fecha"),
                text("Cliente"),
                text("Concepto"),
                text("Base"),
                text("IVA"),
                text("Total"),
            ],
        ];
        all.extend(rows);
        RawSheet::new(all)
    }

    fn venta(fecha: &str, cliente: &str, total: f64) -> Vec<Cell> {
        vec![
            text(fecha),
            text(cliente),
            text("venta"),
            num(total / 1.21),
            num(total - total / 1.21),
            num(total),
        ]
    }

    fn pedidos_sheet() -> RawSheet {
        RawSheet::new(vec![
            vec![text("PEDIDOS")],
            vec![text("Fecha"), text("Nº"), text("Cliente"), text("Importe")],
            vec![text("20/01/2024"), text("P-001"), text("Uno"), num(50.0)],
        ])
    }

    fn contratos_sheet() -> RawSheet {
        RawSheet::new(vec![
            vec![text("CONTRATOS")],
            vec![text("Fecha"), text("Cliente"), text("Descripción"), text("Importe anual")],
            vec![text("01/01/2024"), text("Uno"), text("mantenimiento"), num(1200.0)],
        ])
    }

    #[test]
    fn test_all_three_sheets_success() {
        let workbook: Workbook = vec![
            (
                "Ventas 2024".to_string(),
                ventas_sheet(vec![venta("15/01/2024", "Uno", 121.0)]),
            ),
            ("Pedidos".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        let Some(ParsedDocument::Comercial { ventas, pedidos, contratos }) = result.data else {
            panic!("expected comercial payload");
        };
        assert_eq!(ventas.rows, 1);
        assert_eq!(pedidos.rows, 1);
        assert_eq!(contratos.rows, 1);
        assert_eq!(result.metadata.sheets.len(), 3);
    }

    #[test]
    fn test_missing_ventas_is_error() {
        let workbook: Workbook = vec![
            ("Pedidos".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Error);
        assert!(result.metadata.errors.iter().any(|e| e.contains("Ventas")));
    }

    #[test]
    fn test_multi_year_summaries_stay_separate() {
        let workbook: Workbook = vec![
            (
                "Ventas".to_string(),
                ventas_sheet(vec![
                    venta("15/01/2024", "Uno", 100.0),
                    venta("15/01/2025", "Uno", 50.0),
                ]),
            ),
            ("Pedidos".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        let Some(ParsedDocument::Comercial { ventas, .. }) = result.data else {
            panic!("expected comercial payload");
        };
        assert_eq!(ventas.summaries.len(), 2);
        assert_eq!(ventas.summaries[0].year, Some(2024));
        assert_eq!(ventas.summaries[1].year, Some(2025));
        assert_eq!(ventas.summaries[0].sums["total"], 100.0);
        assert_eq!(ventas.summaries[1].sums["total"], 50.0);
    }

    #[test]
    fn test_ventas_year_label_parses_without_warning() {
        // "Ventas 2024" is the normal sales sheet label; resolving it
        // through the keyword tier must not pollute the warnings.
        let workbook: Workbook = vec![
            (
                "Ventas 2024".to_string(),
                ventas_sheet(vec![venta("15/01/2024", "Uno", 121.0)]),
            ),
            ("Pedidos".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert!(result.metadata.warnings.is_empty());
    }

    #[test]
    fn test_pedidos_keyword_match_still_recorded() {
        let workbook: Workbook = vec![
            (
                "Ventas 2024".to_string(),
                ventas_sheet(vec![venta("15/01/2024", "Uno", 121.0)]),
            ),
            ("Pedidos clientes".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        assert_eq!(result.status, ParseStatus::Success);
        assert!(result
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("matched 'Pedidos clientes' by keyword")));
    }

    #[test]
    fn test_date_range_reported() {
        let workbook: Workbook = vec![
            (
                "Ventas".to_string(),
                ventas_sheet(vec![
                    venta("15/01/2024", "Uno", 100.0),
                    venta("20/06/2024", "Dos", 50.0),
                ]),
            ),
            ("Pedidos".to_string(), pedidos_sheet()),
            ("Contratos".to_string(), contratos_sheet()),
        ];
        let result = parse(&workbook);
        let (min, max) = result.metadata.date_range.unwrap();
        assert_eq!(min, chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(max, chrono::NaiveDate::from_ymd_opt(2024, 6, 20).unwrap());
    }
}
