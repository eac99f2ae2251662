//! Worksheet grid model, header discovery and worksheet lookup.
//!
//! The core works on `RawSheet` grids only; the workbook adapter in
//! `workbook.rs` is the single place that knows about calamine or CSV.

use chrono::NaiveDate;

/// One untyped worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    /// Trimmed non-empty text content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// An immutable row-major grid as read from one worksheet. No header row
/// is assumed; header discovery happens against the raw grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    rows: Vec<Vec<Cell>>,
}

/// Sheets shorter than this cannot hold a header plus data.
pub const MIN_ROWS: usize = 3;

/// Keyword scans look at most this many rows deep.
pub const HEADER_SCAN_ROWS: usize = 10;

impl RawSheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Widest row in the grid; ragged rows are normal in ad-hoc workbooks.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Cell at (row, col); out-of-bounds reads are empty, not errors.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }
}

/// How a document type finds its header row.
#[derive(Debug, Clone, Copy)]
pub enum HeaderRule {
    /// Header is contractually at this 0-based row index.
    FixedOffset(usize),
    /// Scan the first `HEADER_SCAN_ROWS` rows for one containing any of
    /// these needles (case-insensitive substring) in any cell.
    Keyword(&'static [&'static str]),
}

/// Locate the header row. None means the sheet is structurally unusable
/// for this document type.
pub fn locate_header(sheet: &RawSheet, rule: HeaderRule) -> Option<usize> {
    if sheet.row_count() < MIN_ROWS {
        return None;
    }
    match rule {
        HeaderRule::FixedOffset(idx) => {
            // Data must start after the header.
            if idx + 1 < sheet.row_count() {
                Some(idx)
            } else {
                None
            }
        }
        HeaderRule::Keyword(needles) => {
            let limit = sheet.row_count().min(HEADER_SCAN_ROWS);
            (0..limit).find(|&r| {
                sheet.row(r).iter().any(|cell| {
                    cell.as_text().is_some_and(|t| {
                        let lower = t.to_lowercase();
                        needles.iter().any(|n| lower.contains(n))
                    })
                })
            })
        }
    }
}

/// A workbook is an ordered list of named sheets. Order matters: when a
/// keyword matches several sheets, the first in workbook order wins.
pub type Workbook = Vec<(String, RawSheet)>;

/// Which lookup tier found a sheet. Everything below Exact is reported as
/// a warning so operators can see when name matching degraded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchTier {
    Exact,
    Keyword,
    Position,
}

/// Two-phase-plus-positional worksheet lookup: exact case-insensitive
/// name, then case-insensitive substring keywords (alternatives, any one
/// suffices), then (when allowed) a fixed position. Fallback tiers append
/// a warning.
pub fn find_sheet<'a>(
    workbook: &'a Workbook,
    exact: &str,
    keywords: &[&str],
    position: Option<usize>,
    warnings: &mut Vec<String>,
) -> Option<(&'a str, &'a RawSheet, MatchTier)> {
    let exact_lower = exact.to_lowercase();
    if let Some((name, sheet)) = workbook
        .iter()
        .find(|(name, _)| name.to_lowercase() == exact_lower)
    {
        return Some((name, sheet, MatchTier::Exact));
    }

    if !keywords.is_empty() {
        if let Some((name, sheet)) = workbook.iter().find(|(name, _)| {
            let lower = name.to_lowercase();
            keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
        }) {
            warnings.push(format!(
                "sheet '{}' not found, matched '{}' by keyword",
                exact, name
            ));
            return Some((name, sheet, MatchTier::Keyword));
        }
    }

    if let Some(pos) = position {
        if let Some((name, sheet)) = workbook.get(pos) {
            warnings.push(format!(
                "sheet '{}' not found, falling back to sheet #{} ('{}')",
                exact,
                pos + 1,
                name
            ));
            return Some((name, sheet, MatchTier::Position));
        }
    }

    None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn grid(rows: Vec<Vec<Cell>>) -> RawSheet {
        RawSheet::new(rows)
    }

    // -------------------------------------------------------------------------
    // HEADER LOCATOR TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_fixed_offset_header() {
        let sheet = grid(vec![
            vec![text("Listado de compras")],
            vec![text("Fecha"), text("Proveedor")],
            vec![text("01/01/2024"), text("Acme")],
        ]);
        assert_eq!(locate_header(&sheet, HeaderRule::FixedOffset(1)), Some(1));
    }

    #[test]
    fn test_fixed_offset_needs_data_after() {
        let sheet = grid(vec![
            vec![text("a")],
            vec![text("b")],
            vec![text("header")],
        ]);
        // Header at last row leaves no data rows.
        assert_eq!(locate_header(&sheet, HeaderRule::FixedOffset(2)), None);
    }

    #[test]
    fn test_keyword_scan_finds_header() {
        let sheet = grid(vec![
            vec![text("COMPRAS 2024")],
            vec![],
            vec![text("Fecha"), text("Proveedor"), text("Kilos")],
            vec![text("01/01/2024"), text("Acme"), Cell::Number(10.0)],
        ]);
        assert_eq!(
            locate_header(&sheet, HeaderRule::Keyword(&["proveedor"])),
            Some(2)
        );
    }

    #[test]
    fn test_keyword_scan_case_insensitive() {
        let sheet = grid(vec![
            vec![text("x")],
            vec![text("PROVEEDOR"), text("Total")],
            vec![text("Acme"), Cell::Number(5.0)],
        ]);
        assert_eq!(
            locate_header(&sheet, HeaderRule::Keyword(&["proveedor"])),
            Some(1)
        );
    }

    #[test]
    fn test_keyword_scan_window_limited() {
        let mut rows = vec![vec![text("filler")]; 12];
        rows.push(vec![text("Proveedor")]);
        rows.push(vec![text("Acme")]);
        let sheet = grid(rows);
        // Header beyond the 10-row window is not found.
        assert_eq!(locate_header(&sheet, HeaderRule::Keyword(&["proveedor"])), None);
    }

    #[test]
    fn test_short_sheet_rejected() {
        let sheet = grid(vec![vec![text("Proveedor")], vec![text("Acme")]]);
        assert_eq!(locate_header(&sheet, HeaderRule::Keyword(&["proveedor"])), None);
        assert_eq!(locate_header(&sheet, HeaderRule::FixedOffset(0)), None);
    }

    // -------------------------------------------------------------------------
    // SHEET LOOKUP TESTS
    // -------------------------------------------------------------------------

    fn sample_workbook() -> Workbook {
        let sheet = grid(vec![vec![text("a")], vec![text("b")], vec![text("c")]]);
        vec![
            ("Ventas 2024".to_string(), sheet.clone()),
            ("Pedidos".to_string(), sheet.clone()),
            ("Hoja3".to_string(), sheet),
        ]
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let wb = sample_workbook();
        let mut w = Vec::new();
        let (name, _, tier) = find_sheet(&wb, "pedidos", &[], None, &mut w).unwrap();
        assert_eq!(name, "Pedidos");
        assert_eq!(tier, MatchTier::Exact);
        assert!(w.is_empty());
    }

    #[test]
    fn test_keyword_fallback_warns() {
        let wb = sample_workbook();
        let mut w = Vec::new();
        let (name, _, tier) =
            find_sheet(&wb, "Ventas", &["ventas", "2024"], None, &mut w).unwrap();
        assert_eq!(name, "Ventas 2024");
        assert_eq!(tier, MatchTier::Keyword);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_keyword_first_match_wins() {
        let sheet = grid(vec![vec![text("a")], vec![text("b")], vec![text("c")]]);
        let wb: Workbook = vec![
            ("Ventas enero".to_string(), sheet.clone()),
            ("Ventas febrero".to_string(), sheet),
        ];
        let mut w = Vec::new();
        // Two sheets match; first in workbook order is taken.
        let (name, _, _) = find_sheet(&wb, "Ventas", &["ventas"], None, &mut w).unwrap();
        assert_eq!(name, "Ventas enero");
    }

    #[test]
    fn test_positional_fallback_warns() {
        let wb = sample_workbook();
        let mut w = Vec::new();
        let (name, _, tier) = find_sheet(&wb, "Inventario", &["inventario"], Some(2), &mut w).unwrap();
        assert_eq!(name, "Hoja3");
        assert_eq!(tier, MatchTier::Position);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("falling back"));
    }

    #[test]
    fn test_no_match_is_none() {
        let wb = sample_workbook();
        let mut w = Vec::new();
        assert!(find_sheet(&wb, "Contratos", &["contratos"], None, &mut w).is_none());
    }

    // -------------------------------------------------------------------------
    // GRID TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_out_of_bounds_cell_is_empty() {
        let sheet = grid(vec![vec![text("a")]]);
        assert_eq!(*sheet.cell(5, 5), Cell::Empty);
    }

    #[test]
    fn test_column_count_is_widest_row() {
        let sheet = grid(vec![
            vec![text("a")],
            vec![text("a"), text("b"), text("c")],
            vec![],
        ]);
        assert_eq!(sheet.column_count(), 3);
    }
}
