//! Static column maps, one per document shape.
//!
//! Column positions are contractual per document type ("column B is always
//! the provider"), so each map is a fixed table of (index, field, coercion).
//! The eight maps are deliberately independent; the repetition keeps each
//! workbook layout auditable against the customer's template on its own.

use crate::sheet::HeaderRule;

/// How a mapped column is coerced into a record field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Text,
    Number,
    Date,
    Month,
    Year,
}

/// One document shape: its header rule, column table and validation sets.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    /// Shape name used in errors and envelope metadata.
    pub name: &'static str,
    pub header: HeaderRule,
    /// (0-based column index, field name, coercion).
    pub fields: &'static [(usize, &'static str, Coercion)],
    /// A row is kept only if every identity field is present and non-empty.
    pub identity: &'static [&'static str],
    /// ...and at least one value field is non-zero / non-empty.
    pub value: &'static [&'static str],
}

impl ColumnMap {
    /// Highest column index the map reads.
    pub fn max_index(&self) -> usize {
        self.fields.iter().map(|(i, _, _)| *i).max().unwrap_or(0)
    }

    /// Explicit structural check: a sheet narrower than the map cannot be
    /// silently truncated.
    pub fn check_columns(&self, column_count: usize) -> Result<(), String> {
        let needed = self.max_index() + 1;
        if column_count < needed {
            Err(format!(
                "{}: missing columns (sheet has {}, layout needs {})",
                self.name, column_count, needed
            ))
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Payroll (nomina): monthly cost sheets + free-text incident sheet
// =============================================================================

pub static PAYROLL_COSTS: ColumnMap = ColumnMap {
    name: "nomina-costes",
    header: HeaderRule::FixedOffset(2),
    fields: &[
        (0, "empleado", Coercion::Text),
        (1, "departamento", Coercion::Text),
        (2, "salario_base", Coercion::Number),
        (3, "complementos", Coercion::Number),
        (4, "seguridad_social", Coercion::Number),
        (5, "coste_total", Coercion::Number),
    ],
    identity: &["empleado", "departamento"],
    value: &["coste_total"],
};

pub static PAYROLL_OBSERVATIONS: ColumnMap = ColumnMap {
    name: "nomina-incidencias",
    header: HeaderRule::FixedOffset(1),
    fields: &[(0, "texto", Coercion::Text)],
    identity: &["texto"],
    value: &["texto"],
};

// =============================================================================
// Commercial workbook: sales, orders, contracts
// =============================================================================

pub static SALES: ColumnMap = ColumnMap {
    name: "ventas",
    header: HeaderRule::FixedOffset(1),
    fields: &[
        (0, "fecha", Coercion::Date),
        (1, "cliente", Coercion::Text),
        (2, "concepto", Coercion::Text),
        (3, "base", Coercion::Number),
        (4, "iva", Coercion::Number),
        (5, "total", Coercion::Number),
    ],
    identity: &["cliente"],
    value: &["total"],
};

pub static ORDERS: ColumnMap = ColumnMap {
    name: "pedidos",
    header: HeaderRule::FixedOffset(1),
    fields: &[
        (0, "fecha", Coercion::Date),
        (1, "numero", Coercion::Text),
        (2, "cliente", Coercion::Text),
        (3, "importe", Coercion::Number),
    ],
    identity: &["cliente"],
    value: &["importe"],
};

pub static CONTRACTS: ColumnMap = ColumnMap {
    name: "contratos",
    header: HeaderRule::FixedOffset(1),
    fields: &[
        (0, "fecha", Coercion::Date),
        (1, "cliente", Coercion::Text),
        (2, "descripcion", Coercion::Text),
        (3, "importe_anual", Coercion::Number),
    ],
    identity: &["cliente"],
    value: &["importe_anual"],
};

// =============================================================================
// Purchases: header found by keyword, weight/price/value columns
// =============================================================================

pub static PURCHASES: ColumnMap = ColumnMap {
    name: "compras",
    header: HeaderRule::Keyword(&["proveedor"]),
    fields: &[
        (0, "fecha", Coercion::Date),
        (1, "proveedor", Coercion::Text),
        (2, "material", Coercion::Text),
        (3, "kilos", Coercion::Number),
        (4, "precio_kg", Coercion::Number),
        (5, "valor", Coercion::Number),
    ],
    identity: &["proveedor"],
    value: &["valor", "kilos"],
};

// =============================================================================
// Inventory: two layouts in circulation
// =============================================================================

/// Older valued-stock export: fixed two-row preamble before the header.
pub static INVENTORY_VALUED: ColumnMap = ColumnMap {
    name: "inventario-valorado",
    header: HeaderRule::FixedOffset(2),
    fields: &[
        (0, "referencia", Coercion::Text),
        (1, "descripcion", Coercion::Text),
        (2, "familia", Coercion::Text),
        (3, "unidades", Coercion::Number),
        (4, "coste_unitario", Coercion::Number),
        (5, "valor_total", Coercion::Number),
    ],
    identity: &["referencia"],
    value: &["unidades", "valor_total"],
};

/// Newer per-warehouse export: header located by keyword.
pub static INVENTORY_WAREHOUSE: ColumnMap = ColumnMap {
    name: "inventario-almacen",
    header: HeaderRule::Keyword(&["referencia"]),
    fields: &[
        (0, "referencia", Coercion::Text),
        (1, "almacen", Coercion::Text),
        (2, "unidades", Coercion::Number),
        (3, "valor", Coercion::Number),
    ],
    identity: &["referencia"],
    value: &["unidades", "valor"],
};

// =============================================================================
// TESTS
// =============================================================================
