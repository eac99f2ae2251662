//! API Service - Dashboard API over parsed envelopes
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /documents - List parsed envelopes with status and counts
//! - GET /envelope?family= - The raw stored envelope
//! - GET /dashboard?family= - Monthly KPI rows with month-over-month change
//!
//! The API never re-parses anything: it reads the envelope JSON the
//! parser service wrote and derives display KPIs. An error-status
//! envelope yields an empty dashboard, not a failure - the rest of the
//! dashboard must keep working.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    parsed_dir: PathBuf,
}

const FAMILIES: [&str; 4] = ["nomina", "comercial", "compras", "inventario"];

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct DocumentResponse {
    family: String,
    status: String,
    message: String,
    rows_parsed: u64,
    errors: usize,
    warnings: usize,
}

#[derive(Serialize)]
struct DashboardResponse {
    family: String,
    status: String,
    rows: Vec<DashboardRow>,
}

#[derive(Serialize)]
struct DashboardRow {
    month: u32,
    month_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    total: f64,
    records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    star: Option<String>,
    /// Month-over-month change of `total`, percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    change_pct: Option<f64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct FamilyQuery {
    family: String,
}

#[derive(Deserialize)]
struct DashboardQuery {
    family: String,
    year: Option<i32>,
}

// ============================================================================
// Envelope access
// ============================================================================

async fn read_envelope(state: &AppState, family: &str) -> Option<serde_json::Value> {
    let path = state.parsed_dir.join(format!("{}.json", family));
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    serde_json::from_str(&content).ok()
}

/// The summary rows inside a family payload. Comercial nests its sections;
/// the ventas section drives the dashboard.
fn summaries_of(envelope: &serde_json::Value) -> Vec<serde_json::Value> {
    let data = &envelope["data"];
    for section in [
        &data["compras"]["summaries"],
        &data["costes"]["summaries"],
        &data["ventas"]["summaries"],
    ] {
        if let Some(arr) = section.as_array() {
            return arr.clone();
        }
    }
    Vec::new()
}

/// Primary metric for a summary's sums map, first match wins.
fn primary_total(sums: &serde_json::Value) -> f64 {
    for key in ["total", "valor", "coste_total", "importe", "importe_anual"] {
        if let Some(v) = sums.get(key).and_then(|v| v.as_f64()) {
            return v;
        }
    }
    0.0
}

/// Percentage change with the dashboard's asymmetric zero handling: both
/// zero is 0%, growth from a zero baseline is 100%.
fn pct_change(old: f64, new: f64) -> f64 {
    if old == 0.0 && new == 0.0 {
        0.0
    } else if old == 0.0 {
        100.0
    } else {
        (new - old) / old * 100.0
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: "0.1.0",
    })
}

async fn documents_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DocumentResponse>> {
    let mut documents = Vec::new();
    for family in FAMILIES {
        if let Some(envelope) = read_envelope(&state, family).await {
            let metadata = &envelope["metadata"];
            documents.push(DocumentResponse {
                family: family.to_string(),
                status: envelope["status"].as_str().unwrap_or("unknown").to_string(),
                message: envelope["message"].as_str().unwrap_or("").to_string(),
                rows_parsed: metadata["rows_parsed"].as_u64().unwrap_or(0),
                errors: metadata["errors"].as_array().map(|a| a.len()).unwrap_or(0),
                warnings: metadata["warnings"].as_array().map(|a| a.len()).unwrap_or(0),
            });
        }
    }
    Json(documents)
}

async fn envelope_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyQuery>,
) -> impl IntoResponse {
    match read_envelope(&state, &params.family).await {
        Some(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no envelope for family '{}'", params.family),
            }),
        )
            .into_response(),
    }
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> impl IntoResponse {
    let Some(envelope) = read_envelope(&state, &params.family).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no envelope for family '{}'", params.family),
            }),
        )
            .into_response();
    };

    let status = envelope["status"].as_str().unwrap_or("unknown").to_string();

    // Degrade to an empty view on a failed parse; the dashboard shell
    // still renders.
    if status == "error" {
        return (
            StatusCode::OK,
            Json(DashboardResponse {
                family: params.family,
                status,
                rows: Vec::new(),
            }),
        )
            .into_response();
    }

    let mut rows: Vec<DashboardRow> = Vec::new();
    let mut previous_total: Option<f64> = None;
    for summary in summaries_of(&envelope) {
        let year = summary["year"].as_i64().map(|y| y as i32);
        if let Some(wanted) = params.year {
            if year != Some(wanted) {
                continue;
            }
        }
        let total = primary_total(&summary["sums"]);
        let change_pct = previous_total.map(|old| pct_change(old, total));
        previous_total = Some(total);
        rows.push(DashboardRow {
            month: summary["month"].as_u64().unwrap_or(0) as u32,
            month_name: summary["month_name"].as_str().unwrap_or("").to_string(),
            year,
            total,
            records: summary["count"].as_u64().unwrap_or(0),
            star: summary["star"]["name"].as_str().map(|s| s.to_string()),
            change_pct,
        });
    }

    (
        StatusCode::OK,
        Json(DashboardResponse {
            family: params.family,
            status,
            rows,
        }),
    )
        .into_response()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let parsed_dir = PathBuf::from(
        std::env::var("PARSED_DIR").unwrap_or_else(|_| "./data/parsed".to_string()),
    );
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    println!("=== Panel Comercial API ===");
    println!("Parsed dir: {}", parsed_dir.display());
    println!("Listening on: {}", bind_addr);

    let state = Arc::new(AppState { parsed_dir });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/documents", get(documents_handler))
        .route("/envelope", get(envelope_handler))
        .route("/dashboard", get(dashboard_handler))
        .with_state(state)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
