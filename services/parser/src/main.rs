//! Parser Service - Normalizes workbook artifacts into parse envelopes
//!
//! Responsibilities:
//! - Load a downloaded workbook artifact (xls/xlsx/ods/csv)
//! - Locate headers, map fixed columns, validate rows per document family
//! - Aggregate validated records into monthly/group summaries
//! - Emit a ParseResult envelope (status/data/metadata) as JSON
//!
//! CRITICAL: Parsing must be DETERMINISTIC and total: the same artifact
//! always yields the same envelope, and expected data problems surface in
//! the envelope, never as process failures.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

mod aggregate;
mod columns;
mod envelope;
mod extract;
mod families;
mod normalize;
mod sheet;
mod workbook;

use envelope::{ParseResult, ParseStatus};
use families::Family;

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Parses workbook artifacts into dashboard envelopes")]
struct Args {
    /// Path to the downloaded artifact (xls/xlsx/ods/csv)
    #[arg(long)]
    input: PathBuf,

    /// Document family the artifact belongs to
    #[arg(long, value_enum)]
    family: Family,

    /// Workbook year (required for nomina, whose sheets carry only months)
    #[arg(long)]
    year: Option<i32>,

    /// Output directory for envelope JSON (default: $PARSED_DIR or ./data/parsed)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Dry run - parse and report, don't write the envelope
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        PathBuf::from(std::env::var("PARSED_DIR").unwrap_or_else(|_| "./data/parsed".to_string()))
    });

    println!("=== Panel Comercial Parser ===");
    println!("Input: {}", args.input.display());
    println!("Family: {}", args.family.as_str());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let workbook = workbook::load_workbook(&args.input)?;
    println!("\nWorkbook: {} sheet(s)", workbook.len());
    for (name, sheet) in &workbook {
        println!(
            "  - '{}' ({} rows x {} cols)",
            name,
            sheet.row_count(),
            sheet.column_count()
        );
    }

    let result = families::parse(args.family, &workbook, args.year);
    report(&result);

    if args.dry_run {
        println!("\nDry run - envelope not written");
        return Ok(());
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let out_path = out_dir.join(format!("{}.json", args.family.as_str()));
    let json = serde_json::to_string_pretty(&result).context("failed to serialize envelope")?;
    std::fs::write(&out_path, json)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    println!("\n=== Parsing Complete ===");
    println!("Envelope written: {}", out_path.display());
    Ok(())
}

fn report(result: &ParseResult) {
    println!("\nStatus: {}", status_label(result.status));
    println!("Message: {}", result.message);
    println!(
        "Rows: {} parsed, {} skipped",
        result.metadata.rows_parsed, result.metadata.rows_skipped
    );
    if !result.metadata.sheets.is_empty() {
        println!("Sheets used: {}", result.metadata.sheets.join(", "));
    }
    if let Some((from, to)) = result.metadata.date_range {
        println!("Date range: {} .. {}", from, to);
    }

    if !result.metadata.errors.is_empty() {
        println!("Errors ({}):", result.metadata.errors.len());
        for err in &result.metadata.errors {
            println!("  ✗ {}", err);
        }
    }
    if !result.metadata.warnings.is_empty() {
        println!("Warnings ({}):", result.metadata.warnings.len());
        for (i, warn) in result.metadata.warnings.iter().take(5).enumerate() {
            println!("  [{}] {}", i + 1, warn);
        }
        if result.metadata.warnings.len() > 5 {
            println!("  ... and {} more", result.metadata.warnings.len() - 5);
        }
    }
}

fn status_label(status: ParseStatus) -> &'static str {
    match status {
        ParseStatus::Success => "success",
        ParseStatus::PartialSuccess => "partial_success",
        ParseStatus::Error => "error",
    }
}
