//! Collector Service - Downloads workbook files from the document store
//!
//! Responsibilities:
//! - Authenticate against the document store (client-credentials token,
//!   cached with TTL in an explicitly constructed service object)
//! - Download workbook files with rate limiting and best-effort retries
//! - Store raw artifacts on the filesystem, deduplicated by content hash
//! - Register artifact metadata in a JSON manifest for the parser
//!
//! Usage:
//!   # Single URL:
//!   cargo run --bin collector -- --family compras --url https://...
//!
//!   # From config (batch mode):
//!   cargo run --bin collector -- --config config/sources.json
//!
//!   # Specific source from config:
//!   cargo run --bin collector -- --config config/sources.json --source-id compras-2024

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Collects workbook artifacts from the document store")]
struct Args {
    /// Source identifier (string key, used in batch filtering and manifest)
    #[arg(long)]
    source_id: Option<String>,

    /// URL to fetch (for single-URL mode)
    #[arg(long)]
    url: Option<String>,

    /// Document family hint stored with the artifact (nomina, comercial, ...)
    #[arg(long)]
    family: Option<String>,

    /// Path to sources config file (for batch mode)
    #[arg(long)]
    config: Option<String>,

    /// Force re-download even if an artifact with the same hash exists
    #[arg(long, default_value = "false")]
    force: bool,

    /// Dry run - don't save artifacts or touch the manifest
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

// =============================================================================
// Source Configuration Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SourcesConfig {
    version: String,
    sources: Vec<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    id: String,
    name: String,
    /// Document family the parser should use (nomina, comercial, compras,
    /// inventario).
    family: String,
    #[serde(default)]
    year: Option<i32>,
    urls: Vec<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMeta {
    artifact_id: Uuid,
    source_id: String,
    family: String,
    #[serde(default)]
    year: Option<i32>,
    url: String,
    captured_at: DateTime<Utc>,
    content_hash: String,
    mime_type: String,
    size_bytes: i64,
    storage_path: String,
}

#[derive(Debug, Clone)]
struct Config {
    raw_fs_dir: PathBuf,
    rate_limit_ms: u64,
    http_retries: u32,
    auth: Option<AuthConfig>,
}

#[derive(Debug, Clone)]
struct AuthConfig {
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let auth = match std::env::var("STORE_TOKEN_URL") {
            Ok(token_url) => Some(AuthConfig {
                token_url,
                client_id: std::env::var("STORE_CLIENT_ID")
                    .context("STORE_CLIENT_ID env var missing")?,
                client_secret: std::env::var("STORE_CLIENT_SECRET")
                    .context("STORE_CLIENT_SECRET env var missing")?,
            }),
            // Public/test stores need no token.
            Err(_) => None,
        };
        Ok(Self {
            raw_fs_dir: PathBuf::from(
                std::env::var("RAW_FS_DIR").unwrap_or_else(|_| "./data/raw".to_string()),
            ),
            rate_limit_ms: std::env::var("RATE_LIMIT_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            http_retries: std::env::var("HTTP_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            auth,
        })
    }
}

// =============================================================================
// Token cache - explicit, lifetime-scoped, injected into the fetch path
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until expiry.
    expires_in: i64,
}

/// Cached bearer token for the document store. Constructed once in main
/// and passed down; refreshes itself when within 60s of expiry.
struct TokenCache {
    auth: AuthConfig,
    token: Option<(String, DateTime<Utc>)>,
}

impl TokenCache {
    fn new(auth: AuthConfig) -> Self {
        Self { auth, token: None }
    }

    async fn bearer(&mut self, client: &reqwest::Client) -> Result<String> {
        if let Some((token, expires_at)) = &self.token {
            if *expires_at - ChronoDuration::seconds(60) > Utc::now() {
                return Ok(token.clone());
            }
        }

        println!("  Refreshing document store token...");
        let resp: TokenResponse = client
            .post(&self.auth.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.auth.client_id.as_str()),
                ("client_secret", self.auth.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("token request failed")?
            .json()
            .await
            .context("token response was not valid JSON")?;

        let expires_at = Utc::now() + ChronoDuration::seconds(resp.expires_in.max(0));
        self.token = Some((resp.access_token.clone(), expires_at));
        Ok(resp.access_token)
    }
}

// =============================================================================
// Manifest - filesystem registry of collected artifacts
// =============================================================================

fn manifest_path(config: &Config) -> PathBuf {
    config.raw_fs_dir.join("manifest.json")
}

async fn load_manifest(config: &Config) -> Result<Vec<ArtifactMeta>> {
    let path = manifest_path(config);
    match fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).context("manifest.json is corrupt"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).context("failed to read manifest.json"),
    }
}

async fn save_manifest(config: &Config, manifest: &[ArtifactMeta]) -> Result<()> {
    fs::create_dir_all(&config.raw_fs_dir).await?;
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(manifest_path(config), json).await?;
    Ok(())
}

fn find_by_hash<'a>(manifest: &'a [ArtifactMeta], hash: &str) -> Option<&'a ArtifactMeta> {
    manifest.iter().find(|a| a.content_hash == hash)
}

// =============================================================================
// Download
// =============================================================================

/// GET with best-effort retries: transport errors and 5xx are retried
/// with doubling backoff, 4xx fail immediately.
async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    retries: u32,
) -> Result<reqwest::Response> {
    let mut backoff = Duration::from_millis(500);
    let mut last_err: Option<anyhow::Error> = None;
    let attempts = retries.max(1);

    for attempt in 1..=attempts {
        let mut request = client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                if status.is_client_error() {
                    anyhow::bail!("HTTP {} for {}", status, url);
                }
                last_err = Some(anyhow::anyhow!("HTTP {} for {}", status, url));
            }
            Err(e) => last_err = Some(e.into()),
        }
        if attempt < attempts {
            eprintln!("  Attempt {} failed, retrying in {:?}...", attempt, backoff);
            sleep(backoff).await;
            backoff *= 2;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("download failed: {}", url)))
}

fn artifact_extension(mime: &str, url: &str) -> &'static str {
    if url.ends_with(".xlsx") || mime.contains("officedocument.spreadsheetml") {
        "xlsx"
    } else if url.ends_with(".xls") || mime.contains("ms-excel") {
        "xls"
    } else if url.ends_with(".ods") || mime.contains("opendocument") {
        "ods"
    } else if url.ends_with(".csv") || mime.contains("csv") {
        "csv"
    } else {
        "raw"
    }
}

async fn save_to_fs(config: &Config, artifact_id: Uuid, ext: &str, bytes: &[u8]) -> Result<String> {
    let dir = &config.raw_fs_dir;
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", artifact_id, ext));
    fs::write(&path, bytes).await?;
    Ok(path.to_string_lossy().to_string())
}

/// Fetch a single URL, store the artifact and register it in the manifest.
#[allow(clippy::too_many_arguments)]
async fn fetch_url(
    client: &reqwest::Client,
    token_cache: &mut Option<TokenCache>,
    config: &Config,
    manifest: &mut Vec<ArtifactMeta>,
    source_id: &str,
    family: &str,
    year: Option<i32>,
    url: &str,
    force: bool,
    dry_run: bool,
) -> Result<Uuid> {
    println!("  Rate limit: waiting {}ms...", config.rate_limit_ms);
    sleep(Duration::from_millis(config.rate_limit_ms)).await;

    let bearer = match token_cache {
        Some(cache) => Some(cache.bearer(client).await?),
        None => None,
    };

    println!("  Fetching: {}", url);
    let resp = get_with_retry(client, url, bearer.as_deref(), config.http_retries).await?;

    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let bytes = resp.bytes().await?;
    let size_bytes = bytes.len() as i64;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("sha256:{:x}", hasher.finalize());

    println!("  Downloaded: {} bytes, mime: {}", size_bytes, mime);
    println!("  Hash: {}", content_hash);

    if !force {
        if let Some(existing) = find_by_hash(manifest, &content_hash) {
            println!("  Artifact already exists: {}", existing.artifact_id);
            return Ok(existing.artifact_id);
        }
    }

    let artifact_id = Uuid::new_v4();
    let ext = artifact_extension(&mime, url);

    if dry_run {
        println!("  Dry run - would store artifact: {}.{}", artifact_id, ext);
        return Ok(artifact_id);
    }

    let storage_path = save_to_fs(config, artifact_id, ext, &bytes).await?;
    println!("  Saved to: {}", storage_path);

    manifest.push(ArtifactMeta {
        artifact_id,
        source_id: source_id.to_string(),
        family: family.to_string(),
        year,
        url: url.to_string(),
        captured_at: Utc::now(),
        content_hash,
        mime_type: mime,
        size_bytes,
        storage_path,
    });
    save_manifest(config, manifest).await?;
    println!("  Artifact registered: {}", artifact_id);

    Ok(artifact_id)
}

async fn load_sources_config(path: &str) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .await
        .context("Failed to read sources config")?;
    let config: SourcesConfig =
        serde_json::from_str(&content).context("Failed to parse sources config")?;
    Ok(config)
}

fn print_sources_summary(sources_config: &SourcesConfig) {
    println!("\nConfigured sources:");
    println!("{:-<60}", "");
    for source in &sources_config.sources {
        let status = if source.enabled { "✓" } else { "✗" };
        println!(
            "  {} {} - {} [{}] ({} url(s))",
            status,
            source.id,
            source.name,
            source.family,
            source.urls.len()
        );
    }
    println!("{:-<60}", "");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;

    println!("=== Panel Comercial Collector ===");
    println!("Raw store: {}", config.raw_fs_dir.display());
    println!(
        "Auth: {}",
        if config.auth.is_some() {
            "client credentials"
        } else {
            "none"
        }
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent("PanelComercial/0.1 (collector)")
        .build()?;

    let mut token_cache = config.auth.clone().map(TokenCache::new);
    let mut manifest = load_manifest(&config).await?;

    if let Some(config_path) = &args.config {
        // Config-based batch mode
        println!("Loading sources from: {}", config_path);
        let sources_config = load_sources_config(config_path).await?;
        println!("Config version: {}", sources_config.version);

        let sources: Vec<&Source> = sources_config
            .sources
            .iter()
            .filter(|s| {
                if !s.enabled {
                    return false;
                }
                if let Some(ref filter_id) = args.source_id {
                    return &s.id == filter_id;
                }
                true
            })
            .collect();

        if sources.is_empty() {
            print_sources_summary(&sources_config);
            anyhow::bail!("No sources match the filter criteria");
        }

        println!("\nProcessing {} source(s)...", sources.len());

        let mut collected = 0;
        let mut failed = 0;

        for source in sources {
            println!("\n[{}] {} ({})", source.id, source.name, source.family);
            for url in &source.urls {
                match fetch_url(
                    &client,
                    &mut token_cache,
                    &config,
                    &mut manifest,
                    &source.id,
                    &source.family,
                    source.year,
                    url,
                    args.force,
                    args.dry_run,
                )
                .await
                {
                    Ok(artifact_id) => {
                        println!("  ✓ Collected: {}", artifact_id);
                        collected += 1;
                    }
                    Err(e) => {
                        eprintln!("  ✗ Failed: {}", e);
                        failed += 1;
                    }
                }
            }
        }

        println!("\n=== Collection Summary ===");
        println!("Collected: {}", collected);
        println!("Failed: {}", failed);
    } else if let Some(url) = &args.url {
        // Single URL mode
        let source_id = args.source_id.clone().unwrap_or_else(|| "adhoc".to_string());
        let family = args
            .family
            .clone()
            .context("--family is required in single-URL mode")?;
        println!("Source: {}", source_id);
        println!("URL: {}", url);

        let artifact_id = fetch_url(
            &client,
            &mut token_cache,
            &config,
            &mut manifest,
            &source_id,
            &family,
            None,
            url,
            args.force,
            args.dry_run,
        )
        .await?;

        println!("\n=== Collection Complete ===");
        println!("Artifact ID: {}", artifact_id);
        println!(
            "Ready for parsing: cargo run --bin parser -- --input <path> --family {}",
            family
        );
    } else {
        anyhow::bail!(
            "Must specify either:\n  \
             --config <path> for batch mode, or\n  \
             --url <url> --family <family> for single URL mode"
        );
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
