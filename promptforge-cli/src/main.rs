//! promptforge-cli: trigger and inspect trace aggregation over HTTP
//!
//! # Subcommands
//! - `aggregate <tenant> <project> <trace> [--no-wait] [--json]`: run aggregation
//! - `summary <tenant> <project> <trace> [--json]`: show a summary row
//! - `status`: show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "promptforge-cli",
    version,
    about = "PromptForge trace aggregation client"
)]
struct Cli {
    /// PromptForge HTTP server URL (overrides PROMPTFORGE_HTTP_URL env var)
    #[arg(long, env = "PROMPTFORGE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Aggregate one trace into its summary row
    Aggregate {
        tenant_id: i64,
        project_id: i64,
        trace_id: String,

        /// Queue the work on the server and return immediately
        #[arg(long)]
        no_wait: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show the stored summary for a trace
    Summary {
        tenant_id: i64,
        project_id: i64,
        trace_id: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show PromptForge server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_logs: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub total_duration_ms: i64,
    pub first_log_at: String,
    pub last_log_at: String,
    #[serde(default)]
    pub usage_rollup: Option<BTreeMap<String, BTreeMap<String, serde_json::Value>>>,
}

/// Body of `GET /summaries/...`; the snapshot document is not needed here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub stats: StatsView,
    pub snapshot_path: String,
    pub marker: String,
    pub updated_at: String,
}

/// Human-readable lines for a stats block.
pub fn render_stats(stats: &StatsView) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Logs:      {} ({} ok, {} failed)",
            stats.total_logs, stats.success_count, stats.error_count
        ),
        format!("Duration:  {} ms", stats.total_duration_ms),
        format!("Window:    {} .. {}", stats.first_log_at, stats.last_log_at),
    ];

    if let Some(rollup) = &stats.usage_rollup {
        for (provider, models) in rollup {
            for (model, usage) in models {
                let count = usage.get("count").and_then(|c| c.as_u64()).unwrap_or(0);
                let tokens: Vec<String> = usage
                    .as_object()
                    .into_iter()
                    .flatten()
                    .filter(|(k, _)| k.as_str() != "count")
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                lines.push(format!(
                    "Usage:     {}/{} x{} {}",
                    provider,
                    model,
                    count,
                    tokens.join(" ")
                ));
            }
        }
    }
    lines
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Error text from a non-2xx response body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn do_aggregate(
    server: &str,
    tenant_id: i64,
    project_id: i64,
    trace_id: &str,
    wait: bool,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/aggregate", server);
    let body = serde_json::json!({
        "tenantId": tenant_id,
        "projectId": project_id,
        "traceId": trace_id,
        "wait": wait,
    });

    let resp = match client(60)?.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("promptforge-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        eprintln!("promptforge-cli: server returned {}: {}", status, error_message(&body));
        std::process::exit(1);
    }

    let data: serde_json::Value = resp.json()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if data["queued"] == true {
        println!("Queued aggregation for {}/{}/{}", tenant_id, project_id, trace_id);
    } else if data["written"] == false {
        println!("No logs for {}/{}/{}; nothing written", tenant_id, project_id, trace_id);
    } else {
        let action = if data["created"] == true { "Created" } else { "Updated" };
        println!(
            "{} summary for {}/{}/{} after {} attempt(s)",
            action,
            tenant_id,
            project_id,
            trace_id,
            data["attempts"]
        );
        let stats: StatsView = serde_json::from_value(data["stats"].clone())?;
        for line in render_stats(&stats) {
            println!("{}", line);
        }
        println!("Snapshot:  {}", data["snapshotPath"].as_str().unwrap_or("?"));
    }
    Ok(())
}

fn do_summary(
    server: &str,
    tenant_id: i64,
    project_id: i64,
    trace_id: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/summaries/{}/{}/{}", server, tenant_id, project_id, trace_id);
    let resp = match client(10)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("promptforge-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        eprintln!("No summary for {}/{}/{}", tenant_id, project_id, trace_id);
        std::process::exit(1);
    }
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        eprintln!("promptforge-cli: server returned {}: {}", status, error_message(&body));
        std::process::exit(1);
    }

    let data: serde_json::Value = resp.json()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let summary: SummaryView = serde_json::from_value(data)?;
    println!("Trace:     {}/{}/{}", tenant_id, project_id, trace_id);
    for line in render_stats(&summary.stats) {
        println!("{}", line);
    }
    println!("Snapshot:  {}", summary.snapshot_path);
    println!("Marker:    {}", summary.marker);
    println!("Updated:   {}", summary.updated_at);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("PromptForge server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:            {}", body["version"].as_str().unwrap_or("?"));
            println!("Storage:            {}", body["storage"].as_str().unwrap_or("?"));
            if let Some(pg) = body["postgresql"].as_str() {
                println!("PostgreSQL:         {}", pg);
            }
            if let Some(n) = body["summaries"].as_i64() {
                println!("Summaries:          {}", n);
            }
            println!("Socket:             {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("promptforge-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("promptforge-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Aggregate {
            tenant_id,
            project_id,
            trace_id,
            no_wait,
            json,
        } => do_aggregate(&server, tenant_id, project_id, &trace_id, !no_wait, json),
        Commands::Summary {
            tenant_id,
            project_id,
            trace_id,
            json,
        } => do_summary(&server, tenant_id, project_id, &trace_id, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("promptforge-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
