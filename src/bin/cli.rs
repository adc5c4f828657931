//! AIM CLI
//!
//! Command-line client for a running AIM server:
//! - Send call events
//! - Run the seven analytics queries
//! - Inspect subscriber records and engine statistics
//! - Generate config files and metadata databases locally

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for the Analytics-in-Motion engine")]
#[command(long_about = "AIM keeps per-subscriber call statistics up to date in real time.\nSend events, run analytics queries and inspect records from the command line.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:5001", global = true)]
    pub api_url: String,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a call event
    Event {
        /// Calling subscriber
        caller: u64,
        /// Call duration in seconds
        duration: u32,
        /// Call cost
        cost: f64,
        /// Called subscriber
        #[arg(long, default_value = "0")]
        callee: u64,
        /// Long-distance call
        #[arg(short, long)]
        long_distance: bool,
        /// Timestamp (default: now). Supports: "now", ISO 8601, Unix milliseconds
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Run an analytics query
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Show the decoded record of a subscriber
    Record {
        subscriber_id: u64,
    },

    /// Show engine statistics
    Stats,

    /// Show server health
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a metadata database with the standard schema and random campaigns
    InitMeta {
        /// Database file to create
        path: PathBuf,
        /// Number of campaigns
        #[arg(short, long, default_value = "300")]
        campaigns: usize,
        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Average weekly duration of subscribers with more than ALPHA local calls this week
    Q1 { alpha: u32 },
    /// Largest weekly cost among subscribers with more than ALPHA calls this week
    Q2 { alpha: u32 },
    /// Weekly cost ratio grouped by number of calls
    Q3,
    /// Per-city local call statistics of subscribers above ALPHA calls and BETA duration
    Q4 { alpha: u32, beta: u32 },
    /// Per-region local and long-distance cost for a subscriber type and category
    Q5 { sub_type: u16, sub_category: u16 },
    /// Subscribers with the longest calls in a country
    Q6 { country_id: u16 },
    /// Subscriber with the lowest flat rate for a value type
    Q7 {
        subscriber_value_type: u16,
        /// day or week
        #[arg(short, long, default_value = "week")]
        window: String,
    },
}

impl QueryCommand {
    fn kind_and_args(&self) -> Result<(u8, serde_json::Value), Box<dyn std::error::Error>> {
        use serde_json::json;
        Ok(match self {
            QueryCommand::Q1 { alpha } => (1, json!({ "alpha": alpha })),
            QueryCommand::Q2 { alpha } => (2, json!({ "alpha": alpha })),
            QueryCommand::Q3 => (3, json!({})),
            QueryCommand::Q4 { alpha, beta } => (4, json!({ "alpha": alpha, "beta": beta })),
            QueryCommand::Q5 {
                sub_type,
                sub_category,
            } => (5, json!({ "sub_type": sub_type, "sub_category": sub_category })),
            QueryCommand::Q6 { country_id } => (6, json!({ "country_id": country_id })),
            QueryCommand::Q7 {
                subscriber_value_type,
                window,
            } => {
                let window_length = match window.as_str() {
                    "day" | "d" => 0,
                    "week" | "w" => 1,
                    other => return Err(format!("Invalid window: {}. Use: day, week", other).into()),
                };
                (
                    7,
                    json!({
                        "subscriber_value_type": subscriber_value_type,
                        "window_length": window_length,
                    }),
                )
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Event {
            caller,
            duration,
            cost,
            callee,
            long_distance,
            time,
        } => {
            let timestamp = parse_timestamp(time.as_deref())?;
            let body = serde_json::json!({
                "caller_id": caller,
                "callee_id": callee,
                "duration": duration,
                "cost": cost,
                "long_distance": long_distance,
                "timestamp": timestamp,
            });

            let response = client
                .post(format!("{}/api/v1/events", cli.api_url))
                .json(&body)
                .send()
                .await?;

            check("Event rejected", response).await;

            let dt = chrono::DateTime::from_timestamp_millis(timestamp)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "Queued call of subscriber {}: {}s, cost {} at {}",
                caller, duration, cost, dt
            );
        }

        Commands::Query { query } => {
            let (kind, args) = query.kind_and_args()?;
            let response = client
                .post(format!("{}/api/v1/queries/{}", cli.api_url, kind))
                .json(&args)
                .send()
                .await?;
            let response = check("Query failed", response).await;

            let data: serde_json::Value = response.json().await?;
            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&data)?),
                "csv" => print_csv(&data)?,
                _ => print_table(&data),
            }
        }

        Commands::Record { subscriber_id } => {
            let response = client
                .get(format!("{}/api/v1/records/{}", cli.api_url, subscriber_id))
                .send()
                .await?;
            let response = check("Record lookup failed", response).await;

            let record: serde_json::Value = response.json().await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }

        Commands::Stats => {
            let response = client
                .get(format!("{}/api/v1/stats", cli.api_url))
                .send()
                .await?;
            let response = check("Failed to fetch stats", response).await;

            let stats: serde_json::Value = response.json().await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    println!("AIM v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!(
                        "API Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    println!("Shards: {}", health["shards"].as_u64().unwrap_or(0));
                    println!("Records: {}", health["records"].as_u64().unwrap_or(0));
                    println!(
                        "Queued events: {}",
                        health["queued_events"].as_u64().unwrap_or(0)
                    );
                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to AIM API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the AIM server is running:");
                    eprintln!("  cargo run --bin aim-server");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = aim::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", config),
            }
        }

        Commands::InitMeta {
            path,
            campaigns,
            seed,
        } => {
            if path.exists() {
                eprintln!("File already exists: {:?}", path);
                std::process::exit(1);
            }
            let mut store = aim::MetaStore::create(&path)?;
            let summary = store.populate_standard(seed, campaigns)?;
            println!("Metadata written to {:?}", path);
            println!("  {}", summary);
        }
    }

    Ok(())
}

/// The response if it succeeded, otherwise print the error body and exit
async fn check(context: &str, response: reqwest::Response) -> reqwest::Response {
    if response.status().is_success() {
        return response;
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    eprintln!("{} ({}): {}", context, status, text);
    std::process::exit(1);
}

fn parse_timestamp(time: Option<&str>) -> Result<i64, Box<dyn std::error::Error>> {
    match time {
        None | Some("now") => Ok(Utc::now().timestamp_millis()),
        Some(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                Ok(dt.timestamp_millis())
            } else if let Ok(ts) = s.parse::<i64>() {
                Ok(ts)
            } else {
                Err(format!("Invalid timestamp format: {}", s).into())
            }
        }
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.2}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Rows of a query result: the `results` list when present, else the
/// result object itself
fn result_rows(data: &serde_json::Value) -> Vec<serde_json::Map<String, serde_json::Value>> {
    match data.get("results") {
        Some(serde_json::Value::Array(rows)) => rows
            .iter()
            .filter_map(|r| r.as_object().cloned())
            .collect(),
        _ => data.as_object().cloned().into_iter().collect(),
    }
}

fn print_table(data: &serde_json::Value) {
    let rows = result_rows(data);
    let Some(first) = rows.first() else {
        println!("No results");
        return;
    };
    let columns: Vec<&String> = first.keys().collect();

    for column in &columns {
        print!("{:<16}", column);
    }
    println!();
    println!("{}", "-".repeat(columns.len() * 16));

    for row in &rows {
        for column in &columns {
            print!("{:<16}", row.get(*column).map(cell).unwrap_or_default());
        }
        println!();
    }
}

fn print_csv(data: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    let rows = result_rows(data);
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let columns: Vec<String> = first.keys().cloned().collect();

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(cell).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn print_record(record: &serde_json::Value) {
    println!(
        "Subscriber {}",
        record["subscriber_id"].as_u64().unwrap_or(0)
    );
    let updated = record["last_updated"]
        .as_i64()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("Last updated: {}", updated);
    println!();

    println!("{:<32} {}", "Attribute", "Value");
    println!("{}", "-".repeat(48));
    for attribute in record["attributes"].as_array().into_iter().flatten() {
        println!(
            "{:<32} {}",
            attribute["name"].as_str().unwrap_or("-"),
            cell(&attribute["value"])
        );
    }

    println!();
    println!("{:<24} {:<6} {}", "Dimension", "Id", "Label");
    println!("{}", "-".repeat(48));
    for dimension in record["dimensions"].as_array().into_iter().flatten() {
        println!(
            "{:<24} {:<6} {}",
            dimension["name"].as_str().unwrap_or("-"),
            dimension["id"].as_u64().unwrap_or(0),
            dimension["label"].as_str().unwrap_or("-")
        );
    }
}

fn print_stats(stats: &serde_json::Value) {
    println!("Uptime: {}", format_duration(stats["uptime_seconds"].as_u64().unwrap_or(0)));
    println!();

    println!("Shards:");
    for (i, shard) in stats["controller"]["shards"]
        .as_array()
        .into_iter()
        .flatten()
        .enumerate()
    {
        println!(
            "  {}: {} records, {} buckets, {} pending writes",
            i,
            shard["records"].as_u64().unwrap_or(0),
            shard["buckets"].as_u64().unwrap_or(0),
            shard["pending_writes"].as_u64().unwrap_or(0)
        );
    }

    let processor = &stats["processor"];
    println!();
    println!("Events processed: {}", processor["events_processed"].as_u64().unwrap_or(0));
    println!("Campaigns matched: {}", processor["campaigns_matched"].as_u64().unwrap_or(0));
    println!("Queued events: {}", processor["queued_events"].as_u64().unwrap_or(0));

    let latency = &stats["latency"];
    if let Some(avg) = latency["avg_ms"].as_f64() {
        println!();
        println!(
            "Latency: avg {:.3} ms, max {:.3} ms over {} events",
            avg,
            latency["max_ms"].as_f64().unwrap_or(0.0),
            latency["count"].as_u64().unwrap_or(0)
        );
    }
}
