use clap::{Parser, Subcommand};
use serde_json::Value;
use std::time::Duration;

use edge_resilience::config::RetryConfig;
use edge_resilience::http::{OutboundClient, OutboundError, RequestOptions};
use edge_resilience::observability::Logger;

#[derive(Parser)]
#[command(name = "health-cli")]
#[command(about = "Query the health endpoints of an edge-resilience service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Attempts per request; transient failures are retried.
    #[arg(short, long, default_value_t = 3)]
    attempts: u32,

    /// Per-attempt timeout in seconds.
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate health of the service and its dependencies
    Status,
    /// Run one named probe
    Probe { name: String },
    /// Debug-mode diagnostics
    Detailed,
    /// Liveness check
    Live,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let retry = RetryConfig {
        enabled: cli.attempts > 1,
        max_attempts: cli.attempts.max(1),
        ..RetryConfig::default()
    };
    let client = OutboundClient::new(
        &cli.url,
        Duration::from_secs(cli.timeout),
        retry,
        Logger::tracing(),
    )?;

    let path = match &cli.command {
        Commands::Status => "health".to_string(),
        Commands::Probe { name } => format!("health/{name}"),
        Commands::Detailed => "health/detailed".to_string(),
        Commands::Live => "health/live".to_string(),
    };
    // 503/502 from these endpoints carry the verdict itself.
    let options = match &cli.command {
        Commands::Status | Commands::Probe { .. } => RequestOptions::new().idempotent(false),
        Commands::Detailed | Commands::Live => RequestOptions::new(),
    };

    let code = match client.get_json::<Value>(&path, options).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            exit_code(&body)
        }
        Err(err) => {
            print_error(&err)?;
            1
        }
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Non-zero when the document reports the service or probe unhealthy.
fn exit_code(document: &Value) -> i32 {
    match document.get("status").and_then(Value::as_str) {
        Some("unhealthy") => 1,
        _ => 0,
    }
}

fn print_error(err: &OutboundError) -> Result<(), Box<dyn std::error::Error>> {
    // An unhealthy service still answers with the health document.
    if let Some(body) = err.body() {
        if let Ok(json) = serde_json::from_str::<Value>(body) {
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }
    }

    eprintln!("Error: {err}");
    if let Some(remote) = err.remote() {
        eprintln!("Code: {}", remote.code());
        if let Some(id) = remote.context().get("remote_correlation_id") {
            eprintln!("Correlation ID: {id}");
        }
    }
    Ok(())
}
