use tokio::sync::broadcast;
use tracing::{info, warn};

use rust_loadgen::config::Config;
use rust_loadgen::driver::Driver;
use rust_loadgen::logging::init_tracing;
use rust_loadgen::metrics::{gather_metrics_string, register_metrics};

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("All settings are optional; unset values come from the selected profile.");
    eprintln!();
    eprintln!("Workload:");
    eprintln!("  PROFILE                 - light or heavy (default: light)");
    eprintln!("    light: 50000 GET requests, 200 workers, 100ms delay, 1s timeout");
    eprintln!("    heavy: 100000 POST requests of 10 MiB, 500 workers, 50ms delay, no timeout");
    eprintln!("  CONFIG_FILE             - YAML workload file, overridden by the variables below");
    eprintln!(
        "  TARGET_URL              - The URL to load (must start with http:// or https://, default: http://localhost:8081/)"
    );
    eprintln!("  TOTAL_REQUESTS          - Requests to split across workers (remainder is dropped)");
    eprintln!("  NUM_CONCURRENT_TASKS    - Number of concurrent workers (must be > 0)");
    eprintln!("  REQUEST_TYPE            - HTTP method: GET or POST");
    eprintln!("  PAYLOAD_SIZE            - POST body size in bytes");
    eprintln!("  REQUEST_DELAY           - Pause after each request: 50ms, 1s, 0");
    eprintln!("  CLIENT_TIMEOUT          - Per-request timeout: 1s, 500ms; 0 or none waits forever");
    eprintln!();
    eprintln!("Connection pool (per worker):");
    eprintln!("  POOL_MAX_IDLE_PER_HOST  - Idle connections kept per host (default: 1)");
    eprintln!("  POOL_IDLE_TIMEOUT       - How long idle connections are kept (default: 90s)");
    eprintln!("  POOL_TCP_KEEPALIVE      - TCP keepalive interval; 0 or none disables it (default: 60s)");
    eprintln!();
    eprintln!("Runtime:");
    eprintln!("  PRINT_FINAL_METRICS     - Print harness metrics after the summary (default: false)");
    eprintln!("  CANCEL_ON_INTERRUPT     - Abort workers on Ctrl-C and print a partial summary (default: false)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: rust_loadgen)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();
    register_metrics()?;

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    config.print_summary();

    let driver = Driver::new(config.workload.clone()).with_client_config(config.to_client_config());

    let summary = if config.cancel_on_interrupt {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
        driver.run_until(shutdown_rx).await?
    } else {
        driver.run().await?
    };

    if config.print_final_metrics {
        let final_metrics_output = gather_metrics_string(prometheus::default_registry());
        println!("\n--- FINAL METRICS ---\n{}", final_metrics_output);
        println!("--- END OF FINAL METRICS ---");
    }

    if summary.cancelled {
        std::process::exit(130);
    }

    Ok(())
}
