use rust_loadgen::logging::init_tracing;
use rust_loadgen::target::{serve, TargetConfig};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match TargetConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            eprintln!("Optional environment variables:");
            eprintln!("  TARGET_LISTEN_ADDR      - Address to listen on (default: 0.0.0.0:8081)");
            eprintln!("  LATENCY_THRESHOLD       - Latency that marks the service down (default: 1s)");
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(&config).await {
        eprintln!("could not start server: {}", e);
        std::process::exit(1);
    }
}
