use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, LimitConfig, LoggingConfig};
use gatekeeper::{LimiterRegistry, RateLimiter};

/// Drive simulated load through a rate limiter and report its usage.
#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about)]
struct Args {
    /// YAML configuration file; without it a single limiter is built from flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the limiter to exercise
    #[arg(short, long, default_value = "default")]
    limiter: String,

    /// Requests per window when no config file is given
    #[arg(long, default_value_t = 60)]
    requests: i64,

    /// Cost per window when no config file is given
    #[arg(long, default_value_t = 60000.0)]
    cost: f64,

    /// Window length in seconds when no config file is given
    #[arg(long, default_value_t = 60.0)]
    window_secs: f64,

    /// Worker threads admitting in blocking mode
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Async tasks admitting in suspending mode
    #[arg(long, default_value_t = 2)]
    tasks: usize,

    /// Admissions per worker
    #[arg(long, default_value_t = 10)]
    calls: usize,

    /// Estimated cost of each admission
    #[arg(long, default_value_t = 100.0)]
    call_cost: f64,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GatekeeperConfig::from_file(path)?,
        None => flag_config(&args),
    };

    // The config decides the log format, so it is loaded before tracing exists.
    init_tracing(&config.logging, args.json_logs);

    info!("Starting Gatekeeper load run");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!(path = %path.display(), "Configuration file loaded"),
        None => info!("Configuration built from command line flags"),
    }

    let registry = LimiterRegistry::from_config(&config)?;
    let limiter = registry.require(&args.limiter)?;
    info!(limiter = %args.limiter, resources = registry.len(), "Configuration loaded");

    let interrupted = tokio::select! {
        _ = run_load(limiter.clone(), &args) => false,
        _ = shutdown_signal() => {
            warn!("Load run interrupted");
            true
        }
    };

    let usage = limiter.current_usage();
    println!("{}", serde_json::to_string_pretty(&usage)?);

    if interrupted {
        // Blocking workers may be asleep inside an admission; don't wait for them.
        std::process::exit(130);
    }

    info!("Gatekeeper load run finished");
    Ok(())
}

fn flag_config(args: &Args) -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.limits.insert(
        args.limiter.clone(),
        LimitConfig {
            requests_per_window: args.requests,
            cost_per_window: args.cost,
            window_secs: args.window_secs,
            ..LimitConfig::default()
        },
    );
    config
}

fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json || force_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run every blocking worker and async task to completion.
async fn run_load(limiter: Arc<RateLimiter>, args: &Args) {
    let start = Instant::now();
    let calls = args.calls;
    let cost = args.call_cost;

    let mut handles = Vec::with_capacity(args.threads + args.tasks);

    for worker in 0..args.threads {
        let limiter = limiter.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            for call in 0..calls {
                limiter.admit_blocking(cost);
                info!(worker, call, mode = "blocking", "Admitted");
            }
        }));
    }

    for worker in 0..args.tasks {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            for call in 0..calls {
                limiter.admit(cost).await;
                info!(worker, call, mode = "async", "Admitted");
            }
        }));
    }

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            warn!(error = %e, "Load worker failed");
        }
    }

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "All admissions completed");
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
