use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use libcourier::client::ApiClient;
use libcourier::config::Config;
use libcourier::delivery::{DeliveryApi, DeliveryReducer, DeliveryService, DeliveryState};
use libcourier::dispatch::{spawn_reducer_from, SignalBus};
use libcourier::logging::{LogFormat, LoggingConfig};
use libcourier::CourierError;

#[derive(Parser, Debug)]
#[command(name = "courier-sync")]
#[command(version, about = "Fetch the delivery list from the Courier API")]
#[command(long_about = r#"Fetch the delivery list from the Courier API and print the resulting state.

Connection failures are retried; every other failure ends the run.

EXAMPLES:
    # Fetch with the configured API
    courier-sync

    # Point at another server and give up after 3 retries
    courier-sync --base-url https://staging.example.com/api --retry-attempts 3

    # JSON output for scripting
    courier-sync --format json | jq '.deliveries | keys'

    # Keep state between runs, dropping deliveries the server no longer lists
    courier-sync --state ~/.cache/courier/state.json --clear

CONFIGURATION:
    Read from $COURIER_CONFIG, or ~/.config/courier/config.toml when unset.
    A missing default file means built-in defaults.

EXIT CODES:
    0 - Success
    1 - Error (connection, invalid response, configuration, etc.)
    2 - Authentication error (unauthorized or permission denied)
"#)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Override the API base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Delay between retries, e.g. "500ms" or "2s"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    retry_interval: Option<Duration>,

    /// Maximum number of retries after the first attempt
    #[arg(long, value_name = "N")]
    retry_attempts: Option<u32>,

    /// State snapshot to resume from; updated after the run
    #[arg(long, value_name = "PATH")]
    state: Option<String>,

    /// Drop previously known deliveries before applying the list
    #[arg(long)]
    clear: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let format = std::env::var("COURIER_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    let level = std::env::var("COURIER_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    LoggingConfig::new(format, level, args.verbose).init();

    tracing::debug!("courier-sync started with args: {:?}", args);

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CourierError>()
        .map(CourierError::exit_code)
        .unwrap_or(1)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            Config::load_from_path(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::load_or_default()?,
    };

    if let Some(base_url) = &args.base_url {
        config.api.base_url = base_url.clone();
    }
    if let Some(interval) = args.retry_interval {
        config.retry.interval = humantime::format_duration(interval).to_string();
    }
    if args.retry_attempts.is_some() {
        config.retry.attempts = args.retry_attempts;
    }

    config.validate()?;
    Ok(config)
}

fn load_state(path: &Path) -> Result<DeliveryState> {
    if !path.exists() {
        tracing::debug!("No state at {}, starting empty", path.display());
        return Ok(DeliveryState::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state from {}", path.display()))
}

fn save_state(path: &Path, state: &DeliveryState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write state to {}", path.display()))
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let client = ApiClient::new(&config)?;

    let state_path = args
        .state
        .as_ref()
        .map(|path| PathBuf::from(shellexpand::tilde(path).to_string()));
    let initial = match &state_path {
        Some(path) => load_state(path)?,
        None => DeliveryState::default(),
    };

    let bus = SignalBus::new();
    let (state, reducer) = spawn_reducer_from(DeliveryReducer::default(), initial, bus.subscribe());
    let service = DeliveryService::new(DeliveryApi::new(client), bus);

    let outcome = service.refresh(args.clear).await;

    // Closing the bus lets the reducer drain and stop
    drop(service);
    reducer.await.context("Reducer task failed")?;

    let state = state.borrow().clone();
    if let Some(path) = &state_path {
        save_state(path, &state)?;
    }

    match outcome {
        Some(Ok(count)) => tracing::info!("Server reports {} deliveries", count),
        Some(Err(e)) => return Err(CourierError::from(e).into()),
        None => anyhow::bail!("A refresh is already running"),
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&state)?),
        _ => print_text(&state),
    }

    Ok(())
}

fn print_text(state: &DeliveryState) {
    if state.deliveries.is_empty() {
        println!("No deliveries.");
        return;
    }

    for delivery in state.deliveries.values() {
        println!(
            "{}  {}  {}, {} {}",
            delivery.id, delivery.customer, delivery.address, delivery.zip_code, delivery.city
        );
    }
}
