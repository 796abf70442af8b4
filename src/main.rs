//! api-resilience command line.
//!
//! Issues one request through the full client pipeline and prints the JSON
//! response, or prints the profile that would be used.
//!
//! ```text
//! api-resilience --config client.toml get /meals/today
//! api-resilience --platform ios post /meals '{"kcal": 420}'
//! api-resilience profile
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

use api_resilience::config::{load_config, ClientConfig};
use api_resilience::observability::logging::init_logging;
use api_resilience::{ApiClient, ApiError};

#[derive(Parser)]
#[command(name = "api-resilience")]
#[command(about = "Send requests through the resilient API client", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `base_url` from the config
    #[arg(short, long)]
    base_url: Option<String>,

    /// OS identifier (ios, android, ...) overriding detection
    #[arg(short, long)]
    platform: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path
    Get { path: String },
    /// POST a JSON body
    Post { path: String, body: Option<String> },
    /// PUT a JSON body
    Put { path: String, body: Option<String> },
    /// PATCH a JSON body
    Patch { path: String, body: Option<String> },
    /// DELETE a path
    Delete { path: String },
    /// Print the resolved platform profile
    Profile,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(platform) = cli.platform {
        config.platform = Some(platform);
    }

    init_logging(&config.observability);

    match run(&config, cli.command).await {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ClientConfig, command: Commands) -> Result<Value, ApiError> {
    let client = match command {
        Commands::Profile => return Ok(profile_json(config)),
        _ => ApiClient::from_config(config)?,
    };

    match command {
        Commands::Get { path } => client.get(&path).await,
        Commands::Delete { path } => client.delete(&path).await,
        Commands::Post { path, body } => client.post(&path, &parse_body(body)?).await,
        Commands::Put { path, body } => client.put(&path, &parse_body(body)?).await,
        Commands::Patch { path, body } => client.patch(&path, &parse_body(body)?).await,
        Commands::Profile => Ok(profile_json(config)),
    }
}

fn profile_json(config: &ClientConfig) -> Value {
    let profile = config.resolve_profile();
    serde_json::json!({
        "platform": config.platform().as_str(),
        "max_concurrent": profile.max_concurrent,
        "min_interval_ms": profile.min_interval.as_millis() as u64,
        "request_timeout_ms": profile.request_timeout.as_millis() as u64,
        "failure_threshold": profile.failure_threshold,
        "reset_timeout_ms": profile.reset_timeout.as_millis() as u64,
        "max_retries": profile.max_retries,
        "retry_base_delay_ms": profile.retry_base_delay.as_millis() as u64,
        "retry_max_delay_ms": profile.retry_max_delay.as_millis() as u64,
    })
}

fn parse_body(body: Option<String>) -> Result<Value, ApiError> {
    match body {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not valid JSON: {e}"))),
        None => Ok(Value::Object(Default::default())),
    }
}
