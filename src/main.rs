use anyhow::{Context, Result};
use clap::Parser;
use feedhound::config::Config;
use feedhound::feed::{ErrorKind, Resolver, Stage};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Get the default config file path (~/.config/feedhound/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedhound")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedhound", about = "Find the RSS feed behind a web address")]
struct Args {
    /// Addresses to resolve; bare hosts such as example.com are treated as http://
    #[arg(required = true, value_name = "ADDRESS")]
    addresses: Vec<String>,

    /// Config file (defaults to ~/.config/feedhound/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Deadline for each address, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Search URL prefix used when a page links to no feeds
    #[arg(long, value_name = "URL")]
    search_endpoint: Option<String>,

    /// Print one JSON object per address
    #[arg(long)]
    json: bool,
}

/// Outcome for one address, as printed with `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    address: &'a str,
    stage: Option<Stage>,
    feeds: Vec<String>,
    error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    kind: ErrorKind,
    message: String,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;

    if let Some(secs) = args.timeout {
        config.resolve_timeout_secs = secs;
    }
    if let Some(endpoint) = &args.search_endpoint {
        config.search_endpoint = endpoint.clone();
    }
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout only carries results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let resolver = Resolver::new(&config).context("Failed to create HTTP client")?;

    // Ctrl-C cancels whatever resolution is in flight
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let mut all_found = true;

    for address in &args.addresses {
        let report = match resolver.try_resolve(address, &cancel).await {
            Ok(resolution) => Report {
                address: address.as_str(),
                stage: Some(resolution.stage),
                feeds: resolution.feeds,
                error: None,
            },
            Err(e) => Report {
                address: address.as_str(),
                stage: None,
                feeds: Vec::new(),
                error: Some(ErrorReport {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            },
        };

        all_found &= !report.feeds.is_empty();

        if args.json {
            let line = serde_json::to_string(&report).context("Failed to serialize report")?;
            println!("{line}");
        } else if let Some(error) = &report.error {
            eprintln!("{address}: {}", error.message);
        } else {
            for feed in &report.feeds {
                println!("{feed}");
            }
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(if all_found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
