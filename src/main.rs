//! guestdir - command-line access to the guest-directory cache.
//!
//! Hydrates the local mirror, runs one-off searches, reports cache status,
//! and offers an interactive mode that feeds stdin lines through the same
//! debounced orchestrator a typeahead box would use.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guestdir::utils::truncate_string;
use guestdir::{ApiClient, CacheService, Config, GuestSummary, SearchMode, SearchOutcome};

/// Widest result line printed before truncation
const MAX_LINE_WIDTH: usize = 100;

#[derive(Parser)]
#[command(name = "guestdir", version, about = "Local cache and typeahead search for the guest directory")]
struct Cli {
    /// Search strategy for this run (overrides config)
    #[arg(long, global = true)]
    mode: Option<SearchMode>,

    /// Cache directory (overrides config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the local cache from the directory (skipped while fresh)
    Hydrate {
        /// Ignore the freshness window
        #[arg(long)]
        force: bool,
    },
    /// Run a single query and print the matches
    Search {
        query: String,
        /// Do not refresh a stale cache before searching
        #[arg(long)]
        no_hydrate: bool,
    },
    /// Show record count and freshness
    Status,
    /// Treat each stdin line as the current contents of a search box
    Interactive,
    /// Print the effective configuration
    Config {
        /// Also write it to the config file (the API token is left out)
        #[arg(long)]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(mode) = cli.mode {
        config.search_mode = mode;
    }
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = Some(dir);
    }

    if let Command::Config { save } = cli.command {
        return show_config(config, save);
    }

    let mut client = ApiClient::new(config.api_base_url.clone())?;
    if let Some(ref token) = config.api_token {
        client.set_token(token.clone());
    }

    let cache_dir = config.cache_dir()?;
    let service = Arc::new(CacheService::open(&config, &cache_dir, Arc::new(client)));
    service
        .init()
        .await
        .with_context(|| format!("Guest cache at {} is unavailable", cache_dir.display()))?;

    let result = match cli.command {
        Command::Hydrate { force } => hydrate(&service, force).await,
        Command::Search { query, no_hydrate } => search(&service, &query, no_hydrate).await,
        Command::Status => status(&service).await,
        Command::Interactive => interactive(&service).await,
        Command::Config { .. } => Ok(()),
    };

    service.dispose().await;
    result
}

async fn hydrate(service: &CacheService, force: bool) -> Result<()> {
    let count = service.hydrate(force).await?;
    if count == 0 {
        eprintln!("Cache is fresh, nothing fetched (use --force to refresh anyway)");
    } else {
        eprintln!("Hydrated {} guests", count);
    }
    Ok(())
}

async fn search(service: &CacheService, query: &str, no_hydrate: bool) -> Result<()> {
    if !no_hydrate && service.orchestrator().mode() == SearchMode::Local {
        // Serve whatever snapshot exists if the refresh fails.
        if let Err(e) = service.hydrate(false).await {
            warn!(error = %e, "Refresh before search failed, using cached guests");
        }
    }

    match service.search(query, &CancellationToken::new()).await? {
        Some(results) => print_results(&results),
        None => info!("Search cancelled"),
    }
    Ok(())
}

fn show_config(mut config: Config, save: bool) -> Result<()> {
    // Tokens stay in the environment.
    config.api_token = None;
    println!("{}", serde_json::to_string_pretty(&config)?);
    if save {
        let path = config.save()?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(())
}

async fn status(service: &CacheService) -> Result<()> {
    let status = service.status().await?;
    println!("guests:         {}", status.records);
    println!("last hydrated:  {}", status.last_hydrated);
    println!("stale:          {}", if status.is_stale { "yes" } else { "no" });
    println!("search mode:    {}", status.search_mode);
    Ok(())
}

async fn interactive(service: &Arc<CacheService>) -> Result<()> {
    if service.orchestrator().mode() == SearchMode::Local {
        service.refresh_in_background(false);
    }

    eprintln!("Type to search ({} mode), Ctrl+D to quit", service.orchestrator().mode());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut latest: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        let service = Arc::clone(service);
        latest = Some(tokio::spawn(async move {
            match service.submit_query(&line).await {
                Ok(SearchOutcome::Delivered(results)) => {
                    println!("-- {:?}: {} match(es)", line, results.len());
                    print_results(&results);
                }
                Ok(SearchOutcome::Superseded) => {}
                Err(e) => eprintln!("Search failed: {}", e),
            }
        }));
    }

    // Let the final query land before exiting.
    if let Some(handle) = latest {
        handle.await?;
    }
    Ok(())
}

fn print_results(results: &[GuestSummary]) {
    if results.is_empty() {
        println!("(no matches)");
    }
    for guest in results {
        println!("{}", truncate_string(&guest.display_line(), MAX_LINE_WIDTH));
    }
}
