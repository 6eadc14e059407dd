//! Operator tool for the EduGenius offline cache.
//!
//! Drives the cache lifecycle against a live origin and keeps the resulting
//! generations in a store directory.
//!
//! ## Usage
//!
//! ```bash
//! # Precache the manifest and take over from older generations
//! edugenius-cache --config edugenius.json deploy
//!
//! # Show generations and their keys
//! edugenius-cache list
//!
//! # Run one navigation through the controller
//! edugenius-cache fetch /student --document
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edugenius_common::{init_logging, LogConfig, LogFormat};
use edugenius_sw::{
    CacheConfig, CacheController, CacheStorage, Destination, Fetcher, LoaderConfig,
    NetworkFetcher, Registration, Request, SharedCacheStorage, UpdateOutcome,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "edugenius-cache")]
#[command(about = "Operator tool for the EduGenius offline cache")]
struct Cli {
    /// Cache configuration file (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted generations
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Log filter directives (e.g. "edugenius_sw=trace"), overrides -v
    #[arg(long, global = true, value_name = "FILTER")]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Precache the manifest into the configured generation
    Install,

    /// Delete every generation except the configured one
    Activate,

    /// Install, then activate immediately
    Deploy,

    /// List generations and their entries
    List,

    /// Run one request through the controller
    Fetch {
        /// Path relative to the deployment base path
        path: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        document: bool,
    },
}

impl Commands {
    fn writes_store(&self) -> bool {
        !matches!(self, Commands::List)
    }
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_verbosity(self.verbose);
        if self.log_json {
            config = config.with_format(LogFormat::Json);
        }
        if let Some(filter) = &self.log_filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_config());

    let config = match &cli.config {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CacheConfig::default(),
    };
    let store_dir = match cli.store {
        Some(dir) => dir,
        None => default_store_dir()?,
    };
    debug!(version = %config.version, store = %store_dir.display(), "Starting");

    let storage = load_store(&store_dir)?;
    let fetcher = Arc::new(NetworkFetcher::new(LoaderConfig::default())?);

    let writes_store = cli.command.writes_store();
    let report = run(cli.command, config, &storage, fetcher).await?;
    print!("{}", report);

    if writes_store {
        save(&storage, &store_dir).await?;
    }
    Ok(())
}

/// Execute one subcommand against `storage` and return what to print.
async fn run<F: Fetcher>(
    command: Commands,
    config: CacheConfig,
    storage: &SharedCacheStorage,
    fetcher: Arc<F>,
) -> Result<String> {
    let mut out = String::new();

    match command {
        Commands::Install => {
            let controller = CacheController::new(config, Arc::clone(storage), fetcher)?;
            let stored = controller.install().await?;
            writeln!(out, "Installed {} ({} entries)", controller.version(), stored)?;
        }

        Commands::Activate => {
            let controller = CacheController::new(config, Arc::clone(storage), fetcher)?;
            let deleted = controller.activate().await?;
            writeln!(out, "Activated {}", controller.version())?;
            for name in deleted {
                writeln!(out, "  deleted {}", name)?;
            }
        }

        Commands::Deploy => {
            let (registration, _events) = Registration::new(Arc::clone(storage), fetcher);
            match registration.update(config).await? {
                UpdateOutcome::Activated { version, deleted } => {
                    writeln!(out, "Deployed {}", version)?;
                    for name in deleted {
                        writeln!(out, "  deleted {}", name)?;
                    }
                }
                UpdateOutcome::Unchanged => writeln!(out, "Already up to date")?,
            }
        }

        Commands::List => {
            write_generations(&mut out, storage, &config.version).await?;
        }

        Commands::Fetch { path, document } => {
            let url = config.resolve(&path)?;
            let destination = if document {
                Destination::Document
            } else {
                Destination::guess(&url)
            };
            let controller = CacheController::new(config, Arc::clone(storage), fetcher)?;
            let response = controller
                .handle(Request::get(url).destination(destination))
                .await?;
            writeln!(
                out,
                "{} {} {} ({} bytes, {})",
                response.status,
                response.status_text,
                response.url,
                response.body.len(),
                if response.from_cache { "cache" } else { "network" }
            )?;
        }
    }

    Ok(out)
}

fn load_store(dir: &Path) -> Result<SharedCacheStorage> {
    let storage = CacheStorage::load_from_dir(dir)
        .with_context(|| format!("loading store {}", dir.display()))?;
    Ok(storage.shared())
}

async fn save(storage: &SharedCacheStorage, dir: &Path) -> Result<()> {
    storage
        .read()
        .await
        .save_to_dir(dir)
        .with_context(|| format!("saving store {}", dir.display()))
}

async fn write_generations(
    out: &mut String,
    storage: &SharedCacheStorage,
    current: &str,
) -> std::fmt::Result {
    let storage = storage.read().await;
    let names = storage.keys();
    if names.is_empty() {
        return writeln!(out, "No generations");
    }
    for name in names {
        let marker = if name == current { "*" } else { " " };
        let Some(cache) = storage.get(name) else {
            continue;
        };
        writeln!(out, "{} {} ({} entries)", marker, name, cache.len())?;
        for key in cache.keys() {
            writeln!(out, "    {}", key)?;
        }
    }
    Ok(())
}

fn default_store_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("could not find cache directory")?;
    Ok(cache_dir.join("edugenius").join("offline"))
}
