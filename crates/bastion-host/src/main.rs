//! Reference host for the Bastion property store.
//!
//! Wires a backing container, the store runtime, and the economy together,
//! then serves operator commands from stdin until `quit` or end of input.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `bastion.yaml` (or the path given as the
//!    first argument); defaults if the file is absent
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured backend (memory or Dragonfly)
//! 4. Start the store runtime and build the economy
//! 5. Run the console loop
//! 6. Flush queued writes and exit

mod config;
mod console;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bastion_economy::Economy;
use bastion_store::{ContainerProvider, DragonflyBackend, ManagerRegistry, MemoryBackend, StoreRuntime};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{BackendKind, HostConfig, LoggingConfig, StoreConfig};
use crate::console::Console;
use crate::error::HostError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "bastion.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging, or the backend cannot be
/// set up, or if console I/O fails.
#[tokio::main]
async fn main() -> Result<(), HostError> {
    // 1. Load configuration.
    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let config = load_config(&path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        config = %path.display(),
        namespace = config.store.namespace,
        backend = %config.store.backend,
        max_balance = config.economy.max_balance,
        "bastion-host starting"
    );

    // 3. Open the backend.
    let provider = open_backend(&config.store).await?;

    // 4. Start the runtime and build the economy.
    let runtime = StoreRuntime::with_logging();
    let registry = ManagerRegistry::new(config.namespace()?, provider, runtime.clone());
    let economy = Economy::new(registry, config.economy.max_balance)?;
    info!("economy ready; type `help` for commands");

    // 5. Serve the console.
    let console = Console::new(economy);
    console
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    // 6. Flush.
    runtime.flush().await;
    info!("bastion-host stopped");
    Ok(())
}

/// Load and validate configuration from `path`, falling back to defaults
/// when the file does not exist.
fn load_config(path: &Path) -> Result<HostConfig, HostError> {
    let config = if path.exists() {
        HostConfig::from_file(path)?
    } else {
        let mut config = HostConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config
    };
    config.validate()?;
    Ok(config)
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
fn init_logging(config: &LoggingConfig) -> Result<(), HostError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| HostError::Logging {
        message: e.to_string(),
    })
}

/// Build the container provider the configuration names.
async fn open_backend(config: &StoreConfig) -> Result<Arc<dyn ContainerProvider>, HostError> {
    match config.backend {
        BackendKind::Memory => {
            info!("using in-memory backend; values are lost on exit");
            Ok(Arc::new(MemoryBackend::new()))
        }
        BackendKind::Dragonfly => {
            info!(url = config.dragonfly_url, "connecting to Dragonfly");
            let backend = DragonflyBackend::connect(&config.dragonfly_url).await?;
            info!("Dragonfly connected");
            Ok(Arc::new(backend))
        }
    }
}
