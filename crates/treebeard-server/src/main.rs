//! Treebeard server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus
//! `TREEBEARD_*` environment variables, opens an in-process SQLite store, and
//! serves the API over HTTP.
//!
//! Nested keys use a double underscore, e.g. `TREEBEARD_LLM__API_KEY`.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for an `[[auth.users]]` entry:
//!
//! ```
//! cargo run -p treebeard-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::{OsRng, RngCore};
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use treebeard_core::{Treebeard, oracle::OracleRegistry};
use treebeard_server::{
  AppState, ServerConfig, auth::Authenticator, remote::HttpCollaborators, scheduler,
};
use treebeard_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Treebeard dashboard assistant server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("TREEBEARD")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if server_cfg.settings.signing_secret.is_empty() {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    server_cfg.settings.signing_secret = hex::encode(secret);
    warn!("no signing secret configured; upload URLs will not survive a restart");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let remote = HttpCollaborators::new(
    server_cfg.llm.clone(),
    server_cfg.refresh.clone(),
    server_cfg.analysis.clone(),
  )
  .context("failed to build HTTP client")?;

  let registry = OracleRegistry::new(server_cfg.dashboards.clone());
  info!(dashboards = ?registry.dashboard_ids(), "oracles registered");

  let service = Arc::new(Treebeard::new(
    Arc::new(store),
    Arc::new(remote),
    registry,
    server_cfg.settings.clone(),
  ));

  let warm = service.clone();
  tokio::spawn(async move { scheduler::warm_up(&warm).await });
  scheduler::spawn(
    service.clone(),
    Duration::from_secs(server_cfg.refresh.interval_secs),
  );

  let state = AppState {
    service,
    auth: Arc::new(Authenticator::new(
      server_cfg.auth.clone(),
      server_cfg.is_development(),
    )),
    config: Arc::new(server_cfg.clone()),
  };

  let app = treebeard_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutting down");
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
