//! stream-front
//!
//! A TCP proxy/server front end built with Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ config (schema/loader/validation)
//!                       │
//!                       ▼
//!                   module (registry, compose: global + per-server
//!                       │   config contexts, indexed by module)
//!                       ▼
//!                   listen (group by (port, family), sort, absorb
//!                       │   wildcard → minimal physical listeners)
//!                       ▼
//!   accept ───────▶ session (address table lookup → per-address config
//!                       │   → optional TLS/STARTTLS → protocol plugin)
//!                       ▼
//!                   proto (init_session / process_session / teardown)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_front::config::loader::load_config;
use stream_front::config::FileConfig;
use stream_front::listen;
use stream_front::module::{self, ModuleRegistry};
use stream_front::session::{self, ConnectionTracker, Runtime};

#[derive(Parser, Debug)]
#[command(name = "stream-front", about = "TCP front end with consolidated listeners")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_front=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("stream-front v0.1.0 starting");

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    tracing::info!(servers = config.servers.len(), "configuration loaded");

    // Compose module configuration: any failure here aborts startup with
    // no partial state.
    let composed = module::compose(ModuleRegistry::builtin(), &config)?;

    let servers = composed
        .global_conf::<module::core::CoreMainConf>(composed.indices.core)
        .map(|c| c.servers)
        .unwrap_or(0);
    tracing::info!(
        modules = composed.registry.len(),
        servers,
        endpoints = composed.endpoints.len(),
        "module configuration composed"
    );

    // Consolidate listen endpoints into the minimal physical socket set
    // and bind them; bind failure is fatal.
    let specs = listen::consolidate(composed.endpoints);
    let listeners = listen::bind_all(specs).await?;

    tracing::info!(listeners = listeners.len(), "listening for connections");

    let runtime = Arc::new(Runtime {
        indices: composed.indices,
        tracker: ConnectionTracker::new(),
    });

    for listener in listeners {
        tokio::spawn(session::serve(listener, Arc::clone(&runtime)));
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!(
        active = runtime.tracker.active_count(),
        "shutdown signal received"
    );
    Ok(())
}
