#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod channel_types;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod transport;

use crate::adapters::database::{DbPool, PgChannelRepository, PgMessageRepository, PgTemplateRepository};
use crate::adapters::memory::{InMemoryChannelRepository, InMemoryMessageRepository, InMemoryTemplateRepository};
use crate::channel_types::ChannelTypeRegistry;
use crate::config::Config;
use crate::services::DispatchService;
use crate::storage::{ChannelRepository, MessageRepository, TemplateRepository};
use std::sync::Arc;
use tokio::sync::watch;

/// Fully wired application components.
#[derive(Debug)]
pub struct App {
    pub dispatch: DispatchService,
    pub registry: Arc<ChannelTypeRegistry>,
    pub channels: Arc<dyn ChannelRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

/// Wires repositories, channel types and the dispatch engine.
///
/// Without a database pool the in-memory repositories are used.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    registry: Option<Arc<ChannelTypeRegistry>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, registry: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Uses `registry` instead of one built from the transport config.
    /// The built-in types are still added if missing.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ChannelTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// # Errors
    /// Returns an error if a built-in channel type cannot be constructed.
    pub fn build(self) -> anyhow::Result<App> {
        let registry = match self.registry {
            Some(registry) => {
                registry.register_builtins(&self.config.transports)?;
                registry
            }
            None => Arc::new(ChannelTypeRegistry::with_builtins(&self.config.transports)?),
        };
        tracing::info!(channel_types = ?registry.list_names(), "channel types registered");

        let (channels, templates, messages): (
            Arc<dyn ChannelRepository>,
            Arc<dyn TemplateRepository>,
            Arc<dyn MessageRepository>,
        ) = if let Some(pool) = self.pool {
            (
                Arc::new(PgChannelRepository::new(pool.clone())),
                Arc::new(PgTemplateRepository::new(pool.clone())),
                Arc::new(PgMessageRepository::new(pool)),
            )
        } else {
            tracing::warn!("no database configured, using in-memory repositories");
            (
                Arc::new(InMemoryChannelRepository::new()),
                Arc::new(InMemoryTemplateRepository::new()),
                Arc::new(InMemoryMessageRepository::new()),
            )
        };

        let dispatch = DispatchService::new(
            Arc::clone(&registry),
            Arc::clone(&channels),
            Arc::clone(&templates),
            Arc::clone(&messages),
            self.config.dispatch.clone(),
        );

        Ok(App { dispatch, registry, channels, templates, messages })
    }
}

/// Applies pending schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("running database migrations");
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Routes panic reports through `tracing` so they reach the configured log output.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(location = %location, payload = %payload, "panic occurred");
    }));
}

/// Flips `shutdown_tx` to `true` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
            () = terminate => tracing::info!("received SIGTERM, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });
}
