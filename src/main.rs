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

use courier_server::config::Config;
use courier_server::{AppBuilder, adapters, telemetry};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    courier_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (listener, app_router, shutdown_tx, shutdown_rx) = async {
        // Phase 1: Infrastructure Setup
        let pool = match &config.database.url {
            Some(url) => {
                let pool = adapters::database::init_pool(url, &config.database).await?;
                courier_server::run_migrations(&pool).await?;
                Some(pool)
            }
            None => None,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        courier_server::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component Wiring
        let mut builder = AppBuilder::new(config.clone());
        if let Some(pool) = pool {
            builder = builder.with_database(pool);
        }
        let app = builder.build()?;

        // Phase 3: Runtime Setup
        let app_router = courier_server::api::app_router(config.clone(), app.dispatch, shutdown_rx.clone());

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        tracing::info!(address = %addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        Ok::<(tokio::net::TcpListener, axum::Router, watch::Sender<bool>, watch::Receiver<bool>), anyhow::Error>((
            listener,
            app_router,
            shutdown_tx,
            shutdown_rx,
        ))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Serve until a shutdown signal arrives
    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app_router).with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|&s| s).await;
    });
    let mut server = tokio::spawn(async move { server.await });

    // Phase 5: Graceful Shutdown Orchestration
    let mut signal_rx = shutdown_rx.clone();
    let finished_early = tokio::select! {
        res = &mut server => {
            log_server_exit(res);
            true
        }
        _ = signal_rx.wait_for(|&s| s) => false,
    };

    if !finished_early {
        let _ = shutdown_tx.send(true);
        tokio::select! {
            res = server => log_server_exit(res),
            () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
                tracing::warn!("timed out waiting for in-flight requests to finish");
            }
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}

fn log_server_exit(res: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => tracing::info!("server drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "server error"),
        Err(e) => tracing::error!(error = %e, "server task failed"),
    }
}
