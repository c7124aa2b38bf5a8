//! The tickwatch daemon.
//!
//! Loads persisted state, starts the store writer, the alert service and
//! the HTTP API, and runs until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use tickwatch::api::{self, SharedState};
use tickwatch::clock::SystemClock;
use tickwatch::config::Config;
use tickwatch::notify::LogSink;
use tickwatch::service::Service;
use tickwatch::store::{JsonStore, PersistQueue, Snapshot, Store, StoreWriter};
use tickwatch::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::from_env().context("loading configuration")?;
    info!(
        listen = %config.listen,
        data_dir = %config.data_dir.display(),
        hiding_timeout_secs = config.hiding_timeout.as_secs(),
        snooze_clear_time = %config.snooze_clear_time,
        "Starting tickwatchd"
    );

    let store: Arc<dyn Store> = Arc::new(JsonStore::new(&config.data_dir));
    let snapshot = Snapshot::load(store.as_ref()).await;

    let running = CancellationToken::new();

    let (persist, write_rx) = PersistQueue::new();
    let writer = StoreWriter::new(store, write_rx);
    let store_error = writer.subscribe_errors();
    // Stopped separately, after the service, so its last writes land.
    let writer_stop = CancellationToken::new();
    let writer_task = tokio::spawn(writer.run(writer_stop.clone()));

    let (service, handle) = Service::new(
        &config,
        snapshot,
        Arc::new(SystemClock),
        persist,
        Arc::new(LogSink),
    );
    let service_task = tokio::spawn(service.run(running.clone()));

    let state = SharedState::new(handle, store_error);
    let api_running = running.clone();
    let listen = config.listen;
    let api_task = tokio::spawn(async move {
        let result = api::serve(listen, state, api_running.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "API server failed");
            api_running.cancel();
        }
        result
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            info!("Shutdown signal received");
        }
        _ = running.cancelled() => {}
    }
    running.cancel();

    let api_result = api_task.await?;
    service_task.await?;
    writer_stop.cancel();
    writer_task.await?;

    info!("Stopped");
    api_result.context("serving the API")
}
