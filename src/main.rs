use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teslabuddy::command::{wake_channel, CommandDispatcher, TeslaApiExecutor, TeslaMateWaker};
use teslabuddy::config::env::{apply_env_overrides, RejectedOverride};
use teslabuddy::config::{load_config, BuddyConfig};
use teslabuddy::error::SyncError;
use teslabuddy::mqtt::{self, InboundRouter, Topics};
use teslabuddy::scheduler::{refresh_channel, SyncScheduler};
use teslabuddy::store::{PgVehicleStore, VehicleStore};
use teslabuddy::vehicle::{TeslaMateFeed, UnitSettings};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, rejected) = read_config()?;

    // Initialize tracing subscriber
    let default_filter = if config.debug {
        "teslabuddy=debug"
    } else {
        "teslabuddy=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!("TeslaBuddy starting...");

    for RejectedOverride { variable, value } in &rejected {
        warn!(variable = *variable, value = %value, "Ignoring unparsable environment override");
    }

    config.validate().context("Invalid configuration")?;

    let operation_timeout = config.sync.operation_timeout();
    let request_timeout = Duration::from_secs(config.api.request_timeout_seconds.max(1));

    // TeslaMate database
    let store = Arc::new(
        PgVehicleStore::connect(config.database.clone(), operation_timeout)
            .await
            .context("Failed to connect to the TeslaMate database")?,
    );

    let vehicle = store
        .resolve_vehicle(config.vehicle.vin.as_deref())
        .await
        .map_err(SyncError::into_startup)
        .context("Failed to resolve the vehicle")?;

    let units = match store.unit_settings().await {
        Ok(units) => units,
        Err(e) => {
            warn!(error = %e, "Failed to read TeslaMate unit settings, using metric");
            UnitSettings::default()
        }
    };

    info!(
        vin = %vehicle.vin,
        name = %vehicle.display_name(),
        model = %vehicle.model,
        length_unit = units.length_symbol(),
        temperature_unit = units.temperature_symbol(),
        "Vehicle resolved"
    );

    let topics = Topics::new(
        config.base_topic(),
        &config.mqtt.discovery_prefix,
        &vehicle.vin,
    );

    // Channels between the tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (command_tx, command_rx) = mpsc::channel(config.mqtt.command_queue);
    let (refresh, refresh_rx) = refresh_channel();
    let (wake, wake_rx) = wake_channel();
    let (pump_stop_tx, pump_stop_rx) = watch::channel(false);
    let feed = TeslaMateFeed::new();

    // MQTT client
    let router = InboundRouter::new(
        topics.clone(),
        config.sync.observe_teslamate.then_some(vehicle.car_id),
    );
    let session = mqtt::connect(
        &config.mqtt,
        operation_timeout,
        router,
        command_tx,
        refresh.clone(),
        feed.clone(),
    );
    let bus = session.bus;

    // Command path
    let executor = TeslaApiExecutor::new(&config.api, store.clone())
        .context("Failed to initialize the Tesla API client")?;
    let dispatcher = CommandDispatcher::new(
        vehicle.clone(),
        topics.clone(),
        Arc::new(executor),
        refresh,
        request_timeout,
    )
    .with_waker(wake);

    let http_client = reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let waker = TeslaMateWaker::new(http_client, &config.api.teslamate_url, vehicle.car_id, wake_rx);

    // Sync cycle
    let scheduler = SyncScheduler::new(
        vehicle,
        store.clone(),
        Arc::new(bus.clone()),
        topics,
        units,
        &config.vehicle.home_geofence,
        &config.sync,
    )
    .with_feed(feed);

    let mut pump_handle = tokio::spawn(session.pump.run(pump_stop_rx));
    let mut dispatcher_handle = tokio::spawn(dispatcher.run(command_rx, shutdown_rx.clone()));
    let mut waker_handle = tokio::spawn(waker.run(shutdown_rx.clone()));
    let mut scheduler_handle =
        tokio::spawn(scheduler.run(session.events, refresh_rx, shutdown_rx));

    info!("TeslaBuddy running");

    // Wait for shutdown signal or a fatal scheduler error
    let mut outcome: Result<()> = Ok(());
    let mut scheduler_done = false;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl_c signal")?;
            info!("Shutdown signal received");
        }
        result = &mut scheduler_handle => {
            scheduler_done = true;
            match result {
                Ok(Ok(())) => info!("Sync scheduler finished"),
                Ok(Err(e)) => {
                    error!(error = %e, "Sync scheduler failed");
                    outcome = Err(e).context("Sync scheduler failed");
                }
                Err(e) => {
                    error!(error = %e, "Sync scheduler task panicked");
                    outcome = Err(e).context("Sync scheduler task failed");
                }
            }
        }
    }

    // Graceful shutdown. Producers stop first so whatever they already
    // queued on the MQTT client goes out before the DISCONNECT.
    let _ = shutdown_tx.send(true);
    let grace = config.sync.shutdown_grace();
    let deadline = tokio::time::Instant::now() + grace;

    let drained = tokio::time::timeout_at(deadline, async {
        if !scheduler_done {
            let _ = (&mut scheduler_handle).await;
        }
        let _ = (&mut dispatcher_handle).await;
        let _ = (&mut waker_handle).await;
    })
    .await;
    if drained.is_err() {
        warn!(grace_seconds = grace.as_secs(), "Tasks still running after grace period");
        scheduler_handle.abort();
        dispatcher_handle.abort();
        waker_handle.abort();
    }

    if let Err(e) = bus.disconnect().await {
        warn!(error = %e, "Failed to request MQTT disconnect");
    }
    if tokio::time::timeout_at(deadline, &mut pump_handle).await.is_err() {
        warn!("MQTT queue not flushed within grace period");
        let _ = pump_stop_tx.send(true);
        let _ = pump_handle.await;
    }

    info!("TeslaBuddy stopped");
    outcome
}

/// Config file from `TESLABUDDY_CONFIG` or the first argument, then the
/// environment on top. Without a file only defaults and environment apply.
/// Runs before logging exists, so rejected overrides are handed back.
fn read_config() -> Result<(BuddyConfig, Vec<RejectedOverride>)> {
    let path = std::env::var_os("TESLABUDDY_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from));

    let mut config = match path {
        Some(path) => load_config(&path)?,
        None => BuddyConfig::default(),
    };
    let rejected = apply_env_overrides(&mut config);
    Ok((config, rejected))
}
