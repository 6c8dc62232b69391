// Polling scheduler: discovery on connect, then read -> diff -> publish

mod trigger;

pub use trigger::{refresh_channel, RefreshTrigger};

#[cfg(test)]
mod tests;

use crate::config::SyncConfig;
use crate::discovery::publish_discovery;
use crate::error::{with_timeout, SyncError};
use crate::mqtt::{ConnectionEvent, MessageBus, Topics};
use crate::state::{LastPublishedState, StatePublisher};
use crate::store::{SnapshotReader, VehicleStore};
use crate::vehicle::{TeslaMateFeed, UnitSettings, VehicleIdentity};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// No bus session; nothing is published
    Disconnected,
    /// Connected, discovery not yet accepted by the bus
    Discovering,
    /// Steady state: one read -> diff -> publish pass per tick
    Polling,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Disconnected => "disconnected",
            SchedulerState::Discovering => "discovering",
            SchedulerState::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Drives the sync cycle for one vehicle.
///
/// The only owner of `LastPublishedState`. Passes run inside the select
/// loop, so they never overlap; ticks that fall due during a slow pass are
/// skipped.
pub struct SyncScheduler {
    vehicle: VehicleIdentity,
    store: Arc<dyn VehicleStore>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    units: UnitSettings,
    reader: SnapshotReader,
    publisher: StatePublisher,
    cache: LastPublishedState,
    state: SchedulerState,
    poll_interval: Duration,
    operation_timeout: Duration,
    failure_threshold: u32,
    max_reconnect_attempts: u32,
    consecutive_failures: u32,
    failed_reconnects: u32,
}

impl SyncScheduler {
    pub fn new(
        vehicle: VehicleIdentity,
        store: Arc<dyn VehicleStore>,
        bus: Arc<dyn MessageBus>,
        topics: Topics,
        units: UnitSettings,
        home_geofence: &str,
        config: &SyncConfig,
    ) -> Self {
        let reader = SnapshotReader::new(
            store.clone(),
            home_geofence,
            units,
            config.operation_timeout(),
        );
        let publisher = StatePublisher::new(
            bus.clone(),
            topics.clone(),
            config.position_tolerance_meters,
        );

        Self {
            vehicle,
            store,
            bus,
            topics,
            units,
            reader,
            publisher,
            cache: LastPublishedState::new(),
            state: SchedulerState::Disconnected,
            poll_interval: config.poll_interval(),
            operation_timeout: config.operation_timeout(),
            failure_threshold: config.failure_threshold.max(1),
            max_reconnect_attempts: config.max_reconnect_attempts.max(1),
            consecutive_failures: 0,
            failed_reconnects: 0,
        }
    }

    /// Top up every snapshot with what TeslaMate announced over MQTT.
    pub fn with_feed(mut self, feed: TeslaMateFeed) -> Self {
        self.reader = self.reader.with_feed(feed);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cache(&self) -> &LastPublishedState {
        &self.cache
    }

    /// Run until shutdown, or until the store cannot be reconnected.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut refresh: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SyncError> {
        info!(
            vin = %self.vehicle.vin,
            interval_seconds = self.poll_interval.as_secs(),
            "Starting sync scheduler"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        warn!("MQTT event loop gone, stopping scheduler");
                        break;
                    }
                },
                _ = ticker.tick() => self.poll_once().await?,
                Some(()) = refresh.recv() => {
                    debug!(vin = %self.vehicle.vin, "Out-of-cycle refresh");
                    self.poll_once().await?;
                }
            }
        }

        info!(vin = %self.vehicle.vin, "Sync scheduler stopped");
        Ok(())
    }

    /// React to a transport change. On every connect the cache is dropped
    /// and discovery runs before any state is published.
    pub async fn handle_event(&mut self, event: ConnectionEvent) -> Result<(), SyncError> {
        match event {
            ConnectionEvent::Connected => {
                self.cache.clear();
                self.set_state(SchedulerState::Discovering);
                self.poll_once().await
            }
            ConnectionEvent::Disconnected => {
                self.set_state(SchedulerState::Disconnected);
                Ok(())
            }
        }
    }

    /// One tick. Retries discovery first when it has not gone through yet.
    ///
    /// Only an unrecoverable store is returned as an error; everything else
    /// is logged and retried on the next tick.
    pub async fn poll_once(&mut self) -> Result<(), SyncError> {
        if self.state == SchedulerState::Disconnected {
            debug!("Bus disconnected, skipping pass");
            return Ok(());
        }

        if self.state == SchedulerState::Discovering {
            match publish_discovery(self.bus.as_ref(), &self.vehicle, &self.topics, &self.units)
                .await
            {
                Ok(_) => self.set_state(SchedulerState::Polling),
                Err(e) => {
                    warn!(vin = %self.vehicle.vin, error = %e, "Discovery failed, retrying next tick");
                    return Ok(());
                }
            }
        }

        self.run_pass().await
    }

    async fn run_pass(&mut self) -> Result<(), SyncError> {
        let snapshot = match self.reader.read_snapshot(&self.vehicle).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(vin = %self.vehicle.vin, error = %e, "Snapshot read failed");
                return self.record_failure().await;
            }
        };

        self.consecutive_failures = 0;
        self.failed_reconnects = 0;

        let report = self.publisher.publish_changes(&snapshot, &mut self.cache).await;
        if report.is_complete() {
            debug!(
                vin = %self.vehicle.vin,
                updated = report.updated.len(),
                unchanged = report.unchanged,
                "Pass complete"
            );
        } else {
            warn!(
                vin = %self.vehicle.vin,
                updated = report.updated.len(),
                failed = report.failed.len(),
                "Pass incomplete, failed fields retried next tick"
            );
        }
        Ok(())
    }

    /// Count a failed read; at the threshold the store is reconnected, and
    /// too many failed reconnects in a row end the scheduler.
    async fn record_failure(&mut self) -> Result<(), SyncError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.failure_threshold {
            return Ok(());
        }

        warn!(
            failures = self.consecutive_failures,
            "Too many failed passes, reconnecting to the database"
        );

        match with_timeout("store reconnect", self.operation_timeout, self.store.reconnect()).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.failed_reconnects = 0;
                Ok(())
            }
            Err(e) => {
                self.failed_reconnects += 1;
                error!(
                    attempt = self.failed_reconnects,
                    max_attempts = self.max_reconnect_attempts,
                    error = %e,
                    "Database reconnect failed"
                );
                if self.failed_reconnects >= self.max_reconnect_attempts {
                    return Err(SyncError::Transient(format!(
                        "database unreachable after {} reconnect attempts: {}",
                        self.failed_reconnects, e
                    )));
                }
                Ok(())
            }
        }
    }

    fn set_state(&mut self, state: SchedulerState) {
        if self.state != state {
            info!(vin = %self.vehicle.vin, from = %self.state, to = %state, "Scheduler state change");
            self.state = state;
        }
    }
}
