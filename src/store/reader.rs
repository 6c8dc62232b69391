use super::VehicleStore;
use crate::error::{with_timeout, SyncError};
use crate::vehicle::{Snapshot, TeslaMateFeed, UnitSettings, VehicleIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Turns the store's latest reading into a `Snapshot`, topped up with
/// whatever TeslaMate announced over MQTT for fields the store lacks.
///
/// A vehicle disappearing after startup is reported as `Transient`
/// so the scheduler retries on the next tick instead of exiting.
pub struct SnapshotReader {
    store: Arc<dyn VehicleStore>,
    home_geofence: String,
    units: UnitSettings,
    timeout: Duration,
    feed: Option<TeslaMateFeed>,
}

impl SnapshotReader {
    pub fn new(
        store: Arc<dyn VehicleStore>,
        home_geofence: impl Into<String>,
        units: UnitSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            home_geofence: home_geofence.into(),
            units,
            timeout,
            feed: None,
        }
    }

    pub fn with_feed(mut self, feed: TeslaMateFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn units(&self) -> &UnitSettings {
        &self.units
    }

    pub async fn read_snapshot(&self, vehicle: &VehicleIdentity) -> Result<Snapshot, SyncError> {
        let mut reading = with_timeout(
            "read snapshot",
            self.timeout,
            self.store.latest_reading(&vehicle.vin),
        )
        .await
        .map_err(SyncError::into_runtime)?;

        if let Some(feed) = &self.feed {
            feed.merge_into(&mut reading);
        }

        let snapshot =
            Snapshot::from_reading(&vehicle.vin, &reading, &self.home_geofence, &self.units);

        debug!(
            vin = %vehicle.vin,
            fields = snapshot.len(),
            taken_at = %snapshot.taken_at,
            "Snapshot read"
        );

        Ok(snapshot)
    }
}
