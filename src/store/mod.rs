// Backing store access (TeslaMate database)

mod postgres;
mod reader;

pub use postgres::PgVehicleStore;
pub use reader::SnapshotReader;

use crate::error::SyncError;
use crate::vehicle::{UnitSettings, VehicleIdentity, VehicleReading};
use async_trait::async_trait;

/// Read access to the telemetry database.
///
/// Every lookup is keyed by VIN. Implementations must be safe to share
/// between the poll loop and the command dispatcher.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Resolve the vehicle to expose.
    ///
    /// With a VIN: that vehicle, or `NotFound`. Without: the only vehicle
    /// in the store; zero or several vehicles is a `Config` error.
    async fn resolve_vehicle(&self, vin: Option<&str>) -> Result<VehicleIdentity, SyncError>;

    /// Latest telemetry for `vin`, `NotFound` if the VIN is unknown.
    async fn latest_reading(&self, vin: &str) -> Result<VehicleReading, SyncError>;

    /// Display units configured in TeslaMate.
    async fn unit_settings(&self) -> Result<UnitSettings, SyncError>;

    /// Current upstream API access token stored by TeslaMate.
    async fn access_token(&self) -> Result<String, SyncError>;

    /// Drop and re-establish the underlying connection(s).
    async fn reconnect(&self) -> Result<(), SyncError>;
}
