use super::VehicleStore;
use crate::config::DatabaseConfig;
use crate::error::{with_timeout, SyncError};
use crate::vehicle::{UnitSettings, VehicleIdentity, VehicleReading};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CAR_COLUMNS: &str = "SELECT id::int8 AS car_id, \
     COALESCE(eid, 0)::int8 AS api_id, \
     vin, \
     COALESCE(name, '') AS name, \
     COALESCE(model, '') AS model, \
     COALESCE(trim_badging, '') AS trim_badging \
     FROM cars";

/// Latest position, charge sample, open processes and vehicle state of one
/// car, selected by VIN. TeslaMate keeps neither the charge limit nor the
/// time to full charge in its tables; both come back NULL (the latter only
/// while a charge is open) and are filled from its MQTT feed.
const LATEST_READING: &str = r#"
WITH car AS (
    SELECT id FROM cars WHERE vin = $1
),
pos AS (
    SELECT p.* FROM positions p, car
    WHERE p.car_id = car.id
    ORDER BY p.date DESC
    LIMIT 1
),
chg AS (
    SELECT c.*, cp.end_date FROM charges c
    JOIN charging_processes cp ON cp.id = c.charging_process_id, car
    WHERE cp.car_id = car.id
    ORDER BY c.date DESC
    LIMIT 1
),
st AS (
    SELECT s.state::text AS state FROM states s, car
    WHERE s.car_id = car.id
    ORDER BY s.start_date DESC
    LIMIT 1
)
SELECT
    (pos.date AT TIME ZONE 'UTC') AS date,
    pos.latitude::float8 AS latitude,
    pos.longitude::float8 AS longitude,
    (to_jsonb(pos) ->> 'heading')::float8 AS heading,
    pos.speed::float8 AS speed,
    pos.elevation::float8 AS elevation,
    geo.name AS geofence,
    COALESCE(pos.battery_level, chg.battery_level)::int8 AS battery_level,
    NULL::int8 AS charge_limit_soc,
    CASE WHEN chg.date IS NULL THEN NULL ELSE chg.end_date IS NULL END AS plugged_in,
    EXISTS (
        SELECT 1 FROM charging_processes cp
        WHERE cp.car_id = car.id AND cp.end_date IS NULL
    ) AS charging,
    EXISTS (
        SELECT 1 FROM drives d
        WHERE d.car_id = car.id AND d.end_date IS NULL
    ) AS driving,
    pos.odometer::float8 AS odometer,
    pos.est_battery_range_km::float8 AS est_battery_range_km,
    pos.ideal_battery_range_km::float8 AS ideal_battery_range_km,
    pos.inside_temp::float8 AS inside_temp,
    pos.outside_temp::float8 AS outside_temp,
    CASE WHEN chg.end_date IS NULL THEN chg.charger_power::float8 ELSE 0 END AS charger_power,
    CASE WHEN chg.end_date IS NULL THEN chg.charger_voltage::float8 ELSE 0 END AS charger_voltage,
    CASE WHEN chg.end_date IS NULL THEN chg.charger_actual_current::float8 ELSE 0 END
        AS charger_actual_current,
    (CASE WHEN chg.end_date IS NULL THEN NULL ELSE 0 END)::float8 AS time_to_full_charge,
    st.state AS state
FROM car
LEFT JOIN pos ON true
LEFT JOIN chg ON true
LEFT JOIN st ON true
LEFT JOIN LATERAL (
    SELECT g.name FROM geofences g
    WHERE pos.latitude IS NOT NULL
      AND earth_distance(
            ll_to_earth(g.latitude, g.longitude),
            ll_to_earth(pos.latitude, pos.longitude)
          ) < g.radius
    ORDER BY earth_distance(
            ll_to_earth(g.latitude, g.longitude),
            ll_to_earth(pos.latitude, pos.longitude)
          )
    LIMIT 1
) geo ON true
"#;

#[derive(sqlx::FromRow)]
struct CarRow {
    car_id: i64,
    api_id: i64,
    vin: String,
    name: String,
    model: String,
    trim_badging: String,
}

impl From<CarRow> for VehicleIdentity {
    fn from(row: CarRow) -> Self {
        let model = match (row.model.is_empty(), row.trim_badging.is_empty()) {
            (true, _) => String::new(),
            (false, true) => format!("Model {}", row.model),
            (false, false) => format!("Model {} {}", row.model, row.trim_badging.to_uppercase()),
        };
        Self {
            vin: row.vin,
            car_id: row.car_id,
            api_id: row.api_id,
            name: row.name,
            model,
        }
    }
}

/// `VehicleStore` over TeslaMate's PostgreSQL database.
///
/// The pool sits behind a lock so `reconnect` can swap it while readers
/// finish on the old one; `PgPool` itself is safe for concurrent use.
pub struct PgVehicleStore {
    pool: RwLock<PgPool>,
    config: DatabaseConfig,
    timeout: Duration,
}

impl PgVehicleStore {
    /// Connect to TeslaMate's database
    pub async fn connect(config: DatabaseConfig, timeout: Duration) -> Result<Self, SyncError> {
        let pool = Self::open_pool(&config).await?;
        Ok(Self {
            pool: RwLock::new(pool),
            config,
            timeout,
        })
    }

    async fn open_pool(config: &DatabaseConfig) -> Result<PgPool, SyncError> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connecting to TeslaMate database"
        );

        PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| SyncError::Transient(format!("failed to connect to database: {}", e)))
    }

    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }
}

#[async_trait]
impl VehicleStore for PgVehicleStore {
    async fn resolve_vehicle(&self, vin: Option<&str>) -> Result<VehicleIdentity, SyncError> {
        let pool = self.pool().await;

        match vin {
            Some(vin) => {
                let sql = format!("{} WHERE vin = $1", CAR_COLUMNS);
                let row = with_timeout("resolve vehicle", self.timeout, async {
                    Ok::<_, SyncError>(sqlx::query_as::<_, CarRow>(&sql)
                        .bind(vin)
                        .fetch_optional(&pool)
                        .await?)
                })
                .await?;

                row.map(VehicleIdentity::from).ok_or_else(|| {
                    SyncError::NotFound(format!("VIN {} not found in the TeslaMate database", vin))
                })
            }
            None => {
                let sql = format!("{} ORDER BY id LIMIT 2", CAR_COLUMNS);
                let mut rows = with_timeout("resolve vehicle", self.timeout, async {
                    Ok::<_, SyncError>(sqlx::query_as::<_, CarRow>(&sql).fetch_all(&pool).await?)
                })
                .await?;

                match rows.len() {
                    0 => Err(SyncError::Config(
                        "no vehicle found in the TeslaMate database".to_string(),
                    )),
                    1 => Ok(rows.remove(0).into()),
                    _ => Err(SyncError::Config(
                        "several vehicles in the TeslaMate database, set the VIN explicitly"
                            .to_string(),
                    )),
                }
            }
        }
    }

    async fn latest_reading(&self, vin: &str) -> Result<VehicleReading, SyncError> {
        let pool = self.pool().await;

        let reading = with_timeout("read latest telemetry", self.timeout, async {
            Ok::<_, SyncError>(sqlx::query_as::<_, VehicleReading>(LATEST_READING)
                .bind(vin)
                .fetch_optional(&pool)
                .await?)
        })
        .await?;

        debug!(vin = %vin, found = reading.is_some(), "Read latest telemetry");

        reading.ok_or_else(|| SyncError::NotFound(format!("VIN {} not found", vin)))
    }

    async fn unit_settings(&self) -> Result<UnitSettings, SyncError> {
        let pool = self.pool().await;

        let row: Option<(String, String)> = with_timeout("read settings", self.timeout, async {
            Ok::<_, SyncError>(sqlx::query_as(
                "SELECT unit_of_length::text, unit_of_temperature::text FROM settings LIMIT 1",
            )
            .fetch_optional(&pool)
            .await?)
        })
        .await?;

        Ok(match row {
            Some((length, temperature)) => UnitSettings::from_teslamate(&length, &temperature),
            None => {
                warn!("TeslaMate settings row missing, using metric units");
                UnitSettings::default()
            }
        })
    }

    async fn access_token(&self) -> Result<String, SyncError> {
        let pool = self.pool().await;

        let token: Option<String> = with_timeout("read access token", self.timeout, async {
            Ok::<_, SyncError>(
                sqlx::query_scalar("SELECT access::text FROM tokens ORDER BY id DESC LIMIT 1")
                    .fetch_optional(&pool)
                    .await?,
            )
        })
        .await?;

        token.ok_or_else(|| SyncError::NotFound("no API token stored by TeslaMate".to_string()))
    }

    async fn reconnect(&self) -> Result<(), SyncError> {
        let fresh = Self::open_pool(&self.config).await?;
        let old = {
            let mut guard = self.pool.write().await;
            std::mem::replace(&mut *guard, fresh)
        };
        old.close().await;
        info!("Reconnected to TeslaMate database");
        Ok(())
    }
}
