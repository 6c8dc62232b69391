use chrono::{DateTime, Utc};

/// Latest raw telemetry for one vehicle, as stored by TeslaMate.
///
/// Lengths are kilometres and temperatures degrees Celsius; every column is
/// optional because a freshly added car has no positions or charges yet.
#[derive(Clone, Debug, Default, PartialEq, sqlx::FromRow)]
pub struct VehicleReading {
    pub date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub elevation: Option<f64>,
    pub geofence: Option<String>,
    pub battery_level: Option<i64>,
    pub charge_limit_soc: Option<i64>,
    pub plugged_in: Option<bool>,
    /// A charging process without end date exists
    pub charging: bool,
    /// A drive without end date exists
    pub driving: bool,
    pub odometer: Option<f64>,
    pub est_battery_range_km: Option<f64>,
    pub ideal_battery_range_km: Option<f64>,
    pub inside_temp: Option<f64>,
    pub outside_temp: Option<f64>,
    pub charger_power: Option<f64>,
    pub charger_voltage: Option<f64>,
    pub charger_actual_current: Option<f64>,
    pub time_to_full_charge: Option<f64>,
    /// `states.state` of the open state row (online, offline, asleep)
    pub state: Option<String>,
}
