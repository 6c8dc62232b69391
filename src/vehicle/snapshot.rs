use super::{Presence, UnitSettings, VehicleReading};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Every state field published for the vehicle.
///
/// The topic suffix doubles as the entity object id for fields that have a
/// writable counterpart (`charging`, `charge_limit_soc`), so command topics
/// line up with state topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateField {
    Location,
    Presence,
    Geofence,
    Charging,
    ChargeLimitSoc,
    BatteryLevel,
    PluggedIn,
    Odometer,
    EstBatteryRange,
    IdealBatteryRange,
    InsideTemp,
    OutsideTemp,
    ChargerPower,
    ChargerVoltage,
    ChargerActualCurrent,
    TimeToFullCharge,
    VehicleState,
}

impl StateField {
    pub const ALL: [StateField; 17] = [
        StateField::Location,
        StateField::Presence,
        StateField::Geofence,
        StateField::Charging,
        StateField::ChargeLimitSoc,
        StateField::BatteryLevel,
        StateField::PluggedIn,
        StateField::Odometer,
        StateField::EstBatteryRange,
        StateField::IdealBatteryRange,
        StateField::InsideTemp,
        StateField::OutsideTemp,
        StateField::ChargerPower,
        StateField::ChargerVoltage,
        StateField::ChargerActualCurrent,
        StateField::TimeToFullCharge,
        StateField::VehicleState,
    ];

    pub fn topic_suffix(&self) -> &'static str {
        match self {
            StateField::Location => "location",
            StateField::Presence => "presence",
            StateField::Geofence => "geofence",
            StateField::Charging => "charging",
            StateField::ChargeLimitSoc => "charge_limit_soc",
            StateField::BatteryLevel => "battery_level",
            StateField::PluggedIn => "plugged_in",
            StateField::Odometer => "odometer",
            StateField::EstBatteryRange => "est_battery_range",
            StateField::IdealBatteryRange => "ideal_battery_range",
            StateField::InsideTemp => "inside_temp",
            StateField::OutsideTemp => "outside_temp",
            StateField::ChargerPower => "charger_power",
            StateField::ChargerVoltage => "charger_voltage",
            StateField::ChargerActualCurrent => "charger_actual_current",
            StateField::TimeToFullCharge => "time_to_full_charge",
            StateField::VehicleState => "state",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_suffix())
    }
}

/// Geofence state while the car is outside every fence. A zero-length
/// retained payload would delete the topic on the broker instead.
pub const NO_GEOFENCE: &str = "none";

/// GPS fix published as the device tracker's attribute document.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed: f64,
    pub elevation: f64,
}

impl Position {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &Position) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[derive(Serialize)]
struct PositionAttributes<'a> {
    #[serde(flatten)]
    position: &'a Position,
    // Home Assistant requires an accuracy; TeslaMate does not record one
    gps_accuracy: u8,
}

/// Typed value of one state field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Switch(bool),
    Integer(i64),
    Number(f64),
    Position(Position),
}

impl FieldValue {
    /// Whether `self` must be republished when `previous` is what the bus
    /// last accepted.
    ///
    /// Positions are compared by distance: a move shorter than
    /// `tolerance_m` is GPS jitter. Everything else is exact equality.
    pub fn differs_from(&self, previous: &FieldValue, tolerance_m: f64) -> bool {
        match (self, previous) {
            (FieldValue::Position(new), FieldValue::Position(old)) => {
                let moved = new.distance_m(old);
                moved > 0.0 && moved >= tolerance_m
            }
            _ => self != previous,
        }
    }

    /// Text payload for the retained state message.
    pub fn to_payload(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Switch(true) => "ON".to_string(),
            FieldValue::Switch(false) => "OFF".to_string(),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Number(v) => v.to_string(),
            FieldValue::Position(p) => serde_json::to_string(&PositionAttributes {
                position: p,
                gps_accuracy: 1,
            })
            // A struct of finite floats cannot fail to serialize
            .unwrap_or_default(),
        }
    }
}

/// One point-in-time read of every tracked field of a vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub vin: String,
    pub taken_at: DateTime<Utc>,
    fields: BTreeMap<StateField, FieldValue>,
}

impl Snapshot {
    pub fn new(vin: impl Into<String>, taken_at: DateTime<Utc>) -> Self {
        Self {
            vin: vin.into(),
            taken_at,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mostly used by tests.
    pub fn with(mut self, field: StateField, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    pub fn get(&self, field: StateField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Fields present in this snapshot, in `StateField` order.
    pub fn fields(&self) -> impl Iterator<Item = (StateField, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a snapshot from a raw TeslaMate reading.
    ///
    /// Presence is always set, even without a position. Lengths and
    /// temperatures are converted to the user's display units.
    pub fn from_reading(
        vin: &str,
        reading: &VehicleReading,
        home_geofence: &str,
        units: &UnitSettings,
    ) -> Self {
        let mut fields = BTreeMap::new();

        if let (Some(latitude), Some(longitude)) = (reading.latitude, reading.longitude) {
            fields.insert(
                StateField::Location,
                FieldValue::Position(Position {
                    latitude,
                    longitude,
                    heading: reading.heading.unwrap_or(0.0),
                    speed: reading.speed.unwrap_or(0.0),
                    elevation: reading.elevation.unwrap_or(0.0),
                }),
            );
        }

        let geofence = reading
            .geofence
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        fields.insert(
            StateField::Presence,
            FieldValue::Text(Presence::from_geofence(geofence, home_geofence).to_string()),
        );
        fields.insert(
            StateField::Geofence,
            FieldValue::Text(geofence.unwrap_or(NO_GEOFENCE).to_string()),
        );

        fields.insert(StateField::Charging, FieldValue::Switch(reading.charging));

        let mut put = |field: StateField, value: Option<FieldValue>| {
            if let Some(value) = value {
                fields.insert(field, value);
            }
        };

        put(
            StateField::ChargeLimitSoc,
            reading.charge_limit_soc.map(FieldValue::Integer),
        );
        put(
            StateField::BatteryLevel,
            reading.battery_level.map(FieldValue::Integer),
        );
        put(StateField::PluggedIn, reading.plugged_in.map(FieldValue::Switch));

        let length = |km: Option<f64>| km.map(|v| FieldValue::Number(units.length_from_km(v)));
        put(StateField::Odometer, length(reading.odometer));
        put(StateField::EstBatteryRange, length(reading.est_battery_range_km));
        put(StateField::IdealBatteryRange, length(reading.ideal_battery_range_km));

        let temperature =
            |c: Option<f64>| c.map(|v| FieldValue::Number(units.temperature_from_celsius(v)));
        put(StateField::InsideTemp, temperature(reading.inside_temp));
        put(StateField::OutsideTemp, temperature(reading.outside_temp));

        put(StateField::ChargerPower, reading.charger_power.map(FieldValue::Number));
        put(
            StateField::ChargerVoltage,
            reading.charger_voltage.map(FieldValue::Number),
        );
        put(
            StateField::ChargerActualCurrent,
            reading.charger_actual_current.map(FieldValue::Number),
        );
        put(
            StateField::TimeToFullCharge,
            reading.time_to_full_charge.map(FieldValue::Number),
        );

        let state = if reading.charging {
            Some("charging".to_string())
        } else if reading.driving {
            Some("driving".to_string())
        } else {
            reading.state.clone().filter(|s| !s.trim().is_empty())
        };
        put(StateField::VehicleState, state.map(FieldValue::Text));

        Self {
            vin: vin.to_string(),
            taken_at: reading.date.unwrap_or_else(Utc::now),
            fields,
        }
    }
}
