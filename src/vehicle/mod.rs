// Vehicle identity, telemetry readings and snapshots

mod feed;
mod reading;
mod snapshot;

#[cfg(test)]
mod tests;

pub use feed::TeslaMateFeed;
pub use reading::VehicleReading;
pub use snapshot::{FieldValue, Position, Snapshot, StateField, NO_GEOFENCE};

use serde::Serialize;
use std::fmt;

/// The vehicle this process exposes.
///
/// The VIN is the only externally visible key: topics, unique IDs and the
/// discovery device block are all derived from it. The TeslaMate car id and
/// the API id are internal lookups for the upstream HTTP calls.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleIdentity {
    pub vin: String,
    /// TeslaMate `cars.id`
    pub car_id: i64,
    /// Tesla owner-API vehicle id (`cars.eid`)
    pub api_id: i64,
    /// Display name given to the car in the Tesla app
    pub name: String,
    /// e.g. "Model 3 LR"
    pub model: String,
}

impl VehicleIdentity {
    /// Name used as a prefix for every entity; falls back to the VIN
    /// for unnamed cars.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.vin
        } else {
            &self.name
        }
    }
}

/// Where the vehicle is, as Home Assistant's device tracker expects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Home,
    NotHome,
}

impl Presence {
    /// Geofence name equal to the home fence → `home`, anything else
    /// (another fence, or none at all) → `not_home`.
    pub fn from_geofence(geofence: Option<&str>, home_geofence: &str) -> Self {
        match geofence {
            Some(name) if name.trim().eq_ignore_ascii_case(home_geofence.trim()) => {
                Presence::Home
            }
            _ => Presence::NotHome,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Home => "home",
            Presence::NotHome => "not_home",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    Km,
    Mi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Display units chosen in TeslaMate's settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitSettings {
    pub length: LengthUnit,
    pub temperature: TemperatureUnit,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            length: LengthUnit::Km,
            temperature: TemperatureUnit::Celsius,
        }
    }
}

impl UnitSettings {
    /// Parse TeslaMate's `settings.unit_of_length` / `unit_of_temperature`.
    /// Unknown values keep the metric default.
    pub fn from_teslamate(length: &str, temperature: &str) -> Self {
        Self {
            length: if length.eq_ignore_ascii_case("mi") {
                LengthUnit::Mi
            } else {
                LengthUnit::Km
            },
            temperature: if temperature.eq_ignore_ascii_case("F") {
                TemperatureUnit::Fahrenheit
            } else {
                TemperatureUnit::Celsius
            },
        }
    }

    pub fn length_symbol(&self) -> &'static str {
        match self.length {
            LengthUnit::Km => "km",
            LengthUnit::Mi => "mi",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self.temperature {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// TeslaMate stores kilometres
    pub fn length_from_km(&self, km: f64) -> f64 {
        match self.length {
            LengthUnit::Km => round2(km),
            LengthUnit::Mi => round2(km * 0.621_371),
        }
    }

    /// TeslaMate stores degrees Celsius
    pub fn temperature_from_celsius(&self, celsius: f64) -> f64 {
        match self.temperature {
            TemperatureUnit::Celsius => round2(celsius),
            TemperatureUnit::Fahrenheit => round2(celsius * 9.0 / 5.0 + 32.0),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
