use super::VehicleReading;
use std::sync::{Arc, RwLock};

/// Latest values TeslaMate announced on `teslamate/cars/<id>/<key>` for
/// fields its database does not store.
///
/// Cheap to clone; the MQTT event loop records into it and the snapshot
/// reader merges it into every reading.
#[derive(Clone, Debug, Default)]
pub struct TeslaMateFeed {
    values: Arc<RwLock<FeedValues>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct FeedValues {
    charge_limit_soc: Option<i64>,
    time_to_full_charge: Option<f64>,
}

impl TeslaMateFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one TeslaMate message. Returns `false` for keys that are not
    /// tracked and for payloads that do not parse; an empty payload clears
    /// the value.
    pub fn record(&self, key: &str, payload: &[u8]) -> bool {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text.trim(),
            Err(_) => return false,
        };

        let mut values = match self.values.write() {
            Ok(values) => values,
            Err(poisoned) => poisoned.into_inner(),
        };

        match key {
            "charge_limit_soc" => match parse::<i64>(text) {
                Some(value) => {
                    values.charge_limit_soc = value;
                    true
                }
                None => false,
            },
            "time_to_full_charge" => match parse::<f64>(text) {
                Some(value) if value.map_or(true, f64::is_finite) => {
                    values.time_to_full_charge = value;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Fill fields the database left empty. Database values always win.
    pub fn merge_into(&self, reading: &mut VehicleReading) {
        let values = match self.values.read() {
            Ok(values) => *values,
            Err(poisoned) => *poisoned.into_inner(),
        };

        if reading.charge_limit_soc.is_none() {
            reading.charge_limit_soc = values.charge_limit_soc;
        }
        if reading.time_to_full_charge.is_none() {
            reading.time_to_full_charge = values.time_to_full_charge;
        }
    }
}

/// `Some(None)` for an empty payload, `None` when it does not parse
fn parse<T: std::str::FromStr>(text: &str) -> Option<Option<T>> {
    if text.is_empty() {
        return Some(None);
    }
    text.parse().ok().map(Some)
}
