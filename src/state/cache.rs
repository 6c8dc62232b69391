use crate::vehicle::{FieldValue, StateField};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Values of one vehicle as the bus last accepted them
#[derive(Clone, Debug, Default)]
pub struct PublishedFields {
    pub values: HashMap<StateField, FieldValue>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Cache of the most recently published value per field, keyed by VIN.
///
/// Holds only values the bus accepted. Owned by the scheduler and passed
/// into `StatePublisher::publish_changes`, which is the only writer.
#[derive(Clone, Debug, Default)]
pub struct LastPublishedState {
    vehicles: HashMap<String, PublishedFields>,
}

impl LastPublishedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vin: &str, field: StateField) -> Option<&FieldValue> {
        self.vehicles.get(vin)?.values.get(&field)
    }

    pub fn vehicle(&self, vin: &str) -> Option<&PublishedFields> {
        self.vehicles.get(vin)
    }

    /// Record a value after its publish was accepted
    pub(crate) fn record(&mut self, vin: &str, field: StateField, value: FieldValue) {
        let entry = self.vehicles.entry(vin.to_string()).or_default();
        entry.values.insert(field, value);
        entry.last_updated = Some(Utc::now());
    }

    /// Forget everything, so the next pass republishes the full state
    pub fn clear(&mut self) {
        self.vehicles.clear();
    }

    pub fn field_count(&self, vin: &str) -> usize {
        self.vehicles.get(vin).map_or(0, |v| v.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.values().all(|v| v.values.is_empty())
    }
}
