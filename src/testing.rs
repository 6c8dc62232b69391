// In-memory bus and store shared by unit tests

use crate::error::SyncError;
use crate::mqtt::MessageBus;
use crate::store::VehicleStore;
use crate::vehicle::{UnitSettings, VehicleIdentity, VehicleReading};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Records every accepted publish; topics can be made to fail.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<Published>>,
    failing: Mutex<HashSet<String>>,
    down: AtomicBool,
}

impl RecordingBus {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.topic).collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }

    pub fn fail_topic(&self, topic: &str) {
        self.failing.lock().unwrap().insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.failing.lock().unwrap().remove(topic);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SyncError> {
        if self.down.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(topic) {
            return Err(SyncError::Transient(format!("mqtt: publish to {} failed", topic)));
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8(payload).unwrap(),
            retain,
        });
        Ok(())
    }
}

pub fn identity() -> VehicleIdentity {
    VehicleIdentity {
        vin: "5YJ3E7EB0KF000001".to_string(),
        car_id: 1,
        api_id: 424242,
        name: "Blue".to_string(),
        model: "Model 3 LR".to_string(),
    }
}

/// Store returning whatever reading is currently set.
#[derive(Default)]
pub struct MemoryStore {
    pub reading: Mutex<Option<VehicleReading>>,
    pub failing: AtomicBool,
    pub reconnects: AtomicUsize,
    pub reconnect_fails: AtomicBool,
}

impl MemoryStore {
    pub fn with_reading(reading: VehicleReading) -> Self {
        let store = Self::default();
        store.set_reading(reading);
        store
    }

    pub fn set_reading(&self, reading: VehicleReading) {
        *self.reading.lock().unwrap() = Some(reading);
    }
}

#[async_trait]
impl VehicleStore for MemoryStore {
    async fn resolve_vehicle(&self, _vin: Option<&str>) -> Result<VehicleIdentity, SyncError> {
        Ok(identity())
    }

    async fn latest_reading(&self, vin: &str) -> Result<VehicleReading, SyncError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("database: connection reset".to_string()));
        }
        self.reading
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::NotFound(format!("VIN {} not found", vin)))
    }

    async fn unit_settings(&self) -> Result<UnitSettings, SyncError> {
        Ok(UnitSettings::default())
    }

    async fn access_token(&self) -> Result<String, SyncError> {
        Ok("token".to_string())
    }

    async fn reconnect(&self) -> Result<(), SyncError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_fails.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("database: still down".to_string()));
        }
        Ok(())
    }
}
