// Home Assistant MQTT discovery

mod entities;


pub use entities::{
    writable, Component, EntityDescriptor, Unit, CHARGE_LIMIT_MAX, CHARGE_LIMIT_MIN, ENTITIES,
};

use crate::error::SyncError;
use crate::mqtt::{MessageBus, Topics};
use crate::vehicle::{UnitSettings, VehicleIdentity};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct DeviceBlock<'a> {
    identifiers: [String; 1],
    name: &'a str,
    manufacturer: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
}

/// Discovery document. Field order is fixed by the struct so repeated
/// renders are byte-identical.
#[derive(Serialize)]
struct DiscoveryPayload<'a> {
    name: String,
    unique_id: String,
    state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_type: Option<&'static str>,
    device: &'a DeviceBlock<'a>,
}

/// One retained discovery message.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Render the discovery messages for every entity, in `ENTITIES` order.
pub fn discovery_messages(
    vehicle: &VehicleIdentity,
    topics: &Topics,
    units: &UnitSettings,
) -> Result<Vec<DiscoveryMessage>, SyncError> {
    let car_name = vehicle.display_name();
    let device = DeviceBlock {
        identifiers: [format!("{}_device", vehicle.vin)],
        name: car_name,
        manufacturer: "Tesla",
        model: &vehicle.model,
    };

    ENTITIES
        .iter()
        .map(|entity| {
            let payload = DiscoveryPayload {
                name: format!("{} {}", car_name, entity.name),
                unique_id: format!("{}_{}", vehicle.vin, entity.object_id),
                state_topic: topics.state(entity.state_field),
                command_topic: entity.writable.then(|| topics.command(entity.object_id)),
                json_attributes_topic: entity.attributes_field.map(|f| topics.state(f)),
                unit_of_measurement: entity.unit.resolve(units),
                device_class: entity.device_class,
                state_class: entity.state_class,
                icon: entity.icon,
                min: entity.range.map(|(min, _)| min),
                max: entity.range.map(|(_, max)| max),
                source_type: (entity.component == Component::DeviceTracker).then_some("gps"),
                device: &device,
            };

            let payload = serde_json::to_vec(&payload).map_err(|e| {
                SyncError::Config(format!(
                    "failed to render discovery for {}: {}",
                    entity.object_id, e
                ))
            })?;

            Ok(DiscoveryMessage {
                topic: topics.discovery(entity.component.as_str(), entity.object_id),
                payload,
            })
        })
        .collect()
}

/// Publish the discovery document of every entity (retained).
///
/// Stops at the first failed publish; the caller re-runs the whole set
/// before publishing any state. Returns the number of entities announced.
pub async fn publish_discovery(
    bus: &dyn MessageBus,
    vehicle: &VehicleIdentity,
    topics: &Topics,
    units: &UnitSettings,
) -> Result<usize, SyncError> {
    let messages = discovery_messages(vehicle, topics, units)?;

    for message in &messages {
        if let Err(e) = bus.publish(&message.topic, message.payload.clone(), true).await {
            warn!(topic = %message.topic, error = %e, "Discovery publish failed");
            return Err(e);
        }
        debug!(topic = %message.topic, "Discovery published");
    }

    info!(vin = %vehicle.vin, entities = messages.len(), "Discovery published");
    Ok(messages.len())
}
