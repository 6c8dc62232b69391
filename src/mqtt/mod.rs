// MQTT bus adapter (rumqttc)

mod bus;
mod client;
mod topics;

pub use bus::{MessageBus, MqttBus};
pub use client::{
    connect, mqtt_options, ConnectionEvent, EventPump, InboundMessage, InboundRouter,
    MqttSession, Route,
};
pub use topics::Topics;
