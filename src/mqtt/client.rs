use super::{MqttBus, Topics};
use crate::config::MqttConfig;
use crate::scheduler::RefreshTrigger;
use crate::vehicle::TeslaMateFeed;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of rumqttc's request queue between `AsyncClient` and the event loop
const REQUEST_QUEUE: usize = 64;

/// Transport state changes seen by the event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Message received on a subscribed command topic.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Command,
    Refresh,
    Ignore,
}

/// Decides what the process subscribes to and where inbound messages go.
#[derive(Clone, Debug)]
pub struct InboundRouter {
    topics: Topics,
    /// TeslaMate car id when its own topics are observed
    teslamate_car: Option<i64>,
}

impl InboundRouter {
    pub fn new(topics: Topics, teslamate_car: Option<i64>) -> Self {
        Self {
            topics,
            teslamate_car,
        }
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut filters = vec![self.topics.command_filter()];
        if let Some(car_id) = self.teslamate_car {
            filters.push(Topics::teslamate_filter(car_id));
        }
        filters
    }

    pub fn teslamate_car(&self) -> Option<i64> {
        self.teslamate_car
    }

    pub fn route(&self, topic: &str) -> Route {
        if let Some(car_id) = self.teslamate_car {
            if Topics::is_teslamate(topic, car_id) {
                return Route::Refresh;
            }
        }
        if topic.ends_with("/set") {
            Route::Command
        } else {
            Route::Ignore
        }
    }
}

/// Broker connection options; the client id gets a random suffix so two
/// instances never kick each other off the broker.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let suffix = Uuid::new_v4().simple().to_string();
    let client_id = format!("{}-{}", config.client_id, &suffix[..8]);

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.max(5)));
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    options
}

/// Everything produced by `connect`.
pub struct MqttSession {
    pub bus: MqttBus,
    pub pump: EventPump,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

/// Create the MQTT client. Nothing touches the network until the returned
/// `EventPump` runs.
///
/// Values TeslaMate publishes on its own topics are recorded in `feed`.
pub fn connect(
    config: &MqttConfig,
    timeout: Duration,
    router: InboundRouter,
    commands: mpsc::Sender<InboundMessage>,
    refresh: RefreshTrigger,
    feed: TeslaMateFeed,
) -> MqttSession {
    info!(host = %config.host, port = config.port, "Configuring MQTT client");

    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_QUEUE);
    let (events_tx, events) = mpsc::unbounded_channel();
    let closing = Arc::new(AtomicBool::new(false));

    MqttSession {
        bus: MqttBus::new(client.clone(), timeout).with_closing_flag(closing.clone()),
        pump: EventPump {
            eventloop,
            client,
            router,
            events: events_tx,
            commands,
            refresh,
            feed,
            closing,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_seconds.max(1)),
        },
        events,
    }
}

/// Drives rumqttc's event loop: (re)subscribes on every ConnAck, reports
/// connection changes and forwards inbound messages.
///
/// After `MqttBus::disconnect` the pump keeps polling until the queued
/// requests and the DISCONNECT itself went out, then stops.
pub struct EventPump {
    eventloop: EventLoop,
    client: AsyncClient,
    router: InboundRouter,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    commands: mpsc::Sender<InboundMessage>,
    refresh: RefreshTrigger,
    feed: TeslaMateFeed,
    closing: Arc<AtomicBool>,
    reconnect_delay: Duration,
}

impl EventPump {
    /// Poll until the client disconnected, or until `stop` fires.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut connected = false;

        loop {
            let polled = tokio::select! {
                _ = stop.changed() => {
                    warn!("MQTT event loop stopped before the disconnect went out");
                    break;
                }
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from MQTT broker");
                    break;
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(session_present = ack.session_present, "Connected to MQTT broker");
                    self.subscribe();
                    connected = true;
                    let _ = self.events.send(ConnectionEvent::Connected);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.forward(publish.topic, publish.payload.to_vec());
                }
                Ok(_) => {}
                Err(e) if self.closing.load(Ordering::SeqCst) => {
                    debug!(error = %e, "MQTT connection closed while disconnecting");
                    break;
                }
                Err(e) => {
                    if connected {
                        warn!(error = %e, "MQTT connection lost");
                        connected = false;
                        let _ = self.events.send(ConnectionEvent::Disconnected);
                    } else {
                        debug!(error = %e, "MQTT connection attempt failed");
                    }

                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }

        info!("MQTT event loop stopped");
    }

    fn subscribe(&self) {
        for filter in self.router.subscriptions() {
            match self.client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                Ok(()) => debug!(filter = %filter, "Subscribed"),
                Err(e) => warn!(filter = %filter, error = %e, "Failed to subscribe"),
            }
        }
    }

    pub(crate) fn forward(&self, topic: String, payload: Vec<u8>) {
        match self.router.route(&topic) {
            Route::Command => {
                debug!(topic = %topic, "Command received");
                match self.commands.try_send(InboundMessage { topic, payload }) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(msg)) => {
                        warn!(topic = %msg.topic, "Command queue full, dropping command");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Command dispatcher gone, dropping command");
                    }
                }
            }
            Route::Refresh => {
                let key = self
                    .router
                    .teslamate_car()
                    .and_then(|car_id| Topics::teslamate_key(&topic, car_id));
                if let Some(key) = key {
                    if self.feed.record(key, &payload) {
                        debug!(topic = %topic, "TeslaMate value recorded");
                    }
                }
                if self.refresh.request() {
                    debug!(topic = %topic, "TeslaMate update, refresh requested");
                }
            }
            Route::Ignore => debug!(topic = %topic, "Ignoring message"),
        }
    }
}
