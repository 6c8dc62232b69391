use super::{parse_command, Command, CommandExecutor, WakeHandle};
use crate::error::{with_timeout, SyncError};
use crate::mqtt::{InboundMessage, Topics};
use crate::scheduler::RefreshTrigger;
use crate::vehicle::VehicleIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Single consumer of the inbound command queue.
///
/// Commands run one at a time, independent of the poll cycle. A failed
/// command is rejected and not retried; Home Assistant re-issues it.
pub struct CommandDispatcher {
    vehicle: VehicleIdentity,
    topics: Topics,
    executor: Arc<dyn CommandExecutor>,
    refresh: RefreshTrigger,
    waker: Option<WakeHandle>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        vehicle: VehicleIdentity,
        topics: Topics,
        executor: Arc<dyn CommandExecutor>,
        refresh: RefreshTrigger,
        timeout: Duration,
    ) -> Self {
        Self {
            vehicle,
            topics,
            executor,
            refresh,
            waker: None,
            timeout,
        }
    }

    pub fn with_waker(mut self, waker: WakeHandle) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Validate and execute one command message.
    ///
    /// On success an out-of-cycle poll is requested so Home Assistant sees
    /// the result before the next tick.
    pub async fn handle_command(&self, topic: &str, payload: &[u8]) -> Result<Command, SyncError> {
        let command = parse_command(&self.topics, topic, payload)?;
        self.execute(command).await?;
        Ok(command)
    }

    async fn execute(&self, command: Command) -> Result<(), SyncError> {
        debug!(vin = %self.vehicle.vin, command = %command, "Executing command");

        with_timeout(
            "vehicle command",
            self.timeout,
            self.executor.execute(&self.vehicle, command),
        )
        .await?;

        self.refresh.request();
        if let Some(waker) = &self.waker {
            waker.wake();
        }
        Ok(())
    }

    /// Consume the queue until shutdown. Whatever is queued when a command
    /// starts is drained first, keeping only the latest command per entity.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(vin = %self.vehicle.vin, "Command dispatcher started");

        loop {
            let first = tokio::select! {
                _ = shutdown.changed() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let mut batch = vec![first];
            while let Ok(message) = inbound.try_recv() {
                batch.push(message);
            }

            for message in self.coalesce(batch) {
                match self.handle_command(&message.topic, &message.payload).await {
                    Ok(command) => {
                        info!(vin = %self.vehicle.vin, command = %command, "Command executed")
                    }
                    Err(e) => warn!(
                        vin = %self.vehicle.vin,
                        topic = %message.topic,
                        error = %e,
                        "Command rejected"
                    ),
                }
            }
        }

        info!("Command dispatcher stopped");
    }

    /// Reduce a batch to the last valid message per entity, in first-seen
    /// entity order; invalid ones are rejected here.
    pub(crate) fn coalesce(&self, batch: Vec<InboundMessage>) -> Vec<InboundMessage> {
        let mut pending: Vec<(Command, InboundMessage)> = Vec::with_capacity(batch.len());

        for message in batch {
            match parse_command(&self.topics, &message.topic, &message.payload) {
                Ok(command) => {
                    match pending
                        .iter_mut()
                        .find(|(c, _)| c.object_id() == command.object_id())
                    {
                        Some(slot) => {
                            debug!(superseded = %slot.0, by = %command, "Command superseded");
                            *slot = (command, message);
                        }
                        None => pending.push((command, message)),
                    }
                }
                Err(e) => warn!(topic = %message.topic, error = %e, "Command rejected"),
            }
        }

        pending.into_iter().map(|(_, message)| message).collect()
    }
}
