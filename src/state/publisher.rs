use super::LastPublishedState;
use crate::error::SyncError;
use crate::mqtt::{MessageBus, Topics};
use crate::vehicle::{Snapshot, StateField};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one diff/publish pass
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Fields published and recorded in the cache
    pub updated: BTreeSet<StateField>,
    /// Fields whose publish failed; their cache entry is unchanged
    pub failed: Vec<(StateField, SyncError)>,
    pub unchanged: usize,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Publishes the fields of a snapshot that differ from what the bus last
/// accepted.
pub struct StatePublisher {
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    position_tolerance_m: f64,
}

impl StatePublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topics: Topics, position_tolerance_m: f64) -> Self {
        Self {
            bus,
            topics,
            position_tolerance_m,
        }
    }

    /// Diff `new` against `last` and publish the changes (retained).
    ///
    /// A field is published when the cache has no entry for it or the value
    /// differs; the cache is only updated after the bus accepted the publish.
    pub async fn publish_changes(
        &self,
        new: &Snapshot,
        last: &mut LastPublishedState,
    ) -> PublishReport {
        let mut report = PublishReport::default();

        for (field, value) in new.fields() {
            let changed = match last.get(&new.vin, field) {
                Some(previous) => value.differs_from(previous, self.position_tolerance_m),
                None => true,
            };
            if !changed {
                report.unchanged += 1;
                continue;
            }

            let topic = self.topics.state(field);
            let payload = value.to_payload();

            match self.bus.publish(&topic, payload.into_bytes(), true).await {
                Ok(()) => {
                    debug!(vin = %new.vin, field = %field, "State published");
                    last.record(&new.vin, field, value.clone());
                    report.updated.insert(field);
                }
                Err(e) => {
                    warn!(vin = %new.vin, field = %field, error = %e, "State publish failed");
                    report.failed.push((field, e));
                }
            }
        }

        report
    }
}
