// MIT License
// Poll, diff and publish loop

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::devices::EntityKind;
use crate::error::{BridgeError, Result};
use crate::event::EventSink;
use crate::gateway::PanelGateway;
use crate::registry::{EntityRegistry, EntitySet, KindDiff};
use crate::transport::Transport;

/// Samples the panel on a fixed cadence and publishes every transition.
///
/// The loop owns the registry, so it is the only writer of last-known
/// states. A failed cycle is counted and the loop carries on with the next
/// tick.
pub struct PollLoop<T, S> {
    gateway: PanelGateway<T>,
    registry: EntityRegistry,
    sink: S,
    interval: Duration,
    escalate_every: u32,
    consecutive_failures: u32,
}

impl<T: Transport, S: EventSink> PollLoop<T, S> {
    pub fn new(
        gateway: PanelGateway<T>,
        registry: EntityRegistry,
        sink: S,
        interval: Duration,
        escalate_every: u32,
    ) -> Self {
        Self {
            gateway,
            registry,
            sink,
            interval,
            escalate_every: escalate_every.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One fetch/diff/publish pass over partitions, zones and outputs.
    /// Returns the number of events published.
    ///
    /// A state is recorded only once its event has been accepted by the
    /// sink. Transitions left unsent by a sink failure are published on a
    /// later pass.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let mut published = 0;

        let samples = self.gateway.partition_status().await?;
        let diff = self.registry.partitions.apply(&samples);
        published += publish(&self.sink, &mut self.registry.partitions, diff).await?;

        let samples = self.gateway.zone_status().await?;
        let diff = self.registry.zones.apply(&samples);
        published += publish(&self.sink, &mut self.registry.zones, diff).await?;

        let samples = self.gateway.output_status().await?;
        let diff = self.registry.outputs.apply(&samples);
        published += publish(&self.sink, &mut self.registry.outputs, diff).await?;

        Ok(published)
    }

    /// Whether a failure at the current count is logged at warn level.
    ///
    /// Retryable failures escalate on the Nth, 2Nth... consecutive failure.
    /// Anything else escalates every time.
    fn escalates(&self, e: &BridgeError) -> bool {
        !e.is_retryable() || self.consecutive_failures % self.escalate_every == 0
    }

    /// Run one cycle and account for its outcome.
    pub async fn tick(&mut self) {
        match self.poll_once().await {
            Ok(_) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Polling recovered after {} failed cycles",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.escalates(&e) {
                    warn!(
                        "Polling failed {} times in a row: {e}",
                        self.consecutive_failures
                    );
                } else {
                    debug!("Poll failed: {e}");
                }
            }
        }
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Poll loop shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }
}

async fn publish<K: EntityKind, S: EventSink>(
    sink: &S,
    set: &mut EntitySet<K>,
    diff: KindDiff,
) -> Result<usize> {
    let kind = K::KIND;
    for index in &diff.unknown_indexes {
        warn!("Status for unknown {kind} {index}, ignoring");
    }
    for (index, code) in &diff.unhandled {
        warn!("Unhandled {kind} state {code} for {kind} {index}");
    }
    for (event, &(index, raw_state)) in diff.events.iter().zip(&diff.pending) {
        debug!("{kind} {} -> {}", event.index, event.payload);
        sink.publish(event).await?;
        set.commit(index, raw_state);
    }
    Ok(diff.events.len())
}
