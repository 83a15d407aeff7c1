// MIT License
// Inbound command routing from the bus to the panel

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::devices::{DesiredOutput, DesiredPartition, Kind};
use crate::gateway::PanelGateway;
use crate::registry::EntityRegistry;
use crate::transport::Transport;

/// A raw command as received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub topic: String,
    pub payload: String,
}

/// A controllable entity and the topic its commands arrive on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    pub kind: Kind,
    pub index: u32,
    pub name: String,
    pub command_topic: String,
}

impl CommandTarget {
    /// One target per partition and output of `registry`.
    pub fn from_registry(
        registry: &EntityRegistry,
        command_topic: impl Fn(Kind, u32) -> String,
    ) -> Vec<Self> {
        registry
            .controllable()
            .into_iter()
            .map(|(kind, index, name)| CommandTarget {
                kind,
                index,
                name,
                command_topic: command_topic(kind, index),
            })
            .collect()
    }
}

pub type CommandSender = mpsc::Sender<InboundCommand>;
pub type CommandReceiver = mpsc::Receiver<InboundCommand>;

/// Create the bounded inbound command queue.
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Queue a command without waiting. A full or closed queue drops it.
pub fn enqueue(queue: &CommandSender, command: InboundCommand) -> bool {
    match queue.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(command)) => {
            warn!(
                "Command queue full, dropping '{}' for {}",
                command.payload, command.topic
            );
            false
        }
        Err(TrySendError::Closed(command)) => {
            warn!(
                "Command router stopped, dropping '{}' for {}",
                command.payload, command.topic
            );
            false
        }
    }
}

/// What happened to one inbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The panel acknowledged the command.
    Dispatched,
    /// No entity listens on the topic.
    UnknownTopic,
    /// More than one entity listens on the topic.
    AmbiguousTopic,
    /// A valid alarm panel payload the panel cannot carry out.
    Unsupported,
    /// Not a payload for this kind of entity.
    Invalid,
    /// The gateway call failed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Partition(DesiredPartition),
    Output(DesiredOutput),
}

fn parse_action(kind: Kind, payload: &str) -> Result<Action, RouteOutcome> {
    match (kind, payload) {
        (Kind::Partition, "ARM_AWAY") => Ok(Action::Partition(DesiredPartition::Away)),
        (Kind::Partition, "DISARM") => Ok(Action::Partition(DesiredPartition::Off)),
        (
            Kind::Partition,
            "ARM_HOME" | "ARM_NIGHT" | "ARM_VACATION" | "ARM_CUSTOM_BYPASS" | "TRIGGER",
        ) => Err(RouteOutcome::Unsupported),
        (Kind::Output, "ON") => Ok(Action::Output(DesiredOutput::On)),
        (Kind::Output, "OFF") => Ok(Action::Output(DesiredOutput::Off)),
        _ => Err(RouteOutcome::Invalid),
    }
}

/// Turns inbound commands into gateway control calls.
///
/// Failures are logged per command and never retried.
pub struct CommandRouter<T> {
    gateway: PanelGateway<T>,
    targets: Vec<CommandTarget>,
}

impl<T: Transport> CommandRouter<T> {
    pub fn new(gateway: PanelGateway<T>, targets: Vec<CommandTarget>) -> Self {
        Self { gateway, targets }
    }

    pub fn targets(&self) -> &[CommandTarget] {
        &self.targets
    }

    pub async fn handle(&self, command: &InboundCommand) -> RouteOutcome {
        let mut matches = self
            .targets
            .iter()
            .filter(|t| t.command_topic == command.topic);
        let target = match (matches.next(), matches.next()) {
            (Some(target), None) => target,
            (None, _) => {
                warn!("No entity for command topic {}", command.topic);
                return RouteOutcome::UnknownTopic;
            }
            (Some(_), Some(_)) => {
                warn!("Several entities share command topic {}, dropping", command.topic);
                return RouteOutcome::AmbiguousTopic;
            }
        };

        let payload = command.payload.as_str();
        let label = format!("{} {} ({})", target.kind, target.index, target.name);
        let action = match parse_action(target.kind, payload) {
            Ok(action) => action,
            Err(RouteOutcome::Unsupported) => {
                warn!("Unexpected command {payload} for {label}, the panel cannot do this");
                return RouteOutcome::Unsupported;
            }
            Err(outcome) => {
                warn!("Unknown command '{payload}' for {label}");
                return outcome;
            }
        };

        info!("Command: {payload} {label}");
        let result = match action {
            Action::Partition(desired) => {
                self.gateway.control_partition(target.index, desired).await
            }
            Action::Output(desired) => self.gateway.control_output(target.index, desired).await,
        };
        match result {
            Ok(()) => {
                info!("{payload} {label}: success");
                RouteOutcome::Dispatched
            }
            Err(e) => {
                error!("{payload} {label} failed: {e}");
                RouteOutcome::Failed
            }
        }
    }

    /// Handle queued commands one at a time until the queue closes or
    /// `shutdown` flips to true.
    pub async fn run(self, mut queue: CommandReceiver, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Command router shutting down");
                        break;
                    }
                }
                command = queue.recv() => match command {
                    Some(command) => {
                        self.handle(&command).await;
                    }
                    None => {
                        debug!("Command queue closed");
                        break;
                    }
                },
            }
        }
    }
}
