// MIT License
// Elite-SX panel to MQTT bridge
//
//! # elitesx-bridge
//!
//! Bridges the web interface of an Elite-SX alarm panel to MQTT.
//!
//! The panel is polled over HTTP. A session is kept alive with heartbeats
//! and refreshed before it expires, state transitions of partitions, zones
//! and outputs are published as they happen, and inbound commands arm or
//! disarm partitions and switch outputs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use elitesx_bridge::{event_channel, BridgeConfig, EntityRegistry, PanelGateway, PollLoop};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .device_address("192.168.1.50")
//!         .username("installer")
//!         .password("secret")
//!         .build();
//!
//!     let gateway = PanelGateway::from_config(&config)?;
//!     let registry = EntityRegistry::populate(&gateway).await?;
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let keepalive = Arc::clone(gateway.session())
//!         .run_keepalive(config.keepalive_interval(), shutdown_rx.clone());
//!     tokio::spawn(keepalive);
//!
//!     let (events_tx, mut events) = event_channel(64);
//!     let poll = PollLoop::new(
//!         gateway,
//!         registry,
//!         events_tx,
//!         config.poll_interval(),
//!         config.failure_escalation_every,
//!     );
//!     tokio::spawn(poll.run(shutdown_rx));
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{} -> {}", event.unique_id(), event.payload);
//!     }
//!     shutdown_tx.send(true)?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod gateway;
pub mod mqtt;
pub mod poll;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use command::{command_queue, CommandRouter, CommandTarget, InboundCommand, RouteOutcome};
pub use config::{BridgeConfig, BridgeConfigBuilder, Credentials, SessionPolicy};
pub use devices::{
    DesiredOutput, DesiredPartition, DeviceIdentity, Kind, OutputState, PartitionState,
    Privileges, ZoneState,
};
pub use error::{BridgeError, Result};
pub use event::{event_channel, EventReceiver, EventSink, NormalizedEvent};
pub use gateway::PanelGateway;
pub use poll::PollLoop;
pub use registry::{EntityRegistry, EntitySet};
pub use session::SessionManager;
pub use transport::{HttpTransport, Transport};
