// MIT License
// MQTT bus: topics, discovery documents, state publishing, command intake

use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, SubscribeFilter,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::command::{enqueue, CommandSender, InboundCommand};
use crate::devices::{DeviceIdentity, Kind};
use crate::error::Result;
use crate::event::{EventSink, NormalizedEvent};
use crate::registry::EntityRegistry;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Home Assistant component used for each entity kind.
pub fn component(kind: Kind) -> &'static str {
    match kind {
        Kind::Partition => "alarm_control_panel",
        Kind::Zone => "binary_sensor",
        Kind::Output => "switch",
    }
}

/// Topic layout of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
    discovery_prefix: String,
    node_id: String,
}

impl Topics {
    pub fn new(
        base: impl Into<String>,
        discovery_prefix: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            discovery_prefix: discovery_prefix.into().trim_end_matches('/').to_string(),
            node_id: node_id.into(),
        }
    }

    /// `<base>/status`, retained `online`/`offline`.
    pub fn availability(&self) -> String {
        format!("{}/status", self.base)
    }

    fn entity(&self, kind: Kind, index: u32) -> String {
        format!("{}/{}/{}", self.base, component(kind), kind.unique_id(index))
    }

    pub fn state(&self, kind: Kind, index: u32) -> String {
        format!("{}/state", self.entity(kind, index))
    }

    pub fn command(&self, kind: Kind, index: u32) -> String {
        format!("{}/set", self.entity(kind, index))
    }

    pub fn discovery(&self, kind: Kind, index: u32) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix,
            component(kind),
            self.node_id,
            kind.unique_id(index)
        )
    }
}

// ----- Discovery documents -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDevice {
    pub name: String,
    pub model: String,
    pub sw_version: String,
    pub identifiers: Vec<String>,
}

impl From<&DeviceIdentity> for DiscoveryDevice {
    fn from(device: &DeviceIdentity) -> Self {
        Self {
            name: device.name(),
            model: device.model.clone(),
            sw_version: device.software_version.clone(),
            identifiers: vec![device.model.clone(), device.serial.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDocument {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_features: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_arm_required: Option<bool>,
    pub availability: Vec<Availability>,
    pub device: DiscoveryDevice,
}

impl DiscoveryDocument {
    fn new(kind: Kind, index: u32, name: &str, topics: &Topics, device: &DiscoveryDevice) -> Self {
        let (device_class, supported_features, code_arm_required) = match kind {
            // Only away-arm and disarm can be sent to the panel.
            Kind::Partition => (None, Some(vec!["arm_away"]), Some(false)),
            Kind::Zone => (Some("motion"), None, None),
            Kind::Output => (None, None, None),
        };
        Self {
            name: name.to_string(),
            unique_id: kind.unique_id(index),
            state_topic: topics.state(kind, index),
            command_topic: kind
                .is_controllable()
                .then(|| topics.command(kind, index)),
            device_class,
            supported_features,
            code_arm_required,
            availability: vec![Availability {
                topic: topics.availability(),
                payload_available: PAYLOAD_ONLINE,
                payload_not_available: PAYLOAD_OFFLINE,
            }],
            device: device.clone(),
        }
    }
}

/// `(config topic, document)` for every entity of `registry`.
pub fn discovery_documents(
    registry: &EntityRegistry,
    topics: &Topics,
) -> Vec<(String, DiscoveryDocument)> {
    let device = DiscoveryDevice::from(&registry.device);
    let partitions = registry
        .partitions
        .iter()
        .map(|e| (Kind::Partition, e.index, e.name.as_str()));
    let zones = registry
        .zones
        .iter()
        .map(|e| (Kind::Zone, e.index, e.name.as_str()));
    let outputs = registry
        .outputs
        .iter()
        .map(|e| (Kind::Output, e.index, e.name.as_str()));
    partitions
        .chain(zones)
        .chain(outputs)
        .map(|(kind, index, name)| {
            (
                topics.discovery(kind, index),
                DiscoveryDocument::new(kind, index, name, topics, &device),
            )
        })
        .collect()
}

// ----- Client -----

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

/// Connection options with the availability topic as last will.
pub fn mqtt_options(settings: &BrokerSettings, topics: &Topics) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(settings.keep_alive);
    options.set_last_will(LastWill::new(
        topics.availability(),
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.clone().unwrap_or_default());
    }
    options
}

/// Publishes discovery documents, availability and entity states.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topics: Topics,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, topics: Topics) -> Self {
        Self { client, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub async fn publish_json(&self, topic: &str, payload: &impl Serialize, retain: bool) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, json)
            .await?;
        Ok(())
    }

    /// One retained discovery document per entity.
    pub async fn publish_discovery(&self, registry: &EntityRegistry) -> Result<()> {
        let documents = discovery_documents(registry, &self.topics);
        info!("Publishing {} discovery documents", documents.len());
        for (topic, document) in &documents {
            self.publish_json(topic, document, true).await?;
        }
        Ok(())
    }

    pub async fn publish_availability(&self, online: bool) -> Result<()> {
        let payload = if online { PAYLOAD_ONLINE } else { PAYLOAD_OFFLINE };
        self.client
            .publish(self.topics.availability(), QoS::AtLeastOnce, true, payload)
            .await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl EventSink for MqttPublisher {
    async fn publish(&self, event: &NormalizedEvent) -> Result<()> {
        let topic = self.topics.state(event.kind, event.index);
        debug!("MQTT: {topic} <- {}", event.payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, true, event.payload)
            .await?;
        Ok(())
    }
}

/// Drive the MQTT connection until the client disconnects.
///
/// Command topics are (re)subscribed and `online` is re-published on every
/// broker connect, since rumqttc does not restore subscriptions and the
/// broker may have published the last will in between. Inbound publishes are
/// handed to the command queue without waiting.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    command_topics: Vec<String>,
    commands: CommandSender,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(
                    "MQTT: connected, subscribing to {} command topics",
                    command_topics.len()
                );
                if !command_topics.is_empty() {
                    let filters = command_topics
                        .iter()
                        .map(|t| SubscribeFilter::new(t.clone(), QoS::AtLeastOnce));
                    if let Err(e) = client.try_subscribe_many(filters) {
                        error!("Failed to subscribe to command topics: {e}");
                    }
                }
                if let Err(e) =
                    client.try_publish(topics.availability(), QoS::AtLeastOnce, true, PAYLOAD_ONLINE)
                {
                    warn!("Failed to publish availability: {e}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                debug!("MQTT command received on {}: {payload}", msg.topic);
                enqueue(
                    &commands,
                    InboundCommand {
                        topic: msg.topic,
                        payload,
                    },
                );
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT: disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_names, samples::*, Resource};
    use crate::registry::EntitySet;

    fn topics() -> Topics {
        Topics::new("elitesx/", "homeassistant", "elitesx-12345678")
    }

    fn registry() -> EntityRegistry {
        EntityRegistry {
            device: DeviceIdentity::parse("Elite-SX (12345678) Ver 10.0.307").unwrap(),
            privileges: None,
            partitions: EntitySet::from_names(decode_names(Resource::PartitionNames, PNAMES).unwrap()),
            zones: EntitySet::from_names(decode_names(Resource::ZoneNames, ZNAMES).unwrap()),
            outputs: EntitySet::from_names(decode_names(Resource::OutputNames, ONAMES).unwrap()),
        }
    }

    #[test]
    fn test_topics() {
        let topics = topics();
        assert_eq!(topics.availability(), "elitesx/status");
        assert_eq!(
            topics.state(Kind::Zone, 11),
            "elitesx/binary_sensor/zone-11/state"
        );
        assert_eq!(
            topics.command(Kind::Partition, 2),
            "elitesx/alarm_control_panel/partition-2/set"
        );
        assert_eq!(
            topics.discovery(Kind::Output, 12),
            "homeassistant/switch/elitesx-12345678/output-12/config"
        );
    }

    #[test]
    fn test_discovery_documents() {
        let documents = discovery_documents(&registry(), &topics());
        assert_eq!(documents.len(), 3 + 12 + 6);

        let (topic, partition) = &documents[0];
        assert_eq!(topic, "homeassistant/alarm_control_panel/elitesx-12345678/partition-1/config");
        let json = serde_json::to_value(partition).unwrap();
        assert_eq!(json["name"], "House");
        assert_eq!(json["unique_id"], "partition-1");
        assert_eq!(json["command_topic"], "elitesx/alarm_control_panel/partition-1/set");
        assert_eq!(json["supported_features"], serde_json::json!(["arm_away"]));
        assert_eq!(json["device"]["name"], "Elite-SX (12345678)");
        assert_eq!(json["device"]["sw_version"], "10.0.307");
        assert_eq!(
            json["device"]["identifiers"],
            serde_json::json!(["Elite-SX", "12345678"])
        );
        assert_eq!(json["availability"][0]["topic"], "elitesx/status");

        let zone = documents
            .iter()
            .find(|(_, d)| d.unique_id == "zone-13")
            .map(|(_, d)| serde_json::to_value(d).unwrap())
            .unwrap();
        assert_eq!(zone["device_class"], "motion");
        assert_eq!(zone["name"], "Smoke Tmp (Sleepout)");
        assert!(zone.get("command_topic").is_none());

        let output = documents
            .iter()
            .find(|(_, d)| d.unique_id == "output-12")
            .map(|(_, d)| serde_json::to_value(d).unwrap())
            .unwrap();
        assert_eq!(output["command_topic"], "elitesx/switch/output-12/set");
        assert!(output.get("device_class").is_none());
    }

    #[test]
    fn test_mqtt_options_set_last_will() {
        let settings = BrokerSettings {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "elitesx2mqtt".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
        };
        let options = mqtt_options(&settings, &topics());
        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "elitesx/status");
        assert_eq!(&will.message[..], b"offline");
        assert!(will.retain);
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }
}
