// MIT License
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::AsyncClient;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{info, warn};

use elitesx_bridge::command::{command_queue, CommandRouter, CommandTarget};
use elitesx_bridge::constants::{
    DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_FAILURE_ESCALATION, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REFRESH_THRESHOLD_SECS,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
use elitesx_bridge::mqtt::{mqtt_options, run_event_loop, BrokerSettings, MqttPublisher, Topics};
use elitesx_bridge::{BridgeConfig, EntityRegistry, PanelGateway, PollLoop};

/// How long to wait for the MQTT event loop to flush `offline` on shutdown.
const MQTT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "elitesx2mqtt")]
#[command(about = "Bridge between an Elite-SX alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    /// Host or base URL of the panel web interface
    address: String,
    username: String,
    password: String,
    #[serde(default = "default_poll_interval")]
    poll_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval")]
    heartbeat_interval_ms: u64,
    #[serde(default = "default_refresh_threshold")]
    refresh_threshold_secs: u64,
    #[serde(default = "default_keepalive_interval")]
    keepalive_interval_ms: u64,
    #[serde(default = "default_failure_escalation")]
    failure_escalation_every: u32,
    #[serde(default = "default_request_timeout")]
    request_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_refresh_threshold() -> u64 {
    DEFAULT_REFRESH_THRESHOLD_SECS
}
fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_MS
}
fn default_failure_escalation() -> u32 {
    DEFAULT_FAILURE_ESCALATION
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_base_topic")]
    base_topic: String,
    #[serde(default = "default_discovery_prefix")]
    discovery_prefix: String,
    /// Discovery node id. Defaults to `elitesx-<serial>`.
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    keep_alive_secs: u64,
    #[serde(default = "default_command_queue_capacity")]
    command_queue_capacity: usize,
}

fn default_client_id() -> String {
    "elitesx-bridge".to_string()
}
fn default_base_topic() -> String {
    "elitesx".to_string()
}
fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_command_queue_capacity() -> usize {
    DEFAULT_COMMAND_QUEUE_CAPACITY
}

fn build_bridge_config(config: &Config) -> BridgeConfig {
    let panel = &config.panel;
    BridgeConfig::builder()
        .device_address(&panel.address)
        .username(&panel.username)
        .password(&panel.password)
        .poll_interval_ms(panel.poll_interval_ms)
        .heartbeat_interval_ms(panel.heartbeat_interval_ms)
        .refresh_threshold_secs(panel.refresh_threshold_secs)
        .keepalive_interval_ms(panel.keepalive_interval_ms)
        .failure_escalation_every(panel.failure_escalation_every)
        .request_timeout_ms(panel.request_timeout_ms)
        .command_queue_capacity(config.mqtt.command_queue_capacity)
        .build()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=elitesx_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;
    let bridge_config = build_bridge_config(&config);
    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sigterm = signal(SignalKind::terminate())?;

    // Panel session and entity inventory
    info!("Connecting to Elite-SX panel at {}", bridge_config.base_url());
    let gateway =
        PanelGateway::from_config(&bridge_config).context("Failed to create HTTP client")?;
    let registry = EntityRegistry::populate(&gateway)
        .await
        .context("Failed to read panel inventory")?;
    info!(
        "Panel {} ready: {} partitions, {} zones, {} outputs",
        registry.device.name(),
        registry.partitions.len(),
        registry.zones.len(),
        registry.outputs.len()
    );

    // Set up MQTT
    let node_id = config
        .mqtt
        .node_id
        .clone()
        .unwrap_or_else(|| format!("elitesx-{}", registry.device.serial));
    let topics = Topics::new(&config.mqtt.base_topic, &config.mqtt.discovery_prefix, node_id);
    let broker = BrokerSettings {
        host: mqtt_host,
        port: mqtt_port,
        client_id: config.mqtt.client_id.clone(),
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        keep_alive: Duration::from_secs(config.mqtt.keep_alive_secs),
    };
    let (client, eventloop) = AsyncClient::new(mqtt_options(&broker, &topics), 256);
    let publisher = MqttPublisher::new(client.clone(), topics.clone());

    let targets = CommandTarget::from_registry(&registry, |kind, index| topics.command(kind, index));
    let command_topics = targets.iter().map(|t| t.command_topic.clone()).collect();
    let (command_tx, command_rx) = command_queue(bridge_config.command_queue_capacity);

    // Task 1: MQTT event loop (subscribes on connect, forwards commands)
    let mqtt_handle = tokio::spawn(run_event_loop(
        eventloop,
        client,
        topics.clone(),
        command_topics,
        command_tx,
    ));

    publisher
        .publish_discovery(&registry)
        .await
        .context("Failed to publish discovery documents")?;
    publisher
        .publish_availability(true)
        .await
        .context("Failed to publish availability")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Task 2: session keep-alive
    let keepalive_handle = tokio::spawn(
        Arc::clone(gateway.session())
            .run_keepalive(bridge_config.keepalive_interval(), shutdown_rx.clone()),
    );

    // Task 3: command router
    let router = CommandRouter::new(gateway.clone(), targets);
    let router_handle = tokio::spawn(router.run(command_rx, shutdown_rx.clone()));

    // Task 4: poll, diff and publish
    let poll = PollLoop::new(
        gateway,
        registry,
        publisher.clone(),
        bridge_config.poll_interval(),
        bridge_config.failure_escalation_every,
    );
    let poll_handle = tokio::spawn(poll.run(shutdown_rx));

    // Wait for a signal
    info!("MQTT bridge running. Send SIGINT/SIGTERM to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }

    // Stop the panel side first so nothing is published after `offline`
    let _ = shutdown_tx.send(true);
    for (name, handle) in [
        ("keep-alive", keepalive_handle),
        ("command router", router_handle),
        ("poll loop", poll_handle),
    ] {
        if let Err(e) = handle.await {
            warn!("{name} task ended abnormally: {e}");
        }
    }

    if let Err(e) = publisher.publish_availability(false).await {
        warn!("Failed to publish offline availability: {e}");
    }
    if let Err(e) = publisher.disconnect().await {
        warn!("Error disconnecting from MQTT broker: {e}");
    }
    match tokio::time::timeout(MQTT_DRAIN_TIMEOUT, mqtt_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("MQTT task ended abnormally: {e}"),
        Err(_) => warn!("MQTT event loop did not stop in time"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
/// The port defaults to 1883.
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = match stripped.rsplit_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str.parse().context("Invalid MQTT port number")?;
            (host, port)
        }
        None => (stripped, 1883),
    };
    anyhow::ensure!(!host.is_empty(), "MQTT URL must be in format mqtt://host:port");

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(
            parse_mqtt_url("mqtt://broker.local:1884").unwrap(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(
            parse_mqtt_url("tcp://10.0.0.2").unwrap(),
            ("10.0.0.2".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert!(parse_mqtt_url("mqtt://broker:notaport").is_err());
        assert!(parse_mqtt_url("mqtt://").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            address = "192.168.1.50"
            username = "installer"
            password = "secret"

            [mqtt]
            url = "mqtt://localhost:1883"
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.base_topic, "elitesx");
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert!(config.mqtt.node_id.is_none());

        let bridge = build_bridge_config(&config);
        assert_eq!(bridge.base_url(), "http://192.168.1.50");
        assert_eq!(bridge.poll_interval_ms, 1000);
        assert_eq!(bridge.heartbeat_interval_ms, 5000);
        assert_eq!(bridge.refresh_threshold_secs, 65);
        assert_eq!(bridge.command_queue_capacity, 64);
    }

    #[test]
    fn test_config_overrides() {
        let config: Config = toml::from_str(
            r#"
            [panel]
            address = "https://alarm.example/"
            username = "installer"
            password = "secret"
            poll_interval_ms = 2500
            failure_escalation_every = 3

            [mqtt]
            url = "mqtt://localhost"
            node_id = "house"
            command_queue_capacity = 8
            "#,
        )
        .unwrap();

        let bridge = build_bridge_config(&config);
        assert_eq!(bridge.base_url(), "https://alarm.example");
        assert_eq!(bridge.poll_interval_ms, 2500);
        assert_eq!(bridge.failure_escalation_every, 3);
        assert_eq!(bridge.command_queue_capacity, 8);
        assert_eq!(config.mqtt.node_id.as_deref(), Some("house"));
    }
}
