// MIT License
// Bridge configuration

use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_FAILURE_ESCALATION, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REFRESH_THRESHOLD_SECS,
    DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Login credentials for the panel web interface.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session keep-alive timing.
///
/// These are policy values: the panel expires sessions that are not touched
/// every few seconds, and only accepts a refresh close to expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Issue a heartbeat when the last one is at least this old.
    pub heartbeat_interval: Duration,
    /// Issue a refresh when the session has this much time left or less.
    pub refresh_threshold: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            refresh_threshold: Duration::from_secs(DEFAULT_REFRESH_THRESHOLD_SECS),
        }
    }
}

/// Configuration for bridging one panel.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Panel address, either a bare host (`192.168.1.50`) or a base URL.
    pub device_address: String,
    /// Web interface user name
    pub username: String,
    /// Web interface password
    pub password: String,
    /// Status poll cadence in milliseconds (default: 1000)
    pub poll_interval_ms: u64,
    /// Heartbeat cadence in milliseconds (default: 5000)
    pub heartbeat_interval_ms: u64,
    /// Refresh the session when this many seconds or fewer remain (default: 65)
    pub refresh_threshold_secs: u64,
    /// Standalone keep-alive cadence in milliseconds (default: 5000)
    pub keepalive_interval_ms: u64,
    /// Every Nth consecutive poll failure is logged as a warning (default: 10)
    pub failure_escalation_every: u32,
    /// Per-request HTTP timeout in milliseconds (default: 10000)
    pub request_timeout_ms: u64,
    /// Capacity of the inbound command queue (default: 64)
    pub command_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_address: "192.168.1.50".to_string(),
            username: String::new(),
            password: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            failure_escalation_every: DEFAULT_FAILURE_ESCALATION,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("device_address", &self.device_address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .field("refresh_threshold_secs", &self.refresh_threshold_secs)
            .field("keepalive_interval_ms", &self.keepalive_interval_ms)
            .field("failure_escalation_every", &self.failure_escalation_every)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("command_queue_capacity", &self.command_queue_capacity)
            .finish()
    }
}

impl BridgeConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            refresh_threshold: Duration::from_secs(self.refresh_threshold_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base URL of the panel web interface, without a trailing slash.
    pub fn base_url(&self) -> String {
        let addr = self.device_address.trim_end_matches('/');
        if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn device_address(mut self, address: impl Into<String>) -> Self {
        self.config.device_address = address.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    pub fn refresh_threshold_secs(mut self, secs: u64) -> Self {
        self.config.refresh_threshold_secs = secs;
        self
    }

    pub fn keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keepalive_interval_ms = ms;
        self
    }

    pub fn failure_escalation_every(mut self, every: u32) -> Self {
        self.config.failure_escalation_every = every.max(1);
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn command_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.command_queue_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
