// MIT License
// Error taxonomy

/// All errors that can occur while talking to the panel or the bus.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Login (or the recovery login after a failed heartbeat/refresh) failed.
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// A read call failed after a valid session was established.
    #[error("Failed to fetch {resource}: {details}")]
    RemoteFetch {
        resource: &'static str,
        details: String,
    },

    /// A control call's acknowledgement did not match the expected literal.
    #[error("Command {command} rejected: expected '{expected}', received '{received}'")]
    CommandRejected {
        command: String,
        expected: &'static str,
        received: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {path}")]
    UnexpectedStatus { status: u16, path: String },

    #[error("Failed to decode {resource}: {details}")]
    Decode {
        resource: &'static str,
        details: String,
    },

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Whether this error is transient and the next cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Authentication { .. }
                | BridgeError::RemoteFetch { .. }
                | BridgeError::Http(_)
                | BridgeError::UnexpectedStatus { .. }
                | BridgeError::Mqtt(_)
        )
    }

    /// Wrap any failure of a read call as a `RemoteFetch` for `resource`.
    ///
    /// Authentication errors pass through unchanged so callers can tell a
    /// dead session apart from a failed read.
    pub(crate) fn into_fetch(self, resource: &'static str) -> Self {
        match self {
            e @ (BridgeError::Authentication { .. } | BridgeError::RemoteFetch { .. }) => e,
            other => BridgeError::RemoteFetch {
                resource,
                details: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
