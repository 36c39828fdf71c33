use bon::Builder;
use std::time::Duration;
use url::Url;

use crate::error::AdapterError;
use crate::retry::validate_patterns;

pub const DEFAULT_GATEWAY_URL: &str = "ws://localhost:8081/api/v1/adapter";
pub const DEFAULT_LOGIC_ENDPOINT: &str = "http://[::1]:50051";

/// Configuration for the adapter.
#[derive(Debug, Clone, Builder)]
pub struct AdapterConfig {
    /// WebSocket URL of the gateway's adapter path.
    #[builder(into, default = String::from(DEFAULT_GATEWAY_URL))]
    pub gateway_url: String,

    /// gRPC endpoint of the trip logic service.
    #[builder(into, default = String::from(DEFAULT_LOGIC_ENDPOINT))]
    pub logic_endpoint: String,

    /// Status-code patterns for which a refused gateway upgrade is retried.
    #[builder(default = vec![String::from("500")])]
    pub retry_codes: Vec<String>,

    /// Delay before redialling the gateway or the logic service.
    #[builder(default = Duration::from_secs(2))]
    pub dial_retry_delay: Duration,

    /// Delay between tearing down the upstream stream set and rebuilding it.
    #[builder(default = Duration::from_millis(500))]
    pub stream_restart_delay: Duration,

    /// Interval between keep-alive pings on the gateway link.
    #[builder(default = Duration::from_secs(60))]
    pub keep_alive_period: Duration,

    /// How long to spend writing the going-away close frame.
    #[builder(default = Duration::from_secs(5))]
    pub close_write_timeout: Duration,

    /// Capacity of each per-kind relay channel toward the logic service.
    #[builder(default = 256)]
    pub relay_capacity: usize,

    /// Capacity of the gateway write queue.
    #[builder(default = 256)]
    pub outbound_capacity: usize,
}

impl AdapterConfig {
    /// How long after a ping the link waits for a pong before reconnecting.
    pub fn keep_alive_expiry(&self) -> Duration {
        self.keep_alive_period.saturating_sub(Duration::from_secs(1))
    }

    /// Check the retry policy, the gateway URL, and the queue and keep-alive
    /// settings.
    pub fn validate(&self) -> Result<(), AdapterError> {
        validate_patterns(&self.retry_codes)?;

        if self.relay_capacity == 0 {
            return Err(AdapterError::Setting {
                name: "relay_capacity",
                reason: "must be at least 1",
            });
        }
        if self.outbound_capacity == 0 {
            return Err(AdapterError::Setting {
                name: "outbound_capacity",
                reason: "must be at least 1",
            });
        }
        // The pong deadline is one second shorter than the period.
        if self.keep_alive_expiry().is_zero() {
            return Err(AdapterError::Setting {
                name: "keep_alive_period",
                reason: "must be longer than one second",
            });
        }

        let url = Url::parse(&self.gateway_url).map_err(|source| AdapterError::GatewayUrl {
            url: self.gateway_url.clone(),
            source,
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(AdapterError::GatewayScheme(other.to_owned())),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
