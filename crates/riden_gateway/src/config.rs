use bon::Builder;

/// Path the adapter dials for its control connection.
pub const ADAPTER_PATH: &str = "/api/v1/adapter";

/// Path API clients connect to.
pub const CLIENT_PATH: &str = "/api/v1/riden";

/// Configuration for the transport gateway.
#[derive(Debug, Clone, Builder)]
pub struct GatewayConfig {
    /// Host to listen on.
    #[builder(into, default = String::from("localhost"))]
    pub host: String,

    /// Port to listen on.
    #[builder(default = 8081)]
    pub port: u16,

    /// Upgrade path reserved for the adapter.
    #[builder(into, default = String::from(ADAPTER_PATH))]
    pub adapter_path: String,

    /// Upgrade path for API clients.
    #[builder(into, default = String::from(CLIENT_PATH))]
    pub client_path: String,

    /// Per-client write queue capacity.
    #[builder(default = 1024)]
    pub client_queue_capacity: usize,

    /// Write queue capacity for the adapter connection.
    #[builder(default = 1024)]
    pub control_queue_capacity: usize,
}

impl GatewayConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
