use std::time::Duration;

/// Configuration for authentication tasks.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Handshakes taking at least this long are logged at warn level.
    /// Default: 250ms.
    pub slow_auth_threshold: Duration,
    /// SASL protocol name passed to mechanism providers.
    /// Default: "memcached".
    pub protocol: String,
    /// Authentication threads are named `<prefix>-<node>`.
    pub thread_name_prefix: String,
    /// Pause before retrying a rejected binary handshake. The pause ends
    /// early if the task is interrupted.
    /// Default: 100ms.
    pub retry_delay: Duration,
    /// How often a waiting task re-checks `Connection::is_shut_down`.
    /// Default: 50ms.
    pub shutdown_poll_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            slow_auth_threshold: Duration::from_millis(250),
            protocol: "memcached".to_string(),
            thread_name_prefix: "memcache-auth".to_string(),
            retry_delay: Duration::from_millis(100),
            shutdown_poll_interval: Duration::from_millis(50),
        }
    }
}
