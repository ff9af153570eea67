use std::time::Duration;

use agora_settings::ServerSettings;

/// Listener and per-connection settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// `0` binds a free port.
    pub port: u16,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub heartbeat_miss_threshold: u32,
    /// How long shutdown waits for connection tasks.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_send_queue: settings.max_send_queue.max(1),
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_miss_threshold: settings.heartbeat_miss_threshold.max(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_default_settings() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8081);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.bind_addr(), "0.0.0.0:8081");
    }
}
