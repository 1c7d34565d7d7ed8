//! TOML-backed settings for the relay and client binaries (the added ambient
//! stack, §2/§4.7 of the expanded spec): an optional config file, overridden by
//! environment variables, falling back to hard-coded defaults.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_RELAY_LISTEN_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3030";
const DEFAULT_TTL_SECS: u64 = 60;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings for the `relay` binary. The relay's message and bridge TTLs default
/// to 60 seconds but may be adjusted per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub message_ttl_secs: u64,
    pub bridge_ttl_secs: u64,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_RELAY_LISTEN_ADDR.to_string(),
            message_ttl_secs: DEFAULT_TTL_SECS,
            bridge_ttl_secs: DEFAULT_TTL_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Loads `relay.toml` from the current directory if present, then applies
    /// `RELAY_LISTEN_ADDR` / `RELAY_LOG_LEVEL` environment overrides.
    pub fn load() -> Self {
        let mut cfg: RelayConfig = std::fs::read_to_string("relay.toml")
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default();

        if let Ok(addr) = env::var("RELAY_LISTEN_ADDR") {
            cfg.listen_addr = addr;
        }
        if let Ok(level) = env::var("RELAY_LOG_LEVEL") {
            cfg.log_level = level;
        }
        cfg
    }

    /// Parses [`Self::listen_addr`], falling back to the built-in default if the
    /// configured value doesn't parse as a socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        self.listen_addr.parse().unwrap_or_else(|_| {
            tracing_fallback_warn(&self.listen_addr);
            DEFAULT_RELAY_LISTEN_ADDR
                .parse()
                .expect("default listen address is always valid")
        })
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    pub fn bridge_ttl(&self) -> Duration {
        Duration::from_secs(self.bridge_ttl_secs)
    }
}

fn tracing_fallback_warn(configured: &str) {
    eprintln!("warning: listen_addr {configured:?} does not parse as a socket address, using the default");
}

/// Settings for the `client` library and its demo binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay_url: String,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads `client.toml` from the current directory if present, then applies
    /// `CLIENT_RELAY_URL` / `CLIENT_LOG_LEVEL` environment overrides.
    pub fn load() -> Self {
        let mut cfg: ClientConfig = std::fs::read_to_string("client.toml")
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default();

        if let Ok(url) = env::var("CLIENT_RELAY_URL") {
            cfg.relay_url = url;
        }
        if let Ok(level) = env::var("CLIENT_LOG_LEVEL") {
            cfg.log_level = level;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_config_defaults_are_valid() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.socket_addr().port(), 3030);
        assert_eq!(cfg.message_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn relay_config_falls_back_on_unparseable_listen_addr() {
        let cfg = RelayConfig {
            listen_addr: "not an address".to_string(),
            ..RelayConfig::default()
        };
        assert_eq!(cfg.socket_addr(), DEFAULT_RELAY_LISTEN_ADDR.parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn client_config_defaults_point_at_loopback_relay() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.relay_url, "http://127.0.0.1:3030");
    }
}
