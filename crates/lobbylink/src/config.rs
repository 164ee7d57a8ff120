//! Client configuration: where the service lives and how to talk to it.

use std::time::Duration;

use lobbylink_connection::ConnectionConfig;
use lobbylink_matchmaking::MatchmakerConfig;
use lobbylink_session::DEFAULT_AUTH_TIMEOUT;

use crate::ConfigError;

/// Environment variable names read by [`ClientConfig::from_env`].
pub const ENV_HOST: &str = "LOBBYLINK_HOST";
pub const ENV_PORT: &str = "LOBBYLINK_PORT";
pub const ENV_SSL: &str = "LOBBYLINK_SSL";
pub const ENV_SERVER_KEY: &str = "LOBBYLINK_SERVER_KEY";
pub const ENV_AUTH_TIMEOUT_SECS: &str = "LOBBYLINK_AUTH_TIMEOUT_SECS";

/// Everything needed to reach the service.
///
/// The defaults point at a local development server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// `https` / `wss` instead of `http` / `ws`. Secure sockets need the
    /// `tls` feature.
    pub use_ssl: bool,
    /// Shared key the service uses to recognize this client build.
    pub server_key: String,
    /// Upper bound for one login request.
    pub auth_timeout: Duration,
    pub connection: ConnectionConfig,
    pub matchmaker: MatchmakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7350,
            use_ssl: false,
            server_key: "defaultkey".to_string(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            connection: ConnectionConfig::default(),
            matchmaker: MatchmakerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `LOBBYLINK_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(ssl) = lookup(ENV_SSL) {
            config.use_ssl = parse_flag(ENV_SSL, &ssl)?;
        }
        if let Some(key) = lookup(ENV_SERVER_KEY) {
            config.server_key = key;
        }
        if let Some(secs) = lookup(ENV_AUTH_TIMEOUT_SECS) {
            config.auth_timeout = parse_secs(ENV_AUTH_TIMEOUT_SECS, &secs)?;
        }

        Ok(config)
    }

    /// `http(s)://host:port`, the base for RPC calls.
    pub fn http_base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// `ws(s)://host:port/ws`, the realtime endpoint (token not included).
    pub fn socket_url(&self) -> String {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/ws", self.host, self.port)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_points_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7350);
        assert!(!config.use_ssl);
        assert_eq!(config.server_key, "defaultkey");
        assert_eq!(config.auth_timeout, Duration::from_secs(10));
        assert_eq!(config.http_base_url(), "http://127.0.0.1:7350");
        assert_eq!(config.socket_url(), "ws://127.0.0.1:7350/ws");
    }

    #[test]
    fn test_from_lookup_empty_returns_defaults() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 7350);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_from_lookup_overrides_every_field() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_HOST, "lobby.example.com"),
            (ENV_PORT, "443"),
            (ENV_SSL, "true"),
            (ENV_SERVER_KEY, "prodkey"),
            (ENV_AUTH_TIMEOUT_SECS, "30"),
        ]))
        .unwrap();

        assert_eq!(config.server_key, "prodkey");
        assert_eq!(config.auth_timeout, Duration::from_secs(30));
        assert_eq!(config.http_base_url(), "https://lobby.example.com:443");
        assert_eq!(config.socket_url(), "wss://lobby.example.com:443/ws");
    }

    #[test]
    fn test_from_lookup_invalid_port_returns_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[(ENV_PORT, "70000")]));
        assert!(matches!(result, Err(ConfigError::InvalidPort(p)) if p == "70000"));
    }

    #[test]
    fn test_from_lookup_ssl_flag_spellings() {
        for (value, expected) in [("1", true), ("YES", true), ("on", true), ("0", false), ("off", false)] {
            let config = ClientConfig::from_lookup(lookup_from(&[(ENV_SSL, value)])).unwrap();
            assert_eq!(config.use_ssl, expected, "value {value:?}");
        }
    }

    #[test]
    fn test_from_lookup_ssl_garbage_returns_error() {
        let result = ClientConfig::from_lookup(lookup_from(&[(ENV_SSL, "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidFlag { .. })));
    }

    #[test]
    fn test_from_lookup_auth_timeout_rejects_zero_and_garbage() {
        for value in ["0", "soon", "-5"] {
            let result = ClientConfig::from_lookup(lookup_from(&[(ENV_AUTH_TIMEOUT_SECS, value)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidNumber { .. })),
                "value {value:?}"
            );
        }
    }
}
