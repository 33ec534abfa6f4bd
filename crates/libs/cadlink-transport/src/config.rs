use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::TransportError;
use crate::kind::TransportKind;

pub const TRANSPORT_ENV: &str = "CADLINK_TRANSPORT";
pub const HOST_ENV: &str = "CADLINK_HOST";
pub const PORT_ENV: &str = "CADLINK_PORT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2001;

/// Keyword parameters handed to [`Server::serve`](crate::Server::serve).
pub type StartupParams = serde_json::Map<String, JsonValue>;

/// One resolved transport choice. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportConfig {
    kind: TransportKind,
    host: Option<String>,
    port: Option<u16>,
    extra: StartupParams,
}

impl TransportConfig {
    /// A transport without network parameters.
    pub fn new(kind: TransportKind) -> Self {
        Self { kind, host: None, port: None, extra: StartupParams::new() }
    }

    pub fn stdio() -> Self {
        Self::new(TransportKind::Stdio)
    }

    pub fn network(kind: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self { host: Some(host.into()), port: Some(port), ..Self::new(kind) }
    }

    /// Explicit selection by name. Unlike the environment lookup an unknown name is an
    /// error.
    pub fn parse(kind: &str, host: Option<String>, port: Option<u16>) -> Result<Self, TransportError> {
        let kind = kind.parse::<TransportKind>()?;
        Ok(Self { host, port, ..Self::new(kind) })
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Resolves from `CADLINK_TRANSPORT`, `CADLINK_HOST` and `CADLINK_PORT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves from an arbitrary variable lookup.
    ///
    /// A missing or unknown transport falls back to stdio with a warning. Network transports
    /// default to `127.0.0.1:2001`; an unparsable port also falls back with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let kind = match lookup(TRANSPORT_ENV) {
            None => TransportKind::Stdio,
            Some(raw) => raw.parse::<TransportKind>().unwrap_or_else(|_| {
                log::warn!("unknown transport type '{raw}', defaulting to stdio");
                TransportKind::Stdio
            }),
        };
        if !kind.is_network() {
            return Self::new(kind);
        }

        let host = lookup(HOST_ENV)
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup(PORT_ENV) {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                log::warn!("invalid {PORT_ENV} '{raw}', defaulting to {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
        };
        Self::network(kind, host, port)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn extra_params(&self) -> &StartupParams {
        &self.extra
    }

    pub fn supports_notifications(&self) -> bool {
        self.kind.supports_notifications()
    }

    /// Parameters for the serving loop: empty for stdio, otherwise the transport name, the
    /// extra parameters and whichever of host and port are set.
    pub fn startup_params(&self) -> StartupParams {
        let mut params = StartupParams::new();
        if self.kind == TransportKind::Stdio {
            return params;
        }
        params.insert("transport".into(), JsonValue::String(self.kind.as_str().to_string()));
        for (key, value) in &self.extra {
            params.insert(key.clone(), value.clone());
        }
        if let Some(host) = &self.host {
            params.insert("host".into(), JsonValue::String(host.clone()));
        }
        if let Some(port) = self.port {
            params.insert("port".into(), JsonValue::from(port));
        }
        params
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::stdio()
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TransportKind::Stdio {
            return f.write_str("STDIO");
        }
        write!(f, "{} on ", self.kind.as_str().to_ascii_uppercase())?;
        match &self.host {
            Some(host) => f.write_str(host)?,
            None => f.write_str("-")?,
        }
        match self.port {
            Some(port) => write!(f, ":{port}"),
            None => f.write_str(":-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn no_input_resolves_to_stdio_without_notifications() {
        let config = TransportConfig::from_lookup(lookup(&[]));
        assert_eq!(config.kind(), TransportKind::Stdio);
        assert!(!config.supports_notifications());
        assert!(config.startup_params().is_empty());
        assert_eq!(config.to_string(), "STDIO");
    }

    #[test]
    fn network_transport_from_variables() {
        let config = TransportConfig::from_lookup(lookup(&[
            (TRANSPORT_ENV, "SSE"),
            (HOST_ENV, "0.0.0.0"),
            (PORT_ENV, "8080"),
        ]));
        assert_eq!(config.kind(), TransportKind::Sse);
        assert_eq!(config.host(), Some("0.0.0.0"));
        assert_eq!(config.port(), Some(8080));
        assert!(config.supports_notifications());
        assert_eq!(config.to_string(), "SSE on 0.0.0.0:8080");
    }

    #[test]
    fn network_transport_defaults_host_and_port() {
        let config = TransportConfig::from_lookup(lookup(&[(TRANSPORT_ENV, "streamable-http")]));
        assert_eq!(config.host(), Some(DEFAULT_HOST));
        assert_eq!(config.port(), Some(DEFAULT_PORT));

        let config = TransportConfig::from_lookup(lookup(&[
            (TRANSPORT_ENV, "http"),
            (PORT_ENV, "not-a-port"),
        ]));
        assert_eq!(config.port(), Some(DEFAULT_PORT));
    }

    #[test]
    fn unknown_transport_variable_falls_back_to_stdio() {
        let config = TransportConfig::from_lookup(lookup(&[
            (TRANSPORT_ENV, "invalid"),
            (HOST_ENV, "0.0.0.0"),
        ]));
        assert_eq!(config, TransportConfig::stdio());
    }

    #[test]
    fn explicit_unknown_transport_is_an_error() {
        assert!(matches!(
            TransportConfig::parse("carrier-pigeon", None, None),
            Err(TransportError::UnknownTransport { .. })
        ));
    }

    #[test]
    fn startup_params_hold_exactly_the_network_parameters() {
        let config = TransportConfig::network(TransportKind::Sse, "localhost", 3000);
        assert_eq!(
            serde_json::Value::Object(config.startup_params()),
            json!({ "transport": "sse", "host": "localhost", "port": 3000 })
        );
    }

    #[test]
    fn extra_params_are_merged_below_host_and_port() {
        let config = TransportConfig::network(TransportKind::StreamableHttp, "127.0.0.1", 2001)
            .with_extra_param("path", json!("/mcp"))
            .with_extra_param("port", json!(1));
        let params = config.startup_params();
        assert_eq!(params.get("path"), Some(&json!("/mcp")));
        assert_eq!(params.get("port"), Some(&json!(2001)));
        assert_eq!(params.get("transport"), Some(&json!("streamable-http")));
    }

    #[test]
    fn stdio_ignores_extra_params() {
        let config = TransportConfig::stdio().with_extra_param("path", json!("/mcp"));
        assert!(config.startup_params().is_empty());
    }
}
