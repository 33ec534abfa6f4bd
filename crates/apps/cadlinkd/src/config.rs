use cadlink_mux::MuxConfig;
use cadlink_transport::config::{DEFAULT_HOST, DEFAULT_PORT, HOST_ENV, PORT_ENV, TRANSPORT_ENV};
use cadlink_transport::{TransportConfig, TransportError, TransportKind};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub cad: MuxConfig,
    #[serde(default)]
    pub transport: TransportSection,
}

/// A partial transport choice: the `[transport]` table, or the command line flags.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransportSection {
    pub kind: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    /// Built-in defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, std::io::Error> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn resolve_transport(&self, cli: &TransportSection) -> Result<TransportConfig, TransportError> {
        self.resolve_transport_with(cli, |name| std::env::var(name).ok())
    }

    /// Layers the command line over the environment over the file over the defaults.
    ///
    /// Names given on the command line or in the file must be known transports. The
    /// environment is lenient: an unknown kind means stdio and an unparsable port is skipped,
    /// both with a warning.
    pub fn resolve_transport_with(
        &self,
        cli: &TransportSection,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<TransportConfig, TransportError> {
        let kind = if let Some(kind) = &cli.kind {
            kind.parse::<TransportKind>()?
        } else if let Some(raw) = lookup(TRANSPORT_ENV) {
            raw.parse::<TransportKind>().unwrap_or_else(|_| {
                log::warn!("unknown transport type '{raw}', defaulting to stdio");
                TransportKind::Stdio
            })
        } else if let Some(kind) = &self.transport.kind {
            kind.parse::<TransportKind>()?
        } else {
            TransportKind::Stdio
        };
        if !kind.is_network() {
            return Ok(TransportConfig::new(kind));
        }

        let host = cli
            .host
            .clone()
            .or_else(|| lookup(HOST_ENV).filter(|host| !host.trim().is_empty()))
            .or_else(|| self.transport.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli
            .port
            .or_else(|| {
                let raw = lookup(PORT_ENV)?;
                match raw.trim().parse::<u16>() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        log::warn!("invalid {PORT_ENV} '{raw}', ignoring it");
                        None
                    }
                }
            })
            .or(self.transport.port)
            .unwrap_or(DEFAULT_PORT);
        Ok(TransportConfig::network(kind, host, port))
    }
}
