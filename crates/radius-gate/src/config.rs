use crate::module::{Capability, PluginError};
use crate::secrets::SecretError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Secret configuration error: {0}")]
    Secrets(#[from] SecretError),
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

/// Plugin names per capability that must not be dispatched for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableConfig {
    #[serde(default)]
    pub accounting: Vec<String>,
    #[serde(default)]
    pub preauth: Vec<String>,
    #[serde(default)]
    pub postauth: Vec<String>,
    #[serde(default)]
    pub trace: Vec<String>,
}

impl DisableConfig {
    /// Capabilities switched off for the plugin called `name`
    pub fn for_plugin(&self, name: &str) -> HashSet<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| {
                let names = match capability {
                    Capability::PreAuth => &self.preauth,
                    Capability::PostAuth => &self.postauth,
                    Capability::Accounting => &self.accounting,
                    Capability::Trace => &self.trace,
                };
                names.iter().any(|n| n == name)
            })
            .collect()
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Debug output from the pipeline and plugins
    #[serde(default)]
    pub debug: bool,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Run as the accounting proxy instead of the authentication proxy
    #[serde(default)]
    pub accounting: bool,

    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Listen port (default: 1812, or 1813 in accounting mode)
    #[serde(default)]
    pub bind: Option<u16>,

    /// Host of the upstream RADIUS server
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,

    /// Port of the upstream RADIUS server (default: listen port + 2)
    #[serde(default)]
    pub to: Option<u16>,

    /// Data directory holding `secrets`, `clients` and plugin databases
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Directory for plugin log files
    #[serde(default = "default_log")]
    pub log: PathBuf,

    /// Instance identifier used in plugin log file names (default: "auth" or "acct")
    #[serde(default)]
    pub instance: Option<String>,

    /// Never answer a failed authorization with Access-Reject
    #[serde(default)]
    pub no_reject: bool,

    /// Let plugins cache lookups until the next reload
    #[serde(default)]
    pub cache: bool,

    /// Treat Access-Requests without Message-Authenticator as bad-secret
    #[serde(default)]
    pub require_message_authenticator: bool,

    /// Seconds a client's upstream socket may stay idle before it is closed
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// Plugins to load, in dispatch order
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub disable: DisableConfig,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from("/var/lib/radius-gate")
}

fn default_log() -> PathBuf {
    PathBuf::from("/var/log/radius-gate")
}

fn default_session_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            log_level: None,
            accounting: false,
            listen_address: default_listen_address(),
            bind: None,
            upstream_host: default_upstream_host(),
            to: None,
            dir: default_dir(),
            log: default_log(),
            instance: None,
            no_reject: false,
            cache: false,
            require_message_authenticator: false,
            session_timeout: default_session_timeout(),
            plugins: vec![],
            disable: DisableConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn bind_port(&self) -> u16 {
        match self.bind {
            Some(port) => port,
            None if self.accounting => 1813,
            None => 1812,
        }
    }

    /// Upstream port; None when the listen port + 2 default does not fit
    pub fn upstream_port(&self) -> Option<u16> {
        self.to.or_else(|| self.bind_port().checked_add(2))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn instance_name(&self) -> &str {
        match &self.instance {
            Some(instance) => instance,
            None if self.accounting => "acct",
            None => "auth",
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: IpAddr = self
            .listen_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address)))?;
        Ok(SocketAddr::new(addr, self.bind_port()))
    }

    /// Resolve the upstream server address
    pub fn upstream_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self.upstream_port().ok_or_else(|| {
            ConfigError::Invalid(format!("No default upstream port above {}", self.bind_port()))
        })?;
        (self.upstream_host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConfigError::Invalid(format!("Upstream host {} did not resolve", self.upstream_host))
            })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let _: IpAddr = self
            .listen_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address)))?;

        if self.bind == Some(0) {
            return Err(ConfigError::Invalid("Port cannot be 0".to_string()));
        }

        if self.to == Some(0) {
            return Err(ConfigError::Invalid("Upstream port cannot be 0".to_string()));
        }

        if self.upstream_host.is_empty() {
            return Err(ConfigError::Invalid("Upstream host cannot be empty".to_string()));
        }

        if self.upstream_port().is_none() {
            return Err(ConfigError::Invalid(format!(
                "Upstream port must be set when listening on {}",
                self.bind_port()
            )));
        }

        if self.session_timeout == 0 {
            return Err(ConfigError::Invalid("Session timeout cannot be 0".to_string()));
        }

        // Unresolvable hosts are reported when the proxy starts
        if let (Ok(listen), Ok(upstream)) = (self.socket_addr(), self.upstream_addr()) {
            if loops_back(listen, upstream) {
                return Err(ConfigError::Invalid(format!(
                    "Upstream {} is the listen address {}",
                    upstream, listen
                )));
            }
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if plugin.is_empty() {
                return Err(ConfigError::Invalid("Plugin has empty name".to_string()));
            }
            if !seen.insert(plugin) {
                return Err(ConfigError::Invalid(format!("Plugin {} listed twice", plugin)));
            }
        }

        if let Some(level) = &self.log_level {
            if !["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!("Invalid log level: {}", level)));
            }
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            debug: false,
            log_level: Some("info".to_string()),
            accounting: false,
            listen_address: "0.0.0.0".to_string(),
            bind: Some(1812),
            upstream_host: "127.0.0.1".to_string(),
            to: Some(1814),
            dir: default_dir(),
            log: default_log(),
            instance: None,
            no_reject: false,
            cache: true,
            require_message_authenticator: false,
            session_timeout: default_session_timeout(),
            plugins: vec!["usermac".to_string(), "log".to_string()],
            disable: DisableConfig {
                trace: vec!["log".to_string()],
                ..DisableConfig::default()
            },
        }
    }
}

/// Whether datagrams sent to `upstream` would arrive at `listen`
///
/// A wildcard listener receives on loopback and unspecified targets too.
/// Other local interface addresses are not detected.
fn loops_back(listen: SocketAddr, upstream: SocketAddr) -> bool {
    if listen.port() != upstream.port() {
        return false;
    }
    let listen_ip = listen.ip().to_canonical();
    let upstream_ip = upstream.ip().to_canonical();
    listen_ip == upstream_ip
        || (listen_ip.is_unspecified() && (upstream_ip.is_loopback() || upstream_ip.is_unspecified()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_port(), 1812);
        assert_eq!(config.upstream_port(), Some(1814));
        assert_eq!(config.session_timeout(), Duration::from_secs(60));
        assert_eq!(config.instance_name(), "auth");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_accounting_defaults() {
        let config = Config {
            accounting: true,
            ..Config::default()
        };
        assert_eq!(config.bind_port(), 1813);
        assert_eq!(config.upstream_port(), Some(1815));
        assert_eq!(config.instance_name(), "acct");
    }

    #[test]
    fn test_explicit_ports() {
        let config = Config {
            bind: Some(11812),
            to: Some(21812),
            ..Config::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 11812);
        assert_eq!(config.upstream_addr().unwrap().port(), 21812);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"plugins": ["usermac"], "disable": {"trace": ["usermac"]}}"#)
                .unwrap();
        assert_eq!(config.plugins, vec!["usermac"]);
        assert_eq!(config.dir, PathBuf::from("/var/lib/radius-gate"));
        assert_eq!(config.upstream_host, "127.0.0.1");
        assert!(config.disable.preauth.is_empty());
    }

    #[test]
    fn test_disable_for_plugin() {
        let disable = DisableConfig {
            preauth: vec!["log".to_string()],
            trace: vec!["log".to_string(), "debug".to_string()],
            ..DisableConfig::default()
        };
        assert_eq!(
            disable.for_plugin("log"),
            HashSet::from([Capability::PreAuth, Capability::Trace])
        );
        assert_eq!(disable.for_plugin("debug"), HashSet::from([Capability::Trace]));
        assert!(disable.for_plugin("usermac").is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.plugins = vec!["log".to_string(), "log".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bind = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listen_address = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upstream_cannot_loop_back() {
        let config = Config {
            listen_address: "127.0.0.1".to_string(),
            bind: Some(1812),
            to: Some(1812),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_wildcard_listener_loops_back_to_localhost() {
        let config = Config {
            listen_address: "0.0.0.0".to_string(),
            bind: Some(1812),
            upstream_host: "127.0.0.1".to_string(),
            to: Some(1812),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            listen_address: "::".to_string(),
            bind: Some(1812),
            upstream_host: "::1".to_string(),
            to: Some(1812),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            listen_address: "0.0.0.0".to_string(),
            bind: Some(1812),
            upstream_host: "127.0.0.1".to_string(),
            to: Some(1814),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upstream_port_overflow() {
        let config = Config {
            bind: Some(65535),
            ..Config::default()
        };
        assert_eq!(config.upstream_port(), None);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(config.upstream_addr().is_err());

        let config = Config {
            bind: Some(65535),
            to: Some(1812),
            ..Config::default()
        };
        assert_eq!(config.upstream_port(), Some(1812));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_session_timeout_rejected() {
        let config = Config {
            session_timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        Config::example().to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.plugins, vec!["usermac", "log"]);
        assert_eq!(loaded.disable.trace, vec!["log"]);
        assert!(loaded.cache);
    }
}
