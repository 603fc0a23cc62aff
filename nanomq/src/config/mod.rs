// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

mod bridge;
pub mod keyfile;
mod url;

pub use bridge::{BridgeConfig, BridgeSubscription};
pub use url::{ListenerUrl, Transport};

use self::keyfile::{parse_bool, parse_number};
use crate::error::{Error, ErrorKind};

/// Mapping from environment variables to config keys. Applied between the
/// config file and the command line flags.
const ENV_KEYS: &[(&str, &str)] = &[
    ("NANOMQ_BROKER_URL", "url"),
    ("NANOMQ_DAEMON", "daemon"),
    ("NANOMQ_NUM_TASKQ_THREAD", "num_taskq_thread"),
    ("NANOMQ_MAX_TASKQ_THREAD", "max_taskq_thread"),
    ("NANOMQ_PARALLEL", "parallel"),
    ("NANOMQ_PROPERTY_SIZE", "property_size"),
    ("NANOMQ_MSQ_LEN", "msq_len"),
    ("NANOMQ_QOS_DURATION", "qos_duration"),
    ("NANOMQ_ALLOW_ANONYMOUS", "allow_anonymous"),
    ("NANOMQ_WEBSOCKET_ENABLE", "websocket.enable"),
    ("NANOMQ_WEBSOCKET_URL", "websocket.url"),
    ("NANOMQ_HTTP_SERVER_ENABLE", "http_server.enable"),
    ("NANOMQ_HTTP_SERVER_PORT", "http_server.port"),
    ("NANOMQ_HTTP_SERVER_USERNAME", "http_server.username"),
    ("NANOMQ_HTTP_SERVER_PASSWORD", "http_server.password"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Logging section.
#[derive(Debug, Clone)]
pub struct Log {
    log_level: LogLevel,
    log_file: PathBuf,
}

impl Log {
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn log_file(&self) -> &Path {
        self.log_file.as_path()
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_file: PathBuf::from("/tmp/nanomq/nanomq.log"),
        }
    }
}

/// MQTT-over-WebSocket listener section.
#[derive(Debug, Clone)]
pub struct Websocket {
    enable: bool,
    url: String,
}

impl Websocket {
    #[must_use]
    pub const fn enable(&self) -> bool {
        self.enable
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for Websocket {
    fn default() -> Self {
        Self {
            enable: false,
            url: "nmq+ws://0.0.0.0:8083/mqtt".to_string(),
        }
    }
}

/// Embedded http admin endpoint section. The keys are recognized and kept;
/// the endpoint itself lives outside this crate.
#[derive(Debug, Clone)]
pub struct HttpServer {
    enable: bool,
    port: u16,
    username: String,
    password: String,
}

impl HttpServer {
    #[must_use]
    pub const fn enable(&self) -> bool {
        self.enable
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self {
            enable: false,
            port: 8081,
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Broker main config.
///
/// Values are layered in precedence order: command line flags over
/// environment variables over config file entries over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    url: String,
    daemon: bool,

    /// Size of the shared worker pool executing I/O completions.
    num_taskq_thread: u8,
    max_taskq_thread: u8,

    /// Number of concurrently served connections per listener.
    parallel: usize,

    /// Upper bound on the encoded size of MQTT 5.0 user properties.
    property_size: usize,

    /// Per-pipe outbound queue bound.
    msq_len: usize,

    /// Seconds between retransmissions of unacknowledged QoS > 0 messages.
    qos_duration: u64,

    allow_anonymous: bool,

    websocket: Websocket,
    http_server: HttpServer,
    log: Log,

    bridge: Option<BridgeConfig>,
    auth_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "broker+tcp://0.0.0.0:1883".to_string(),
            daemon: false,
            num_taskq_thread: 4,
            max_taskq_thread: 8,
            parallel: 32,
            property_size: 32,
            msq_len: 64,
            qos_duration: 30,
            allow_anonymous: true,
            websocket: Websocket::default(),
            http_server: HttpServer::default(),
            log: Log::default(),
            bridge: None,
            auth_file: None,
        }
    }
}

impl Config {
    /// Load a `key=value` config file over the current values.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or holds invalid entries.
    pub fn load_file(&mut self, path: &Path) -> Result<(), Error> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to read config file {path:?}, err: {err:?}"),
            )
        })?;
        self.load_str(&content)
    }

    /// Apply config entries from `content` over the current values.
    ///
    /// # Errors
    ///
    /// Returns error if an entry has an invalid value.
    pub fn load_str(&mut self, content: &str) -> Result<(), Error> {
        for (key, value) in keyfile::parse(content)? {
            self.apply_entry(&key, &value)?;
        }
        Ok(())
    }

    /// Apply `NANOMQ_*` environment variables over the current values.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn load_env(&mut self) -> Result<(), Error> {
        for (env_key, config_key) in ENV_KEYS {
            if let Ok(value) = env::var(env_key) {
                self.apply_entry(config_key, &value)?;
            }
        }
        Ok(())
    }

    fn apply_entry(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "url" => self.url = value.to_string(),
            "daemon" => self.daemon = parse_bool(key, value)?,
            "num_taskq_thread" => self.num_taskq_thread = parse_number(key, value)?,
            "max_taskq_thread" => self.max_taskq_thread = parse_number(key, value)?,
            "parallel" => self.parallel = parse_number(key, value)?,
            "property_size" => self.property_size = parse_number(key, value)?,
            "msq_len" => self.msq_len = parse_number(key, value)?,
            "qos_duration" => self.qos_duration = parse_number(key, value)?,
            "allow_anonymous" => self.allow_anonymous = parse_bool(key, value)?,
            "websocket.enable" => self.websocket.enable = parse_bool(key, value)?,
            "websocket.url" => self.websocket.url = value.to_string(),
            "http_server.enable" => self.http_server.enable = parse_bool(key, value)?,
            "http_server.port" => self.http_server.port = parse_number(key, value)?,
            "http_server.username" => self.http_server.username = value.to_string(),
            "http_server.password" => self.http_server.password = value.to_string(),
            "log.level" => {
                self.log.log_level = match value {
                    "off" => LogLevel::Off,
                    "error" => LogLevel::Error,
                    "warn" => LogLevel::Warn,
                    "info" => LogLevel::Info,
                    "debug" => LogLevel::Debug,
                    "trace" => LogLevel::Trace,
                    _ => {
                        return Err(Error::from_string(
                            ErrorKind::ConfigError,
                            format!("Invalid log.level: {value}"),
                        ))
                    }
                };
            }
            "log.file" => self.log.log_file = PathBuf::from(value),
            _ => log::warn!("config: Unknown config key: {key}"),
        }
        Ok(())
    }

    /// Load the bridge config file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load_bridge_file(&mut self, path: &Path) -> Result<(), Error> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to read bridge file {path:?}, err: {err:?}"),
            )
        })?;
        self.bridge = Some(BridgeConfig::parse(&content)?);
        Ok(())
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) -> &mut Self {
        self.url = url.to_string();
        self
    }

    #[must_use]
    pub const fn daemon(&self) -> bool {
        self.daemon
    }

    pub fn set_daemon(&mut self, daemon: bool) -> &mut Self {
        self.daemon = daemon;
        self
    }

    #[must_use]
    pub const fn num_taskq_thread(&self) -> u8 {
        self.num_taskq_thread
    }

    pub fn set_num_taskq_thread(&mut self, n: u8) -> &mut Self {
        self.num_taskq_thread = n;
        self
    }

    #[must_use]
    pub const fn max_taskq_thread(&self) -> u8 {
        self.max_taskq_thread
    }

    pub fn set_max_taskq_thread(&mut self, n: u8) -> &mut Self {
        self.max_taskq_thread = n;
        self
    }

    #[must_use]
    pub const fn parallel(&self) -> usize {
        self.parallel
    }

    pub fn set_parallel(&mut self, parallel: usize) -> &mut Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub const fn property_size(&self) -> usize {
        self.property_size
    }

    pub fn set_property_size(&mut self, property_size: usize) -> &mut Self {
        self.property_size = property_size;
        self
    }

    #[must_use]
    pub const fn msq_len(&self) -> usize {
        self.msq_len
    }

    pub fn set_msq_len(&mut self, msq_len: usize) -> &mut Self {
        self.msq_len = msq_len;
        self
    }

    #[must_use]
    pub const fn qos_duration(&self) -> u64 {
        self.qos_duration
    }

    pub fn set_qos_duration(&mut self, qos_duration: u64) -> &mut Self {
        self.qos_duration = qos_duration;
        self
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub const fn websocket(&self) -> &Websocket {
        &self.websocket
    }

    pub fn set_websocket_enable(&mut self, enable: bool) -> &mut Self {
        self.websocket.enable = enable;
        self
    }

    #[must_use]
    pub const fn http_server(&self) -> &HttpServer {
        &self.http_server
    }

    pub fn set_http_server_enable(&mut self, enable: bool) -> &mut Self {
        self.http_server.enable = enable;
        self
    }

    pub fn set_http_server_port(&mut self, port: u16) -> &mut Self {
        self.http_server.port = port;
        self
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    #[must_use]
    pub const fn bridge(&self) -> Option<&BridgeConfig> {
        self.bridge.as_ref()
    }

    pub fn set_bridge(&mut self, bridge: BridgeConfig) -> &mut Self {
        self.bridge = Some(bridge);
        self
    }

    #[must_use]
    pub const fn auth_file(&self) -> Option<&PathBuf> {
        self.auth_file.as_ref()
    }

    pub fn set_auth_file(&mut self, path: &Path) -> &mut Self {
        self.auth_file = Some(path.to_path_buf());
        self
    }

    /// Replace the port in the listener url, used by `-p/--port`.
    ///
    /// # Errors
    ///
    /// Returns error if the current url is invalid.
    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        let mut url = ListenerUrl::parse(&self.url)?;
        url.set_port(port)?;
        self.url = url.to_string();
        Ok(())
    }

    /// All listener urls this broker binds: the main url plus the
    /// WebSocket url when enabled.
    ///
    /// # Errors
    ///
    /// Returns error if an url is invalid.
    pub fn listener_urls(&self) -> Result<Vec<ListenerUrl>, Error> {
        let mut urls = vec![ListenerUrl::parse(&self.url)?];
        if self.websocket.enable {
            urls.push(ListenerUrl::parse(&self.websocket.url)?);
        }
        Ok(urls)
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        let _urls = self.listener_urls()?;
        if self.num_taskq_thread == 0 || self.max_taskq_thread == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "Task queue thread counts must be in 1..=255",
            ));
        }
        if self.num_taskq_thread > self.max_taskq_thread {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "num_taskq_thread must not exceed max_taskq_thread",
            ));
        }
        if self.parallel == 0 {
            return Err(Error::new(ErrorKind::ConfigError, "parallel must be > 0"));
        }
        if self.msq_len == 0 {
            return Err(Error::new(ErrorKind::ConfigError, "msq_len must be > 0"));
        }
        if self.qos_duration == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "qos_duration must be > 0",
            ));
        }
        if let Some(bridge) = &self.bridge {
            bridge.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_FILE: &str = r"
## NanoMQ broker config
url=broker+tcp://0.0.0.0:1993
daemon=false
num_taskq_thread=2
max_taskq_thread=4
parallel=16
property_size=64
msq_len=128
qos_duration=10
allow_anonymous=true
websocket.enable=true
websocket.url=nmq+ws://0.0.0.0:8083/mqtt
http_server.enable=false
http_server.port=8081
";

    #[test]
    fn test_load_str() {
        let mut config = Config::default();
        config.load_str(CONFIG_FILE).unwrap();
        assert_eq!(config.url(), "broker+tcp://0.0.0.0:1993");
        assert_eq!(config.num_taskq_thread(), 2);
        assert_eq!(config.parallel(), 16);
        assert_eq!(config.msq_len(), 128);
        assert!(config.websocket().enable());
        assert!(config.validate().is_ok());
        assert_eq!(config.listener_urls().unwrap().len(), 2);
    }

    #[test]
    fn test_validate_thread_counts() {
        let mut config = Config::default();
        config.set_num_taskq_thread(9).set_max_taskq_thread(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_port() {
        let mut config = Config::default();
        config.set_port(11883).unwrap();
        assert_eq!(config.url(), "broker+tcp://0.0.0.0:11883");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.load_str("msq_len=16\n").unwrap();
        env::set_var("NANOMQ_MSQ_LEN", "99");
        config.load_env().unwrap();
        env::remove_var("NANOMQ_MSQ_LEN");
        assert_eq!(config.msq_len(), 99);
    }
}
