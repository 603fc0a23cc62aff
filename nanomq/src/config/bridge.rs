// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::{topic, ProtocolLevel, QoS, TopicFilter};
use std::collections::BTreeMap;

use super::keyfile::{self, parse_bool, parse_number};
use crate::error::{Error, ErrorKind};

/// One upstream subscription: messages received on it are injected into
/// the local broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSubscription {
    topic: String,
    qos: QoS,
}

impl BridgeSubscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }
}

/// Bridge section, loaded from its own config file.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    address: String,
    proto_ver: ProtocolLevel,
    clientid: Option<String>,
    clean_start: bool,
    username: String,
    password: String,
    keepalive: u16,
    forwards: Vec<String>,
    subscriptions: Vec<BridgeSubscription>,
    parallel: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            proto_ver: ProtocolLevel::V311,
            clientid: None,
            clean_start: true,
            username: String::new(),
            password: String::new(),
            keepalive: 60,
            forwards: Vec::new(),
            subscriptions: Vec::new(),
            parallel: 2,
        }
    }
}

impl BridgeConfig {
    /// Parse the content of a bridge config file.
    ///
    /// # Errors
    ///
    /// Returns error if a key has an invalid value.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let mut config = Self::default();
        // subscription index -> (topic, qos)
        let mut sub_topics: BTreeMap<u32, String> = BTreeMap::new();
        let mut sub_qos: BTreeMap<u32, QoS> = BTreeMap::new();

        for (key, value) in keyfile::parse(content)? {
            match key.as_str() {
                "bridge.address" => config.address = value,
                "bridge.proto_ver" => {
                    let ver: u8 = parse_number(&key, &value)?;
                    config.proto_ver = ProtocolLevel::try_from(ver).map_err(|_| {
                        Error::from_string(
                            ErrorKind::ConfigError,
                            format!("Invalid bridge.proto_ver: {value}"),
                        )
                    })?;
                }
                "bridge.clientid" => config.clientid = Some(value),
                "bridge.clean_start" => config.clean_start = parse_bool(&key, &value)?,
                "bridge.username" => config.username = value,
                "bridge.password" => config.password = value,
                "bridge.keepalive" => config.keepalive = parse_number(&key, &value)?,
                "bridge.forwards" => {
                    config.forwards = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                        .collect();
                }
                "bridge.parallel" => config.parallel = parse_number(&key, &value)?,
                _ => {
                    if let Some(rest) = key.strip_prefix("bridge.subscription.") {
                        if let Some(index) = rest.strip_suffix(".topic") {
                            let index: u32 = parse_number(&key, index)?;
                            sub_topics.insert(index, value);
                        } else if let Some(index) = rest.strip_suffix(".qos") {
                            let index: u32 = parse_number(&key, index)?;
                            let qos: u8 = parse_number(&key, &value)?;
                            let qos = QoS::try_from(qos).map_err(|_| {
                                Error::from_string(
                                    ErrorKind::ConfigError,
                                    format!("Invalid qos in {key}: {value}"),
                                )
                            })?;
                            sub_qos.insert(index, qos);
                        }
                    } else {
                        log::warn!("bridge: Unknown config key: {key}");
                    }
                }
            }
        }

        for (index, topic) in sub_topics {
            let qos = sub_qos.remove(&index).unwrap_or(QoS::AtMostOnce);
            config.subscriptions.push(BridgeSubscription { topic, qos });
        }

        Ok(config)
    }

    /// Whether this bridge should be started at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.address.is_empty()
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn proto_ver(&self) -> ProtocolLevel {
        self.proto_ver
    }

    #[must_use]
    pub fn clientid(&self) -> Option<&str> {
        self.clientid.as_deref()
    }

    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub const fn keepalive(&self) -> u16 {
        self.keepalive
    }

    #[must_use]
    pub fn forwards(&self) -> &[String] {
        &self.forwards
    }

    /// Parsed forward filters, checked by `validate`.
    ///
    /// # Errors
    ///
    /// Returns error if a forward entry is not a valid topic filter.
    pub fn forward_filters(&self) -> Result<Vec<TopicFilter>, Error> {
        self.forwards
            .iter()
            .map(|filter| {
                TopicFilter::parse(filter).map_err(|err| {
                    Error::from_string(
                        ErrorKind::ConfigError,
                        format!("Invalid bridge forward filter {filter}: {err:?}"),
                    )
                })
            })
            .collect()
    }

    #[must_use]
    pub fn subscriptions(&self) -> &[BridgeSubscription] {
        &self.subscriptions
    }

    #[must_use]
    pub const fn parallel(&self) -> usize {
        self.parallel
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the address, forwards or subscriptions are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.enabled() {
            return Ok(());
        }
        let _filters = self.forward_filters()?;
        for subscription in &self.subscriptions {
            topic::validate_sub_topic(&subscription.topic).map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!(
                        "Invalid bridge subscription {}: {err:?}",
                        subscription.topic
                    ),
                )
            })?;
        }
        if self.parallel == 0 {
            return Err(Error::new(ErrorKind::ConfigError, "bridge.parallel must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRIDGE_FILE: &str = r#"
## Bridge to the cloud broker.
bridge.address=mqtt-tcp://broker.example.com:1883
bridge.proto_ver=4
bridge.clientid=bridge-edge-7
bridge.clean_start=true
bridge.username=edge
bridge.password=secret
bridge.keepalive=60
bridge.forwards=topic1/#,topic2/#
bridge.subscription.1.topic=cmd/topic1
bridge.subscription.1.qos=1
bridge.subscription.2.topic=cmd/topic2
bridge.subscription.2.qos=2
bridge.parallel=2
"#;

    #[test]
    fn test_parse() {
        let config = BridgeConfig::parse(BRIDGE_FILE).unwrap();
        assert!(config.enabled());
        assert_eq!(config.address(), "mqtt-tcp://broker.example.com:1883");
        assert_eq!(config.proto_ver(), ProtocolLevel::V311);
        assert_eq!(config.clientid(), Some("bridge-edge-7"));
        assert_eq!(config.forwards(), &["topic1/#", "topic2/#"]);
        assert_eq!(config.subscriptions().len(), 2);
        assert_eq!(config.subscriptions()[0].topic(), "cmd/topic1");
        assert_eq!(config.subscriptions()[0].qos(), QoS::AtLeastOnce);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_when_empty() {
        let config = BridgeConfig::parse("").unwrap();
        assert!(!config.enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_forward() {
        let content = "bridge.address=mqtt-tcp://h:1\nbridge.forwards=bad/#/filter\n";
        let config = BridgeConfig::parse(content).unwrap();
        assert!(config.validate().is_err());
    }
}
