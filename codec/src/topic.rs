// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Topic names, topic filters and the wildcard matching rules from
//! MQTT chapter 4.7.

use std::fmt;

use crate::utils::write_u16_string;
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    EmptyTopic,
    TooManyData,

    /// Misplaced `+`/`#`, or wildcard inside a topic name.
    InvalidWildcard,
}

impl From<TopicError> for DecodeError {
    fn from(_e: TopicError) -> Self {
        Self::InvalidTopic
    }
}

impl From<TopicError> for EncodeError {
    fn from(_e: TopicError) -> Self {
        Self::InvalidData
    }
}

/// Validate a topic name used in PUBLISH packets.
///
/// Topic names must be non-empty, fit the 16-bit length field and contain
/// no wildcard characters [MQTT-3.3.2-2].
///
/// # Errors
///
/// Returns error if `topic` violates any of these rules.
pub fn validate_pub_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::EmptyTopic);
    }
    if topic.len() > u16::MAX as usize {
        return Err(TopicError::TooManyData);
    }
    if topic.bytes().any(|b| b == b'+' || b == b'#') {
        return Err(TopicError::InvalidWildcard);
    }
    Ok(())
}

/// Validate a topic filter used in SUBSCRIBE/UNSUBSCRIBE packets.
///
/// `+` must occupy a whole level; `#` must occupy the last level
/// [MQTT-4.7.1-2, MQTT-4.7.1-3].
///
/// # Errors
///
/// Returns error if `filter` violates any of these rules.
pub fn validate_sub_topic(filter: &str) -> Result<(), TopicError> {
    if filter.is_empty() {
        return Err(TopicError::EmptyTopic);
    }
    if filter.len() > u16::MAX as usize {
        return Err(TopicError::TooManyData);
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        match *level {
            "+" => (),
            "#" => {
                if index != last {
                    return Err(TopicError::InvalidWildcard);
                }
            }
            _ => {
                if level.contains(['+', '#']) {
                    return Err(TopicError::InvalidWildcard);
                }
            }
        }
    }
    Ok(())
}

/// A validated topic name, as carried by PUBLISH packets.
///
/// Encoded on the wire as a length-prefixed UTF-8 string.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PubTopic(String);

impl PubTopic {
    /// # Errors
    ///
    /// Returns error if `topic` is empty, oversized or contains wildcards.
    pub fn new(topic: &str) -> Result<Self, TopicError> {
        validate_pub_topic(topic)?;
        Ok(Self(topic.to_string()))
    }

    /// Byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }
}

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = ba.read_u16_string()?;
        validate_pub_topic(&s)?;
        Ok(Self(s))
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        write_u16_string(buf, &self.0)
    }
}

/// A validated topic filter, as carried by SUBSCRIBE/UNSUBSCRIBE packets.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubTopic(String);

impl SubTopic {
    /// # Errors
    ///
    /// Returns error if `filter` is empty, oversized or has misplaced
    /// wildcards.
    pub fn new(filter: &str) -> Result<Self, TopicError> {
        validate_sub_topic(filter)?;
        Ok(Self(filter.to_string()))
    }

    /// Byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }
}

impl AsRef<str> for SubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for SubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let s = ba.read_u16_string()?;
        validate_sub_topic(&s)?;
        Ok(Self(s))
    }
}

impl EncodePacket for SubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        write_u16_string(buf, &self.0)
    }
}

/// One level of a parsed topic filter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopicLevel {
    /// Literal level string, possibly empty.
    Literal(String),

    /// `+`, matches exactly one level.
    Single,

    /// `#`, matches any number of remaining levels, including zero.
    Multi,
}

impl TopicLevel {
    fn parse(level: &str) -> Result<Self, TopicError> {
        match level {
            "+" => Ok(Self::Single),
            "#" => Ok(Self::Multi),
            _ => {
                if level.contains(['+', '#']) {
                    Err(TopicError::InvalidWildcard)
                } else {
                    Ok(Self::Literal(level.to_string()))
                }
            }
        }
    }
}

/// A topic filter split into levels, with the matcher the broker routes by.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
    levels: Vec<TopicLevel>,
}

impl TopicFilter {
    /// Parse `filter` into levels.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is not a valid topic filter.
    pub fn parse(filter: &str) -> Result<Self, TopicError> {
        validate_sub_topic(filter)?;
        let levels = filter
            .split('/')
            .map(TopicLevel::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            filter: filter.to_string(),
            levels,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn levels(&self) -> &[TopicLevel] {
        &self.levels
    }

    /// Check whether a concrete `topic` matches this filter.
    ///
    /// Topics whose first level starts with `$` are reserved: they match
    /// neither `#` nor `+` at the root, only an identical literal level
    /// [MQTT-4.7.2-1].
    #[must_use]
    pub fn is_match(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('/').collect();

        if parts[0].starts_with('$')
            && !matches!(&self.levels[0], TopicLevel::Literal(root) if root == parts[0])
        {
            return false;
        }

        let mut index = 0;
        for level in &self.levels {
            match level {
                TopicLevel::Multi => return true,
                TopicLevel::Single => {
                    if index >= parts.len() || parts[index].is_empty() {
                        return false;
                    }
                    index += 1;
                }
                TopicLevel::Literal(literal) => {
                    if index >= parts.len() || parts[index] != literal {
                        return false;
                    }
                    index += 1;
                }
            }
        }

        index == parts.len()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sub_topic() {
        assert!(validate_sub_topic("sport/tennis/player/#").is_ok());
        assert!(validate_sub_topic("#").is_ok());
        assert!(validate_sub_topic("+").is_ok());
        assert!(validate_sub_topic("+/tennis/#").is_ok());
        assert!(validate_sub_topic("sport//tennis").is_ok());

        assert!(validate_sub_topic("").is_err());
        assert!(validate_sub_topic("sport/tennis/player#").is_err());
        assert!(validate_sub_topic("sport/#/player").is_err());
        assert!(validate_sub_topic("sport+").is_err());
    }

    #[test]
    fn test_validate_pub_topic() {
        assert!(validate_pub_topic("sport/tennis/player1").is_ok());
        assert!(validate_pub_topic("sport/tennis/#").is_err());
        assert!(validate_pub_topic("sport/+/player1").is_err());
        assert!(validate_pub_topic("").is_err());
    }

    #[test]
    fn test_literal_match() {
        let filter = TopicFilter::parse("sensors/room1/temp").unwrap();
        assert!(filter.is_match("sensors/room1/temp"));
        assert!(!filter.is_match("sensors/room1"));
        assert!(!filter.is_match("sensors/room1/temp/x"));
    }

    #[test]
    fn test_single_wildcard() {
        let filter = TopicFilter::parse("sensors/+/temp").unwrap();
        assert!(filter.is_match("sensors/room1/temp"));
        assert!(!filter.is_match("sensors/room1/hum"));
        assert!(!filter.is_match("sensors/a/b/temp"));
        // `+` never matches an empty level.
        assert!(!filter.is_match("sensors//temp"));
    }

    #[test]
    fn test_multi_wildcard() {
        let filter = TopicFilter::parse("sport/#").unwrap();
        assert!(filter.is_match("sport/tennis"));
        assert!(filter.is_match("sport/tennis/player1/ranking"));
        // `#` includes the parent level itself.
        assert!(filter.is_match("sport"));
        assert!(!filter.is_match("other"));
    }

    #[test]
    fn test_reserved_topics() {
        let all = TopicFilter::parse("#").unwrap();
        assert!(!all.is_match("$SYS/foo"));
        assert!(all.is_match("foo"));

        let plus = TopicFilter::parse("+/foo").unwrap();
        assert!(!plus.is_match("$SYS/foo"));

        let sys = TopicFilter::parse("$SYS/#").unwrap();
        assert!(sys.is_match("$SYS/foo"));
        assert!(sys.is_match("$SYS/brokers/clients/c1/connected"));
        assert!(!sys.is_match("other/foo"));
    }

    #[test]
    fn test_empty_levels() {
        let filter = TopicFilter::parse("a//b").unwrap();
        assert!(filter.is_match("a//b"));
        assert!(!filter.is_match("a/b"));
    }
}
