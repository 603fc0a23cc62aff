// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::utils::{write_u16_bytes, write_u16_string};
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, VarInt};

mod id {
    pub const PAYLOAD_FORMAT_INDICATOR: u8 = 0x01;
    pub const MESSAGE_EXPIRY_INTERVAL: u8 = 0x02;
    pub const CONTENT_TYPE: u8 = 0x03;
    pub const RESPONSE_TOPIC: u8 = 0x08;
    pub const CORRELATION_DATA: u8 = 0x09;
    pub const SUBSCRIPTION_IDENTIFIER: u8 = 0x0b;
    pub const SESSION_EXPIRY_INTERVAL: u8 = 0x11;
    pub const ASSIGNED_CLIENT_IDENTIFIER: u8 = 0x12;
    pub const SERVER_KEEP_ALIVE: u8 = 0x13;
    pub const AUTHENTICATION_METHOD: u8 = 0x15;
    pub const AUTHENTICATION_DATA: u8 = 0x16;
    pub const REQUEST_PROBLEM_INFORMATION: u8 = 0x17;
    pub const WILL_DELAY_INTERVAL: u8 = 0x18;
    pub const REQUEST_RESPONSE_INFORMATION: u8 = 0x19;
    pub const RESPONSE_INFORMATION: u8 = 0x1a;
    pub const SERVER_REFERENCE: u8 = 0x1c;
    pub const REASON_STRING: u8 = 0x1f;
    pub const RECEIVE_MAXIMUM: u8 = 0x21;
    pub const TOPIC_ALIAS_MAXIMUM: u8 = 0x22;
    pub const TOPIC_ALIAS: u8 = 0x23;
    pub const MAXIMUM_QOS: u8 = 0x24;
    pub const RETAIN_AVAILABLE: u8 = 0x25;
    pub const USER_PROPERTY: u8 = 0x26;
    pub const MAXIMUM_PACKET_SIZE: u8 = 0x27;
    pub const WILDCARD_SUBSCRIPTION_AVAILABLE: u8 = 0x28;
    pub const SUBSCRIPTION_IDENTIFIER_AVAILABLE: u8 = 0x29;
    pub const SHARED_SUBSCRIPTION_AVAILABLE: u8 = 0x2a;
}

/// A single property in an MQTT 5.0 property section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property {
    PayloadFormatIndicator(u8),
    MessageExpiryInterval(u32),
    ContentType(String),
    ResponseTopic(String),
    CorrelationData(Vec<u8>),
    SubscriptionIdentifier(usize),
    SessionExpiryInterval(u32),
    AssignedClientIdentifier(String),
    ServerKeepAlive(u16),
    AuthenticationMethod(String),
    AuthenticationData(Vec<u8>),
    RequestProblemInformation(u8),
    WillDelayInterval(u32),
    RequestResponseInformation(u8),
    ResponseInformation(String),
    ServerReference(String),
    ReasonString(String),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQoS(u8),
    RetainAvailable(u8),
    UserProperty(String, String),
    MaximumPacketSize(u32),
    WildcardSubscriptionAvailable(u8),
    SubscriptionIdentifierAvailable(u8),
    SharedSubscriptionAvailable(u8),
}

impl Property {
    const fn property_id(&self) -> u8 {
        match self {
            Self::PayloadFormatIndicator(_) => id::PAYLOAD_FORMAT_INDICATOR,
            Self::MessageExpiryInterval(_) => id::MESSAGE_EXPIRY_INTERVAL,
            Self::ContentType(_) => id::CONTENT_TYPE,
            Self::ResponseTopic(_) => id::RESPONSE_TOPIC,
            Self::CorrelationData(_) => id::CORRELATION_DATA,
            Self::SubscriptionIdentifier(_) => id::SUBSCRIPTION_IDENTIFIER,
            Self::SessionExpiryInterval(_) => id::SESSION_EXPIRY_INTERVAL,
            Self::AssignedClientIdentifier(_) => id::ASSIGNED_CLIENT_IDENTIFIER,
            Self::ServerKeepAlive(_) => id::SERVER_KEEP_ALIVE,
            Self::AuthenticationMethod(_) => id::AUTHENTICATION_METHOD,
            Self::AuthenticationData(_) => id::AUTHENTICATION_DATA,
            Self::RequestProblemInformation(_) => id::REQUEST_PROBLEM_INFORMATION,
            Self::WillDelayInterval(_) => id::WILL_DELAY_INTERVAL,
            Self::RequestResponseInformation(_) => id::REQUEST_RESPONSE_INFORMATION,
            Self::ResponseInformation(_) => id::RESPONSE_INFORMATION,
            Self::ServerReference(_) => id::SERVER_REFERENCE,
            Self::ReasonString(_) => id::REASON_STRING,
            Self::ReceiveMaximum(_) => id::RECEIVE_MAXIMUM,
            Self::TopicAliasMaximum(_) => id::TOPIC_ALIAS_MAXIMUM,
            Self::TopicAlias(_) => id::TOPIC_ALIAS,
            Self::MaximumQoS(_) => id::MAXIMUM_QOS,
            Self::RetainAvailable(_) => id::RETAIN_AVAILABLE,
            Self::UserProperty(..) => id::USER_PROPERTY,
            Self::MaximumPacketSize(_) => id::MAXIMUM_PACKET_SIZE,
            Self::WildcardSubscriptionAvailable(_) => id::WILDCARD_SUBSCRIPTION_AVAILABLE,
            Self::SubscriptionIdentifierAvailable(_) => id::SUBSCRIPTION_IDENTIFIER_AVAILABLE,
            Self::SharedSubscriptionAvailable(_) => id::SHARED_SUBSCRIPTION_AVAILABLE,
        }
    }

    /// Byte length in packet, including the identifier byte.
    fn bytes(&self) -> usize {
        let value_len = match self {
            Self::PayloadFormatIndicator(_)
            | Self::RequestProblemInformation(_)
            | Self::RequestResponseInformation(_)
            | Self::MaximumQoS(_)
            | Self::RetainAvailable(_)
            | Self::WildcardSubscriptionAvailable(_)
            | Self::SubscriptionIdentifierAvailable(_)
            | Self::SharedSubscriptionAvailable(_) => 1,
            Self::ServerKeepAlive(_)
            | Self::ReceiveMaximum(_)
            | Self::TopicAliasMaximum(_)
            | Self::TopicAlias(_) => 2,
            Self::MessageExpiryInterval(_)
            | Self::SessionExpiryInterval(_)
            | Self::WillDelayInterval(_)
            | Self::MaximumPacketSize(_) => 4,
            Self::SubscriptionIdentifier(value) => {
                VarInt::new(*value).map_or(1, |v| v.bytes())
            }
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientIdentifier(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInformation(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => 2 + s.len(),
            Self::CorrelationData(bytes) | Self::AuthenticationData(bytes) => 2 + bytes.len(),
            Self::UserProperty(key, value) => 2 + key.len() + 2 + value.len(),
        };
        1 + value_len
    }

    fn decode_one(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_id = ba.read_byte()?;
        let property = match property_id {
            id::PAYLOAD_FORMAT_INDICATOR => Self::PayloadFormatIndicator(ba.read_byte()?),
            id::MESSAGE_EXPIRY_INTERVAL => Self::MessageExpiryInterval(ba.read_u32()?),
            id::CONTENT_TYPE => Self::ContentType(ba.read_u16_string()?),
            id::RESPONSE_TOPIC => Self::ResponseTopic(ba.read_u16_string()?),
            id::CORRELATION_DATA => Self::CorrelationData(ba.read_u16_bytes()?.to_vec()),
            id::SUBSCRIPTION_IDENTIFIER => {
                Self::SubscriptionIdentifier(VarInt::decode(ba)?.value())
            }
            id::SESSION_EXPIRY_INTERVAL => Self::SessionExpiryInterval(ba.read_u32()?),
            id::ASSIGNED_CLIENT_IDENTIFIER => {
                Self::AssignedClientIdentifier(ba.read_u16_string()?)
            }
            id::SERVER_KEEP_ALIVE => Self::ServerKeepAlive(ba.read_u16()?),
            id::AUTHENTICATION_METHOD => Self::AuthenticationMethod(ba.read_u16_string()?),
            id::AUTHENTICATION_DATA => Self::AuthenticationData(ba.read_u16_bytes()?.to_vec()),
            id::REQUEST_PROBLEM_INFORMATION => Self::RequestProblemInformation(ba.read_byte()?),
            id::WILL_DELAY_INTERVAL => Self::WillDelayInterval(ba.read_u32()?),
            id::REQUEST_RESPONSE_INFORMATION => {
                Self::RequestResponseInformation(ba.read_byte()?)
            }
            id::RESPONSE_INFORMATION => Self::ResponseInformation(ba.read_u16_string()?),
            id::SERVER_REFERENCE => Self::ServerReference(ba.read_u16_string()?),
            id::REASON_STRING => Self::ReasonString(ba.read_u16_string()?),
            id::RECEIVE_MAXIMUM => Self::ReceiveMaximum(ba.read_u16()?),
            id::TOPIC_ALIAS_MAXIMUM => Self::TopicAliasMaximum(ba.read_u16()?),
            id::TOPIC_ALIAS => Self::TopicAlias(ba.read_u16()?),
            id::MAXIMUM_QOS => Self::MaximumQoS(ba.read_byte()?),
            id::RETAIN_AVAILABLE => Self::RetainAvailable(ba.read_byte()?),
            id::USER_PROPERTY => {
                let key = ba.read_u16_string()?;
                let value = ba.read_u16_string()?;
                Self::UserProperty(key, value)
            }
            id::MAXIMUM_PACKET_SIZE => Self::MaximumPacketSize(ba.read_u32()?),
            id::WILDCARD_SUBSCRIPTION_AVAILABLE => {
                Self::WildcardSubscriptionAvailable(ba.read_byte()?)
            }
            id::SUBSCRIPTION_IDENTIFIER_AVAILABLE => {
                Self::SubscriptionIdentifierAvailable(ba.read_byte()?)
            }
            id::SHARED_SUBSCRIPTION_AVAILABLE => {
                Self::SharedSubscriptionAvailable(ba.read_byte()?)
            }
            _ => {
                log::error!("property: Unknown property id: {property_id:#x}");
                return Err(DecodeError::InvalidPropertyId);
            }
        };
        Ok(property)
    }

    fn encode_one(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.push(self.property_id());
        match self {
            Self::PayloadFormatIndicator(v)
            | Self::RequestProblemInformation(v)
            | Self::RequestResponseInformation(v)
            | Self::MaximumQoS(v)
            | Self::RetainAvailable(v)
            | Self::WildcardSubscriptionAvailable(v)
            | Self::SubscriptionIdentifierAvailable(v)
            | Self::SharedSubscriptionAvailable(v) => buf.push(*v),
            Self::ServerKeepAlive(v)
            | Self::ReceiveMaximum(v)
            | Self::TopicAliasMaximum(v)
            | Self::TopicAlias(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Self::MessageExpiryInterval(v)
            | Self::SessionExpiryInterval(v)
            | Self::WillDelayInterval(v)
            | Self::MaximumPacketSize(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Self::SubscriptionIdentifier(v) => {
                VarInt::new(*v)?.encode(buf)?;
            }
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientIdentifier(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInformation(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => {
                write_u16_string(buf, s)?;
            }
            Self::CorrelationData(bytes) | Self::AuthenticationData(bytes) => {
                write_u16_bytes(buf, bytes)?;
            }
            Self::UserProperty(key, value) => {
                write_u16_string(buf, key)?;
                write_u16_string(buf, value)?;
            }
        }
        Ok(())
    }
}

/// Property section of an MQTT 5.0 variable header: a varint byte count
/// followed by the properties themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, property: Property) -> &mut Self {
        self.0.push(property);
        self
    }

    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.0
    }

    /// Byte length in packet, including the leading varint.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let body: usize = self.0.iter().map(Property::bytes).sum();
        VarInt::new(body).map_or(1, |v| v.bytes()) + body
    }

    /// Total encoded size of the user properties alone. The broker bounds
    /// this sum with its `property_size` limit.
    #[must_use]
    pub fn user_property_bytes(&self) -> usize {
        self.0
            .iter()
            .filter(|p| matches!(p, Property::UserProperty(..)))
            .map(Property::bytes)
            .sum()
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let body_len = VarInt::decode(ba)?.value();
        let end_offset = ba
            .offset()
            .checked_add(body_len)
            .ok_or(DecodeError::InvalidRemainingLength)?;

        let mut properties = Vec::new();
        while ba.offset() < end_offset {
            properties.push(Property::decode_one(ba)?);
        }
        if ba.offset() != end_offset {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let body: usize = self.0.iter().map(Property::bytes).sum();
        VarInt::new(body)?.encode(buf)?;
        for property in &self.0 {
            property.encode_one(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_round_trip() {
        let props = Properties::new();
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x00]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(Properties::decode(&mut ba), Ok(props));
    }

    #[test]
    fn test_round_trip() {
        let mut props = Properties::new();
        props
            .push(Property::SessionExpiryInterval(120))
            .push(Property::UserProperty("region".to_string(), "eu".to_string()))
            .push(Property::TopicAlias(4));
        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), props.bytes());

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn test_user_property_bytes() {
        let mut props = Properties::new();
        props.push(Property::UserProperty("k".to_string(), "v".to_string()));
        props.push(Property::ServerKeepAlive(30));
        // id + (2 + 1) + (2 + 1)
        assert_eq!(props.user_property_bytes(), 7);
    }

    #[test]
    fn test_unknown_property_id() {
        let buf = [0x02, 0x7f, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyId)
        );
    }
}
