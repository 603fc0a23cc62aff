// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ByteArray, DecodeError, EncodeError, PacketType};

/// Parse a packet object out of a byte stream.
pub trait DecodePacket: Sized {
    /// Decode one object from `ba`, advancing its cursor.
    ///
    /// # Errors
    ///
    /// Returns error if bytes in `ba` are malformed.
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError>;
}

/// Serialize a packet object into a byte buffer.
pub trait EncodePacket {
    /// Append the wire form of `self` to `buf`, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Returns error if some field cannot be represented on the wire.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// Common interface of all control packets.
pub trait Packet: Send + fmt::Debug {
    fn packet_type(&self) -> PacketType;
}

/// MQTT quality of service level.
#[repr(u8)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,

    /// At least once delivery.
    AtLeastOnce = 1,

    /// Exactly once delivery.
    ExactOnce = 2,
}

impl QoS {
    /// Effective QoS of an outbound delivery: the weaker of the publish QoS
    /// and the granted subscription QoS [MQTT-3.8.4-6].
    #[must_use]
    pub fn degrade(self, granted: Self) -> Self {
        self.min(granted)
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as Self
    }
}

/// Packet identifier carried by QoS > 0 publishes and by
/// subscribe/unsubscribe transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u16);

impl PacketId {
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Byte length in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        2
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for PacketId {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let value = ba.read_u16()?;
        Ok(Self(value))
    }
}

impl EncodePacket for PacketId {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.extend_from_slice(&self.0.to_be_bytes());
        Ok(Self::bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_degrade() {
        assert_eq!(QoS::ExactOnce.degrade(QoS::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(QoS::AtMostOnce.degrade(QoS::ExactOnce), QoS::AtMostOnce);
        assert_eq!(QoS::AtLeastOnce.degrade(QoS::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn test_qos_from_byte() {
        assert_eq!(QoS::try_from(2).unwrap(), QoS::ExactOnce);
        assert_eq!(QoS::try_from(3), Err(DecodeError::InvalidQoS));
    }
}
