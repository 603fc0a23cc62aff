// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! QoS acknowledge packets of MQTT 5.0. Reason code and properties are
//! optional on the wire: a remaining length of 2 means success with no
//! properties [MQTT-3.4.2.1].

use super::{Properties, ReasonCode};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType,
};

macro_rules! reason_ack_packet {
    ($name:ident, $packet_type:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct $name {
            packet_id: PacketId,
            reason_code: ReasonCode,
            properties: Properties,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: PacketId, reason_code: ReasonCode) -> Self {
                Self {
                    packet_id,
                    reason_code,
                    properties: Properties::new(),
                }
            }

            #[must_use]
            pub const fn packet_id(&self) -> PacketId {
                self.packet_id
            }

            #[must_use]
            pub const fn reason_code(&self) -> ReasonCode {
                self.reason_code
            }

            #[must_use]
            pub const fn properties(&self) -> &Properties {
                &self.properties
            }
        }

        impl DecodePacket for $name {
            fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
                let fixed_header = FixedHeader::decode(ba)?;
                if fixed_header.packet_type() != $packet_type {
                    return Err(DecodeError::InvalidPacketType);
                }
                let remaining_length = fixed_header.remaining_length();
                if remaining_length < PacketId::bytes() {
                    return Err(DecodeError::InvalidRemainingLength);
                }

                let packet_id = PacketId::decode(ba)?;
                let reason_code = if remaining_length > PacketId::bytes() {
                    ReasonCode::try_from(ba.read_byte()?)?
                } else {
                    ReasonCode::Success
                };
                let properties =
                    if remaining_length > PacketId::bytes() + ReasonCode::bytes() {
                        Properties::decode(ba)?
                    } else {
                        Properties::new()
                    };

                Ok(Self {
                    packet_id,
                    reason_code,
                    properties,
                })
            }
        }

        impl EncodePacket for $name {
            fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
                let old_len = buf.len();
                // Reason code and properties may be omitted entirely for a
                // success ack with no properties.
                let minimal =
                    self.reason_code == ReasonCode::Success && self.properties.is_empty();
                let remaining_length = if minimal {
                    PacketId::bytes()
                } else {
                    PacketId::bytes() + ReasonCode::bytes() + self.properties.bytes()
                };
                let fixed_header = FixedHeader::new($packet_type, remaining_length)?;
                fixed_header.encode(buf)?;
                self.packet_id.encode(buf)?;
                if !minimal {
                    buf.push(u8::from(self.reason_code));
                    self.properties.encode(buf)?;
                }
                Ok(buf.len() - old_len)
            }
        }

        impl Packet for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }
        }
    };
}

reason_ack_packet!(
    PublishAckPacket,
    PacketType::PublishAck,
    "Response to a QoS 1 publish."
);
reason_ack_packet!(
    PublishReceivedPacket,
    PacketType::PublishReceived,
    "Second packet of the QoS 2 handshake."
);
reason_ack_packet!(
    PublishReleasePacket,
    PacketType::PublishRelease,
    "Third packet of the QoS 2 handshake."
);
reason_ack_packet!(
    PublishCompletePacket,
    PacketType::PublishComplete,
    "Fourth and final packet of the QoS 2 handshake."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_encoding() {
        let packet = PublishAckPacket::new(PacketId::new(3), ReasonCode::Success);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x40, 0x02, 0x00, 0x03]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(PublishAckPacket::decode(&mut ba), Ok(packet));
    }

    #[test]
    fn test_reason_code_round_trip() {
        let packet =
            PublishReceivedPacket::new(PacketId::new(8), ReasonCode::NoMatchingSubscribers);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishReceivedPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::NoMatchingSubscribers);
    }
}
