// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS, VarInt};

/// Control packet type, the high nibble of the first byte.
///
/// The publish variant carries its flag bits; for every other type the flag
/// nibble holds a fixed reserved value which is validated on decode
/// [MQTT-2.2.2-1, MQTT-2.2.2-2].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketType {
    #[default]
    Connect,
    ConnectAck,
    Publish {
        dup: bool,
        qos: QoS,
        retain: bool,
    },
    PublishAck,
    PublishReceived,
    PublishRelease,
    PublishComplete,
    Subscribe,
    SubscribeAck,
    Unsubscribe,
    UnsubscribeAck,
    PingRequest,
    PingResponse,
    Disconnect,
    /// Authentication exchange, MQTT 5.0 only.
    Auth,
}

impl PacketType {
    /// Byte length in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }

    const fn type_bits(self) -> u8 {
        match self {
            Self::Connect => 1,
            Self::ConnectAck => 2,
            Self::Publish { .. } => 3,
            Self::PublishAck => 4,
            Self::PublishReceived => 5,
            Self::PublishRelease => 6,
            Self::PublishComplete => 7,
            Self::Subscribe => 8,
            Self::SubscribeAck => 9,
            Self::Unsubscribe => 10,
            Self::UnsubscribeAck => 11,
            Self::PingRequest => 12,
            Self::PingResponse => 13,
            Self::Disconnect => 14,
            Self::Auth => 15,
        }
    }

    const fn flag_bits(self) -> u8 {
        match self {
            Self::Publish { dup, qos, retain } => {
                let dup = if dup { 0b1000 } else { 0 };
                let qos = (qos as u8) << 1;
                let retain = if retain { 0b0001 } else { 0 };
                dup | qos | retain
            }
            // Bits 3,2,1,0 of PUBREL, SUBSCRIBE and UNSUBSCRIBE are reserved
            // as 0,0,1,0 [MQTT-3.6.1-1, MQTT-3.8.1-1, MQTT-3.10.1-1].
            Self::PublishRelease | Self::Subscribe | Self::Unsubscribe => 0b0010,
            _ => 0b0000,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        (packet_type.type_bits() << 4) | packet_type.flag_bits()
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flag = v & 0b0000_1111;

        if type_bits == 3 {
            let dup = flag & 0b1000 == 0b1000;
            let retain = flag & 0b0001 == 0b0001;
            let qos = QoS::try_from((flag & 0b0110) >> 1)
                .map_err(|_| DecodeError::InvalidPacketFlags)?;
            return Ok(Self::Publish { dup, qos, retain });
        }

        let packet_type = match type_bits {
            1 => Self::Connect,
            2 => Self::ConnectAck,
            4 => Self::PublishAck,
            5 => Self::PublishReceived,
            6 => Self::PublishRelease,
            7 => Self::PublishComplete,
            8 => Self::Subscribe,
            9 => Self::SubscribeAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubscribeAck,
            12 => Self::PingRequest,
            13 => Self::PingResponse,
            14 => Self::Disconnect,
            15 => Self::Auth,
            t => {
                log::error!("header: Invalid packet type bits: {t:#b}");
                return Err(DecodeError::InvalidPacketType);
            }
        };

        if flag == packet_type.flag_bits() {
            Ok(packet_type)
        } else {
            log::error!("header: Got packet flag {flag:#b} in {packet_type:?}");
            Err(DecodeError::InvalidPacketFlags)
        }
    }
}

/// Fixed header part of a control packet.
///
/// ```txt
///  7 6 5 4 3 2 1 0
/// +-------+-------+
/// | Type  | Flags |
/// +-------+-------+
/// | Remaining Len |
/// +-------+-------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedHeader {
    packet_type: PacketType,
    remaining_length: VarInt,
}

impl FixedHeader {
    /// Create a fixed header with `packet_type` and `remaining_length`.
    ///
    /// # Errors
    ///
    /// Returns error if `remaining_length` exceeds the 4-byte varint range.
    pub const fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, EncodeError> {
        let remaining_length = match VarInt::new(remaining_length) {
            Ok(v) => v,
            Err(err) => return Err(err),
        };
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value()
    }

    /// Byte length in packet.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;
        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?;
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.packet_type));
        let len = self.remaining_length.encode(buf)?;
        Ok(PacketType::bytes() + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_publish_flags() {
        let buf = [0x3d, 0x00];
        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(
            header.packet_type(),
            PacketType::Publish {
                dup: true,
                qos: QoS::ExactOnce,
                retain: true
            }
        );
    }

    #[test]
    fn test_decode_reserved_flags() {
        // SUBSCRIBE with reserved bits cleared is malformed.
        let buf = [0x80, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );

        let buf = [0x82, 0x00];
        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(header.packet_type(), PacketType::Subscribe);
    }

    #[test]
    fn test_encode() {
        let mut buf = Vec::new();
        let header = FixedHeader::new(PacketType::PingResponse, 0).unwrap();
        assert_eq!(header.encode(&mut buf).unwrap(), 2);
        assert_eq!(&buf, &[0xd0, 0x00]);
    }
}
