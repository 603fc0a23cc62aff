// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::{Properties, ReasonCode};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType,
};

/// MQTT 5.0 UNSUBACK: packet id, properties, then one reason code per
/// requested filter in request order [MQTT-3.11.3-1].
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reason_codes: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub fn with_vec(packet_id: PacketId, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reason_codes,
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn reason_codes(&self) -> &[ReasonCode] {
        &self.reason_codes
    }
}

impl DecodePacket for UnsubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let end_offset = ba
            .offset()
            .checked_add(fixed_header.remaining_length())
            .ok_or(DecodeError::InvalidRemainingLength)?;

        let packet_id = PacketId::decode(ba)?;
        let properties = Properties::decode(ba)?;

        let mut reason_codes = Vec::new();
        while ba.offset() < end_offset {
            reason_codes.push(ReasonCode::try_from(ba.read_byte()?)?);
        }

        Ok(Self {
            packet_id,
            properties,
            reason_codes,
        })
    }
}

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let remaining_length =
            PacketId::bytes() + self.properties.bytes() + self.reason_codes.len();
        let fixed_header = FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for reason_code in &self.reason_codes {
            buf.push(u8::from(*reason_code));
        }
        Ok(buf.len() - old_len)
    }
}

impl Packet for UnsubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubscribeAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = UnsubscribeAckPacket::with_vec(
            PacketId::new(4),
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xb0, 0x05, 0x00, 0x04, 0x00, 0x00, 0x11]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(UnsubscribeAckPacket::decode(&mut ba), Ok(packet));
    }
}
