// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType,
};

macro_rules! ping_packet {
    ($name:ident, $packet_type:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name {}

        impl $name {
            #[must_use]
            pub const fn new() -> Self {
                Self {}
            }
        }

        impl DecodePacket for $name {
            fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
                let fixed_header = FixedHeader::decode(ba)?;
                if fixed_header.packet_type() != $packet_type {
                    return Err(DecodeError::InvalidPacketType);
                }
                if fixed_header.remaining_length() != 0 {
                    return Err(DecodeError::InvalidRemainingLength);
                }
                Ok(Self {})
            }
        }

        impl EncodePacket for $name {
            fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
                let fixed_header = FixedHeader::new($packet_type, 0)?;
                fixed_header.encode(buf)
            }
        }

        impl Packet for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }
        }
    };
}

ping_packet!(
    PingRequestPacket,
    PacketType::PingRequest,
    "Keep-alive probe from the client [MQTT-3.1.2-23]."
);
ping_packet!(
    PingResponsePacket,
    PacketType::PingResponse,
    "Server reply to a ping request."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut buf = Vec::new();
        PingRequestPacket::new().encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xc0, 0x00]);

        let mut ba = ByteArray::new(&buf);
        assert!(PingRequestPacket::decode(&mut ba).is_ok());

        buf.clear();
        PingResponsePacket::new().encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xd0, 0x00]);
    }
}
