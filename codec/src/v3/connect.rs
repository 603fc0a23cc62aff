// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::topic::{validate_pub_topic, PubTopic};
use crate::utils::{write_u16_bytes, write_u16_string};
use crate::{
    ByteArray, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    Packet, PacketType, ProtocolLevel, QoS,
};

/// `ConnectPacket` is the first packet a client sends after the network
/// connection is established.
///
/// Basic structure of packet:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// +-----------------------+
/// | Protocol name         |
/// +-----------------------+
/// | Protocol level        |
/// +-----------------------+
/// | Connect flags         |
/// +-----------------------+
/// | Keep alive            |
/// +-----------------------+
/// | Client id             |
/// +-----------------------+
/// | Will topic (optional) |
/// +-----------------------+
/// | Will payload (opt)    |
/// +-----------------------+
/// | Username (optional)   |
/// +-----------------------+
/// | Password (optional)   |
/// +-----------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_level: ProtocolLevel,
    connect_flags: ConnectFlags,

    /// Time interval in seconds between two control packets from the client.
    keep_alive: u16,

    client_id: String,

    will_topic: Option<PubTopic>,
    will_message: Vec<u8>,

    username: String,
    password: Vec<u8>,
}

impl ConnectPacket {
    /// Create a clean-session connect packet with `client_id`.
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        let mut connect_flags = ConnectFlags::default();
        connect_flags.set_clean_session(true);
        Self {
            protocol_level: ProtocolLevel::V311,
            connect_flags,
            keep_alive: 60,
            client_id: client_id.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    #[must_use]
    pub const fn connect_flags(&self) -> &ConnectFlags {
        &self.connect_flags
    }

    pub fn connect_flags_mut(&mut self) -> &mut ConnectFlags {
        &mut self.connect_flags
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&str> {
        self.will_topic.as_ref().map(AsRef::as_ref)
    }

    /// Install a will message.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name.
    pub fn set_will(
        &mut self,
        topic: &str,
        message: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<&mut Self, EncodeError> {
        validate_pub_topic(topic).map_err(|_| EncodeError::InvalidData)?;
        self.will_topic = Some(PubTopic::new(topic).map_err(|_| EncodeError::InvalidData)?);
        self.will_message = message.to_vec();
        self.connect_flags
            .set_will(true)
            .set_will_qos(qos)
            .set_will_retain(retain);
        Ok(self)
    }

    #[must_use]
    pub fn will_message(&self) -> &[u8] {
        &self.will_message
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, username: &str) -> &mut Self {
        self.username = username.to_string();
        self.connect_flags.set_username(!username.is_empty());
        self
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    pub fn set_password(&mut self, password: &[u8]) -> &mut Self {
        self.password = password.to_vec();
        self.connect_flags.set_password(!password.is_empty());
        self
    }

    fn remaining_length(&self) -> usize {
        let mut len = 2 + self.protocol_level.protocol_name().len() // protocol name
            + 1 // protocol level
            + 1 // connect flags
            + 2 // keep alive
            + 2 + self.client_id.len();
        if let Some(will_topic) = &self.will_topic {
            len += will_topic.bytes();
            len += 2 + self.will_message.len();
        }
        if self.connect_flags.username() {
            len += 2 + self.username.len();
        }
        if self.connect_flags.password() {
            len += 2 + self.password.len();
        }
        len
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = ba.read_u16_string()?;
        let protocol_level = ProtocolLevel::try_from(ba.read_byte()?)?;
        if protocol_name != protocol_level.protocol_name() {
            return Err(DecodeError::InvalidProtocolName);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let client_id = ba.read_u16_string()?;

        let (will_topic, will_message) = if connect_flags.will() {
            let topic = PubTopic::decode(ba)?;
            let message = ba.read_u16_bytes()?.to_vec();
            (Some(topic), message)
        } else {
            (None, Vec::new())
        };

        let username = if connect_flags.username() {
            ba.read_u16_string()?
        } else {
            String::new()
        };

        let password = if connect_flags.password() {
            ba.read_u16_bytes()?.to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            username,
            password,
        })
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        fixed_header.encode(buf)?;

        write_u16_string(buf, self.protocol_level.protocol_name())?;
        self.protocol_level.encode(buf)?;
        self.connect_flags.encode(buf)?;
        buf.extend_from_slice(&self.keep_alive.to_be_bytes());

        write_u16_string(buf, &self.client_id)?;
        if let Some(will_topic) = &self.will_topic {
            will_topic.encode(buf)?;
            write_u16_bytes(buf, &self.will_message)?;
        }
        if self.connect_flags.username() {
            write_u16_string(buf, &self.username)?;
        }
        if self.connect_flags.password() {
            write_u16_bytes(buf, &self.password)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut packet = ConnectPacket::new("sensor-17");
        packet.set_keep_alive(30);
        packet
            .set_will("goodbye", b"bye", QoS::AtLeastOnce, false)
            .unwrap();
        packet.set_username("edge");
        packet.set_password(b"secret");

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.will_topic(), Some("goodbye"));
        assert!(decoded.connect_flags().clean_session());
    }

    #[test]
    fn test_decode_fixture() {
        let buf: Vec<u8> = vec![
            0x10, 0x14, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x08,
            b'w', b'v', b'v', b'w', b'a', b's', b'd', b'f',
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.client_id(), "wvvwasdf");
        assert_eq!(packet.keep_alive(), 60);
        assert_eq!(packet.protocol_level(), ProtocolLevel::V311);
    }
}
