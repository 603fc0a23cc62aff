// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::{v3, v5, ProtocolLevel, QoS};

/// Will message supplied at CONNECT time, emitted by the broker when the
/// connection dies abnormally.
#[derive(Debug, Clone)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Connection parameters captured at CONNECT time.
///
/// Shared behind an `Arc` because will messages and `$SYS` notifications
/// consult these fields after the socket is gone.
#[derive(Debug, Clone)]
pub struct ConnectParam {
    client_id: String,
    protocol_level: ProtocolLevel,
    clean_session: bool,
    keep_alive: u16,
    username: String,
    will: Option<WillMessage>,
}

impl ConnectParam {
    #[must_use]
    pub fn from_v3(packet: &v3::ConnectPacket) -> Self {
        let flags = packet.connect_flags();
        let will = packet.will_topic().map(|topic| WillMessage {
            topic: topic.to_string(),
            payload: packet.will_message().to_vec(),
            qos: flags.will_qos(),
            retain: flags.will_retain(),
        });
        Self {
            client_id: packet.client_id().to_string(),
            protocol_level: packet.protocol_level(),
            clean_session: flags.clean_session(),
            keep_alive: packet.keep_alive(),
            username: packet.username().to_string(),
            will,
        }
    }

    #[must_use]
    pub fn from_v5(packet: &v5::ConnectPacket) -> Self {
        let flags = packet.connect_flags();
        let will = packet.will_topic().map(|topic| WillMessage {
            topic: topic.to_string(),
            payload: packet.will_message().to_vec(),
            qos: flags.will_qos(),
            retain: flags.will_retain(),
        });
        Self {
            client_id: packet.client_id().to_string(),
            protocol_level: ProtocolLevel::V5,
            clean_session: flags.clean_session(),
            keep_alive: packet.keep_alive(),
            username: packet.username().to_string(),
            will,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub const fn will(&self) -> Option<&WillMessage> {
        self.will.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_v3() {
        let mut packet = v3::ConnectPacket::new("dev-1");
        packet
            .set_will("goodbye", b"bye", QoS::AtLeastOnce, false)
            .unwrap();
        packet.set_username("edge");

        let cparam = ConnectParam::from_v3(&packet);
        assert_eq!(cparam.client_id(), "dev-1");
        assert!(cparam.clean_session());
        assert_eq!(cparam.username(), "edge");
        let will = cparam.will().unwrap();
        assert_eq!(will.topic, "goodbye");
        assert_eq!(will.payload, b"bye");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(!will.retain);
    }
}
