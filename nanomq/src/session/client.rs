// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles client packets.

use codec::{
    utils::random_client_id, ByteArray, DecodePacket, FixedHeader, PacketId, PacketType,
    ProtocolLevel, QoS,
    v3::{self, PublishPacket},
    v5,
};
use std::sync::Arc;

use super::{InflightStage, Session, Status};
use crate::commands::SessionToListenerCmd;
use crate::error::{Error, ErrorKind};
use crate::session::ConnectParam;

impl Session {
    pub(super) async fn handle_client_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let fixed_header = FixedHeader::decode(&mut ba)?;

        // The first packet from a client MUST be CONNECT [MQTT-3.1.0-1].
        if self.status == Status::Invalid && fixed_header.packet_type() != PacketType::Connect {
            return Err(Error::new(
                ErrorKind::StatusError,
                "session: Got control packet before CONNECT",
            ));
        }

        match fixed_header.packet_type() {
            PacketType::Connect => self.on_client_connect(buf).await,
            PacketType::PingRequest => self.on_client_ping(buf).await,
            PacketType::Publish { .. } => self.on_client_publish(buf).await,
            PacketType::PublishAck => self.on_client_publish_ack(buf),
            PacketType::PublishReceived => self.on_client_publish_received(buf).await,
            PacketType::PublishRelease => self.on_client_publish_release(buf).await,
            PacketType::PublishComplete => self.on_client_publish_complete(buf),
            PacketType::Subscribe => self.on_client_subscribe(buf).await,
            PacketType::Unsubscribe => self.on_client_unsubscribe(buf).await,
            PacketType::Disconnect => self.on_client_disconnect(buf),
            t => {
                log::warn!("session: Unhandled packet type: {t:?}");
                Ok(())
            }
        }
    }

    async fn reject_client_id(&mut self) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let ack_packet =
                v5::ConnectAckPacket::new(false, v5::ReasonCode::ClientIdentifierNotValid);
            self.send(&ack_packet).await?;
        } else {
            let ack_packet =
                v3::ConnectAckPacket::new(false, v3::ConnectReturnCode::IdentifierRejected);
            self.send(&ack_packet).await?;
        }
        self.status = Status::Disconnected;
        Ok(())
    }

    async fn on_client_connect(&mut self, buf: &[u8]) -> Result<(), Error> {
        // A second CONNECT on the same connection is a protocol violation
        // [MQTT-3.1.0-2].
        if self.status != Status::Invalid {
            self.status = Status::Disconnected;
            return Err(Error::new(
                ErrorKind::StatusError,
                "session: Got a second CONNECT packet",
            ));
        }

        let mut ba = ByteArray::new(buf);
        let protocol_level = match ProtocolLevel::decode(&mut ba) {
            Ok(protocol_level) => protocol_level,
            Err(err) => {
                // The Server MUST respond with return code 0x01 and
                // disconnect if the protocol level is not supported
                // [MQTT-3.1.2-2].
                let ack_packet = v3::ConnectAckPacket::new(
                    false,
                    v3::ConnectReturnCode::UnacceptedProtocol,
                );
                self.send(&ack_packet).await?;
                self.status = Status::Disconnected;
                return Err(err.into());
            }
        };
        self.protocol_level = protocol_level;

        if protocol_level == ProtocolLevel::V5 {
            self.on_client_connect_v5(buf).await
        } else {
            self.on_client_connect_v3(buf).await
        }
    }

    async fn on_client_connect_v3(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v3::ConnectPacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                // The Server MUST close the network connection without a
                // CONNACK if the packet does not conform [MQTT-3.1.4-1].
                self.status = Status::Disconnected;
                return Err(err.into());
            }
        };

        // A zero-byte ClientId with CleanSession set to 0 is rejected with
        // return code 0x02 [MQTT-3.1.3-8].
        if packet.client_id().is_empty() && !packet.connect_flags().clean_session() {
            return self.reject_client_id().await;
        }
        if packet.client_id().is_empty() {
            if !self.config.allow_empty_client_id() {
                return self.reject_client_id().await;
            }
            // Assign a unique ClientId to that client [MQTT-3.1.3-6].
            let new_client_id = random_client_id();
            let _ret = packet.set_client_id(&new_client_id);
        }

        self.apply_keep_alive(packet.keep_alive());

        let cparam = Arc::new(ConnectParam::from_v3(&packet));
        let password = packet.password().to_vec();
        self.cparam = Some(Arc::clone(&cparam));
        self.status = Status::Connecting;

        self.sender
            .send(SessionToListenerCmd::Connect(self.id, cparam, password))
            .await
            .map_err(Into::into)
    }

    async fn on_client_connect_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v5::ConnectPacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                self.status = Status::Disconnected;
                return Err(err.into());
            }
        };

        if packet.properties().user_property_bytes() > self.config.property_size() {
            log::error!(
                "session: CONNECT user properties exceed limit of {} bytes",
                self.config.property_size()
            );
            return self.close_with_reason(v5::ReasonCode::ProtocolError).await;
        }

        if packet.client_id().is_empty() {
            if !self.config.allow_empty_client_id() {
                return self.reject_client_id().await;
            }
            packet.set_client_id(&random_client_id());
        }

        self.apply_keep_alive(packet.keep_alive());

        let cparam = Arc::new(ConnectParam::from_v5(&packet));
        let password = packet.password().to_vec();
        self.cparam = Some(Arc::clone(&cparam));
        self.status = Status::Connecting;

        self.sender
            .send(SessionToListenerCmd::Connect(self.id, cparam, password))
            .await
            .map_err(Into::into)
    }

    /// The server disconnects a client silent for 1.5 times its advertised
    /// keepalive interval [MQTT-3.1.2-24]. Zero disables the timer.
    fn apply_keep_alive(&mut self, keep_alive: u16) {
        if keep_alive > 0 {
            let deadline = u64::from(keep_alive) * 3 / 2;
            self.config.set_keep_alive(deadline.max(1));
        } else {
            self.config.set_keep_alive(0);
        }
    }

    async fn on_client_ping(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let _packet = v3::PingRequestPacket::decode(&mut ba)?;
        self.send(&v3::PingResponsePacket::new()).await
    }

    async fn on_client_publish(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = if self.protocol_level == ProtocolLevel::V5 {
            let v5_packet = v5::PublishPacket::decode(&mut ba)?;
            if v5_packet.properties().user_property_bytes() > self.config.property_size() {
                log::error!(
                    "session: PUBLISH user properties exceed limit of {} bytes",
                    self.config.property_size()
                );
                return self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            }
            downgrade_publish(&v5_packet)?
        } else {
            PublishPacket::decode(&mut ba)?
        };

        match packet.qos() {
            QoS::AtMostOnce => {
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
            }
            QoS::AtLeastOnce => {
                let packet_id = packet.packet_id();
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
                self.send_publish_ack(packet_id).await?;
            }
            QoS::ExactOnce => {
                // Route only the first copy; repeated ids just get another
                // PUBREC [MQTT-4.3.3-2].
                let packet_id = packet.packet_id();
                if !self.pub_recv_packets.contains(&packet_id.value()) {
                    self.pub_recv_packets.insert(packet_id.value());
                    self.sender
                        .send(SessionToListenerCmd::Publish(self.id, packet))
                        .await?;
                }
                self.send_publish_received(packet_id).await?;
            }
        }
        Ok(())
    }

    async fn send_publish_ack(&mut self, packet_id: PacketId) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::PublishAckPacket::new(packet_id, v5::ReasonCode::Success);
            self.send(&packet).await
        } else {
            self.send(&v3::PublishAckPacket::new(packet_id)).await
        }
    }

    async fn send_publish_received(&mut self, packet_id: PacketId) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::PublishReceivedPacket::new(packet_id, v5::ReasonCode::Success);
            self.send(&packet).await
        } else {
            self.send(&v3::PublishReceivedPacket::new(packet_id)).await
        }
    }

    /// PUBACK for an outbound QoS 1 delivery.
    fn on_client_publish_ack(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            v5::PublishAckPacket::decode(&mut ba)?.packet_id()
        } else {
            v3::PublishAckPacket::decode(&mut ba)?.packet_id()
        };
        if self.inflight_out.remove(&packet_id.value()).is_none() {
            log::warn!(
                "session: PUBACK for unknown packet id {} on pipe {}",
                packet_id,
                self.id
            );
        }
        Ok(())
    }

    /// PUBREC for an outbound QoS 2 delivery; reply with PUBREL.
    async fn on_client_publish_received(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            v5::PublishReceivedPacket::decode(&mut ba)?.packet_id()
        } else {
            v3::PublishReceivedPacket::decode(&mut ba)?.packet_id()
        };
        match self.inflight_out.get_mut(&packet_id.value()) {
            Some(message) => message.stage = InflightStage::AwaitPublishComplete,
            None => {
                log::warn!(
                    "session: PUBREC for unknown packet id {} on pipe {}",
                    packet_id,
                    self.id
                );
            }
        }
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::PublishReleasePacket::new(packet_id, v5::ReasonCode::Success);
            self.send(&packet).await
        } else {
            self.send(&v3::PublishReleasePacket::new(packet_id)).await
        }
    }

    /// PUBREL for an inbound QoS 2 publish; reply with PUBCOMP.
    async fn on_client_publish_release(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            v5::PublishReleasePacket::decode(&mut ba)?.packet_id()
        } else {
            v3::PublishReleasePacket::decode(&mut ba)?.packet_id()
        };
        self.pub_recv_packets.remove(&packet_id.value());
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::PublishCompletePacket::new(packet_id, v5::ReasonCode::Success);
            self.send(&packet).await
        } else {
            self.send(&v3::PublishCompletePacket::new(packet_id)).await
        }
    }

    /// PUBCOMP closes an outbound QoS 2 delivery.
    fn on_client_publish_complete(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            v5::PublishCompletePacket::decode(&mut ba)?.packet_id()
        } else {
            v3::PublishCompletePacket::decode(&mut ba)?.packet_id()
        };
        if self.inflight_out.remove(&packet_id.value()).is_none() {
            log::warn!(
                "session: PUBCOMP for unknown packet id {} on pipe {}",
                packet_id,
                self.id
            );
        }
        Ok(())
    }

    async fn on_client_subscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = if self.protocol_level == ProtocolLevel::V5 {
            let v5_packet = v5::SubscribePacket::decode(&mut ba)?;
            if v5_packet.properties().user_property_bytes() > self.config.property_size() {
                log::error!(
                    "session: SUBSCRIBE user properties exceed limit of {} bytes",
                    self.config.property_size()
                );
                return self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            }
            let mut topics = Vec::with_capacity(v5_packet.topics().len());
            for topic in v5_packet.topics() {
                topics.push(v3::SubscribeTopic::new(topic.topic(), topic.qos())?);
            }
            v3::SubscribePacket::with_topics(v5_packet.packet_id(), topics)
        } else {
            v3::SubscribePacket::decode(&mut ba)?
        };

        let packet_id = packet.packet_id();
        if let Err(err) = self
            .sender
            .send(SessionToListenerCmd::Subscribe(self.id, packet))
            .await
        {
            log::error!("session: Failed to send subscribe cmd: {err:?}");
            // Report failure for the whole request.
            let ack_packet =
                v3::SubscribeAckPacket::new(packet_id, v3::SubscribeAck::Failed);
            return self.send(&ack_packet).await;
        }
        Ok(())
    }

    async fn on_client_unsubscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = if self.protocol_level == ProtocolLevel::V5 {
            let v5_packet = v5::UnsubscribePacket::decode(&mut ba)?;
            v3::UnsubscribePacket::with_topics(v5_packet.packet_id(), v5_packet.topics().to_vec())
        } else {
            v3::UnsubscribePacket::decode(&mut ba)?
        };

        self.sender
            .send(SessionToListenerCmd::Unsubscribe(self.id, packet))
            .await
            .map_err(Into::into)
    }

    fn on_client_disconnect(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        if self.protocol_level == ProtocolLevel::V5 {
            let _packet = v5::DisconnectPacket::decode(&mut ba)?;
        } else {
            let _packet = v3::DisconnectPacket::decode(&mut ba)?;
        }
        // Receiving DISCONNECT discards the will message [MQTT-3.14.4-3].
        self.clean_exit = true;
        self.status = Status::Disconnected;
        Ok(())
    }
}

/// Strip the 5.0 property section off a publish for internal routing.
fn downgrade_publish(packet: &v5::PublishPacket) -> Result<PublishPacket, Error> {
    let mut v3_packet = PublishPacket::new(packet.topic(), packet.qos(), packet.payload())?;
    v3_packet.set_retain(packet.retain());
    v3_packet.set_packet_id(packet.packet_id());
    Ok(v3_packet)
}
