// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Listener cmd handlers.

use codec::{
    ProtocolLevel,
    v3::{self, ConnectReturnCode, PublishPacket, SubscribeAckPacket},
    v5,
};

use super::{Session, Status};
use crate::commands::ListenerToSessionCmd;
use crate::error::Error;

impl Session {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck {
                return_code,
                session_present,
                inflight,
                pending,
            } => {
                self.on_listener_connect_ack(return_code, session_present, inflight, pending)
                    .await
            }
            ListenerToSessionCmd::Publish(packet) => self.on_listener_publish(packet).await,
            ListenerToSessionCmd::SubscribeAck { packet, retained } => {
                self.on_listener_subscribe_ack(packet, retained).await
            }
            ListenerToSessionCmd::UnsubscribeAck {
                packet,
                reason_codes,
            } => {
                self.on_listener_unsubscribe_ack(packet, reason_codes).await
            }
            ListenerToSessionCmd::Disconnect => self.on_listener_disconnect().await,
        }
    }

    /// Send CONNACK, re-send the deliveries left unacknowledged by the
    /// previous connection, then flush deliveries queued while the client
    /// was offline.
    async fn on_listener_connect_ack(
        &mut self,
        return_code: ConnectReturnCode,
        session_present: bool,
        inflight: Vec<PublishPacket>,
        pending: Vec<PublishPacket>,
    ) -> Result<(), Error> {
        let accepted = return_code == ConnectReturnCode::Accepted;

        if self.protocol_level == ProtocolLevel::V5 {
            let reason_code = match return_code {
                ConnectReturnCode::Accepted => v5::ReasonCode::Success,
                ConnectReturnCode::UnacceptedProtocol => {
                    v5::ReasonCode::UnsupportedProtocolVersion
                }
                ConnectReturnCode::IdentifierRejected => {
                    v5::ReasonCode::ClientIdentifierNotValid
                }
                ConnectReturnCode::ServerUnavailable => v5::ReasonCode::ServerUnavailable,
                ConnectReturnCode::MalformedUsernamePassword => {
                    v5::ReasonCode::BadUserNameOrPassword
                }
                ConnectReturnCode::Unauthorized => v5::ReasonCode::NotAuthorized,
            };
            let ack_packet = v5::ConnectAckPacket::new(session_present, reason_code);
            self.send(&ack_packet).await?;
        } else {
            let ack_packet = v3::ConnectAckPacket::new(session_present, return_code);
            self.send(&ack_packet).await?;
        }

        if accepted {
            self.status = Status::Connected;
            for packet in inflight {
                self.redeliver_publish(packet).await?;
            }
            for packet in pending {
                self.deliver_publish(packet).await?;
            }
        } else {
            // A rejected CONNECT never activates the session; its will
            // message must not fire.
            self.clean_exit = true;
            self.status = Status::Disconnected;
        }
        Ok(())
    }

    async fn on_listener_publish(&mut self, packet: PublishPacket) -> Result<(), Error> {
        if self.status != Status::Connected {
            log::debug!(
                "session: Dropping publish to pipe {} in status {:?}",
                self.id,
                self.status
            );
            return Ok(());
        }
        self.deliver_publish(packet).await
    }

    /// Send SUBACK, then the retained messages matching the fresh
    /// subscriptions, each exactly once [MQTT-3.3.1-6].
    async fn on_listener_subscribe_ack(
        &mut self,
        packet: SubscribeAckPacket,
        retained: Vec<PublishPacket>,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let reason_codes = packet
                .acks()
                .iter()
                .map(|ack| match ack {
                    v3::SubscribeAck::QoS(codec::QoS::AtMostOnce) => v5::ReasonCode::Success,
                    v3::SubscribeAck::QoS(codec::QoS::AtLeastOnce) => v5::ReasonCode::GrantedQoS1,
                    v3::SubscribeAck::QoS(codec::QoS::ExactOnce) => v5::ReasonCode::GrantedQoS2,
                    v3::SubscribeAck::Failed => v5::ReasonCode::UnspecifiedError,
                })
                .collect();
            let ack_packet = v5::SubscribeAckPacket::with_vec(packet.packet_id(), reason_codes);
            self.send(&ack_packet).await?;
        } else {
            self.send(&packet).await?;
        }

        for retained_packet in retained {
            self.deliver_publish(retained_packet).await?;
        }
        Ok(())
    }

    /// Send UNSUBACK; 5.0 carries one reason code per requested filter in
    /// request order [MQTT-3.11.3-1].
    async fn on_listener_unsubscribe_ack(
        &mut self,
        packet: v3::UnsubscribeAckPacket,
        reason_codes: Vec<v5::ReasonCode>,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let ack_packet =
                v5::UnsubscribeAckPacket::with_vec(packet.packet_id(), reason_codes);
            self.send(&ack_packet).await
        } else {
            self.send(&packet).await
        }
    }

    /// Server-side eviction after a client id takeover.
    async fn on_listener_disconnect(&mut self) -> Result<(), Error> {
        log::info!("session: Evicted by listener, pipe {}", self.id);
        self.clean_exit = true;
        self.close_with_reason(v5::ReasonCode::SessionTakenOver).await
    }
}
