// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The outbound MQTT client driving the upstream connection.
//!
//! Same protocol state machine as a local session, running against a
//! connected socket instead of an accepted one.

use codec::{
    utils::random_client_id, ByteArray, DecodePacket, EncodePacket, FixedHeader, PacketId,
    PacketType, ProtocolLevel, QoS,
    v3::{self, PublishPacket},
    v5,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{BridgeToDispatcherCmd, DispatcherToBridgeCmd};
use crate::config::{BridgeConfig, ListenerUrl};
use crate::error::{Error, ErrorKind};

pub struct BridgeClient {
    config: BridgeConfig,
    stream: TcpStream,
    next_packet_id: u16,
    dispatcher_sender: Sender<BridgeToDispatcherCmd>,
}

impl BridgeClient {
    /// Connect upstream, wait for CONNACK and open the configured
    /// upstream subscriptions.
    pub async fn connect(
        config: BridgeConfig,
        dispatcher_sender: Sender<BridgeToDispatcherCmd>,
    ) -> Result<Self, Error> {
        let url = ListenerUrl::parse(config.address())?;
        let stream = TcpStream::connect(url.address()).await?;
        let mut client = Self {
            config,
            stream,
            next_packet_id: 1,
            dispatcher_sender,
        };

        client.send_connect().await?;
        client.wait_connect_ack().await?;
        client.send_subscriptions().await?;
        log::info!("bridge: Connected to {}", client.config.address());
        Ok(client)
    }

    async fn send_connect(&mut self) -> Result<(), Error> {
        let client_id = self
            .config
            .clientid()
            .map_or_else(random_client_id, ToString::to_string);
        let mut buf = Vec::new();
        if self.config.proto_ver() == ProtocolLevel::V5 {
            let mut packet = v5::ConnectPacket::new(&client_id);
            packet.set_keep_alive(self.config.keepalive());
            packet
                .connect_flags_mut()
                .set_clean_session(self.config.clean_start());
            if !self.config.username().is_empty() {
                packet.set_username(self.config.username());
                packet.set_password(self.config.password().as_bytes());
            }
            packet.encode(&mut buf)?;
        } else {
            let mut packet = v3::ConnectPacket::new(&client_id);
            packet.set_keep_alive(self.config.keepalive());
            packet
                .connect_flags_mut()
                .set_clean_session(self.config.clean_start());
            if !self.config.username().is_empty() {
                packet.set_username(self.config.username());
                packet.set_password(self.config.password().as_bytes());
            }
            packet.encode(&mut buf)?;
        }
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn wait_connect_ack(&mut self) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(64);
        let packet_bytes = loop {
            if let Some(packet_bytes) = split_packet(&mut buf)? {
                break packet_bytes;
            }
            let n_recv = self.stream.read_buf(&mut buf).await?;
            if n_recv == 0 {
                return Err(Error::new(
                    ErrorKind::SocketError,
                    "bridge: Connection closed before CONNACK",
                ));
            }
        };

        let mut ba = ByteArray::new(&packet_bytes);
        let accepted = if self.config.proto_ver() == ProtocolLevel::V5 {
            let ack = v5::ConnectAckPacket::decode(&mut ba)?;
            !ack.reason_code().is_error()
        } else {
            let ack = v3::ConnectAckPacket::decode(&mut ba)?;
            ack.return_code() == v3::ConnectReturnCode::Accepted
        };
        if accepted {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::SocketError,
                "bridge: Upstream rejected the connection",
            ))
        }
    }

    async fn send_subscriptions(&mut self) -> Result<(), Error> {
        for subscription in self.config.subscriptions().to_vec() {
            let packet_id = self.next_packet_id();
            let mut buf = Vec::new();
            if self.config.proto_ver() == ProtocolLevel::V5 {
                let packet =
                    v5::SubscribePacket::new(subscription.topic(), subscription.qos(), packet_id)?;
                packet.encode(&mut buf)?;
            } else {
                let packet =
                    v3::SubscribePacket::new(subscription.topic(), subscription.qos(), packet_id)?;
                packet.encode(&mut buf)?;
            }
            self.stream.write_all(&buf).await?;
        }
        Ok(())
    }

    fn next_packet_id(&mut self) -> PacketId {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        PacketId::new(id)
    }

    /// Drive the upstream connection until it fails.
    pub async fn run_loop(
        mut self,
        dispatcher_receiver: &mut Receiver<DispatcherToBridgeCmd>,
    ) {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        let keepalive = u64::from(self.config.keepalive().max(1));
        let mut ping_tick = tokio::time::interval(Duration::from_secs(keepalive));
        ping_tick.tick().await;

        loop {
            tokio::select! {
                read_result = self.stream.read_buf(&mut buf) => {
                    match read_result {
                        Ok(0) => {
                            log::error!("bridge: Upstream closed the connection");
                            return;
                        }
                        Ok(_n_recv) => {
                            if let Err(err) = self.consume_buffer(&mut buf).await {
                                log::error!("bridge: Failed to handle upstream packet: {err:?}");
                                return;
                            }
                        }
                        Err(err) => {
                            log::error!("bridge: Upstream socket error: {err:?}");
                            return;
                        }
                    }
                }

                Some(cmd) = dispatcher_receiver.recv() => {
                    let DispatcherToBridgeCmd::Forward(packet) = cmd;
                    if let Err(err) = self.forward_publish(packet).await {
                        log::error!("bridge: Failed to forward publish: {err:?}");
                        return;
                    }
                }

                _ = ping_tick.tick() => {
                    if let Err(err) = self.send_ping().await {
                        log::error!("bridge: Failed to send ping: {err:?}");
                        return;
                    }
                }
            }
        }
    }

    async fn consume_buffer(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        while let Some(packet_bytes) = split_packet(buf)? {
            self.handle_upstream_packet(&packet_bytes).await?;
        }
        Ok(())
    }

    async fn handle_upstream_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let fixed_header = FixedHeader::decode(&mut ba)?;
        match fixed_header.packet_type() {
            PacketType::Publish { .. } => self.on_upstream_publish(buf).await,
            PacketType::PublishRelease => {
                let mut ba = ByteArray::new(buf);
                let packet_id = if self.config.proto_ver() == ProtocolLevel::V5 {
                    v5::PublishReleasePacket::decode(&mut ba)?.packet_id()
                } else {
                    v3::PublishReleasePacket::decode(&mut ba)?.packet_id()
                };
                self.write_packet(&v3::PublishCompletePacket::new(packet_id))
                    .await
            }
            PacketType::PublishReceived => {
                let mut ba = ByteArray::new(buf);
                let packet_id = if self.config.proto_ver() == ProtocolLevel::V5 {
                    v5::PublishReceivedPacket::decode(&mut ba)?.packet_id()
                } else {
                    v3::PublishReceivedPacket::decode(&mut ba)?.packet_id()
                };
                self.write_packet(&v3::PublishReleasePacket::new(packet_id))
                    .await
            }
            PacketType::PublishAck
            | PacketType::PublishComplete
            | PacketType::SubscribeAck
            | PacketType::PingResponse => Ok(()),
            t => {
                log::warn!("bridge: Unhandled upstream packet type: {t:?}");
                Ok(())
            }
        }
    }

    /// Inject an upstream message into the local broker.
    async fn on_upstream_publish(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = if self.config.proto_ver() == ProtocolLevel::V5 {
            let v5_packet = v5::PublishPacket::decode(&mut ba)?;
            let mut packet =
                PublishPacket::new(v5_packet.topic(), v5_packet.qos(), v5_packet.payload())?;
            packet.set_retain(v5_packet.retain());
            packet.set_packet_id(v5_packet.packet_id());
            packet
        } else {
            PublishPacket::decode(&mut ba)?
        };

        match packet.qos() {
            QoS::AtMostOnce => (),
            QoS::AtLeastOnce => {
                self.write_packet(&v3::PublishAckPacket::new(packet.packet_id()))
                    .await?;
            }
            QoS::ExactOnce => {
                self.write_packet(&v3::PublishReceivedPacket::new(packet.packet_id()))
                    .await?;
            }
        }

        self.dispatcher_sender
            .send(BridgeToDispatcherCmd::Publish(packet))
            .await
            .map_err(Into::into)
    }

    /// Duplicate a locally routed publish upstream, payload/qos/retain
    /// preserved.
    async fn forward_publish(&mut self, mut packet: PublishPacket) -> Result<(), Error> {
        if packet.qos() != QoS::AtMostOnce {
            let packet_id = self.next_packet_id();
            packet.set_packet_id(packet_id);
        }
        let mut buf = Vec::new();
        if self.config.proto_ver() == ProtocolLevel::V5 {
            let mut v5_packet =
                v5::PublishPacket::new(packet.topic(), packet.qos(), packet.payload())?;
            v5_packet.set_retain(packet.retain());
            v5_packet.set_packet_id(packet.packet_id());
            v5_packet.encode(&mut buf)?;
        } else {
            packet.encode(&mut buf)?;
        }
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), Error> {
        self.write_packet(&v3::PingRequestPacket::new()).await
    }

    async fn write_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }
}

/// Take one complete control packet off the front of `buf`, if present.
fn split_packet(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
    let mut ba = ByteArray::new(buf);
    let Ok(fixed_header) = FixedHeader::decode(&mut ba) else {
        if buf.len() > 5 {
            return Err(Error::new(ErrorKind::DecodeError, "Invalid fixed header"));
        }
        return Ok(None);
    };
    let packet_len = fixed_header.bytes() + fixed_header.remaining_length();
    if buf.len() < packet_len {
        return Ok(None);
    }
    Ok(Some(buf.drain(..packet_len).collect()))
}
