// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-connection protocol state machine.
//!
//! One session task owns one accepted socket. All packets from that pipe
//! are processed in wire order inside `run_loop`, and all outbound packets
//! are written by the same task, which gives the per-pipe ordering
//! guarantees without any locking.

use codec::{
    ByteArray, DecodePacket, EncodePacket, FixedHeader, ProtocolLevel, QoS,
    v3::{self, PublishPacket},
    v5,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::sleep;

use crate::commands::{ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::types::PipeId;

mod client;
mod config;
mod cparam;
mod listener;

pub use config::SessionConfig;
pub use cparam::{ConnectParam, WillMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Invalid,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Delivery stage of an unacknowledged outbound publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InflightStage {
    /// QoS 1, waiting for PUBACK.
    AwaitPublishAck,

    /// QoS 2, waiting for PUBREC.
    AwaitPublishReceived,

    /// QoS 2, PUBREL sent, waiting for PUBCOMP.
    AwaitPublishComplete,
}

#[derive(Debug, Clone)]
struct InflightMessage {
    packet: PublishPacket,
    stage: InflightStage,
}

/// A client connection and all of its protocol state.
#[derive(Debug)]
pub struct Session {
    id: PipeId,
    config: SessionConfig,
    stream: Stream,

    status: Status,
    protocol_level: ProtocolLevel,
    cparam: Option<Arc<ConnectParam>>,

    /// True once the client sent DISCONNECT or the broker evicted the
    /// session deliberately; suppresses the will message.
    clean_exit: bool,

    /// Last wire activity, drives the keepalive deadline.
    instant: Instant,

    next_packet_id: u16,

    /// Outbound QoS > 0 deliveries awaiting acknowledgement,
    /// keyed by packet id.
    inflight_out: HashMap<u16, InflightMessage>,

    /// Inbound QoS 2 publishes seen but not yet released, for
    /// exactly-once dedup.
    pub_recv_packets: HashSet<u16>,

    sender: Sender<SessionToListenerCmd>,
    receiver: Receiver<ListenerToSessionCmd>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: PipeId,
        config: SessionConfig,
        stream: Stream,
        sender: Sender<SessionToListenerCmd>,
        receiver: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        Self {
            id,
            config,
            stream,

            status: Status::Invalid,
            protocol_level: ProtocolLevel::V311,
            cparam: None,
            clean_exit: false,

            instant: Instant::now(),

            next_packet_id: 1,
            inflight_out: HashMap::new(),
            pub_recv_packets: HashSet::new(),

            sender,
            receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        let connect_deadline = Instant::now();
        let mut resend_tick =
            tokio::time::interval(Duration::from_secs(self.config.qos_duration().max(1)));
        // First tick fires immediately; consume it.
        resend_tick.tick().await;

        loop {
            if self.status == Status::Disconnected {
                break;
            }
            let idle_remaining = self.idle_remaining(connect_deadline);

            tokio::select! {
                read_result = self.stream.read_buf(&mut buf) => {
                    match read_result {
                        Ok(0) => {
                            log::info!("session: Socket closed by peer, pipe {}", self.id);
                            break;
                        }
                        Ok(_n_recv) => {
                            if let Err(err) = self.consume_buffer(&mut buf).await {
                                log::error!(
                                    "session: Failed to handle packet on pipe {}: {err:?}",
                                    self.id
                                );
                                break;
                            }
                        }
                        Err(err) => {
                            log::info!("session: Socket error on pipe {}: {err:?}", self.id);
                            break;
                        }
                    }
                }

                Some(cmd) = self.receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("session: Failed to handle listener cmd on pipe {}: {err:?}", self.id);
                    }
                }

                _ = resend_tick.tick() => {
                    if let Err(err) = self.resend_inflight().await {
                        log::error!("session: Failed to resend on pipe {}: {err:?}", self.id);
                        break;
                    }
                }

                () = sleep(idle_remaining) => {
                    if self.status == Status::Invalid {
                        log::warn!("session: No CONNECT within timeout, pipe {}", self.id);
                    } else {
                        log::warn!("session: Keepalive expired, pipe {}", self.id);
                    }
                    break;
                }
            }
        }

        self.finish().await;
    }

    /// Seconds until the idle deadline fires.
    ///
    /// Before CONNECT the connect timeout applies; afterwards the
    /// 1.5x-keepalive deadline, or effectively never when keepalive is
    /// disabled.
    fn idle_remaining(&self, connect_deadline: Instant) -> Duration {
        const FOREVER: Duration = Duration::from_secs(3600 * 24 * 365);
        let (start, limit) = if self.status == Status::Invalid {
            (connect_deadline, self.config.connect_timeout())
        } else {
            (self.instant, self.config.keep_alive())
        };
        if limit == 0 {
            return FOREVER;
        }
        Duration::from_secs(limit).saturating_sub(start.elapsed())
    }

    /// Split complete packets out of the receive buffer. Partial packets
    /// stay buffered until more bytes arrive.
    async fn consume_buffer(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        loop {
            if self.status == Status::Disconnected {
                buf.clear();
                return Ok(());
            }
            let mut ba = ByteArray::new(buf);
            let Ok(fixed_header) = FixedHeader::decode(&mut ba) else {
                if buf.len() > 5 {
                    // 5 bytes always hold a full fixed header; anything
                    // undecodable beyond that is garbage.
                    return Err(Error::new(ErrorKind::DecodeError, "Invalid fixed header"));
                }
                return Ok(());
            };
            let packet_len = fixed_header.bytes() + fixed_header.remaining_length();
            if buf.len() < packet_len {
                return Ok(());
            }

            let packet_bytes: Vec<u8> = buf.drain(..packet_len).collect();
            self.reset_instant();
            self.handle_client_packet(&packet_bytes).await?;
        }
    }

    /// Reset idle timer after wire activity.
    fn reset_instant(&mut self) {
        self.instant = Instant::now();
    }

    /// Allocate the next non-zero packet id not already in flight.
    fn next_packet_id(&mut self) -> u16 {
        loop {
            let id = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            if id != 0 && !self.inflight_out.contains_key(&id) {
                return id;
            }
        }
    }

    async fn send<P: EncodePacket>(&mut self, packet: &P) -> Result<(), Error> {
        if self.status == Status::Disconnected {
            return Err(Error::new(
                ErrorKind::SendError,
                "session: Cannot send packet after disconnect",
            ));
        }
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write(&buf).await?;
        self.reset_instant();
        Ok(())
    }

    /// Deliver one publish to this client, with QoS bookkeeping.
    ///
    /// The packet QoS is already degraded by the dispatcher; this method
    /// assigns a fresh packet id for QoS > 0 and tracks the delivery until
    /// acknowledged.
    pub(crate) async fn deliver_publish(&mut self, mut packet: PublishPacket) -> Result<(), Error> {
        if packet.qos() != QoS::AtMostOnce {
            let packet_id = self.next_packet_id();
            packet.set_packet_id(codec::PacketId::new(packet_id));
            let stage = if packet.qos() == QoS::AtLeastOnce {
                InflightStage::AwaitPublishAck
            } else {
                InflightStage::AwaitPublishReceived
            };
            self.inflight_out.insert(
                packet_id,
                InflightMessage {
                    packet: packet.clone(),
                    stage,
                },
            );
        }
        self.send_publish(&packet).await
    }

    /// Re-send a delivery that was in flight when the previous connection
    /// of this client died. The original packet id is kept and the dup
    /// flag set [MQTT-4.4.0-1]; `next_packet_id` skips ids held here.
    pub(crate) async fn redeliver_publish(&mut self, packet: PublishPacket) -> Result<(), Error> {
        if packet.qos() == QoS::AtMostOnce {
            log::error!(
                "session: QoS 0 packet in resumed inflight queue, pipe {}",
                self.id
            );
            return self.send_publish(&packet).await;
        }
        let stage = if packet.qos() == QoS::AtLeastOnce {
            InflightStage::AwaitPublishAck
        } else {
            InflightStage::AwaitPublishReceived
        };
        self.inflight_out.insert(
            packet.packet_id().value(),
            InflightMessage {
                packet: packet.clone(),
                stage,
            },
        );

        let mut dup_packet = packet;
        let _ret = dup_packet.set_dup(true);
        self.send_publish(&dup_packet).await
    }

    /// Encode a publish for the client protocol version and write it.
    async fn send_publish(&mut self, packet: &PublishPacket) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let mut v5_packet =
                v5::PublishPacket::new(packet.topic(), packet.qos(), packet.payload())?;
            v5_packet.set_packet_id(packet.packet_id());
            v5_packet.set_retain(packet.retain());
            let _ret = v5_packet.set_dup(packet.dup());
            self.send(&v5_packet).await
        } else {
            self.send(packet).await
        }
    }

    /// Retransmit unacknowledged deliveries, dup flag set [MQTT-4.4.0-1].
    async fn resend_inflight(&mut self) -> Result<(), Error> {
        if self.status != Status::Connected {
            return Ok(());
        }
        let mut messages: Vec<InflightMessage> = self.inflight_out.values().cloned().collect();
        messages.sort_by_key(|m| m.packet.packet_id());
        for message in messages {
            match message.stage {
                InflightStage::AwaitPublishAck | InflightStage::AwaitPublishReceived => {
                    let mut packet = message.packet;
                    let _ret = packet.set_dup(true);
                    self.send_publish(&packet).await?;
                }
                InflightStage::AwaitPublishComplete => {
                    let packet = v3::PublishReleasePacket::new(message.packet.packet_id());
                    self.send(&packet).await?;
                }
            }
        }
        Ok(())
    }

    /// Send DISCONNECT to a 5.0 client and mark the session closed. 3.1.1
    /// has no server-to-client DISCONNECT; the socket is simply dropped.
    async fn close_with_reason(&mut self, reason_code: v5::ReasonCode) -> Result<(), Error> {
        self.status = Status::Disconnecting;
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::DisconnectPacket::new(reason_code);
            if let Err(err) = self.send(&packet).await {
                log::error!("session: Failed to send disconnect packet: {err:?}");
            }
        }
        self.status = Status::Disconnected;
        Ok(())
    }

    /// Report the end of this connection to the listener.
    async fn finish(&mut self) {
        let inflight: Vec<PublishPacket> = {
            let mut messages: Vec<&InflightMessage> = self
                .inflight_out
                .values()
                .filter(|m| m.stage != InflightStage::AwaitPublishComplete)
                .collect();
            messages.sort_by_key(|m| m.packet.packet_id());
            messages.iter().map(|m| m.packet.clone()).collect()
        };

        let cmd = SessionToListenerCmd::Disconnect {
            pipe_id: self.id,
            cparam: self.cparam.clone(),
            clean: self.clean_exit,
            inflight,
        };
        if let Err(err) = self.sender.send(cmd).await {
            log::error!(
                "session: Failed to send disconnect cmd, pipe {}, err: {err:?}",
                self.id
            );
        }
    }
}
