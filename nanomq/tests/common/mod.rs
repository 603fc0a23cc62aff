// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Shared helpers: an in-process broker and a minimal test client
//! speaking the codec directly over TCP.

#![allow(dead_code)]

use codec::{
    ByteArray, DecodePacket, EncodePacket, FixedHeader, PacketId, QoS,
    v3::{
        ConnectAckPacket, ConnectPacket, ConnectReturnCode, DisconnectPacket, PublishAckPacket,
        PublishCompletePacket, PublishPacket, PublishReceivedPacket, PublishReleasePacket,
        SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
    },
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use nanomq::config::Config;
use nanomq::server::ServerContext;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a whole broker on `port`, tasks spawned onto the test runtime.
pub async fn start_broker(port: u16) {
    let mut config = Config::default();
    config.set_url(&format!("broker+tcp://127.0.0.1:{port}"));
    start_broker_with(config).await;
}

pub async fn start_broker_with(config: Config) {
    let mut context = ServerContext::new(config);
    context
        .init_modules()
        .await
        .expect("Failed to init broker modules");
}

/// A test client driving raw control packets over one TCP connection.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    /// Open a socket and run the CONNECT handshake.
    pub async fn connect(port: u16, client_id: &str, clean_session: bool) -> Self {
        let packet = connect_packet(client_id, clean_session);
        let (client, ack) = Self::connect_with(port, &packet).await;
        assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
        client
    }

    pub async fn connect_with(port: u16, packet: &ConnectPacket) -> (Self, ConnectAckPacket) {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("Failed to connect to broker");
        let mut client = Self {
            stream,
            buf: Vec::with_capacity(1024),
        };
        client.send(packet).await;
        let ack: ConnectAckPacket = client.read_expected().await;
        (client, ack)
    }

    pub async fn send<P: EncodePacket>(&mut self, packet: &P) {
        let mut buf = Vec::new();
        packet.encode(&mut buf).expect("Failed to encode packet");
        self.stream
            .write_all(&buf)
            .await
            .expect("Failed to write packet");
    }

    /// Read one complete control packet, raw.
    pub async fn read_packet(&mut self) -> Vec<u8> {
        loop {
            if let Some(packet) = self.split_packet() {
                return packet;
            }
            let n_recv = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("Timed out waiting for packet")
                .expect("Socket error while reading");
            assert!(n_recv > 0, "Broker closed the connection");
        }
    }

    fn split_packet(&mut self) -> Option<Vec<u8>> {
        let mut ba = ByteArray::new(&self.buf);
        let fixed_header = FixedHeader::decode(&mut ba).ok()?;
        let packet_len = fixed_header.bytes() + fixed_header.remaining_length();
        if self.buf.len() < packet_len {
            return None;
        }
        Some(self.buf.drain(..packet_len).collect())
    }

    /// Read one packet and decode it as `P`.
    pub async fn read_expected<P: DecodePacket + std::fmt::Debug>(&mut self) -> P {
        let bytes = self.read_packet().await;
        let mut ba = ByteArray::new(&bytes);
        P::decode(&mut ba).expect("Unexpected packet on the wire")
    }

    /// Expect no packet to arrive within a short window.
    pub async fn expect_silence(&mut self) {
        if self.split_packet().is_some() {
            panic!("Expected silence, got a packet");
        }
        let result = timeout(Duration::from_millis(500), self.stream.read_buf(&mut self.buf)).await;
        assert!(result.is_err(), "Expected silence, got bytes");
    }

    /// Subscribe and wait for the SUBACK.
    pub async fn subscribe(&mut self, filter: &str, qos: QoS, packet_id: u16) -> SubscribeAckPacket {
        let packet = SubscribePacket::new(filter, qos, PacketId::new(packet_id))
            .expect("Invalid topic filter");
        self.send(&packet).await;
        let ack: SubscribeAckPacket = self.read_expected().await;
        assert_eq!(ack.packet_id(), PacketId::new(packet_id));
        ack
    }

    /// Unsubscribe and wait for the UNSUBACK.
    pub async fn unsubscribe(&mut self, filter: &str, packet_id: u16) {
        let packet =
            UnsubscribePacket::new(filter, PacketId::new(packet_id)).expect("Invalid filter");
        self.send(&packet).await;
        let ack: UnsubscribeAckPacket = self.read_expected().await;
        assert_eq!(ack.packet_id(), PacketId::new(packet_id));
    }

    /// Publish with the full acknowledgement handshake of the QoS level.
    pub async fn publish(&mut self, topic: &str, qos: QoS, payload: &[u8], retain: bool) {
        let mut packet = PublishPacket::new(topic, qos, payload).expect("Invalid topic");
        packet.set_retain(retain);
        match qos {
            QoS::AtMostOnce => self.send(&packet).await,
            QoS::AtLeastOnce => {
                packet.set_packet_id(PacketId::new(11));
                self.send(&packet).await;
                let ack: PublishAckPacket = self.read_expected().await;
                assert_eq!(ack.packet_id(), PacketId::new(11));
            }
            QoS::ExactOnce => {
                packet.set_packet_id(PacketId::new(12));
                self.send(&packet).await;
                let rec: PublishReceivedPacket = self.read_expected().await;
                assert_eq!(rec.packet_id(), PacketId::new(12));
                self.send(&PublishReleasePacket::new(PacketId::new(12))).await;
                let comp: PublishCompletePacket = self.read_expected().await;
                assert_eq!(comp.packet_id(), PacketId::new(12));
            }
        }
    }

    /// Read packets until a PUBLISH arrives, acknowledging QoS 1
    /// deliveries on the way out.
    pub async fn expect_publish(&mut self) -> PublishPacket {
        let bytes = self.read_packet().await;
        let mut ba = ByteArray::new(&bytes);
        let packet = PublishPacket::decode(&mut ba).expect("Expected a publish packet");
        if packet.qos() == QoS::AtLeastOnce {
            self.send(&PublishAckPacket::new(packet.packet_id())).await;
        }
        packet
    }

    /// Orderly shutdown with a DISCONNECT packet.
    pub async fn disconnect(mut self) {
        self.send(&DisconnectPacket::new()).await;
        // Give the broker a moment to process before the socket drops.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn connect_packet(client_id: &str, clean_session: bool) -> ConnectPacket {
    let mut packet = ConnectPacket::new(client_id);
    packet.connect_flags_mut().set_clean_session(clean_session);
    packet
}

/// Let in-flight broker routing settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
