// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::{
    PingRequestPacket, PingResponsePacket, PublishAckPacket, PublishCompletePacket,
    PublishPacket, PublishReceivedPacket, PublishReleasePacket,
};
use codec::{ByteArray, DecodePacket, PacketId, QoS};

mod common;
use common::{start_broker, TestClient};

#[tokio::test]
async fn test_ping() {
    const PORT: u16 = 18881;
    start_broker(PORT).await;

    let mut client = TestClient::connect(PORT, "ping-client", true).await;
    client.send(&PingRequestPacket::new()).await;
    let _pong: PingResponsePacket = client.read_expected().await;
}

#[tokio::test]
async fn test_qos1_inbound_handshake() {
    const PORT: u16 = 18882;
    start_broker(PORT).await;

    let mut client = TestClient::connect(PORT, "qos1-client", true).await;
    let mut packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"data").unwrap();
    packet.set_packet_id(PacketId::new(77));
    client.send(&packet).await;

    let ack: PublishAckPacket = client.read_expected().await;
    assert_eq!(ack.packet_id(), PacketId::new(77));
}

#[tokio::test]
async fn test_qos2_inbound_handshake() {
    const PORT: u16 = 18883;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "qos2-sub", true).await;
    subscriber.subscribe("exact/topic", QoS::AtMostOnce, 1).await;

    let mut client = TestClient::connect(PORT, "qos2-client", true).await;
    let mut packet = PublishPacket::new("exact/topic", QoS::ExactOnce, b"once").unwrap();
    packet.set_packet_id(PacketId::new(5));
    client.send(&packet).await;

    let rec: PublishReceivedPacket = client.read_expected().await;
    assert_eq!(rec.packet_id(), PacketId::new(5));

    // A resent copy with the dup flag must not be routed again.
    let mut dup_packet = PublishPacket::new("exact/topic", QoS::ExactOnce, b"once").unwrap();
    dup_packet.set_packet_id(PacketId::new(5));
    dup_packet.set_dup(true).unwrap();
    client.send(&dup_packet).await;
    let _rec: PublishReceivedPacket = client.read_expected().await;

    client.send(&PublishReleasePacket::new(PacketId::new(5))).await;
    let comp: PublishCompletePacket = client.read_expected().await;
    assert_eq!(comp.packet_id(), PacketId::new(5));

    // The subscriber saw the message exactly once.
    let delivery = subscriber.expect_publish().await;
    assert_eq!(delivery.payload(), b"once");
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_qos2_outbound_handshake() {
    const PORT: u16 = 18884;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "qos2-out-sub", true).await;
    subscriber.subscribe("exact/out", QoS::ExactOnce, 1).await;

    let mut publisher = TestClient::connect(PORT, "qos2-out-pub", true).await;
    publisher
        .publish("exact/out", QoS::ExactOnce, b"payload", false)
        .await;

    // Broker delivers at qos 2; run the receiver side of the handshake.
    let bytes = subscriber.read_packet().await;
    let mut ba = ByteArray::new(&bytes);
    let delivery = PublishPacket::decode(&mut ba).unwrap();
    assert_eq!(delivery.qos(), QoS::ExactOnce);
    assert_eq!(delivery.payload(), b"payload");

    subscriber
        .send(&PublishReceivedPacket::new(delivery.packet_id()))
        .await;
    let rel: PublishReleasePacket = subscriber.read_expected().await;
    assert_eq!(rel.packet_id(), delivery.packet_id());
    subscriber
        .send(&PublishCompletePacket::new(delivery.packet_id()))
        .await;
}
