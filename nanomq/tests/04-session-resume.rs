// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::{ConnectReturnCode, PublishAckPacket, PublishPacket};
use codec::{ByteArray, DecodePacket, QoS};

mod common;
use common::{connect_packet, settle, start_broker, TestClient};

#[tokio::test]
async fn test_clean_start_false_resumption() {
    const PORT: u16 = 18861;
    start_broker(PORT).await;

    // X subscribes with clean-start=false, then leaves.
    let (mut x_client, ack) =
        TestClient::connect_with(PORT, &connect_packet("x1", false)).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
    assert!(!ack.session_present());
    x_client.subscribe("alerts/#", QoS::AtLeastOnce, 1).await;
    x_client.disconnect().await;

    // Publish while X is offline.
    let mut publisher = TestClient::connect(PORT, "resume-pub", true).await;
    publisher
        .publish("alerts/fire", QoS::AtLeastOnce, b"P", false)
        .await;
    settle().await;

    // X returns with the same id and clean-start=false: no re-subscribe
    // needed, the queued delivery arrives after the CONNACK.
    let (mut x_client, ack) =
        TestClient::connect_with(PORT, &connect_packet("x1", false)).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
    assert!(ack.session_present());

    let packet = x_client.expect_publish().await;
    assert_eq!(packet.topic(), "alerts/fire");
    assert_eq!(packet.payload(), b"P");
    assert_eq!(packet.qos(), QoS::AtLeastOnce);

    // The live subscription was restored too.
    publisher
        .publish("alerts/smoke", QoS::AtLeastOnce, b"Q", false)
        .await;
    let packet = x_client.expect_publish().await;
    assert_eq!(packet.topic(), "alerts/smoke");
}

#[tokio::test]
async fn test_clean_start_true_discards_session() {
    const PORT: u16 = 18862;
    start_broker(PORT).await;

    let (mut x_client, _ack) =
        TestClient::connect_with(PORT, &connect_packet("x2", false)).await;
    x_client.subscribe("alerts/#", QoS::AtLeastOnce, 1).await;
    x_client.disconnect().await;

    let mut publisher = TestClient::connect(PORT, "discard-pub", true).await;
    publisher
        .publish("alerts/fire", QoS::AtLeastOnce, b"P", false)
        .await;
    settle().await;

    // Reconnecting with clean-start=true starts from scratch.
    let (mut x_client, ack) =
        TestClient::connect_with(PORT, &connect_packet("x2", true)).await;
    assert!(!ack.session_present());
    x_client.expect_silence().await;
}

#[tokio::test]
async fn test_qos0_not_queued_offline() {
    const PORT: u16 = 18863;
    start_broker(PORT).await;

    let (mut x_client, _ack) =
        TestClient::connect_with(PORT, &connect_packet("x3", false)).await;
    x_client.subscribe("alerts/#", QoS::AtLeastOnce, 1).await;
    x_client.disconnect().await;

    let mut publisher = TestClient::connect(PORT, "qos0-pub", true).await;
    publisher
        .publish("alerts/fire", QoS::AtMostOnce, b"P", false)
        .await;
    settle().await;

    let (mut x_client, ack) =
        TestClient::connect_with(PORT, &connect_packet("x3", false)).await;
    assert!(ack.session_present());
    x_client.expect_silence().await;
}

#[tokio::test]
async fn test_unacked_delivery_resent_with_original_packet_id() {
    const PORT: u16 = 18865;
    start_broker(PORT).await;

    let (mut x_client, _ack) =
        TestClient::connect_with(PORT, &connect_packet("x4", false)).await;
    x_client.subscribe("alerts/#", QoS::AtLeastOnce, 1).await;

    let mut publisher = TestClient::connect(PORT, "inflight-pub", true).await;
    publisher
        .publish("alerts/fire", QoS::AtLeastOnce, b"P", false)
        .await;

    // Receive the delivery but never acknowledge it, then sever the
    // connection.
    let bytes = x_client.read_packet().await;
    let mut ba = ByteArray::new(&bytes);
    let delivery = PublishPacket::decode(&mut ba).unwrap();
    assert_eq!(delivery.qos(), QoS::AtLeastOnce);
    assert!(!delivery.dup());
    let original_id = delivery.packet_id();
    drop(x_client);
    settle().await;

    // The unacknowledged delivery comes back under its original packet id
    // with the dup flag set.
    let (mut x_client, ack) =
        TestClient::connect_with(PORT, &connect_packet("x4", false)).await;
    assert!(ack.session_present());

    let bytes = x_client.read_packet().await;
    let mut ba = ByteArray::new(&bytes);
    let resent = PublishPacket::decode(&mut ba).unwrap();
    assert_eq!(resent.topic(), "alerts/fire");
    assert_eq!(resent.payload(), b"P");
    assert_eq!(resent.packet_id(), original_id);
    assert!(resent.dup());

    x_client.send(&PublishAckPacket::new(original_id)).await;
    x_client.expect_silence().await;
}

#[tokio::test]
async fn test_client_id_takeover() {
    const PORT: u16 = 18864;
    start_broker(PORT).await;

    let mut first = TestClient::connect(PORT, "shared-id", true).await;
    first.subscribe("topic/a", QoS::AtMostOnce, 1).await;

    // Second connection with the same client id evicts the first pipe.
    let mut second = TestClient::connect(PORT, "shared-id", true).await;
    second.subscribe("topic/a", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::connect(PORT, "takeover-pub", true).await;
    publisher
        .publish("topic/a", QoS::AtMostOnce, b"data", false)
        .await;

    let packet = second.expect_publish().await;
    assert_eq!(packet.payload(), b"data");
}
