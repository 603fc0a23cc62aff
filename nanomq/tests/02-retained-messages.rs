// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::QoS;

mod common;
use common::{settle, start_broker, TestClient};

#[tokio::test]
async fn test_retain_then_late_subscribe() {
    const PORT: u16 = 18841;
    start_broker(PORT).await;

    let mut publisher = TestClient::connect(PORT, "retain-pub", true).await;
    publisher
        .publish("status/device7", QoS::AtLeastOnce, b"online", true)
        .await;
    settle().await;

    let mut subscriber = TestClient::connect(PORT, "retain-sub", true).await;
    subscriber.subscribe("status/#", QoS::ExactOnce, 1).await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "status/device7");
    assert_eq!(packet.payload(), b"online");
    // Stored at qos 1, granted qos 2: delivered at the weaker level.
    assert_eq!(packet.qos(), QoS::AtLeastOnce);
    assert!(packet.retain());

    // Exactly once, even though the filter keeps matching.
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_retain_delivered_once_for_overlapping_filters() {
    const PORT: u16 = 18842;
    start_broker(PORT).await;

    let mut publisher = TestClient::connect(PORT, "overlap-pub", true).await;
    publisher
        .publish("status/device7", QoS::AtMostOnce, b"online", true)
        .await;
    settle().await;

    let mut subscriber = TestClient::connect(PORT, "overlap-sub", true).await;
    let packet = codec::v3::SubscribePacket::with_topics(
        codec::PacketId::new(1),
        vec![
            codec::v3::SubscribeTopic::new("status/#", QoS::AtMostOnce).unwrap(),
            codec::v3::SubscribeTopic::new("status/device7", QoS::AtMostOnce).unwrap(),
        ],
    );
    subscriber.send(&packet).await;
    let _ack: codec::v3::SubscribeAckPacket = subscriber.read_expected().await;

    let publish = subscriber.expect_publish().await;
    assert_eq!(publish.payload(), b"online");
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_retain_tombstone() {
    const PORT: u16 = 18843;
    start_broker(PORT).await;

    let mut publisher = TestClient::connect(PORT, "tomb-pub", true).await;
    publisher
        .publish("status/device7", QoS::AtLeastOnce, b"online", true)
        .await;
    // An empty retained payload removes the stored message.
    publisher
        .publish("status/device7", QoS::AtLeastOnce, b"", true)
        .await;
    settle().await;

    let mut subscriber = TestClient::connect(PORT, "tomb-sub", true).await;
    subscriber.subscribe("status/#", QoS::ExactOnce, 1).await;
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_retain_replaced() {
    const PORT: u16 = 18844;
    start_broker(PORT).await;

    let mut publisher = TestClient::connect(PORT, "replace-pub", true).await;
    publisher
        .publish("config/interval", QoS::AtMostOnce, b"10", true)
        .await;
    publisher
        .publish("config/interval", QoS::AtMostOnce, b"30", true)
        .await;
    settle().await;

    let mut subscriber = TestClient::connect(PORT, "replace-sub", true).await;
    subscriber.subscribe("config/interval", QoS::AtMostOnce, 1).await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.payload(), b"30");
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_live_delivery_keeps_retain_flag_clear() {
    const PORT: u16 = 18845;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "live-sub", true).await;
    subscriber.subscribe("status/#", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::connect(PORT, "live-pub", true).await;
    publisher
        .publish("status/device7", QoS::AtMostOnce, b"online", true)
        .await;

    // A retained publish routed to a live subscriber is a normal delivery.
    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.payload(), b"online");
    assert!(!packet.retain());
}
