// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::QoS;

mod common;
use common::{start_broker, TestClient};

#[tokio::test]
async fn test_hash_wildcard_skips_reserved_topics() {
    const PORT: u16 = 18871;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "reserved-sub", true).await;
    subscriber.subscribe("#", QoS::AtMostOnce, 1).await;

    // Connect events land on $SYS topics; a fresh client must not leak
    // into the `#` subscription.
    let mut publisher = TestClient::connect(PORT, "reserved-pub", true).await;
    publisher
        .publish("$SYS/foo", QoS::AtMostOnce, b"hidden", false)
        .await;
    publisher
        .publish("visible/topic", QoS::AtMostOnce, b"seen", false)
        .await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "visible/topic");
    assert_eq!(packet.payload(), b"seen");
    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_sys_connect_events_reach_explicit_subscribers() {
    const PORT: u16 = 18872;
    start_broker(PORT).await;

    let mut observer = TestClient::connect(PORT, "sys-observer", true).await;
    observer
        .subscribe("$SYS/brokers/clients/#", QoS::AtMostOnce, 1)
        .await;

    let fresh = TestClient::connect(PORT, "watched-client", true).await;

    let event = observer.expect_publish().await;
    assert_eq!(
        event.topic(),
        "$SYS/brokers/clients/watched-client/connected"
    );
    let value: serde_json::Value = serde_json::from_slice(event.payload()).unwrap();
    assert_eq!(value["client_id"], "watched-client");

    fresh.disconnect().await;
    let event = observer.expect_publish().await;
    assert_eq!(
        event.topic(),
        "$SYS/brokers/clients/watched-client/disconnected"
    );
    let value: serde_json::Value = serde_json::from_slice(event.payload()).unwrap();
    assert_eq!(value["reason"], "normal");
}

#[tokio::test]
async fn test_plus_wildcard_skips_reserved_root() {
    const PORT: u16 = 18873;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "plus-sub", true).await;
    subscriber.subscribe("+/foo", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::connect(PORT, "plus-pub", true).await;
    publisher
        .publish("$SYS/foo", QoS::AtMostOnce, b"hidden", false)
        .await;
    publisher
        .publish("bar/foo", QoS::AtMostOnce, b"seen", false)
        .await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "bar/foo");
    subscriber.expect_silence().await;
}
