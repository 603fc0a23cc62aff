// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::ConnectReturnCode;
use codec::QoS;

mod common;
use common::{connect_packet, start_broker, TestClient};

#[tokio::test]
async fn test_will_on_abnormal_disconnect() {
    const PORT: u16 = 18851;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "will-sub", true).await;
    subscriber.subscribe("goodbye", QoS::AtLeastOnce, 1).await;

    let mut packet = connect_packet("will-client", true);
    packet
        .set_will("goodbye", b"bye", QoS::AtLeastOnce, false)
        .unwrap();
    let (dying_client, ack) = TestClient::connect_with(PORT, &packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);

    // Sever the connection without a DISCONNECT packet.
    drop(dying_client);

    let will = subscriber.expect_publish().await;
    assert_eq!(will.topic(), "goodbye");
    assert_eq!(will.payload(), b"bye");
    assert_eq!(will.qos(), QoS::AtLeastOnce);
}

#[tokio::test]
async fn test_no_will_on_clean_disconnect() {
    const PORT: u16 = 18852;
    start_broker(PORT).await;

    let mut subscriber = TestClient::connect(PORT, "nowill-sub", true).await;
    subscriber.subscribe("goodbye", QoS::AtLeastOnce, 1).await;

    let mut packet = connect_packet("nowill-client", true);
    packet
        .set_will("goodbye", b"bye", QoS::AtLeastOnce, false)
        .unwrap();
    let (client, ack) = TestClient::connect_with(PORT, &packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);

    // A DISCONNECT packet discards the stored will message.
    client.disconnect().await;

    subscriber.expect_silence().await;
}

#[tokio::test]
async fn test_retained_will() {
    const PORT: u16 = 18853;
    start_broker(PORT).await;

    let mut packet = connect_packet("retwill-client", true);
    packet
        .set_will("lastseen/edge9", b"gone", QoS::AtMostOnce, true)
        .unwrap();
    let (dying_client, _ack) = TestClient::connect_with(PORT, &packet).await;
    drop(dying_client);

    // The will retain flag stores the message for later subscribers.
    common::settle().await;
    let mut subscriber = TestClient::connect(PORT, "retwill-sub", true).await;
    subscriber.subscribe("lastseen/#", QoS::AtMostOnce, 1).await;

    let will = subscriber.expect_publish().await;
    assert_eq!(will.topic(), "lastseen/edge9");
    assert_eq!(will.payload(), b"gone");
    assert!(will.retain());
}
