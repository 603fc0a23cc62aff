// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! MQTT-over-WebSocket listener, one control packet per binary frame.

use codec::{
    ByteArray, DecodePacket, EncodePacket, QoS,
    v3::{ConnectAckPacket, ConnectPacket, ConnectReturnCode, PublishPacket},
};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

mod common;
use common::{start_broker_with, TestClient};

use nanomq::config::Config;

#[tokio::test]
async fn test_websocket_listener() {
    const TCP_PORT: u16 = 18911;
    const WS_PORT: u16 = 18912;

    let mut config = Config::default();
    config.set_url(&format!("broker+tcp://127.0.0.1:{TCP_PORT}"));
    config
        .load_str(&format!(
            "websocket.enable=true\nwebsocket.url=nmq+ws://127.0.0.1:{WS_PORT}/mqtt\n"
        ))
        .unwrap();
    start_broker_with(config).await;

    let (mut ws_stream, _response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{WS_PORT}/mqtt"))
            .await
            .expect("Failed to open websocket");

    // CONNECT over a binary frame.
    let mut buf = Vec::new();
    ConnectPacket::new("ws-client").encode(&mut buf).unwrap();
    ws_stream.send(Message::binary(buf)).await.unwrap();

    let frame = ws_stream.next().await.unwrap().unwrap();
    let data = frame.into_data();
    let mut ba = ByteArray::new(&data);
    let ack = ConnectAckPacket::decode(&mut ba).unwrap();
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);

    // A tcp subscriber sees publishes from the websocket pipe.
    let mut subscriber = TestClient::connect(TCP_PORT, "ws-observer", true).await;
    subscriber.subscribe("ws/topic", QoS::AtMostOnce, 1).await;

    let mut buf = Vec::new();
    PublishPacket::new("ws/topic", QoS::AtMostOnce, b"from-ws")
        .unwrap()
        .encode(&mut buf)
        .unwrap();
    ws_stream.send(Message::binary(buf)).await.unwrap();

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "ws/topic");
    assert_eq!(packet.payload(), b"from-ws");
}

#[tokio::test]
async fn test_websocket_wrong_path_rejected() {
    const TCP_PORT: u16 = 18913;
    const WS_PORT: u16 = 18914;

    let mut config = Config::default();
    config.set_url(&format!("broker+tcp://127.0.0.1:{TCP_PORT}"));
    config
        .load_str(&format!(
            "websocket.enable=true\nwebsocket.url=nmq+ws://127.0.0.1:{WS_PORT}/mqtt\n"
        ))
        .unwrap();
    start_broker_with(config).await;

    let result =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{WS_PORT}/other")).await;
    assert!(result.is_err());
}
