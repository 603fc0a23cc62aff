// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::ConnectReturnCode;
use std::fs;
use std::path::Path;

mod common;
use common::{connect_packet, start_broker_with, TestClient};

use nanomq::config::Config;

const AUTH_FILE: &str = "/tmp/nanomq-tests/auth.conf";
const AUTH_CONTENT: &str = "auth.1.login=admin\nauth.1.password=public\n";

async fn start_auth_broker(port: u16) {
    fs::create_dir_all("/tmp/nanomq-tests").unwrap();
    fs::write(AUTH_FILE, AUTH_CONTENT).unwrap();

    let mut config = Config::default();
    config.set_url(&format!("broker+tcp://127.0.0.1:{port}"));
    config.load_str("allow_anonymous=false\n").unwrap();
    config.set_auth_file(Path::new(AUTH_FILE));
    start_broker_with(config).await;
}

#[tokio::test]
async fn test_anonymous_rejected() {
    const PORT: u16 = 18901;
    start_auth_broker(PORT).await;

    let (_client, ack) = TestClient::connect_with(PORT, &connect_packet("anon", true)).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Unauthorized);
}

#[tokio::test]
async fn test_valid_credentials_accepted() {
    const PORT: u16 = 18902;
    start_auth_broker(PORT).await;

    let mut packet = connect_packet("authed", true);
    packet.set_username("admin");
    packet.set_password(b"public");
    let (mut client, ack) = TestClient::connect_with(PORT, &packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);

    // The accepted session is fully usable.
    client.subscribe("some/topic", codec::QoS::AtMostOnce, 1).await;
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    const PORT: u16 = 18903;
    start_auth_broker(PORT).await;

    let mut packet = connect_packet("intruder", true);
    packet.set_username("admin");
    packet.set_password(b"guessed");
    let (_client, ack) = TestClient::connect_with(PORT, &packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::MalformedUsernamePassword);
}
