// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Broker event topics under the reserved `$SYS` tree.
//!
//! Connect/disconnect events are synthesized as retained-free QoS 0
//! publishes; the reserved-topic rule keeps them away from `#` and `+`
//! subscribers, only explicit `$SYS` filters observe them.

use codec::v3::PublishPacket;
use codec::QoS;
use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::session::ConnectParam;

#[derive(Debug, Serialize)]
struct ConnectedEvent<'a> {
    client_id: &'a str,
    username: &'a str,
    keep_alive: u16,
    clean_session: bool,
    proto_ver: u8,
}

#[derive(Debug, Serialize)]
struct DisconnectedEvent<'a> {
    client_id: &'a str,
    username: &'a str,
    reason: &'a str,
}

#[must_use]
pub fn connected_topic(client_id: &str) -> String {
    format!("$SYS/brokers/clients/{client_id}/connected")
}

#[must_use]
pub fn disconnected_topic(client_id: &str) -> String {
    format!("$SYS/brokers/clients/{client_id}/disconnected")
}

/// Build the connect-notification publish for a fresh session.
///
/// # Errors
///
/// Returns error if the event cannot be serialized.
pub fn connected_packet(cparam: &ConnectParam) -> Result<PublishPacket, Error> {
    let event = ConnectedEvent {
        client_id: cparam.client_id(),
        username: cparam.username(),
        keep_alive: cparam.keep_alive(),
        clean_session: cparam.clean_session(),
        proto_ver: cparam.protocol_level() as u8,
    };
    let payload = serde_json::to_vec(&event).map_err(|err| {
        Error::from_string(
            ErrorKind::EncodeError,
            format!("Failed to serialize connected event: {err:?}"),
        )
    })?;
    PublishPacket::new(
        &connected_topic(cparam.client_id()),
        QoS::AtMostOnce,
        &payload,
    )
    .map_err(Into::into)
}

/// Build the disconnect-notification publish.
///
/// # Errors
///
/// Returns error if the event cannot be serialized.
pub fn disconnected_packet(cparam: &ConnectParam, reason: &str) -> Result<PublishPacket, Error> {
    let event = DisconnectedEvent {
        client_id: cparam.client_id(),
        username: cparam.username(),
        reason,
    };
    let payload = serde_json::to_vec(&event).map_err(|err| {
        Error::from_string(
            ErrorKind::EncodeError,
            format!("Failed to serialize disconnected event: {err:?}"),
        )
    })?;
    PublishPacket::new(
        &disconnected_topic(cparam.client_id()),
        QoS::AtMostOnce,
        &payload,
    )
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::v3::ConnectPacket;

    #[test]
    fn test_connected_packet() {
        let connect = ConnectPacket::new("edge-42");
        let cparam = ConnectParam::from_v3(&connect);
        let packet = connected_packet(&cparam).unwrap();
        assert_eq!(packet.topic(), "$SYS/brokers/clients/edge-42/connected");
        assert_eq!(packet.qos(), QoS::AtMostOnce);

        let value: serde_json::Value = serde_json::from_slice(packet.payload()).unwrap();
        assert_eq!(value["client_id"], "edge-42");
        assert_eq!(value["clean_session"], true);
        assert_eq!(value["proto_ver"], 4);
    }
}
