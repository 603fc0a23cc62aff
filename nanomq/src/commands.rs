// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Command enums exchanged between the broker apps. Packets cross module
//! boundaries in their 3.1.1 form; sessions re-encode for 5.0 clients at
//! the socket.

use codec::v3::{
    ConnectReturnCode, PublishPacket, SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket,
    UnsubscribePacket,
};
use codec::v5::ReasonCode;
use std::sync::Arc;

use crate::session::ConnectParam;
use crate::types::{ListenerId, PipeId};

#[derive(Debug, Clone)]
pub enum SessionToListenerCmd {
    /// CONNECT accepted by the protocol layer; password travels separately
    /// from the long-lived connect parameters.
    Connect(PipeId, Arc<ConnectParam>, Vec<u8>),

    Publish(PipeId, PublishPacket),

    Subscribe(PipeId, SubscribePacket),

    Unsubscribe(PipeId, UnsubscribePacket),

    /// Connection ended. `clean` is true when the client sent DISCONNECT,
    /// false on socket loss or keepalive expiry. `inflight` carries
    /// unacknowledged QoS > 0 deliveries for session caching.
    Disconnect {
        pipe_id: PipeId,
        cparam: Option<Arc<ConnectParam>>,
        clean: bool,
        inflight: Vec<PublishPacket>,
    },
}

#[derive(Debug, Clone)]
pub enum ListenerToSessionCmd {
    /// Accepted or not, with the state of a resumed session. `inflight`
    /// deliveries were on the wire when the previous connection died and
    /// are re-sent under their original packet ids [MQTT-4.4.0-1];
    /// `pending` arrived while the client was offline.
    ConnectAck {
        return_code: ConnectReturnCode,
        session_present: bool,
        inflight: Vec<PublishPacket>,
        pending: Vec<PublishPacket>,
    },

    /// QoS in the packet is already degraded to
    /// `min(publish.qos, subscription.qos)`.
    Publish(PublishPacket),

    /// Ack plus any retained messages matching the new subscriptions.
    SubscribeAck {
        packet: SubscribeAckPacket,
        retained: Vec<PublishPacket>,
    },

    /// Ack plus one reason code per requested filter in request order
    /// [MQTT-3.11.3-1]; 3.1.1 sessions only use the packet id.
    UnsubscribeAck {
        packet: UnsubscribeAckPacket,
        reason_codes: Vec<ReasonCode>,
    },

    /// Server-side eviction, e.g. client id takeover.
    Disconnect,
}

#[derive(Debug, Clone)]
pub enum ListenerToDispatcherCmd {
    /// Authenticated CONNECT; the dispatcher resumes or discards any
    /// cached session for this client id. The listener id routes replies
    /// for this pipe.
    SessionConnected(ListenerId, PipeId, Arc<ConnectParam>),

    Publish(PublishPacket),

    Subscribe(PipeId, SubscribePacket),

    Unsubscribe(PipeId, UnsubscribePacket),

    SessionDisconnected {
        pipe_id: PipeId,
        cparam: Option<Arc<ConnectParam>>,
        clean: bool,
        inflight: Vec<PublishPacket>,
    },
}

#[derive(Debug, Clone)]
pub enum DispatcherToListenerCmd {
    ConnectAck {
        pipe_id: PipeId,
        return_code: ConnectReturnCode,
        session_present: bool,
        inflight: Vec<PublishPacket>,
        pending: Vec<PublishPacket>,
    },

    Publish(PipeId, PublishPacket),

    SubscribeAck {
        pipe_id: PipeId,
        packet: SubscribeAckPacket,
        retained: Vec<PublishPacket>,
    },

    UnsubscribeAck {
        pipe_id: PipeId,
        packet: UnsubscribeAckPacket,
        reason_codes: Vec<ReasonCode>,
    },
}

#[derive(Debug, Clone)]
pub enum DispatcherToBridgeCmd {
    /// Local publish whose topic matched a forward filter.
    Forward(PublishPacket),
}

#[derive(Debug, Clone)]
pub enum BridgeToDispatcherCmd {
    /// Message received on an upstream subscription, injected as if
    /// published locally.
    Publish(PublishPacket),
}
