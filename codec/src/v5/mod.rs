// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Control packets of MQTT 5.0.
//!
//! The 5.0 wire format extends the 3.1.1 packets with a property section in
//! the variable header and per-operation reason codes.

mod acks;
mod connect;
mod connect_ack;
mod disconnect;
mod property;
mod publish;
mod reason_code;
mod subscribe;
mod subscribe_ack;
mod unsubscribe;
mod unsubscribe_ack;

pub use acks::{
    PublishAckPacket, PublishCompletePacket, PublishReceivedPacket, PublishReleasePacket,
};
pub use connect::ConnectPacket;
pub use connect_ack::ConnectAckPacket;
pub use disconnect::DisconnectPacket;
pub use property::{Properties, Property};
pub use publish::PublishPacket;
pub use reason_code::ReasonCode;
pub use subscribe::{RetainHandling, SubscribePacket, SubscribeTopic};
pub use subscribe_ack::SubscribeAckPacket;
pub use unsubscribe::UnsubscribePacket;
pub use unsubscribe_ack::UnsubscribeAckPacket;
