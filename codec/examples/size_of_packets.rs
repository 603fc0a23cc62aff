// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::mem::size_of;

fn print_basic_types() {
    use nanomq_codec::{ByteArray, FixedHeader, PacketId, PubTopic, QoS, SubTopic, VarInt};
    println!("ByteArray: {}", size_of::<ByteArray>());
    println!("FixedHeader: {}", size_of::<FixedHeader>());
    println!("PacketId: {}", size_of::<PacketId>());
    println!("PubTopic: {}", size_of::<PubTopic>());
    println!("SubTopic: {}", size_of::<SubTopic>());
    println!("QoS: {}", size_of::<QoS>());
    println!("VarInt: {}", size_of::<VarInt>());
}

fn print_v3_packets() {
    use nanomq_codec::v3::{
        ConnectAckPacket, ConnectPacket, DisconnectPacket, PingRequestPacket, PingResponsePacket,
        PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
        PublishReleasePacket, SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket,
        UnsubscribePacket,
    };

    println!("==== V3 ====");
    println!("ConnectPacket: {}", size_of::<ConnectPacket>());
    println!("ConnectAckPacket: {}", size_of::<ConnectAckPacket>());
    println!("PublishPacket: {}", size_of::<PublishPacket>());
    println!("PublishAckPacket: {}", size_of::<PublishAckPacket>());
    println!(
        "PublishReceivedPacket: {}",
        size_of::<PublishReceivedPacket>()
    );
    println!(
        "PublishReleasePacket: {}",
        size_of::<PublishReleasePacket>()
    );
    println!(
        "PublishCompletePacket: {}",
        size_of::<PublishCompletePacket>()
    );
    println!("SubscribePacket: {}", size_of::<SubscribePacket>());
    println!("SubscribeAckPacket: {}", size_of::<SubscribeAckPacket>());
    println!("UnsubscribePacket: {}", size_of::<UnsubscribePacket>());
    println!(
        "UnsubscribeAckPacket: {}",
        size_of::<UnsubscribeAckPacket>()
    );
    println!("PingRequestPacket: {}", size_of::<PingRequestPacket>());
    println!("PingResponsePacket: {}", size_of::<PingResponsePacket>());
    println!("DisconnectPacket: {}", size_of::<DisconnectPacket>());
}

fn print_v5_packets() {
    use nanomq_codec::v5::{
        ConnectAckPacket, ConnectPacket, DisconnectPacket, Properties, Property, PublishAckPacket,
        PublishCompletePacket, PublishPacket, PublishReceivedPacket, PublishReleasePacket,
        SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
    };

    println!("==== V5 ====");
    println!("ConnectPacket: {}", size_of::<ConnectPacket>());
    println!("ConnectAckPacket: {}", size_of::<ConnectAckPacket>());
    println!("PublishPacket: {}", size_of::<PublishPacket>());
    println!("PublishAckPacket: {}", size_of::<PublishAckPacket>());
    println!(
        "PublishReceivedPacket: {}",
        size_of::<PublishReceivedPacket>()
    );
    println!(
        "PublishReleasePacket: {}",
        size_of::<PublishReleasePacket>()
    );
    println!(
        "PublishCompletePacket: {}",
        size_of::<PublishCompletePacket>()
    );
    println!("SubscribePacket: {}", size_of::<SubscribePacket>());
    println!("SubscribeAckPacket: {}", size_of::<SubscribeAckPacket>());
    println!("UnsubscribePacket: {}", size_of::<UnsubscribePacket>());
    println!(
        "UnsubscribeAckPacket: {}",
        size_of::<UnsubscribeAckPacket>()
    );
    println!("DisconnectPacket: {}", size_of::<DisconnectPacket>());
    println!("Property: {}", size_of::<Property>());
    println!("Properties: {}", size_of::<Properties>());
}

fn main() {
    print_basic_types();
    print_v3_packets();
    print_v5_packets();
}
