// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Listener cmd handlers: the publish/subscribe/teardown hot paths.

use codec::v3::{
    ConnectReturnCode, PublishPacket, SubscribeAck, SubscribeAckPacket, SubscribePacket,
    UnsubscribeAckPacket, UnsubscribePacket,
};
use codec::v5::ReasonCode;
use codec::TopicFilter;
use std::collections::HashSet;
use std::sync::Arc;

use super::sessions::{CachedSession, CachedSubscription};
use super::Dispatcher;
use crate::commands::{DispatcherToBridgeCmd, DispatcherToListenerCmd, ListenerToDispatcherCmd};
use crate::error::Error;
use crate::session::ConnectParam;
use crate::sys_topics;
use crate::types::{ListenerId, PipeId};

impl Dispatcher {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToDispatcherCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToDispatcherCmd::SessionConnected(listener_id, pipe_id, cparam) => {
                self.on_session_connected(listener_id, pipe_id, cparam)
                    .await
            }
            ListenerToDispatcherCmd::Publish(packet) => self.on_publish(&packet).await,
            ListenerToDispatcherCmd::Subscribe(pipe_id, packet) => {
                self.on_subscribe(pipe_id, &packet).await
            }
            ListenerToDispatcherCmd::Unsubscribe(pipe_id, packet) => {
                self.on_unsubscribe(pipe_id, &packet).await
            }
            ListenerToDispatcherCmd::SessionDisconnected {
                pipe_id,
                cparam,
                clean,
                inflight,
            } => {
                self.on_session_disconnected(pipe_id, cparam, clean, inflight)
                    .await
            }
        }
    }

    /// Activate a fresh session: resume the cached state when the client
    /// reconnects with clean-start=false, then announce the connect event.
    async fn on_session_connected(
        &mut self,
        listener_id: ListenerId,
        pipe_id: PipeId,
        cparam: Arc<ConnectParam>,
    ) -> Result<(), Error> {
        self.pipe_listeners.insert(pipe_id, listener_id);
        self.client_pipes
            .insert(cparam.client_id().to_string(), pipe_id);

        let client_id = cparam.client_id();
        let (session_present, inflight, pending) = if cparam.clean_session() {
            self.cached_sessions.discard(client_id);
            (false, Vec::new(), Vec::new())
        } else if let Some(mut cached) = self.cached_sessions.pop(client_id) {
            for subscription in cached.subscriptions() {
                self.sub_trie
                    .insert(&subscription.filter, pipe_id, subscription.qos);
                self.pipes.insert(pipe_id, subscription.filter.as_str());
            }
            (true, cached.take_inflight(), cached.take_pending())
        } else {
            (false, Vec::new(), Vec::new())
        };

        self.send_to_pipe(
            pipe_id,
            DispatcherToListenerCmd::ConnectAck {
                pipe_id,
                return_code: ConnectReturnCode::Accepted,
                session_present,
                inflight,
                pending,
            },
        )
        .await;

        match sys_topics::connected_packet(&cparam) {
            Ok(packet) => self.on_publish(&packet).await?,
            Err(err) => log::error!("dispatcher: Failed to build connect event: {err:?}"),
        }
        Ok(())
    }

    /// Route one publish: retained store, live fan-out, offline sessions,
    /// bridge forwards.
    pub(super) async fn on_publish(&mut self, packet: &PublishPacket) -> Result<(), Error> {
        if packet.retain() {
            self.retain_trie.insert(packet);
        }

        for subscriber in self.sub_trie.search(packet.topic()) {
            let mut out_packet = packet.clone();
            out_packet.set_qos(packet.qos().degrade(subscriber.qos));
            // Retain is only set on deliveries of stored messages
            // [MQTT-3.3.1-9].
            out_packet.set_retain(false);
            let _ret = out_packet.set_dup(false);
            self.send_to_pipe(
                subscriber.pipe_id,
                DispatcherToListenerCmd::Publish(subscriber.pipe_id, out_packet),
            )
            .await;
        }

        self.cached_sessions.route_publish(packet);

        if !self.forward_filters.is_empty()
            && self
                .forward_filters
                .iter()
                .any(|filter| filter.is_match(packet.topic()))
        {
            let cmd = DispatcherToBridgeCmd::Forward(packet.clone());
            if let Err(err) = self.bridge_sender.send(cmd).await {
                log::error!("dispatcher: Failed to forward to bridge: {err:?}");
            }
        }
        Ok(())
    }

    /// Mutate the index for each requested filter, then answer with one
    /// reason byte per filter in request order plus the matching retained
    /// messages.
    async fn on_subscribe(
        &mut self,
        pipe_id: PipeId,
        packet: &SubscribePacket,
    ) -> Result<(), Error> {
        let mut acks = Vec::with_capacity(packet.topics().len());
        let mut retained = Vec::new();
        // A retained message is delivered once even when several fresh
        // filters match its topic.
        let mut seen_topics: HashSet<String> = HashSet::new();

        for topic in packet.topics() {
            match TopicFilter::parse(topic.topic()) {
                Ok(filter) => {
                    self.sub_trie.insert(&filter, pipe_id, topic.qos());
                    self.pipes.insert(pipe_id, topic.topic());
                    acks.push(SubscribeAck::QoS(topic.qos()));

                    for mut retained_packet in self.retain_trie.search(&filter) {
                        if !seen_topics.insert(retained_packet.topic().to_string()) {
                            continue;
                        }
                        retained_packet.set_qos(retained_packet.qos().degrade(topic.qos()));
                        retained_packet.set_retain(true);
                        let _ret = retained_packet.set_dup(false);
                        retained.push(retained_packet);
                    }
                }
                Err(err) => {
                    log::error!(
                        "dispatcher: Invalid subscribe filter: {}, err: {err:?}",
                        topic.topic()
                    );
                    acks.push(SubscribeAck::Failed);
                }
            }
        }

        let ack_packet = SubscribeAckPacket::with_vec(packet.packet_id(), acks);
        self.send_to_pipe(
            pipe_id,
            DispatcherToListenerCmd::SubscribeAck {
                pipe_id,
                packet: ack_packet,
                retained,
            },
        )
        .await;
        Ok(())
    }

    /// Remove each requested filter, collecting one reason code per filter
    /// in request order [MQTT-3.11.3-1].
    async fn on_unsubscribe(
        &mut self,
        pipe_id: PipeId,
        packet: &UnsubscribePacket,
    ) -> Result<(), Error> {
        let mut reason_codes = Vec::with_capacity(packet.topics().len());
        for topic in packet.topics() {
            match TopicFilter::parse(topic.as_ref()) {
                Ok(filter) => {
                    let removed = self.sub_trie.delete(&filter, pipe_id);
                    self.pipes.remove(pipe_id, topic.as_ref());
                    reason_codes.push(if removed.is_some() {
                        ReasonCode::Success
                    } else {
                        ReasonCode::NoSubscriptionExisted
                    });
                }
                Err(err) => {
                    log::error!(
                        "dispatcher: Invalid unsubscribe filter: {}, err: {err:?}",
                        topic.as_ref()
                    );
                    reason_codes.push(ReasonCode::TopicFilterInvalid);
                }
            }
        }

        let ack_packet = UnsubscribeAckPacket::new(packet.packet_id());
        self.send_to_pipe(
            pipe_id,
            DispatcherToListenerCmd::UnsubscribeAck {
                pipe_id,
                packet: ack_packet,
                reason_codes,
            },
        )
        .await;
        Ok(())
    }

    /// Tear down every subscription of the pipe, cache the session when
    /// clean-start=false, emit the will message on abnormal loss.
    async fn on_session_disconnected(
        &mut self,
        pipe_id: PipeId,
        cparam: Option<Arc<ConnectParam>>,
        clean: bool,
        inflight: Vec<PublishPacket>,
    ) -> Result<(), Error> {
        let filters = self.pipes.drop_pipe(pipe_id);
        let mut subscriptions = Vec::with_capacity(filters.len());
        for filter_str in filters {
            let Ok(filter) = TopicFilter::parse(&filter_str) else {
                log::error!("dispatcher: Broken filter in pipe table: {filter_str}");
                continue;
            };
            match self.sub_trie.delete(&filter, pipe_id) {
                Some(subscriber) => subscriptions.push(CachedSubscription {
                    filter,
                    qos: subscriber.qos,
                }),
                None => {
                    // Tables out of sync; keep tearing down best-effort.
                    log::error!(
                        "dispatcher: Pipe {pipe_id} missing in tree for filter {filter_str}"
                    );
                }
            }
        }
        let was_activated = self.pipe_listeners.remove(&pipe_id).is_some();

        let Some(cparam) = cparam else {
            // Pipe died before a CONNECT was accepted.
            return Ok(());
        };
        if !was_activated {
            // CONNECT was rejected; neither will nor events apply.
            return Ok(());
        }

        // An evicted pipe no longer owns its client id; only the last
        // holder may cache a session.
        let owns_client_id = self.client_pipes.get(cparam.client_id()) == Some(&pipe_id);
        if owns_client_id {
            self.client_pipes.remove(cparam.client_id());
            if !cparam.clean_session() {
                let session = CachedSession::new(subscriptions, inflight);
                self.cached_sessions.cache(cparam.client_id(), session);
            }
        }

        if !clean {
            if let Some(will) = cparam.will() {
                match PublishPacket::new(&will.topic, will.qos, &will.payload) {
                    Ok(mut will_packet) => {
                        will_packet.set_retain(will.retain);
                        self.on_publish(&will_packet).await?;
                    }
                    Err(err) => {
                        log::error!("dispatcher: Failed to build will packet: {err:?}");
                    }
                }
            }
        }

        let reason = if clean { "normal" } else { "abnormal" };
        match sys_topics::disconnected_packet(&cparam, reason) {
            Ok(packet) => self.on_publish(&packet).await?,
            Err(err) => log::error!("dispatcher: Failed to build disconnect event: {err:?}"),
        }
        Ok(())
    }
}
