// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Dispatcher is the message router.
//!
//! It owns all shared routing state: the subscription tree, the retained
//! tree, the pipe→filter table and the cached sessions. Running it as a
//! single task serializes every index mutation, so a publish always
//! observes a consistent snapshot of the matching nodes.

use codec::TopicFilter;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{
    BridgeToDispatcherCmd, DispatcherToBridgeCmd, DispatcherToListenerCmd, ListenerToDispatcherCmd,
};
use crate::config::Config;
use crate::types::{ListenerId, PipeId};

mod bridge;
mod listener;
mod pipes;
mod retain;
mod sessions;
mod trie;

pub use trie::{SubTrie, Subscriber};

/// Cached sessions are dropped after this long without a reconnect.
const CACHED_SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub struct Dispatcher {
    sub_trie: trie::SubTrie,
    retain_trie: retain::RetainTrie,
    pipes: pipes::PipeTable,
    cached_sessions: sessions::CachedSessions,

    /// Which listener serves each live pipe.
    pipe_listeners: HashMap<PipeId, ListenerId>,

    /// Which pipe currently owns each client id. A takeover remaps the
    /// client id; the evicted pipe must not cache a session over the
    /// live one.
    client_pipes: HashMap<String, PipeId>,

    /// Topic patterns duplicated to the bridge context.
    forward_filters: Vec<TopicFilter>,

    qos_duration: u64,

    listener_senders: HashMap<ListenerId, Sender<DispatcherToListenerCmd>>,
    listener_receiver: Receiver<ListenerToDispatcherCmd>,

    bridge_sender: Sender<DispatcherToBridgeCmd>,
    bridge_receiver: Receiver<BridgeToDispatcherCmd>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        config: &Config,
        forward_filters: Vec<TopicFilter>,
        listener_senders: Vec<(ListenerId, Sender<DispatcherToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToDispatcherCmd>,
        bridge_sender: Sender<DispatcherToBridgeCmd>,
        bridge_receiver: Receiver<BridgeToDispatcherCmd>,
    ) -> Self {
        Self {
            sub_trie: trie::SubTrie::new(),
            retain_trie: retain::RetainTrie::new(),
            pipes: pipes::PipeTable::new(),
            cached_sessions: sessions::CachedSessions::new(config.msq_len()),

            pipe_listeners: HashMap::new(),
            client_pipes: HashMap::new(),
            forward_filters,
            qos_duration: config.qos_duration(),

            listener_senders: listener_senders.into_iter().collect(),
            listener_receiver,

            bridge_sender,
            bridge_receiver,
        }
    }

    pub async fn run_loop(&mut self) -> ! {
        let mut expire_tick =
            tokio::time::interval(Duration::from_secs(self.qos_duration.max(1)));
        expire_tick.tick().await;

        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("dispatcher: Failed to handle listener cmd: {err:?}");
                    }
                }
                Some(cmd) = self.bridge_receiver.recv() => {
                    if let Err(err) = self.handle_bridge_cmd(cmd).await {
                        log::error!("dispatcher: Failed to handle bridge cmd: {err:?}");
                    }
                }
                _ = expire_tick.tick() => {
                    self.cached_sessions.expire(CACHED_SESSION_TTL);
                }
            }
        }
    }

    async fn send_to_pipe(&mut self, pipe_id: PipeId, cmd: DispatcherToListenerCmd) {
        let Some(listener_id) = self.pipe_listeners.get(&pipe_id) else {
            log::error!("dispatcher: No listener for pipe {pipe_id}");
            return;
        };
        let Some(sender) = self.listener_senders.get(listener_id) else {
            log::error!("dispatcher: No sender for listener {listener_id}");
            return;
        };
        if let Err(err) = sender.send(cmd).await {
            log::error!("dispatcher: Failed to send cmd to listener {listener_id}: {err:?}");
        }
    }
}
