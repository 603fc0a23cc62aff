// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Bridge egress: an MQTT client hosted in-process.
//!
//! Locally routed publishes whose topic matches a forward filter are
//! duplicated upstream; messages received on the configured upstream
//! subscriptions are injected into the local publish path.

use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{BridgeToDispatcherCmd, DispatcherToBridgeCmd};
use crate::config::BridgeConfig;

mod client;

use client::BridgeClient;

pub struct BridgeApp {
    config: Option<BridgeConfig>,

    dispatcher_sender: Sender<BridgeToDispatcherCmd>,
    dispatcher_receiver: Receiver<DispatcherToBridgeCmd>,
}

impl BridgeApp {
    #[must_use]
    pub const fn new(
        config: Option<BridgeConfig>,
        dispatcher_sender: Sender<BridgeToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToBridgeCmd>,
    ) -> Self {
        Self {
            config,
            dispatcher_sender,
            dispatcher_receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let config = match self.config.take() {
            Some(config) if config.enabled() => config,
            _ => {
                self.drain().await;
                return;
            }
        };

        match BridgeClient::connect(config, self.dispatcher_sender.clone()).await {
            Ok(client) => {
                client.run_loop(&mut self.dispatcher_receiver).await;
                log::error!("bridge: Upstream connection lost, bridge is dormant");
            }
            Err(err) => {
                log::error!("bridge: Failed to connect upstream: {err:?}");
            }
        }
        self.drain().await;
    }

    /// Consume and drop forward cmds so the dispatcher never blocks on a
    /// dead bridge.
    async fn drain(&mut self) {
        while let Some(cmd) = self.dispatcher_receiver.recv().await {
            match cmd {
                DispatcherToBridgeCmd::Forward(packet) => {
                    log::debug!("bridge: Dropping forward of {}", packet.topic());
                }
            }
        }
    }
}
