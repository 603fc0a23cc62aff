// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Init server context internal modules.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ServerContext, CHANNEL_CAPACITY};
use crate::auth::Authenticator;
use crate::bridge::BridgeApp;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::listener::Listener;

impl ServerContext {
    /// Bind the listeners and spawn every broker task onto the current
    /// runtime. Also the entry point of integration tests, which run a
    /// whole broker in-process.
    ///
    /// # Errors
    ///
    /// Returns error if a listener cannot bind or a config file is broken.
    pub async fn init_modules(&mut self) -> Result<(), Error> {
        log::info!("server: Initializing modules");

        // Auth predicate shared by all listeners.
        let mut authenticator = Authenticator::new(self.config.allow_anonymous());
        if let Some(auth_file) = self.config.auth_file() {
            authenticator.load_file(auth_file)?;
        }
        let authenticator = Arc::new(authenticator);

        let next_pipe_id = Arc::new(AtomicU32::new(1));

        let (listeners_to_dispatcher_sender, listeners_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);

        // Listeners module.
        let mut listener_objs = Vec::new();
        let mut dispatcher_to_listener_senders = Vec::new();
        let listener_urls = self.config.listener_urls()?;
        for (listener_id, url) in (0_u32..).zip(listener_urls.iter()) {
            let (dispatcher_to_listener_sender, dispatcher_to_listener_receiver) =
                mpsc::channel(CHANNEL_CAPACITY);
            dispatcher_to_listener_senders.push((listener_id, dispatcher_to_listener_sender));

            let listener = Listener::bind(
                listener_id,
                url,
                self.config.clone(),
                Arc::clone(&authenticator),
                Arc::clone(&next_pipe_id),
                listeners_to_dispatcher_sender.clone(),
                dispatcher_to_listener_receiver,
            )
            .await?;
            listener_objs.push(listener);
        }

        for mut listener in listener_objs {
            tokio::spawn(async move {
                listener.run_loop().await;
            });
        }

        // Bridge module. The forward channel is bounded by
        // `bridge.parallel`, the in-flight forward budget.
        let bridge_parallel = self
            .config
            .bridge()
            .map_or(1, crate::config::BridgeConfig::parallel);
        let (bridge_to_dispatcher_sender, bridge_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_bridge_sender, dispatcher_to_bridge_receiver) =
            mpsc::channel(bridge_parallel.max(1));
        let forward_filters = match self.config.bridge() {
            Some(bridge) => bridge.forward_filters()?,
            None => Vec::new(),
        };

        let bridge_app = BridgeApp::new(
            self.config.bridge().cloned(),
            bridge_to_dispatcher_sender,
            dispatcher_to_bridge_receiver,
        );
        tokio::spawn(async move {
            bridge_app.run_loop().await;
        });

        // Dispatcher module.
        let mut dispatcher = Dispatcher::new(
            &self.config,
            forward_filters,
            dispatcher_to_listener_senders,
            listeners_to_dispatcher_receiver,
            dispatcher_to_bridge_sender,
            bridge_to_dispatcher_receiver,
        );
        tokio::spawn(async move {
            dispatcher.run_loop().await;
        });

        Ok(())
    }
}
