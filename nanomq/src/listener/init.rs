// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Initialize Listener.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::tungstenite::handshake::server as ws_server;
use tokio_tungstenite::tungstenite::http;

use super::{Listener, Protocol};
use crate::auth::Authenticator;
use crate::commands::{DispatcherToListenerCmd, ListenerToDispatcherCmd};
use crate::config::{Config, ListenerUrl, Transport};
use crate::error::Error;
use crate::socket::{new_tcp_listener, tune_stream};
use crate::stream::Stream;
use crate::types::ListenerId;

const SESSION_CHANNEL_CAPACITY: usize = 16;

impl Listener {
    /// Bind to the socket address in `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    pub async fn bind(
        id: ListenerId,
        url: &ListenerUrl,
        config: Config,
        authenticator: Arc<Authenticator>,
        next_pipe_id: Arc<AtomicU32>,
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
    ) -> Result<Self, Error> {
        log::info!("listener: Binding {url}");
        let tcp_listener = new_tcp_listener(url.address()).await?;
        let protocol = match url.transport() {
            Transport::Tcp => Protocol::Mqtt(tcp_listener),
            Transport::Ws => Protocol::Ws(tcp_listener, url.path().map(ToString::to_string)),
        };

        let (session_sender, session_receiver) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let conn_permits = Arc::new(Semaphore::new(config.parallel()));

        Ok(Self {
            id,
            protocol,
            config,

            authenticator,
            next_pipe_id,
            conn_permits,

            session_senders: HashMap::new(),
            client_ids: BTreeMap::new(),
            pipe_clients: HashMap::new(),

            session_sender,
            session_receiver: Some(session_receiver),

            dispatcher_sender,
            dispatcher_receiver: Some(dispatcher_receiver),
        })
    }

    /// Wait for a free connection slot, then accept the next client.
    pub(super) async fn accept(&mut self) -> Result<(OwnedSemaphorePermit, Stream), Error> {
        let permit = Arc::clone(&self.conn_permits)
            .acquire_owned()
            .await
            .expect("Connection semaphore closed");

        match &mut self.protocol {
            Protocol::Mqtt(listener) => {
                let (tcp_stream, address) = listener.accept().await?;
                log::info!("listener: New mqtt connection from {address}");
                tune_stream(&tcp_stream);
                Ok((permit, Stream::Mqtt(tcp_stream)))
            }
            Protocol::Ws(listener, listener_path) => {
                let (tcp_stream, address) = listener.accept().await?;
                log::info!("listener: New ws connection from {address}");
                tune_stream(&tcp_stream);

                let expected_path = listener_path.clone();
                let check_ws_path = move |request: &ws_server::Request,
                                          response: ws_server::Response|
                      -> Result<ws_server::Response, ws_server::ErrorResponse> {
                    match &expected_path {
                        Some(path) if request.uri().path() != path => {
                            let resp = http::Response::builder()
                                .status(http::StatusCode::NOT_FOUND)
                                .body(None)
                                .expect("Static response is valid");
                            Err(resp)
                        }
                        _ => Ok(response),
                    }
                };
                let ws_stream =
                    tokio_tungstenite::accept_hdr_async(tcp_stream, check_ws_path).await?;
                Ok((permit, Stream::Ws(Box::new(ws_stream))))
            }
        }
    }
}
