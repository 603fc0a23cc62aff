// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Session cmd handlers.

use codec::v3::{ConnectReturnCode, PublishPacket, SubscribePacket, UnsubscribePacket};
use std::sync::Arc;

use super::Listener;
use crate::commands::{ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::Error;
use crate::session::ConnectParam;
use crate::types::PipeId;

impl Listener {
    pub(super) async fn handle_session_cmd(
        &mut self,
        cmd: SessionToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            SessionToListenerCmd::Connect(pipe_id, cparam, password) => {
                self.on_session_connect(pipe_id, cparam, &password).await
            }
            SessionToListenerCmd::Publish(_pipe_id, packet) => {
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::Publish(packet))
                    .await
                    .map_err(Into::into)
            }
            SessionToListenerCmd::Subscribe(pipe_id, packet) => {
                self.on_session_subscribe(pipe_id, packet).await
            }
            SessionToListenerCmd::Unsubscribe(pipe_id, packet) => {
                self.on_session_unsubscribe(pipe_id, packet).await
            }
            SessionToListenerCmd::Disconnect {
                pipe_id,
                cparam,
                clean,
                inflight,
            } => {
                self.on_session_disconnect(pipe_id, cparam, clean, inflight)
                    .await
            }
        }
    }

    /// Check credentials, evict any live pipe with the same client id,
    /// then hand the session to the dispatcher.
    async fn on_session_connect(
        &mut self,
        pipe_id: PipeId,
        cparam: Arc<ConnectParam>,
        password: &[u8],
    ) -> Result<(), Error> {
        if !self.authenticator.check(cparam.username(), password) {
            log::warn!(
                "listener: Rejected credentials of client {} on pipe {pipe_id}",
                cparam.client_id()
            );
            let return_code = if cparam.username().is_empty() {
                ConnectReturnCode::Unauthorized
            } else {
                ConnectReturnCode::MalformedUsernamePassword
            };
            return self
                .send_to_session(
                    pipe_id,
                    ListenerToSessionCmd::ConnectAck {
                        return_code,
                        session_present: false,
                        inflight: Vec::new(),
                        pending: Vec::new(),
                    },
                )
                .await;
        }

        // A connected client reusing this client id is disconnected first
        // [MQTT-3.1.4-2].
        let client_id = cparam.client_id().to_string();
        if let Some(old_pipe_id) = self.client_ids.get(&client_id).copied() {
            if old_pipe_id != pipe_id {
                log::info!(
                    "listener: Client id {client_id} taken over, evicting pipe {old_pipe_id}"
                );
                if let Err(err) = self
                    .send_to_session(old_pipe_id, ListenerToSessionCmd::Disconnect)
                    .await
                {
                    log::error!("listener: Failed to evict pipe {old_pipe_id}: {err:?}");
                }
            }
        }
        self.client_ids.insert(client_id.clone(), pipe_id);
        self.pipe_clients.insert(pipe_id, client_id);

        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionConnected(
                self.id, pipe_id, cparam,
            ))
            .await
            .map_err(Into::into)
    }

    async fn on_session_subscribe(
        &mut self,
        pipe_id: PipeId,
        packet: SubscribePacket,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Subscribe(pipe_id, packet))
            .await
            .map_err(Into::into)
    }

    async fn on_session_unsubscribe(
        &mut self,
        pipe_id: PipeId,
        packet: UnsubscribePacket,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Unsubscribe(pipe_id, packet))
            .await
            .map_err(Into::into)
    }

    async fn on_session_disconnect(
        &mut self,
        pipe_id: PipeId,
        cparam: Option<Arc<ConnectParam>>,
        clean: bool,
        inflight: Vec<PublishPacket>,
    ) -> Result<(), Error> {
        if self.session_senders.remove(&pipe_id).is_none() {
            log::error!("listener: Unknown pipe {pipe_id} at disconnect");
        }
        if let Some(client_id) = self.pipe_clients.remove(&pipe_id) {
            // A takeover may have remapped the client id to a newer pipe.
            if self.client_ids.get(&client_id) == Some(&pipe_id) {
                self.client_ids.remove(&client_id);
            }
        }

        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionDisconnected {
                pipe_id,
                cparam,
                clean,
                inflight,
            })
            .await
            .map_err(Into::into)
    }

    pub(super) async fn send_to_session(
        &mut self,
        pipe_id: PipeId,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        if let Some(session_sender) = self.session_senders.get(&pipe_id) {
            session_sender.send(cmd).await.map_err(Into::into)
        } else {
            Err(Error::pipe_error(pipe_id))
        }
    }
}
