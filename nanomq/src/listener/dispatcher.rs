// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Dispatcher cmd handlers.

use codec::QoS;
use tokio::sync::mpsc::error::TrySendError;

use super::Listener;
use crate::commands::{DispatcherToListenerCmd, ListenerToSessionCmd};
use crate::error::Error;

impl Listener {
    pub(super) async fn handle_dispatcher_cmd(
        &mut self,
        cmd: DispatcherToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            DispatcherToListenerCmd::ConnectAck {
                pipe_id,
                return_code,
                session_present,
                inflight,
                pending,
            } => {
                self.send_to_session(
                    pipe_id,
                    ListenerToSessionCmd::ConnectAck {
                        return_code,
                        session_present,
                        inflight,
                        pending,
                    },
                )
                .await
            }
            DispatcherToListenerCmd::Publish(pipe_id, packet) => {
                // Publish deliveries use the bounded per-pipe queue; a full
                // queue drops the message instead of stalling the router.
                let Some(session_sender) = self.session_senders.get(&pipe_id) else {
                    log::debug!("listener: Dropping publish to dead pipe {pipe_id}");
                    return Ok(());
                };
                let qos = packet.qos();
                match session_sender.try_send(ListenerToSessionCmd::Publish(packet)) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_cmd)) => {
                        if qos == QoS::AtMostOnce {
                            log::debug!("listener: Queue of pipe {pipe_id} full, dropped qos0");
                        } else {
                            log::debug!(
                                "listener: Queue of pipe {pipe_id} full, dropped qos{} delivery",
                                u8::from(qos)
                            );
                        }
                        Ok(())
                    }
                    Err(TrySendError::Closed(_cmd)) => {
                        log::debug!("listener: Pipe {pipe_id} closed during delivery");
                        Ok(())
                    }
                }
            }
            DispatcherToListenerCmd::SubscribeAck {
                pipe_id,
                packet,
                retained,
            } => {
                self.send_to_session(
                    pipe_id,
                    ListenerToSessionCmd::SubscribeAck { packet, retained },
                )
                .await
            }
            DispatcherToListenerCmd::UnsubscribeAck {
                pipe_id,
                packet,
                reason_codes,
            } => {
                self.send_to_session(
                    pipe_id,
                    ListenerToSessionCmd::UnsubscribeAck {
                        packet,
                        reason_codes,
                    },
                )
                .await
            }
        }
    }
}
