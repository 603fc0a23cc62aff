// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles commands and new connections.

use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;

use super::Listener;
use crate::session::{Session, SessionConfig};
use crate::stream::Stream;
use crate::types::PipeId;

impl Listener {
    /// # Panics
    ///
    /// Raise panic if failed to unpack channel receivers.
    pub async fn run_loop(&mut self) -> ! {
        // Take ownership of mpsc receivers or else tokio select will raise
        // borrow errors.
        let mut session_receiver = self
            .session_receiver
            .take()
            .expect("Invalid session receiver");
        let mut dispatcher_receiver = self
            .dispatcher_receiver
            .take()
            .expect("Invalid dispatcher receiver");

        loop {
            tokio::select! {
                accept_result = self.accept() => {
                    match accept_result {
                        Ok((permit, stream)) => self.new_connection(permit, stream),
                        Err(err) => log::error!("listener: Failed to accept: {err:?}"),
                    }
                }

                Some(cmd) = session_receiver.recv() => {
                    if let Err(err) = self.handle_session_cmd(cmd).await {
                        log::error!("listener: Failed to handle session cmd: {err:?}");
                    }
                }

                Some(cmd) = dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("listener: Failed to handle dispatcher cmd: {err:?}");
                    }
                }
            }
        }
    }

    fn next_pipe_id(&mut self) -> PipeId {
        loop {
            let pipe_id = self.next_pipe_id.fetch_add(1, Ordering::Relaxed);
            if pipe_id != 0 && !self.session_senders.contains_key(&pipe_id) {
                return pipe_id;
            }
        }
    }

    /// Mint a pipe id and hand the stream to a fresh session task. The
    /// connection permit travels with the task and frees a slot when the
    /// session ends.
    fn new_connection(&mut self, permit: OwnedSemaphorePermit, stream: Stream) {
        let pipe_id = self.next_pipe_id();
        let (sender, receiver) = mpsc::channel(self.config.msq_len());
        self.session_senders.insert(pipe_id, sender);

        let mut session_config = SessionConfig::new();
        session_config
            .set_qos_duration(self.config.qos_duration())
            .set_property_size(self.config.property_size());
        let session = Session::new(
            pipe_id,
            session_config,
            stream,
            self.session_sender.clone(),
            receiver,
        );
        tokio::spawn(async move {
            session.run_loop().await;
            drop(permit);
        });
        log::info!("listener: Started session for pipe {pipe_id}");
    }
}
