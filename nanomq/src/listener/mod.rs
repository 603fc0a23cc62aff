// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Semaphore;

use crate::auth::Authenticator;
use crate::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd,
};
use crate::config::Config;
use crate::types::{ListenerId, PipeId};

mod dispatcher;
mod init;
mod protocol;
mod run;
mod session;

use protocol::Protocol;

/// One bound socket plus the bookkeeping of every pipe accepted on it.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    protocol: Protocol,
    config: Config,

    authenticator: Arc<Authenticator>,

    /// Pipe id mint shared by all listeners, so ids are process-unique.
    next_pipe_id: Arc<AtomicU32>,

    /// Fixed budget of concurrently served connections (`parallel`).
    conn_permits: Arc<Semaphore>,

    session_senders: HashMap<PipeId, Sender<ListenerToSessionCmd>>,
    client_ids: BTreeMap<String, PipeId>,
    pipe_clients: HashMap<PipeId, String>,

    session_sender: Sender<SessionToListenerCmd>,
    session_receiver: Option<Receiver<SessionToListenerCmd>>,

    dispatcher_sender: Sender<ListenerToDispatcherCmd>,
    dispatcher_receiver: Option<Receiver<DispatcherToListenerCmd>>,
}
