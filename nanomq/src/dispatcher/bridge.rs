// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Bridge cmd handlers.

use super::Dispatcher;
use crate::commands::BridgeToDispatcherCmd;
use crate::error::Error;

impl Dispatcher {
    /// Messages from upstream subscriptions run the full local publish
    /// path, retained store included.
    pub(super) async fn handle_bridge_cmd(
        &mut self,
        cmd: BridgeToDispatcherCmd,
    ) -> Result<(), Error> {
        match cmd {
            BridgeToDispatcherCmd::Publish(packet) => self.on_publish(&packet).await,
        }
    }
}
