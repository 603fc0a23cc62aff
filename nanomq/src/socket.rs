// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;

/// Create a new tcp server socket bound to `address`.
///
/// # Errors
///
/// Returns error if `address` is invalid or already in use.
pub async fn new_tcp_listener(address: &str) -> Result<TcpListener, Error> {
    let listener = TcpListener::bind(address).await?;
    log::info!("socket: Listening at {address}");
    Ok(listener)
}

/// Disable Nagle's algorithm on an accepted client socket.
pub fn tune_stream(stream: &TcpStream) {
    if let Err(err) = stream.set_nodelay(true) {
        log::warn!("socket: Failed to set nodelay: {err:?}");
    }
}
