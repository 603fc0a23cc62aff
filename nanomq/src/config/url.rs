// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Listener and bridge url parsing.
//!
//! Recognized schemes:
//! * `broker+tcp://host:port`: plaintext MQTT
//! * `broker+tls+tcp://host:port`: served as plaintext above the transport
//! * `nmq+ws://host:port/path`: MQTT over WebSocket
//! * `nmq+wss://host:port/path`: served as plaintext above the transport
//! * `mqtt-tcp://host:port`: bridge upstream address

use std::fmt;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Ws,
}

/// A parsed listener url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerUrl {
    transport: Transport,
    address: String,
    path: Option<String>,
}

impl ListenerUrl {
    /// Parse a listener url string.
    ///
    /// # Errors
    ///
    /// Returns error if the scheme is unknown or the address is empty.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let (scheme, rest) = url.split_once("://").ok_or_else(|| {
            Error::from_string(ErrorKind::UrlError, format!("Invalid url: {url}"))
        })?;

        let transport = match scheme {
            "broker+tcp" | "mqtt-tcp" | "tcp" => Transport::Tcp,
            "broker+tls+tcp" | "tls+tcp" => {
                log::warn!("url: TLS is terminated outside the broker, serving {url} as plaintext");
                Transport::Tcp
            }
            "nmq+ws" | "ws" => Transport::Ws,
            "nmq+wss" | "wss" => {
                log::warn!("url: TLS is terminated outside the broker, serving {url} as plaintext");
                Transport::Ws
            }
            _ => {
                return Err(Error::from_string(
                    ErrorKind::UrlError,
                    format!("Unknown url scheme: {scheme}"),
                ))
            }
        };

        let (address, path) = match rest.find('/') {
            Some(index) => (
                rest[..index].to_string(),
                Some(rest[index..].to_string()),
            ),
            None => (rest.to_string(), None),
        };
        if address.is_empty() {
            return Err(Error::from_string(
                ErrorKind::UrlError,
                format!("Empty address in url: {url}"),
            ));
        }

        Ok(Self {
            transport,
            address,
            path,
        })
    }

    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// `host:port` part of the url.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Request path for WebSocket listeners.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Replace the port, used by the `-p/--port` CLI flag.
    ///
    /// # Errors
    ///
    /// Returns error if the address has no `host:port` shape.
    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        let host = self.address.rsplit_once(':').map(|(host, _)| host).ok_or_else(|| {
            Error::from_string(
                ErrorKind::UrlError,
                format!("No port in address: {}", self.address),
            )
        })?;
        self.address = format!("{host}:{port}");
        Ok(())
    }
}

impl fmt::Display for ListenerUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scheme = match self.transport {
            Transport::Tcp => "broker+tcp",
            Transport::Ws => "nmq+ws",
        };
        write!(f, "{scheme}://{}", self.address)?;
        if let Some(path) = &self.path {
            write!(f, "{path}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let url = ListenerUrl::parse("broker+tcp://0.0.0.0:1883").unwrap();
        assert_eq!(url.transport(), Transport::Tcp);
        assert_eq!(url.address(), "0.0.0.0:1883");
        assert_eq!(url.path(), None);
    }

    #[test]
    fn test_parse_ws() {
        let url = ListenerUrl::parse("nmq+ws://0.0.0.0:8083/mqtt").unwrap();
        assert_eq!(url.transport(), Transport::Ws);
        assert_eq!(url.address(), "0.0.0.0:8083");
        assert_eq!(url.path(), Some("/mqtt"));
    }

    #[test]
    fn test_tls_served_as_plaintext() {
        let url = ListenerUrl::parse("broker+tls+tcp://0.0.0.0:8883").unwrap();
        assert_eq!(url.transport(), Transport::Tcp);
        let url = ListenerUrl::parse("nmq+wss://0.0.0.0:8084/mqtt").unwrap();
        assert_eq!(url.transport(), Transport::Ws);
    }

    #[test]
    fn test_invalid() {
        assert!(ListenerUrl::parse("gopher://host:70").is_err());
        assert!(ListenerUrl::parse("not-a-url").is_err());
        assert!(ListenerUrl::parse("broker+tcp://").is_err());
    }

    #[test]
    fn test_set_port() {
        let mut url = ListenerUrl::parse("broker+tcp://0.0.0.0:1883").unwrap();
        url.set_port(11883).unwrap();
        assert_eq!(url.address(), "0.0.0.0:11883");
    }
}
