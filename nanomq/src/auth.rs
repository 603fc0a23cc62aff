// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Username/password predicate checked at CONNECT time.
//!
//! Credentials come from a key=value file with numbered entries:
//!
//! ```txt
//! auth.1.login=admin
//! auth.1.password=public
//! auth.2.login=client
//! auth.2.password=hardtoguess
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::keyfile;
use crate::error::{Error, ErrorKind};

#[derive(Debug, Default, Clone)]
pub struct Authenticator {
    allow_anonymous: bool,
    credentials: HashMap<String, String>,
}

impl Authenticator {
    #[must_use]
    pub fn new(allow_anonymous: bool) -> Self {
        Self {
            allow_anonymous,
            credentials: HashMap::new(),
        }
    }

    /// Load credentials from an auth config file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load_file(&mut self, path: &Path) -> Result<(), Error> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to read auth file {path:?}, err: {err:?}"),
            )
        })?;
        self.load_str(&content)
    }

    /// Parse credentials from the content of an auth config file.
    ///
    /// # Errors
    ///
    /// Returns error if a line is not a `key=value` pair.
    pub fn load_str(&mut self, content: &str) -> Result<(), Error> {
        let entries = keyfile::parse(content)?;
        let mut logins: HashMap<String, String> = HashMap::new();
        let mut passwords: HashMap<String, String> = HashMap::new();
        for (key, value) in entries {
            if let Some(rest) = key.strip_prefix("auth.") {
                if let Some(index) = rest.strip_suffix(".login") {
                    logins.insert(index.to_string(), value);
                } else if let Some(index) = rest.strip_suffix(".password") {
                    passwords.insert(index.to_string(), value);
                }
            }
        }
        for (index, login) in logins {
            if let Some(password) = passwords.remove(&index) {
                self.credentials.insert(login, password);
            } else {
                log::warn!("auth: Entry {index} has login but no password");
            }
        }
        Ok(())
    }

    /// Check a username/password pair from a CONNECT packet.
    pub fn check(&self, username: &str, password: &[u8]) -> bool {
        if username.is_empty() && password.is_empty() {
            return self.allow_anonymous;
        }
        self.credentials
            .get(username)
            .map_or(false, |expected| expected.as_bytes() == password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTH_FILE: &str = r"
# Credentials for edge clients.
auth.1.login=admin
auth.1.password=public
auth.2.login=client
auth.2.password=hardtoguess
";

    #[test]
    fn test_anonymous() {
        let auth = Authenticator::new(true);
        assert!(auth.check("", b""));

        let auth = Authenticator::new(false);
        assert!(!auth.check("", b""));
    }

    #[test]
    fn test_credentials() {
        let mut auth = Authenticator::new(false);
        auth.load_str(AUTH_FILE).unwrap();
        assert!(auth.check("admin", b"public"));
        assert!(auth.check("client", b"hardtoguess"));
        assert!(!auth.check("admin", b"wrong"));
        assert!(!auth.check("nobody", b"public"));
    }
}
