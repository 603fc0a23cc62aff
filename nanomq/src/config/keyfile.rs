// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Parser for the `key=value` config format.
//!
//! Lines starting with `#` (including the `##` doc-comment style) are
//! skipped, as are blank lines. Values may be wrapped in double quotes.

use crate::error::{Error, ErrorKind};

/// Parse `content` into key/value pairs in file order.
///
/// # Errors
///
/// Returns error if a non-comment line has no `=` separator.
pub fn parse(content: &str) -> Result<Vec<(String, String)>, Error> {
    let mut entries = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid config line {}: {line}", line_no + 1),
            )
        })?;
        let key = key.trim().to_string();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        entries.push((key, value.to_string()));
    }
    Ok(entries)
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::from_string(
            ErrorKind::ConfigError,
            format!("Invalid boolean for {key}: {value}"),
        )),
    }
}

pub(crate) fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value.parse::<T>().map_err(|_| {
        Error::from_string(
            ErrorKind::ConfigError,
            format!("Invalid number for {key}: {value}"),
        )
    })
}
