// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::Rng;

use crate::{DecodeError, EncodeError};

/// Convert `bytes` into an UTF-8 string.
///
/// The null character U+0000 and the UTF-16 surrogate range are rejected
/// [MQTT-1.5.3-1, MQTT-1.5.3-2].
///
/// # Errors
///
/// Returns error if `bytes` is not a well formed MQTT string.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, DecodeError> {
    let s = String::from_utf8(bytes.to_vec())?;
    if s.contains('\u{0}') {
        return Err(DecodeError::InvalidString);
    }
    Ok(s)
}

/// Append a length-prefixed UTF-8 string to `buf`.
///
/// # Errors
///
/// Returns error if `s` is longer than 65535 bytes.
pub fn write_u16_string(buf: &mut Vec<u8>, s: &str) -> Result<usize, EncodeError> {
    let len = u16::try_from(s.len()).map_err(|_| EncodeError::TooManyData)?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(2 + s.len())
}

/// Append a length-prefixed binary chunk to `buf`.
///
/// # Errors
///
/// Returns error if `bytes` is longer than 65535 bytes.
pub fn write_u16_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<usize, EncodeError> {
    let len = u16::try_from(bytes.len()).map_err(|_| EncodeError::TooManyData)?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(2 + bytes.len())
}

const CLIENT_ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CLIENT_ID_RANDOM_LEN: usize = 12;

/// Generate a random client id for clients which connected with an empty one.
#[must_use]
pub fn random_client_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CLIENT_ID_RANDOM_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CLIENT_ID_CHARS.len());
            char::from(CLIENT_ID_CHARS[idx])
        })
        .collect();
    format!("nanomq-{suffix}")
}
