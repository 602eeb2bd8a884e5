// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Kernel object naming.
// Any process can rebuild the name of a pooled semaphore from its id alone,
// which is how unrelated processes rendezvous on the same object.

use crate::{Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
fn to_hex(val: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = HEX_DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    buf
}

/// Append `id` as exactly 8 lowercase hex digits. Locale independent.
pub fn push_id_hex(out: &mut String, id: u32) {
    for shift in (0..8).rev() {
        out.push(HEX_DIGITS[((id >> (shift * 4)) & 0xf) as usize] as char);
    }
}

/// Name of the pooled semaphore `id`: `<prefix><8 hex digits>`.
pub fn semaphore_name(prefix: &str, id: u32) -> String {
    let mut name = String::with_capacity(prefix.len() + 8);
    name.push_str(prefix);
    push_id_hex(&mut name, id);
    name
}

/// Maximum length for POSIX named objects. Set to 0 to disable truncation.
///
/// On macOS `PSEMNAMLEN` and `PSHMNAMLEN` are 31. On Linux the limit is
/// typically 255.
#[cfg(target_os = "macos")]
pub const NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const NAME_MAX: usize = 0; // 0 = no truncation

fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Conversion("name is empty".into()));
    }
    if name.contains('\0') {
        return Err(Error::Conversion(format!("{name:?} contains a NUL byte")));
    }
    Ok(())
}

/// Produce the OS-level name for a named object.
///
/// POSIX: a leading '/' is added. When `NAME_MAX > 0`, names whose POSIX
/// form would exceed that limit are shortened to
///     `/<prefix>_<16-hex-FNV-1a-hash>`
/// where `<prefix>` is a truncated portion of the original name.
///
/// Windows: the name is used verbatim.
pub fn make_object_name(name: &str) -> Result<String> {
    validate(name)?;

    if cfg!(windows) {
        return Ok(name.to_string());
    }

    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if NAME_MAX == 0 || result.len() <= NAME_MAX {
        return Ok(result);
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = NAME_MAX.saturating_sub(HASH_SUFFIX_LEN + 1);

    let hex = to_hex(fnv1a_64(result.as_bytes()));

    let mut shortened = String::with_capacity(NAME_MAX);
    shortened.push('/');
    let body = &result[1..];
    let mut take = prefix_len.min(body.len());
    while !body.is_char_boundary(take) {
        take -= 1;
    }
    shortened.push_str(&body[..take]);
    shortened.push('_');
    shortened.extend(hex.iter().map(|&b| b as char));
    Ok(shortened)
}
