// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt::Write,
    sync::atomic::{AtomicU32, Ordering},
};

use rand::RngExt;

/// Monotonic identifier source for requestId / msgID / sessionId /
/// transactionId values.
///
/// Seeded from the CSPRNG at construction, masked to 31 bits (or 15 bits
/// when the `16bitIDs` compatibility directive is set) and never yielding
/// zero.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU32,
    mask: u32,
}

impl IdGenerator {
    pub fn new(short_ids: bool) -> Self {
        let mask = if short_ids { 0x7fff } else { 0x7fff_ffff };
        let seed: u32 = rand::rng().random();
        Self {
            next: AtomicU32::new(seed & mask),
            mask,
        }
    }

    /// Next identifier, wrapping within the mask and skipping zero.
    pub fn next_id(&self) -> i32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed) & self.mask;
            if id != 0 {
                return id as i32;
            }
        }
    }
}

/// Hex representation of a buffer for packet dumps, 16 bytes per row.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / 16 + 1);
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(&mut out, "{:04x}:", i * 16);
        for b in chunk {
            let _ = write!(&mut out, " {b:02x}");
        }
        out.push('\n');
    }
    out
}
