// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Passphrase-to-key expansion and key localization (RFC 3414 §2.6 and
//! A.2), plus the KeyChange textual-convention codec (RFC 2274 §5).

use md5::{Digest, Md5};
use sha1::Sha1;

use crate::{
    error::{ErrorKind, SnmpError, SnmpResult},
    security::crypto::{AuthProtocol, random_bytes},
};

/// Minimum accepted passphrase length.
pub const MIN_PASSPHRASE_LEN: usize = 8;

const EXPANDED_LEN: usize = 1024 * 1024;
const HASH_BLOCK: usize = 64;

/// Expand a passphrase to 1 MiB by cyclic repetition and hash it into the
/// master key Ku.
pub fn generate_ku(auth: AuthProtocol, passphrase: &[u8]) -> SnmpResult<Vec<u8>> {
    if passphrase.len() < MIN_PASSPHRASE_LEN {
        return Err(SnmpError::with_detail(
            ErrorKind::GenErr,
            format!(
                "passphrase of {} chars is below the USM minimum of {}",
                passphrase.len(),
                MIN_PASSPHRASE_LEN
            ),
        ));
    }

    let mut block = [0u8; HASH_BLOCK];
    let mut pindex = 0usize;
    match auth {
        AuthProtocol::HmacMd5 => {
            let mut ctx = Md5::new();
            for _ in 0..EXPANDED_LEN / HASH_BLOCK {
                fill_block(&mut block, passphrase, &mut pindex);
                ctx.update(block);
            }
            Ok(ctx.finalize().to_vec())
        },
        AuthProtocol::HmacSha1 => {
            let mut ctx = Sha1::new();
            for _ in 0..EXPANDED_LEN / HASH_BLOCK {
                fill_block(&mut block, passphrase, &mut pindex);
                ctx.update(block);
            }
            Ok(ctx.finalize().to_vec())
        },
    }
}

fn fill_block(block: &mut [u8; HASH_BLOCK], passphrase: &[u8], pindex: &mut usize) {
    for slot in block.iter_mut() {
        *slot = passphrase[*pindex % passphrase.len()];
        *pindex += 1;
    }
}

/// Localize Ku to an engine: Kul = H(Ku ‖ engineID ‖ Ku).
pub fn generate_kul(
    auth: AuthProtocol,
    engine_id: &[u8],
    ku: &[u8],
) -> SnmpResult<Vec<u8>> {
    let proper = auth.digest_len();
    if engine_id.is_empty() || ku.len() < proper {
        return Err(SnmpError::with_detail(
            ErrorKind::GenErr,
            "engine id empty or master key too short for localization",
        ));
    }
    let mut buf = Vec::with_capacity(proper * 2 + engine_id.len());
    buf.extend_from_slice(&ku[..proper]);
    buf.extend_from_slice(engine_id);
    buf.extend_from_slice(&ku[..proper]);
    Ok(auth.hash(&buf))
}

/// Derive both keys from a passphrase in one step.
pub fn passphrase_to_kul(
    auth: AuthProtocol,
    engine_id: &[u8],
    passphrase: &[u8],
) -> SnmpResult<Vec<u8>> {
    let ku = generate_ku(auth, passphrase)?;
    generate_kul(auth, engine_id, &ku)
}

/// Encode a new key under the old one per the KeyChange TC:
/// `random ‖ (H(oldkey ‖ random) XOR newkey)`.
pub fn encode_keychange(
    auth: AuthProtocol,
    old_key: &[u8],
    new_key: &[u8],
) -> SnmpResult<Vec<u8>> {
    if old_key.is_empty() || old_key.len() != new_key.len() {
        return Err(SnmpError::with_detail(
            ErrorKind::GenErr,
            "KeyChange requires equal-length old and new keys",
        ));
    }
    let proper = old_key.len().min(auth.digest_len());

    let random = random_bytes(proper);
    let mut seed = Vec::with_capacity(proper * 2);
    seed.extend_from_slice(&old_key[..proper]);
    seed.extend_from_slice(&random);
    let digest = auth.hash(&seed);

    let mut out = Vec::with_capacity(proper * 2);
    out.extend_from_slice(&random);
    for (d, n) in digest[..proper].iter().zip(new_key[..proper].iter()) {
        out.push(d ^ n);
    }
    Ok(out)
}

/// Invert [`encode_keychange`] with the old key.
pub fn decode_keychange(
    auth: AuthProtocol,
    old_key: &[u8],
    kc_string: &[u8],
) -> SnmpResult<Vec<u8>> {
    if old_key.is_empty() || kc_string.len() != old_key.len() * 2 {
        return Err(SnmpError::with_detail(
            ErrorKind::GenErr,
            "KeyChange string must be exactly twice the old key length",
        ));
    }
    let proper = old_key.len();
    let (random, masked) = kc_string.split_at(proper);

    let mut seed = Vec::with_capacity(proper * 2);
    seed.extend_from_slice(old_key);
    seed.extend_from_slice(random);
    let digest = auth.hash(&seed);

    let mut new_key = Vec::with_capacity(proper);
    for (d, m) in digest[..proper].iter().zip(masked.iter()) {
        new_key.push(d ^ m);
    }
    Ok(new_key)
}
