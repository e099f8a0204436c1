// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Thin contract over the RustCrypto primitives the USM needs: HMAC-MD5 /
//! HMAC-SHA1 keyed hashes, DES-CBC and AES-CFB128 privacy transforms, and
//! CSPRNG bytes.

use aes::{
    Aes128,
    cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
        block_padding::NoPadding},
};
use hmac::{Hmac, Mac};
use md5::{Digest as _, Md5};
use rand::RngExt;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::{ErrorKind, SnmpError, SnmpResult};

/// Truncated length of the wire authentication tag.
pub const AUTH_TAG_LEN: usize = 12;

/// DES block / key / pre-IV width.
pub const DES_BLOCK_LEN: usize = 8;
/// Localized privacy key width for both DES (key + pre-IV) and AES-128.
pub const PRIV_KEY_LEN: usize = 16;
/// AES-CFB128 IV width.
pub const AES_IV_LEN: usize = 16;

type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;
type AesCfbEnc = cfb_mode::Encryptor<Aes128>;
type AesCfbDec = cfb_mode::Decryptor<Aes128>;

/// Authentication transform selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    HmacMd5,
    HmacSha1,
}

impl AuthProtocol {
    /// Full digest width: 16 for MD5, 20 for SHA1.
    pub fn digest_len(self) -> usize {
        match self {
            AuthProtocol::HmacMd5 => 16,
            AuthProtocol::HmacSha1 => 20,
        }
    }

    /// Plain (unkeyed) digest.
    pub fn hash(self, message: &[u8]) -> Vec<u8> {
        match self {
            AuthProtocol::HmacMd5 => Md5::digest(message).to_vec(),
            AuthProtocol::HmacSha1 => Sha1::digest(message).to_vec(),
        }
    }

    /// Full-width HMAC over `message`.
    pub fn keyed_hash(self, key: &[u8], message: &[u8]) -> SnmpResult<Vec<u8>> {
        if key.len() < self.digest_len() {
            return Err(SnmpError::with_detail(
                ErrorKind::ScGeneralFailure,
                format!("auth key of {} bytes is too short", key.len()),
            ));
        }
        Ok(match self {
            AuthProtocol::HmacMd5 => {
                let mut mac = Hmac::<Md5>::new_from_slice(key)
                    .map_err(|_| SnmpError::new(ErrorKind::ScGeneralFailure))?;
                mac.update(message);
                mac.finalize().into_bytes().to_vec()
            },
            AuthProtocol::HmacSha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key)
                    .map_err(|_| SnmpError::new(ErrorKind::ScGeneralFailure))?;
                mac.update(message);
                mac.finalize().into_bytes().to_vec()
            },
        })
    }

    /// 12-byte truncated wire tag.
    pub fn auth_tag(self, key: &[u8], message: &[u8]) -> SnmpResult<[u8; AUTH_TAG_LEN]> {
        let full = self.keyed_hash(key, message)?;
        let mut tag = [0u8; AUTH_TAG_LEN];
        tag.copy_from_slice(&full[..AUTH_TAG_LEN]);
        Ok(tag)
    }

    /// Constant-time verification of a received 12-byte tag.
    pub fn check_auth_tag(
        self,
        key: &[u8],
        message: &[u8],
        received: &[u8],
    ) -> SnmpResult<bool> {
        if received.len() != AUTH_TAG_LEN {
            return Ok(false);
        }
        let tag = self.auth_tag(key, message)?;
        Ok(tag.ct_eq(received).into())
    }
}

/// Privacy transform selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    DesCbc,
    AesCfb128,
}

impl PrivProtocol {
    /// Localized key bytes the transform consumes.
    pub fn key_len(self) -> usize {
        PRIV_KEY_LEN
    }

    /// Encrypt `plaintext`. DES pads the tail block with the pad count;
    /// AES-CFB is length-preserving.
    pub fn encrypt(self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> SnmpResult<Vec<u8>> {
        match self {
            PrivProtocol::DesCbc => {
                if key.len() < DES_BLOCK_LEN || iv.len() != DES_BLOCK_LEN {
                    return Err(SnmpError::new(ErrorKind::ScGeneralFailure));
                }
                let pad = DES_BLOCK_LEN - plaintext.len() % DES_BLOCK_LEN;
                let pad = if pad == DES_BLOCK_LEN { 0 } else { pad };
                let mut buf = Vec::with_capacity(plaintext.len() + pad);
                buf.extend_from_slice(plaintext);
                buf.extend(std::iter::repeat_n(pad as u8, pad));

                let enc = DesCbcEnc::new_from_slices(&key[..DES_BLOCK_LEN], iv)
                    .map_err(|_| SnmpError::new(ErrorKind::ScGeneralFailure))?;
                let total = buf.len();
                enc.encrypt_padded_mut::<NoPadding>(&mut buf, total)
                    .map_err(|_| SnmpError::new(ErrorKind::ScGeneralFailure))?;
                Ok(buf)
            },
            PrivProtocol::AesCfb128 => {
                if key.len() < PRIV_KEY_LEN || iv.len() != AES_IV_LEN {
                    return Err(SnmpError::new(ErrorKind::ScGeneralFailure));
                }
                let mut buf = plaintext.to_vec();
                let enc = AesCfbEnc::new_from_slices(&key[..PRIV_KEY_LEN], iv)
                    .map_err(|_| SnmpError::new(ErrorKind::ScGeneralFailure))?;
                enc.encrypt(&mut buf);
                Ok(buf)
            },
        }
    }

    /// Decrypt `ciphertext`. DES trailing pad bytes are left in place; the
    /// BER length of the recovered payload delimits the real content.
    pub fn decrypt(
        self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> SnmpResult<Vec<u8>> {
        match self {
            PrivProtocol::DesCbc => {
                if key.len() < DES_BLOCK_LEN
                    || iv.len() != DES_BLOCK_LEN
                    || ciphertext.is_empty()
                    || ciphertext.len() % DES_BLOCK_LEN != 0
                {
                    return Err(SnmpError::new(ErrorKind::DecryptionError));
                }
                let mut buf = ciphertext.to_vec();
                let dec = DesCbcDec::new_from_slices(&key[..DES_BLOCK_LEN], iv)
                    .map_err(|_| SnmpError::new(ErrorKind::DecryptionError))?;
                dec.decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|_| SnmpError::new(ErrorKind::DecryptionError))?;
                Ok(buf)
            },
            PrivProtocol::AesCfb128 => {
                if key.len() < PRIV_KEY_LEN || iv.len() != AES_IV_LEN {
                    return Err(SnmpError::new(ErrorKind::DecryptionError));
                }
                let mut buf = ciphertext.to_vec();
                let dec = AesCfbDec::new_from_slices(&key[..PRIV_KEY_LEN], iv)
                    .map_err(|_| SnmpError::new(ErrorKind::DecryptionError))?;
                dec.decrypt(&mut buf);
                Ok(buf)
            },
        }
    }
}

/// CSPRNG bytes for salts and KeyChange material.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rng().fill(&mut buf[..]);
    buf
}
