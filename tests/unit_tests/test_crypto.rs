// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use hex_literal::hex;
use snmp_client_rs::security::crypto::{
    AUTH_TAG_LEN, AuthProtocol, PrivProtocol, random_bytes,
};

// RFC 2202 known-answer vectors with keys at least one digest wide
// (shorter keys are outside the USM contract).

#[test]
fn hmac_md5_case_3() {
    let key = [0xaa; 16];
    let data = [0xdd; 50];
    let mac = AuthProtocol::HmacMd5.keyed_hash(&key, &data).expect("hmac");
    assert_eq!(mac, hex!("56be34521d144c88dbb8c733f0e8b3f6"));
}

#[test]
fn hmac_sha1_case_3() {
    let key = [0xaa; 20];
    let data = [0xdd; 50];
    let mac = AuthProtocol::HmacSha1.keyed_hash(&key, &data).expect("hmac");
    assert_eq!(mac, hex!("125d7342b9ac11cd91a39af48aa17b4f63f175d3"));
}

#[test]
fn truncated_tags_are_twelve_bytes() {
    let key = [0xaa; 20];
    let tag = AuthProtocol::HmacSha1
        .auth_tag(&key, b"message")
        .expect("tag");
    assert_eq!(tag.len(), AUTH_TAG_LEN);
    let full = AuthProtocol::HmacSha1
        .keyed_hash(&key, b"message")
        .expect("hmac");
    assert_eq!(&full[..AUTH_TAG_LEN], &tag[..]);
}

#[test]
fn short_keys_are_rejected() {
    assert!(AuthProtocol::HmacMd5.keyed_hash(b"Jefe", b"data").is_err());
    assert!(
        AuthProtocol::HmacSha1
            .keyed_hash(&[0u8; 19], b"data")
            .is_err()
    );
}

#[test]
fn des_rejects_ragged_ciphertext() {
    let key = hex!("0102030405060708090a0b0c0d0e0f10");
    let iv = hex!("1112131415161718");
    // Not a whole number of blocks.
    assert!(PrivProtocol::DesCbc.decrypt(&key, &iv, &[0u8; 13]).is_err());
    assert!(PrivProtocol::DesCbc.decrypt(&key, &iv, &[]).is_err());
}

#[test]
fn des_block_aligned_input_gets_no_pad() {
    let key = hex!("0102030405060708090a0b0c0d0e0f10");
    let iv = hex!("1112131415161718");
    let plaintext = [0x42u8; 32];
    let ct = PrivProtocol::DesCbc
        .encrypt(&key, &iv, &plaintext)
        .expect("encrypt");
    assert_eq!(ct.len(), 32);
    let pt = PrivProtocol::DesCbc.decrypt(&key, &iv, &ct).expect("decrypt");
    assert_eq!(pt, plaintext);
}

#[test]
fn aes_decrypt_with_wrong_iv_scrambles() {
    let key = hex!("000102030405060708090a0b0c0d0e0f");
    let iv = hex!("101112131415161718191a1b1c1d1e1f");
    let wrong_iv = hex!("201112131415161718191a1b1c1d1e1f");
    let plaintext = b"sensitive scoped pdu";
    let ct = PrivProtocol::AesCfb128
        .encrypt(&key, &iv, plaintext)
        .expect("encrypt");
    let pt = PrivProtocol::AesCfb128
        .decrypt(&key, &wrong_iv, &ct)
        .expect("decrypt");
    assert_ne!(&pt[..], &plaintext[..]);
}

#[test]
fn random_bytes_are_fresh() {
    let a = random_bytes(16);
    let b = random_bytes(16);
    assert_eq!(a.len(), 16);
    assert_ne!(a, b);
}
