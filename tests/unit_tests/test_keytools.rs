// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use hex_literal::hex;
use snmp_client_rs::security::{
    crypto::AuthProtocol,
    keytools::{
        decode_keychange, encode_keychange, generate_ku, generate_kul,
        passphrase_to_kul,
    },
};

// RFC 3414 appendix A: "maplesyrup" localized to engine
// 00:00:00:00:00:00:00:00:00:00:00:02.
#[test]
fn rfc3414_md5_chain() {
    let ku = generate_ku(AuthProtocol::HmacMd5, b"maplesyrup").expect("ku");
    assert_eq!(ku, hex!("9faf3283884e92834ebc9847d8edd963"));

    let kul = generate_kul(
        AuthProtocol::HmacMd5,
        &hex!("000000000000000000000002"),
        &ku,
    )
    .expect("kul");
    assert_eq!(kul, hex!("526f5eed9fcce26f8964c2930787d82b"));

    let direct = passphrase_to_kul(
        AuthProtocol::HmacMd5,
        &hex!("000000000000000000000002"),
        b"maplesyrup",
    )
    .expect("kul");
    assert_eq!(direct, kul);
}

#[test]
fn rfc3414_sha1_chain() {
    let ku = generate_ku(AuthProtocol::HmacSha1, b"maplesyrup").expect("ku");
    assert_eq!(ku, hex!("9fb5cc0381497b3793528939ff788d5d79145211"));

    let kul = generate_kul(
        AuthProtocol::HmacSha1,
        &hex!("000000000000000000000002"),
        &ku,
    )
    .expect("kul");
    assert_eq!(kul, hex!("6695febc9288e36282235fc7151f128497b38f3f"));
}

#[test]
fn localization_depends_on_engine() {
    let ku = generate_ku(AuthProtocol::HmacMd5, b"maplesyrup").expect("ku");
    let one = generate_kul(AuthProtocol::HmacMd5, &[0x01; 12], &ku).expect("kul");
    let two = generate_kul(AuthProtocol::HmacMd5, &[0x02; 12], &ku).expect("kul");
    assert_ne!(one, two);
    assert!(generate_kul(AuthProtocol::HmacMd5, &[], &ku).is_err());
}

#[test]
fn passphrase_minimum_length() {
    assert!(generate_ku(AuthProtocol::HmacMd5, b"1234567").is_err());
    assert!(generate_ku(AuthProtocol::HmacMd5, b"12345678").is_ok());
}

#[test]
fn keychange_recovers_only_with_right_old_key() {
    let old = generate_ku(AuthProtocol::HmacSha1, b"correct horse").expect("ku");
    let new = generate_ku(AuthProtocol::HmacSha1, b"battery staple").expect("ku");
    let kc = encode_keychange(AuthProtocol::HmacSha1, &old, &new).expect("encode");

    let recovered =
        decode_keychange(AuthProtocol::HmacSha1, &old, &kc).expect("decode");
    assert_eq!(recovered, new);

    let wrong = generate_ku(AuthProtocol::HmacSha1, b"wrong-key!").expect("ku");
    let garbage =
        decode_keychange(AuthProtocol::HmacSha1, &wrong, &kc).expect("decode");
    assert_ne!(garbage, new);
}

#[test]
fn keychange_length_contract() {
    let old = vec![0x11; 16];
    let new = vec![0x22; 16];
    let kc = encode_keychange(AuthProtocol::HmacMd5, &old, &new).expect("encode");
    assert_eq!(kc.len(), 32);
    // Mismatched lengths are refused on both sides.
    assert!(encode_keychange(AuthProtocol::HmacMd5, &old, &new[..8]).is_err());
    assert!(decode_keychange(AuthProtocol::HmacMd5, &old, &kc[..24]).is_err());
}
