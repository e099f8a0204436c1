// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use snmp_client_rs::{
    asn1::{
        TAG_GAUGE32, TAG_INTEGER, TAG_OCTET_STR, TAG_OBJECT_ID, TAG_SEQUENCE,
        build::ForwardBuilder, parse::Reader, rbuild::ReverseBuilder,
    },
    models::oid::MAX_OID_LEN,
};

/// The sign grid the codec must get right on both the build and parse
/// sides, including the Integer/Unsigned32 distinction by tag.
#[test]
fn integer_sign_grid() {
    let grid: [i64; 11] = [
        -1,
        0,
        1,
        127,
        128,
        255,
        256,
        32767,
        32768,
        i32::MAX as i64,
        i32::MIN as i64,
    ];
    for v in grid {
        let mut b = ForwardBuilder::new();
        b.push_int(TAG_INTEGER, v).expect("build int");
        let bytes = b.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_i64(TAG_INTEGER).expect("parse int"), v, "value {v}");

        // The same numeric value under the unsigned tag is a different
        // TLV and must not parse as INTEGER.
        if v >= 0 {
            let mut b = ForwardBuilder::new();
            b.push_uint(TAG_GAUGE32, v as u64).expect("build uint");
            let bytes = b.into_bytes();
            assert_eq!(bytes[0], TAG_GAUGE32);
            let mut r = Reader::new(&bytes);
            assert!(r.read_i64(TAG_INTEGER).is_err());
            let mut r = Reader::new(&bytes);
            assert_eq!(r.read_u32(TAG_GAUGE32).expect("parse uint"), v as u32);
        }
    }
}

#[test]
fn zero_length_string_encoding() {
    let mut b = ForwardBuilder::new();
    b.push_octets(TAG_OCTET_STR, &[]).expect("build");
    assert_eq!(b.into_bytes(), vec![0x04, 0x00]);

    let mut r = Reader::new(&[0x04, 0x00]);
    let s = r.read_octets(TAG_OCTET_STR).expect("parse");
    assert!(s.is_empty());
}

/// Forward and reverse builders must agree bytewise on a nested message
/// shape with every length form in play.
#[test]
fn forward_reverse_equivalence() {
    let payload = vec![0x5a; 300];

    let mut fwd = ForwardBuilder::new();
    let outer = fwd.begin_seq(TAG_SEQUENCE);
    fwd.push_int(TAG_INTEGER, 3).expect("int");
    let inner = fwd.begin_seq(TAG_SEQUENCE);
    fwd.push_int(TAG_INTEGER, 0x7fffffff).expect("int");
    fwd.push_octets(TAG_OCTET_STR, &payload).expect("octets");
    fwd.end_seq(inner).expect("inner");
    fwd.push_oid(TAG_OBJECT_ID, &[1, 3, 6, 1, 2, 1, 1, 5, 0])
        .expect("oid");
    fwd.end_seq(outer).expect("outer");

    let mut rev = ReverseBuilder::new();
    let outer = rev.mark();
    rev.prepend_oid(TAG_OBJECT_ID, &[1, 3, 6, 1, 2, 1, 1, 5, 0])
        .expect("oid");
    let inner = rev.mark();
    rev.prepend_octets(TAG_OCTET_STR, &payload).expect("octets");
    rev.prepend_int(TAG_INTEGER, 0x7fffffff).expect("int");
    rev.wrap_seq(TAG_SEQUENCE, inner).expect("inner");
    rev.prepend_int(TAG_INTEGER, 3).expect("int");
    rev.wrap_seq(TAG_SEQUENCE, outer).expect("outer");

    assert_eq!(fwd.into_bytes(), rev.into_bytes());
}

/// OID round-trips across the full allowed length range, plus the
/// first-pair compaction edge cases.
#[test]
fn oid_lengths_and_compaction() {
    // Empty OID and every length from the minimal pair up to 128.
    let mut cases: Vec<Vec<u32>> = vec![Vec::new()];
    for len in 2..=MAX_OID_LEN {
        let mut oid = vec![1u32, 3];
        for i in 2..len {
            oid.push((i as u32 * 7919) % 100_000);
        }
        cases.push(oid);
    }
    // Compaction edges: both subids folded into the first octet.
    cases.push(vec![0, 0]);
    cases.push(vec![0, 39]);
    cases.push(vec![1, 0]);
    cases.push(vec![1, 39]);
    cases.push(vec![2, 0]);
    cases.push(vec![2, 999]);
    cases.push(vec![2, u32::MAX - 80]);

    for oid in cases {
        let mut b = ForwardBuilder::new();
        b.push_oid(TAG_OBJECT_ID, &oid).expect("build oid");
        let bytes = b.into_bytes();
        let mut r = Reader::new(&bytes);
        let parsed = r.read_oid(TAG_OBJECT_ID).expect("parse oid");
        assert_eq!(parsed, oid, "oid {oid:?}");
    }
}

#[test]
fn parser_rejects_overlong_subid() {
    // Six continuation octets exceed 32 bits.
    let mut r = Reader::new(&[0x06, 0x07, 0x2b, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
    assert!(r.read_oid(TAG_OBJECT_ID).is_err());
}

#[test]
fn truncated_sequences_fail_cleanly() {
    // Declared length runs past the buffer.
    let mut r = Reader::new(&[0x30, 0x10, 0x02, 0x01, 0x05]);
    assert!(r.read_constructed(TAG_SEQUENCE).is_err());

    // Length-of-length too wide.
    let mut r = Reader::new(&[0x30, 0x85, 0x01, 0x01, 0x01, 0x01, 0x01]);
    assert!(r.read_constructed(TAG_SEQUENCE).is_err());
}
