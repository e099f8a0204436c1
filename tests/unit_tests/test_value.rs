// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use snmp_client_rs::{
    asn1::{build::ForwardBuilder, parse::Reader, rbuild::ReverseBuilder},
    models::{oid::Oid, value::Value},
};

fn round_trip(value: Value) {
    let mut fwd = ForwardBuilder::new();
    value.build(&mut fwd).expect("forward build");
    let fwd_bytes = fwd.into_bytes();

    let mut rev = ReverseBuilder::new();
    value.rbuild(&mut rev).expect("reverse build");
    assert_eq!(fwd_bytes, rev.into_bytes(), "builders disagree on {value:?}");

    let mut r = Reader::new(&fwd_bytes);
    let parsed = Value::parse(&mut r).expect("parse");
    assert!(r.is_empty(), "trailing bytes after {value:?}");
    assert_eq!(parsed, value);
}

#[test]
fn every_variant_round_trips() {
    let oid = Oid::from_slice(&[1, 3, 6, 1, 4, 1, 8072, 3, 2, 10]).expect("oid");
    let cases = vec![
        Value::Integer(-2147483648),
        Value::Integer(2147483647),
        Value::Counter32(0),
        Value::Counter32(u32::MAX),
        Value::Gauge32(4294967295),
        Value::TimeTicks(123456789),
        Value::UInteger(42),
        Value::Counter64(u64::MAX),
        Value::Counter64(0),
        Value::OctetString(Vec::new()),
        Value::OctetString(b"public".to_vec()),
        Value::OctetString(vec![0u8; 1000]),
        Value::IpAddress([192, 0, 2, 1]),
        Value::Opaque(vec![0xde, 0xad, 0xbe, 0xef]),
        Value::BitString(vec![0x06, 0xc0]),
        Value::ObjectIdentifier(oid),
        Value::Null,
        Value::NoSuchObject,
        Value::NoSuchInstance,
        Value::EndOfMibView,
        Value::OpaqueFloat(1.5e-3),
        Value::OpaqueDouble(-2.25e100),
        Value::OpaqueI64(i64::MIN),
        Value::OpaqueI64(i64::MAX),
        Value::OpaqueU64(u64::MAX),
        Value::OpaqueU64(0),
    ];
    for value in cases {
        round_trip(value);
    }
}

#[test]
fn exception_markers_have_distinct_tags() {
    for (value, tag) in [
        (Value::NoSuchObject, 0x80),
        (Value::NoSuchInstance, 0x81),
        (Value::EndOfMibView, 0x82),
    ] {
        let mut b = ForwardBuilder::new();
        value.build(&mut b).expect("build");
        assert_eq!(b.into_bytes(), vec![tag, 0x00]);
    }
}

#[test]
fn raw_opaque_survives_unknown_extension() {
    // An Opaque that happens not to carry the 9F-7x prefix stays raw.
    let value = Value::Opaque(vec![0x9f, 0x01, 0x00]);
    let mut b = ForwardBuilder::new();
    value.build(&mut b).expect("build");
    let bytes = b.into_bytes();
    let mut r = Reader::new(&bytes);
    // 9F with an unknown second tag is preserved as plain bytes.
    assert_eq!(
        Value::parse(&mut r).expect("parse"),
        Value::Opaque(vec![0x9f, 0x01, 0x00])
    );
}
