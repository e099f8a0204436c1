// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use hex_literal::hex;
use snmp_client_rs::{
    error::ErrorKind,
    models::{
        message::{
            MsgFlags, build_global_data, check_packet, parse_envelope,
            parse_scoped_pdu,
        },
        pdu::{Pdu, PduType},
        value::Value,
    },
    security::{
        IncomingParams, OutgoingParams, SecurityLevel, SecurityModel,
        SessionSecurity, USM_SEC_MODEL, usm::Usm,
    },
    stats::Stats,
};

fn noauth_usm() -> Usm {
    Usm::new(
        hex!("80001f888071be3c6e4d071d00000000").to_vec(),
        Arc::new(Stats::new()),
    )
}

fn noauth_session(engine_id: &[u8]) -> SessionSecurity {
    SessionSecurity {
        security_model: USM_SEC_MODEL,
        security_level: SecurityLevel::NoAuthNoPriv,
        security_engine_id: engine_id.to_vec(),
        ..Default::default()
    }
}

fn encode_get(usm: &Usm, pdu: &Pdu, msg_id: i32) -> Vec<u8> {
    let sec = noauth_session(&pdu.security_engine_id);
    let global = build_global_data(
        msg_id,
        65507,
        MsgFlags::for_message(pdu.security_level, pdu.command),
        USM_SEC_MODEL,
    )
    .expect("global data");
    let scoped =
        snmp_client_rs::models::message::build_scoped_pdu(pdu).expect("scoped");
    usm.encode_forward(&OutgoingParams {
        global_data: &global,
        scoped_pdu: &scoped,
        sec: &sec,
        max_msg_size: 65507,
    })
    .expect("encode")
}

/// End-to-end scenario: a noAuthNoPriv GET of sysName.0 with msgID=42 and
/// reqID=7, fed back through the parser, yields the original PDU.
#[test]
fn noauth_get_round_trip() {
    let usm = noauth_usm();

    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 7;
    pdu.context_engine_id = vec![0x80, 0x00, 0x00, 0x00, 0x06];
    pdu.security_engine_id = usm.local_engine_id().to_vec();
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));
    let whole = encode_get(&usm, &pdu, 42);

    let envelope = parse_envelope(&whole).expect("envelope");
    assert_eq!(envelope.msg_id, 42);
    assert_eq!(envelope.security_model, USM_SEC_MODEL);
    assert_eq!(envelope.security_level, SecurityLevel::NoAuthNoPriv);
    assert!(envelope.flags.contains(MsgFlags::REPORTABLE));

    let decoded = usm
        .decode(&IncomingParams {
            whole_msg: &whole,
            security_level: envelope.security_level,
            reportable: true,
            sec_params: envelope.sec_params,
            sec_params_offset: envelope.sec_params_offset,
            msg_data: envelope.msg_data,
            sec: None,
        })
        .expect("decode");

    let (context_engine_id, context_name, parsed) =
        parse_scoped_pdu(&decoded.scoped_pdu).expect("scoped pdu");
    assert_eq!(context_engine_id, vec![0x80, 0x00, 0x00, 0x00, 0x06]);
    assert!(context_name.is_empty());
    assert_eq!(parsed.command, PduType::Get);
    assert_eq!(parsed.request_id, 7);
    assert_eq!(parsed.varbind_count(), 1);
    assert_eq!(
        parsed.varbinds[0].name.to_string(),
        "1.3.6.1.2.1.1.5.0"
    );
    assert_eq!(parsed.varbinds[0].value, Value::Null);
}

/// A message advertising msgMaxSize=100 violates the 484 floor and must
/// be rejected as an ASN.1 parse error.
#[test]
fn undersized_msg_max_size_rejected() {
    let usm = noauth_usm();
    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 1;
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));

    let sec = noauth_session(&[]);
    let global = build_global_data(
        5,
        100,
        MsgFlags::for_message(SecurityLevel::NoAuthNoPriv, PduType::Get),
        USM_SEC_MODEL,
    )
    .expect("global data");
    let scoped =
        snmp_client_rs::models::message::build_scoped_pdu(&pdu).expect("scoped");
    let whole = usm
        .encode_forward(&OutgoingParams {
            global_data: &global,
            scoped_pdu: &scoped,
            sec: &sec,
            max_msg_size: 65507,
        })
        .expect("encode");

    let err = parse_envelope(&whole).expect_err("must reject");
    assert_eq!(err.kind(), ErrorKind::Asn1Parse);
}

/// msgFlags with priv set but auth clear is an invalid message.
#[test]
fn priv_without_auth_rejected() {
    let usm = noauth_usm();
    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 2;
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));

    let sec = noauth_session(&[]);
    let global = build_global_data(
        6,
        65507,
        MsgFlags::PRIV | MsgFlags::REPORTABLE,
        USM_SEC_MODEL,
    )
    .expect("global data");
    let scoped =
        snmp_client_rs::models::message::build_scoped_pdu(&pdu).expect("scoped");
    let whole = usm
        .encode_forward(&OutgoingParams {
            global_data: &global,
            scoped_pdu: &scoped,
            sec: &sec,
            max_msg_size: 65507,
        })
        .expect("encode");

    let err = parse_envelope(&whole).expect_err("must reject");
    assert_eq!(err.kind(), ErrorKind::InvalidMsg);
}

/// The whole-message framing helper drives stream reassembly.
#[test]
fn check_packet_on_real_message() {
    let usm = noauth_usm();
    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 3;
    pdu.security_engine_id = usm.local_engine_id().to_vec();
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));
    let whole = encode_get(&usm, &pdu, 9);

    assert_eq!(
        check_packet(&whole).expect("framed"),
        Some(whole.len()),
        "framing must match the encoded length"
    );
    // A prefix is incomplete, not an error.
    assert_eq!(check_packet(&whole[..1]).expect("partial"), None);
}
