// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use hex_literal::hex;
use snmp_client_rs::{
    error::ErrorKind,
    models::{
        message::{MsgFlags, build_global_data, build_scoped_pdu, parse_envelope,
            parse_scoped_pdu},
        pdu::{Pdu, PduType},
        value::Value,
    },
    security::{
        IncomingParams, OutgoingParams, SecurityLevel, SecurityModel,
        SessionSecurity, USM_SEC_MODEL,
        crypto::{AuthProtocol, PrivProtocol},
        keytools,
        usm::{Usm, UsmUser},
    },
    stats::{StatId, Stats},
};

const AGENT_ENGINE: [u8; 12] = hex!("80001f8880e9bd0300000000");

fn fresh_usm() -> (Usm, Arc<Stats>) {
    let stats = Arc::new(Stats::new());
    let usm = Usm::new(
        hex!("80001f888071be3c6e4d071d00000000").to_vec(),
        Arc::clone(&stats),
    );
    (usm, stats)
}

fn bert(auth: AuthProtocol, privacy: Option<PrivProtocol>) -> UsmUser {
    let auth_key =
        keytools::passphrase_to_kul(auth, &AGENT_ENGINE, b"authpass123")
            .expect("auth kul");
    let priv_key = privacy
        .map(|_| {
            let mut kul =
                keytools::passphrase_to_kul(auth, &AGENT_ENGINE, b"privpass456")
                    .expect("priv kul");
            kul.truncate(16);
            kul
        })
        .unwrap_or_default();
    UsmUser {
        engine_id: AGENT_ENGINE.to_vec(),
        user_name: "bert".into(),
        security_name: "bert".into(),
        auth_protocol: Some(auth),
        auth_key,
        priv_protocol: privacy,
        priv_key,
        ..Default::default()
    }
}

fn session_for(user: &UsmUser, level: SecurityLevel) -> SessionSecurity {
    SessionSecurity {
        security_model: USM_SEC_MODEL,
        security_name: user.user_name.clone(),
        security_level: level,
        security_engine_id: user.engine_id.clone(),
        auth_protocol: user.auth_protocol,
        auth_key: user.auth_key.clone(),
        priv_protocol: user.priv_protocol,
        priv_key: user.priv_key.clone(),
        ..Default::default()
    }
}

fn encode(usm: &Usm, sec: &SessionSecurity, pdu: &Pdu, msg_id: i32) -> Vec<u8> {
    let global = build_global_data(
        msg_id,
        65507,
        MsgFlags::for_message(sec.security_level, pdu.command),
        USM_SEC_MODEL,
    )
    .expect("global data");
    let scoped = build_scoped_pdu(pdu).expect("scoped");
    usm.encode_forward(&OutgoingParams {
        global_data: &global,
        scoped_pdu: &scoped,
        sec,
        max_msg_size: 65507,
    })
    .expect("encode")
}

fn decode(usm: &Usm, whole: &[u8]) -> Result<Pdu, snmp_client_rs::error::SnmpError> {
    let envelope = parse_envelope(whole).expect("envelope");
    let decoded = usm.decode(&IncomingParams {
        whole_msg: whole,
        security_level: envelope.security_level,
        reportable: envelope.flags.contains(MsgFlags::REPORTABLE),
        sec_params: envelope.sec_params,
        sec_params_offset: envelope.sec_params_offset,
        msg_data: envelope.msg_data,
        sec: None,
    })?;
    let (_, _, pdu) = parse_scoped_pdu(&decoded.scoped_pdu).expect("scoped");
    Ok(pdu)
}

/// authPriv round-trip with SHA1/AES, the second transform pair.
#[test]
fn sha1_aes_auth_priv_round_trip() {
    let (usm, _) = fresh_usm();
    let user = bert(AuthProtocol::HmacSha1, Some(PrivProtocol::AesCfb128));
    usm.add_user(user.clone()).expect("add user");
    usm.set_engine_time(&AGENT_ENGINE, 3, 500, true);

    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 1234;
    pdu.context_engine_id = AGENT_ENGINE.to_vec();
    pdu.add_null_varbind("1.3.6.1.2.1.1.3.0".parse().expect("oid"));

    let sec = session_for(&user, SecurityLevel::AuthPriv);
    let whole = encode(&usm, &sec, &pdu, 77);

    // The scoped PDU must not appear in clear anywhere in the message.
    let scoped = build_scoped_pdu(&pdu).expect("scoped");
    assert!(
        !whole.windows(scoped.len()).any(|w| w == scoped),
        "plaintext scoped PDU leaked into the encrypted message"
    );

    let parsed = decode(&usm, &whole).expect("decode");
    assert_eq!(parsed.request_id, 1234);
    assert_eq!(parsed.varbinds[0].name.to_string(), "1.3.6.1.2.1.1.3.0");
}

#[test]
fn empty_engine_id_is_discovery() {
    let (usm, stats) = fresh_usm();
    let user = bert(AuthProtocol::HmacMd5, None);
    usm.add_user(user.clone()).expect("add user");

    let mut probe = Pdu::new(PduType::Get);
    probe.request_id = 1;
    probe.add_null_varbind("1.3.6.1.6.3.10.2.1.1.0".parse().expect("oid"));
    let sec = SessionSecurity {
        security_model: USM_SEC_MODEL,
        security_level: SecurityLevel::NoAuthNoPriv,
        ..Default::default()
    };
    let whole = encode(&usm, &sec, &probe, 2);

    let err = decode(&usm, &whole).expect_err("discovery must error");
    assert_eq!(err.kind(), ErrorKind::UsmUnknownEngineId);
    assert_eq!(stats.get(StatId::UsmStatsUnknownEngineIds), 1);

    // The matching report carries the counter instance and our engine id.
    let mut request = Pdu::new(PduType::Get);
    request.msg_id = 2;
    let report = usm
        .make_report(&request, ErrorKind::UsmUnknownEngineId)
        .expect("report");
    assert_eq!(report.command, PduType::Report);
    assert_eq!(report.security_engine_id, usm.local_engine_id());
    assert_eq!(
        report.varbinds[0].name.to_string(),
        "1.3.6.1.6.3.15.1.1.4.0"
    );
    assert_eq!(report.varbinds[0].value, Value::Counter32(1));
}

#[test]
fn unknown_user_is_counted_and_reported() {
    let (usm, stats) = fresh_usm();
    usm.set_engine_time(&AGENT_ENGINE, 1, 10, true);

    // "alice" exists nowhere in the table.
    let ghost = UsmUser {
        engine_id: AGENT_ENGINE.to_vec(),
        user_name: "alice".into(),
        security_name: "alice".into(),
        auth_protocol: Some(AuthProtocol::HmacMd5),
        auth_key: vec![0x55; 16],
        ..Default::default()
    };
    let sec = session_for(&ghost, SecurityLevel::AuthNoPriv);
    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 9;
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));
    let whole = encode(&usm, &sec, &pdu, 10);

    let err = decode(&usm, &whole).expect_err("unknown user");
    assert_eq!(err.kind(), ErrorKind::UsmUnknownUser);
    assert_eq!(stats.get(StatId::UsmStatsUnknownUserNames), 1);
}

#[test]
fn level_beyond_user_capability_is_unsupported() {
    let (usm, stats) = fresh_usm();
    // bert has auth but no privacy.
    let user = bert(AuthProtocol::HmacMd5, None);
    usm.add_user(user.clone()).expect("add user");
    usm.set_engine_time(&AGENT_ENGINE, 1, 10, true);

    let mut sec = session_for(&user, SecurityLevel::AuthPriv);
    sec.priv_protocol = Some(PrivProtocol::DesCbc);
    sec.priv_key = vec![0x66; 16];
    let mut pdu = Pdu::new(PduType::Get);
    pdu.request_id = 3;
    pdu.add_null_varbind("1.3.6.1.2.1.1.5.0".parse().expect("oid"));
    let whole = encode(&usm, &sec, &pdu, 11);

    let err = decode(&usm, &whole).expect_err("level mismatch");
    assert_eq!(err.kind(), ErrorKind::UsmUnsupportedLevel);
    assert_eq!(stats.get(StatId::UsmStatsUnsupportedSecLevels), 1);
}

/// Boots advancing by one updates the cache exactly once; replaying the
/// same values afterwards changes nothing.
#[test]
fn boots_advance_updates_lcd_once() {
    let (usm, _) = fresh_usm();
    usm.set_engine_time(&AGENT_ENGINE, 4, 100, true);

    usm.set_engine_time(&AGENT_ENGINE, 5, 10, true);
    let (boots_after, time_after) = usm.engine_time(&AGENT_ENGINE);
    assert_eq!(boots_after, 5);

    usm.set_engine_time(&AGENT_ENGINE, 5, 10, true);
    let (boots_again, time_again) = usm.engine_time(&AGENT_ENGINE);
    assert_eq!(boots_again, 5);
    // Only elapsed wall time may move the estimate, not the replay.
    assert!(time_again >= time_after && time_again <= time_after + 2);

    // A regression attempt is ignored once authenticated.
    usm.set_engine_time(&AGENT_ENGINE, 4, 500, true);
    assert_eq!(usm.engine_time(&AGENT_ENGINE).0, 5);
}
