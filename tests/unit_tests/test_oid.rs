// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::cmp::Ordering;

use snmp_client_rs::models::oid::Oid;

#[test]
fn compare_prefix_and_subid_rules() {
    let a = Oid::from_slice(&[1, 3, 6, 1]).expect("oid");
    let b = Oid::from_slice(&[1, 3, 6, 1, 1]).expect("oid");
    assert_eq!(a.compare(&b), Ordering::Less);

    let c = Oid::from_slice(&[1, 3, 6, 2]).expect("oid");
    let d = Oid::from_slice(&[1, 3, 6, 1, 99]).expect("oid");
    assert_eq!(c.compare(&d), Ordering::Greater);

    let e = Oid::from_slice(&[1, 3, 6, 1, 2, 1]).expect("oid");
    assert_eq!(e.compare(&e.clone()), Ordering::Equal);
}

#[test]
fn prefix_matching() {
    let base: Oid = "1.3.6.1.6.3.15.1.1.2".parse().expect("oid");
    let instance: Oid = "1.3.6.1.6.3.15.1.1.2.0".parse().expect("oid");
    assert!(base.is_prefix_of(&instance));
    assert!(!instance.is_prefix_of(&base));
    assert!(base.is_prefix_of(&base));
}

#[test]
fn ordering_is_total_for_sorting() {
    let mut oids: Vec<Oid> = ["1.3.6.2", "1.3.6.1.99", "1.3.6.1", "1.3"]
        .iter()
        .map(|s| s.parse().expect("oid"))
        .collect();
    oids.sort();
    let sorted: Vec<String> = oids.iter().map(Oid::to_string).collect();
    assert_eq!(sorted, vec!["1.3", "1.3.6.1", "1.3.6.1.99", "1.3.6.2"]);
}
