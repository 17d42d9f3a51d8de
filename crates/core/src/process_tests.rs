// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process slot tests

use super::*;

#[test]
fn index_matches_table_order() {
    for (i, ptype) in ProcessType::ALL.iter().enumerate() {
        assert_eq!(ptype.index(), i);
    }
}

#[test]
fn names_use_hyphenated_forms() {
    assert_eq!(ProcessType::PreStart.name(), "pre-start");
    assert_eq!(ProcessType::Main.name(), "main");
    assert_eq!(ProcessType::PostStop.name(), "post-stop");
}

#[test]
fn exit_code_encodes_in_low_byte() {
    assert_eq!(ExitStatus::Code(0).encode(), 0);
    assert_eq!(ExitStatus::Code(3).encode(), 3);
    assert_eq!(ExitStatus::Code(255).encode(), 255);
}

#[test]
fn signal_encodes_in_high_byte() {
    assert_eq!(ExitStatus::Signal(9).encode(), 9 << 8);
    assert_eq!(ExitStatus::Signal(15).encode(), 15 << 8);
    assert!(ExitStatus::Signal(15).is_signal());
}

#[test]
fn signal_names_round_trip() {
    for sig in [1, 2, 9, 15] {
        let name = signal_name(sig).unwrap();
        assert_eq!(signal_number(name), Some(sig));
    }
}

#[test]
fn signal_number_accepts_sig_prefix() {
    assert_eq!(signal_number("SIGTERM"), Some(15));
    assert_eq!(signal_number("TERM"), Some(15));
    assert_eq!(signal_number("NOSUCH"), None);
}
