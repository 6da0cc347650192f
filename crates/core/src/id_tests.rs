// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::TaskId;

#[test]
fn short_truncates_long_ids() {
    assert_eq!("abcdefgh".short(4), "abcd");
    assert_eq!("ab".short(4), "ab");
    assert_eq!("".short(4), "");
}

#[test]
fn task_id_display_roundtrip() {
    let id = TaskId::new("build-core");
    assert_eq!(id.to_string(), "build-core");
    assert_eq!(id.as_str(), "build-core");
}

#[test]
fn task_id_from_str() {
    let id: TaskId = "t1".into();
    assert_eq!(id, "t1");
}

#[test]
fn task_id_serde_is_transparent() {
    let id = TaskId::new("t-42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"t-42\"");

    let parsed: TaskId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn task_id_ordering_is_lexicographic() {
    let mut ids = vec![TaskId::new("c"), TaskId::new("a"), TaskId::new("b")];
    ids.sort();
    assert_eq!(ids, vec![TaskId::new("a"), TaskId::new("b"), TaskId::new("c")]);
}
