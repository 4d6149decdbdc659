// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::link::Link;
use std::rc::Rc;

fn silent_link(id: u64) -> Rc<Link> {
    Link::new(id, true, false, Box::new(|_frame: &crate::frame::Frame| {}))
}

fn dummy_list_stream(responder: &Rc<Link>) -> Stream {
    Stream::List { path: "/x".to_owned(), remote_rid: 1, responder: Rc::downgrade(responder) }
}

// ── insert / rid uniqueness ─────────────────────────────────────────────

#[test]
fn insert_succeeds_on_fresh_rid() {
    let link = silent_link(1);
    let mut table = StreamTable::new();
    assert!(table.insert(7, dummy_list_stream(&link)).is_ok());
    assert_eq!(table.len(), 1);
}

#[test]
fn insert_fails_and_returns_value_on_occupied_rid() {
    let link = silent_link(1);
    let mut table = StreamTable::new();
    table.insert(7, dummy_list_stream(&link)).unwrap();

    let second = dummy_list_stream(&link);
    let err = table.insert(7, second).unwrap_err();
    assert!(matches!(err, Stream::List { .. }));
    assert_eq!(table.len(), 1);
}

// ── get / remove ─────────────────────────────────────────────────────────

#[test]
fn get_and_remove_round_trip() {
    let link = silent_link(1);
    let mut table = StreamTable::new();
    table.insert(3, dummy_list_stream(&link)).unwrap();

    assert!(table.get(3).is_some());
    let removed = table.remove(3);
    assert!(removed.is_some());
    assert!(table.get(3).is_none());
    assert!(table.is_empty());
}

#[test]
fn remove_missing_rid_returns_none() {
    let mut table = StreamTable::new();
    assert!(table.remove(99).is_none());
}

// ── drain ────────────────────────────────────────────────────────────────

#[test]
fn drain_returns_ownership_of_every_entry() {
    let link = silent_link(1);
    let mut table = StreamTable::new();
    table.insert(1, dummy_list_stream(&link)).unwrap();
    table.insert(2, dummy_list_stream(&link)).unwrap();

    let drained = table.drain();
    assert_eq!(drained.len(), 2);
    assert!(table.is_empty());
}
