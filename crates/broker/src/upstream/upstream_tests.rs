// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::broker::Broker;
use crate::frame::{Frame, Request};
use crate::link::{Link, Sink};
use crate::node::resolve;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

fn unique_dir() -> std::path::PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("dslink-broker-upstream-test-{}-{n}", std::process::id()))
}

struct RecordingSink {
    frames: Rc<RefCell<Vec<Frame>>>,
}

impl Sink for RecordingSink {
    fn send(&self, frame: &Frame) {
        self.frames.borrow_mut().push(frame.clone());
    }
}

fn recording_link(id: u64) -> (Rc<Link>, Rc<RefCell<Vec<Frame>>>) {
    let frames = Rc::new(RefCell::new(Vec::new()));
    let link = Link::new(id, true, false, Box::new(RecordingSink { frames: Rc::clone(&frames) }));
    (link, frames)
}

fn add_connection_request(rid: u32, name: &str) -> Request {
    Request {
        rid,
        method: Some("invoke".to_owned()),
        path: Some("/sys/upstream/add_connection".to_owned()),
        params: Some(serde_json::json!({"name": name, "url": "http://x", "brokerName": "b"})),
    }
}

// ── install() builds the static surface ───────────────────────────────────

#[test]
fn install_creates_upstream_and_add_connection_nodes() {
    let broker = Broker::new(UpstreamRegistryConfig::new(unique_dir())).unwrap();
    let upstream = resolve(&broker.root, "/sys/upstream").expect("upstream node should exist");
    assert!(upstream.borrow().children.contains_key("add_connection"));
    let action = resolve(&broker.root, "/sys/upstream/add_connection").unwrap();
    assert_eq!(action.borrow().metadata.get("$invokable").and_then(Value::as_str), Some("config"));
}

// ── add_connection: invoke round trip ─────────────────────────────────────

#[test]
fn add_connection_builds_subtree_and_persists_to_disk() {
    let dir = unique_dir();
    let broker = Broker::new(UpstreamRegistryConfig::new(dir.clone())).unwrap();
    let (link, frames) = recording_link(1);

    broker.handle(&link, &serde_json::to_value(Frame { requests: Some(vec![add_connection_request(9, "u1")]), responses: None }).unwrap());

    let resp = &frames.borrow()[0].responses.as_ref().unwrap()[0];
    assert_eq!(resp.rid, 9);
    assert_eq!(resp.stream.as_deref(), Some("closed"));
    assert!(resp.error.is_none());

    let node = resolve(&broker.root, "/sys/upstream/u1").expect("subtree should exist");
    for expected in ["name", "brokerName", "url", "token", "enabled", "delete"] {
        assert!(node.borrow().children.contains_key(expected), "missing {expected}");
    }

    let on_disk = persist::load_all(&dir).unwrap();
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[0].name, "u1");

    std::fs::remove_dir_all(&dir).ok();
}

// ── duplicate upstream rejected ───────────────────────────────────────────

#[test]
fn add_connection_with_duplicate_name_is_rejected_and_does_not_touch_disk() {
    let dir = unique_dir();
    let broker = Broker::new(UpstreamRegistryConfig::new(dir.clone())).unwrap();
    let (link, frames) = recording_link(1);

    broker.handle(&link, &serde_json::to_value(Frame { requests: Some(vec![add_connection_request(1, "dup")]), responses: None }).unwrap());
    broker.handle(&link, &serde_json::to_value(Frame { requests: Some(vec![add_connection_request(2, "dup")]), responses: None }).unwrap());

    let second_resp = &frames.borrow()[1].responses.as_ref().unwrap()[0];
    assert_eq!(second_resp.error.as_ref().unwrap().kind, "invalidParameter");

    let upstream = resolve(&broker.root, "/sys/upstream").unwrap();
    assert_eq!(upstream.borrow().children.iter().filter(|(name, _)| name.as_str() == "dup").count(), 1);
    assert_eq!(persist::load_all(&dir).unwrap().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

// ── delete action ─────────────────────────────────────────────────────────

#[test]
fn delete_action_unlinks_node_and_removes_persisted_file() {
    let dir = unique_dir();
    let broker = Broker::new(UpstreamRegistryConfig::new(dir.clone())).unwrap();
    let (link, frames) = recording_link(1);
    broker.handle(&link, &serde_json::to_value(Frame { requests: Some(vec![add_connection_request(1, "removable")]), responses: None }).unwrap());
    frames.borrow_mut().clear();

    broker.handle(
        &link,
        &serde_json::to_value(Frame {
            requests: Some(vec![Request {
                rid: 2,
                method: Some("invoke".to_owned()),
                path: Some("/sys/upstream/removable/delete".to_owned()),
                params: None,
            }]),
            responses: None,
        })
        .unwrap(),
    );

    assert!(resolve(&broker.root, "/sys/upstream/removable").is_none());
    assert!(persist::load_all(&dir).unwrap().is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

// ── reload across restarts ────────────────────────────────────────────────

#[test]
fn restarting_with_the_same_directory_reloads_without_reprompting_a_save() {
    let dir = unique_dir();
    {
        let broker = Broker::new(UpstreamRegistryConfig::new(dir.clone())).unwrap();
        let (link, _frames) = recording_link(1);
        broker.handle(&link, &serde_json::to_value(Frame { requests: Some(vec![add_connection_request(1, "persisted")]), responses: None }).unwrap());
    }

    let broker2 = Broker::new(UpstreamRegistryConfig::new(dir.clone())).unwrap();
    assert!(resolve(&broker2.root, "/sys/upstream/persisted").is_some());
    // Exactly the one file from the original save, not a duplicate re-save on reload.
    assert_eq!(persist::load_all(&dir).unwrap().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
