// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ListStreamHub`: ties one remote list stream to many local subscribers,
//! plus the `HubRegistry` that owns hubs keyed by the responder link and
//! remote rid that created them.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::frame::{classify_update, Frame, ListUpdate, Response};
use crate::link::Link;

/// Identifies a hub: the responder link serving it, plus the rid the
/// broker assigned when it forwarded the originating `list` request.
pub type HubKey = (u64, u32);

/// One remote list stream, multiplexed to any number of local requesters.
pub struct ListStreamHub {
    pub path: String,
    pub remote_rid: u32,
    pub responder: Weak<Link>,
    /// Insertion-ordered so a bootstrap snapshot replays in first-seen order.
    updates_cache: IndexMap<String, Value>,
    /// requester_rid -> weak handle on the subscribing link.
    subscribers: IndexMap<u32, Weak<Link>>,
}

impl ListStreamHub {
    pub fn new(path: String, remote_rid: u32, responder: Weak<Link>) -> Self {
        Self { path, remote_rid, responder, updates_cache: IndexMap::new(), subscribers: IndexMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = (u32, &Weak<Link>)> {
        self.subscribers.iter().map(|(rid, weak)| (*rid, weak))
    }

    /// Register `requester_rid` as a subscriber. If the cache already holds
    /// content, returns a bootstrap response to send immediately — built
    /// from the cache's current iteration order.
    ///
    /// Re-subscribing with the same `requester_rid` replaces the prior
    /// weak handle, so subscribing twice on the same rid is idempotent.
    pub fn subscribe(&mut self, requester: &Rc<Link>, requester_rid: u32) -> Option<Response> {
        self.subscribers.insert(requester_rid, Rc::downgrade(requester));
        if self.updates_cache.is_empty() {
            return None;
        }
        let updates: Vec<Value> =
            self.updates_cache.iter().map(|(name, value)| Value::Array(vec![Value::String(name.clone()), value.clone()])).collect();
        Some(Response {
            rid: requester_rid,
            stream: Some("open".to_owned()),
            updates: Some(updates),
            error: None,
            extra: Default::default(),
        })
    }

    /// Remove `requester_rid`. Returns `true` if the hub is now empty and
    /// should be torn down by the caller.
    pub fn unsubscribe(&mut self, requester_rid: u32) -> bool {
        self.subscribers.shift_remove(&requester_rid);
        self.is_empty()
    }

    /// Apply a responder update to the cache, then fan the (rid-rewritten)
    /// response out to every live subscriber.
    ///
    /// The cache is updated even with zero subscribers; there's just
    /// nothing to send in that case.
    pub fn apply(&mut self, response: &Response) {
        if let Some(updates) = &response.updates {
            for entry in updates {
                match classify_update(entry) {
                    Some(ListUpdate::Set(name, value)) => {
                        self.updates_cache.insert(name.to_owned(), value.clone());
                    }
                    Some(ListUpdate::Remove(name)) => {
                        self.updates_cache.shift_remove(name);
                    }
                    // "a list value update? almost never used" (original
                    // source) — accepted, cache untouched.
                    Some(ListUpdate::Unrecognized) | None => {}
                }
            }
        }

        // Deep-copy per subscriber: mutating one outgoing frame must never
        // be observable by the next subscriber in line.
        for (requester_rid, weak_link) in &self.subscribers {
            let Some(link) = weak_link.upgrade() else { continue };
            let mut outgoing = response.clone();
            outgoing.rid = *requester_rid;
            link.send(&Frame::with_responses(vec![outgoing]));
        }
        trace!(path = %self.path, subscribers = self.subscribers.len(), "fanned out list update");
    }

    /// Prune subscribers whose link has been dropped. Returns `true` if the
    /// hub is now empty.
    pub fn prune_dead(&mut self) -> bool {
        self.subscribers.retain(|_, weak| weak.upgrade().is_some());
        self.is_empty()
    }
}

/// Owns every live `ListStreamHub`, keyed by `(responder_link_id, remote_rid)`.
#[derive(Default)]
pub struct HubRegistry {
    hubs: IndexMap<HubKey, ListStreamHub>,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_mut(&mut self, key: HubKey) -> Option<&mut ListStreamHub> {
        self.hubs.get_mut(&key)
    }

    pub fn get(&self, key: HubKey) -> Option<&ListStreamHub> {
        self.hubs.get(&key)
    }

    pub fn insert(&mut self, key: HubKey, hub: ListStreamHub) {
        self.hubs.insert(key, hub);
    }

    pub fn remove(&mut self, key: HubKey) -> Option<ListStreamHub> {
        self.hubs.shift_remove(&key)
    }

    /// Remove every hub served by `responder_link_id` — called on that
    /// link's teardown, since every hub it served is now orphaned.
    pub fn remove_all_for_responder(&mut self, responder_link_id: u64) -> Vec<ListStreamHub> {
        let keys: Vec<HubKey> =
            self.hubs.keys().filter(|(link_id, _)| *link_id == responder_link_id).copied().collect();
        keys.into_iter().filter_map(|k| self.hubs.shift_remove(&k)).collect()
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
