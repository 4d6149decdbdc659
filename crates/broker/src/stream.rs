// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-link stream bookkeeping.

use std::collections::HashMap;
use std::rc::Weak;

use crate::link::Link;

/// A stream owned by a `Link`, reached by local rid.
///
/// `responder` names the link that owns the `ListStreamHub` this entry
/// points at (together with `remote_rid`, this is the hub's `HubKey`) — for
/// an entry in a responder's own `remote_streams` that's trivially a weak
/// handle back to itself, but it lets teardown code treat both tables
/// uniformly without a separate link-lookup table.
pub enum Stream {
    /// Half of a list subscription: which remote hub it joins.
    List { path: String, remote_rid: u32, responder: Weak<Link> },
    /// One in-flight invoke call.
    Invoke {
        remote_rid: u32,
        responder: Weak<Link>,
        requester: Weak<Link>,
        requester_rid: u32,
        closed: bool,
    },
}

/// Owns the `Stream` values for one link, keyed by 32-bit rid.
#[derive(Default)]
pub struct StreamTable {
    streams: HashMap<u32, Stream>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new stream. Fails if `rid` is already occupied.
    pub fn insert(&mut self, rid: u32, stream: Stream) -> Result<(), Stream> {
        if self.streams.contains_key(&rid) {
            return Err(stream);
        }
        self.streams.insert(rid, stream);
        Ok(())
    }

    pub fn get(&self, rid: u32) -> Option<&Stream> {
        self.streams.get(&rid)
    }

    pub fn get_mut(&mut self, rid: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&rid)
    }

    /// Remove and return ownership of the stream so cascading cleanup
    /// (subscriber unregistration, requester notification) can run before
    /// the value is dropped.
    pub fn remove(&mut self, rid: u32) -> Option<Stream> {
        self.streams.remove(&rid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Stream)> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drain all entries, returning ownership of each `(rid, Stream)` pair.
    /// Used on link teardown.
    pub fn drain(&mut self) -> Vec<(u32, Stream)> {
        self.streams.drain().collect()
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
