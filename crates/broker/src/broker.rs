// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker's root handle. Every subsystem takes this as an explicit
//! collaborator instead of reaching for global state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::dispatcher;
use crate::hub::HubRegistry;
use crate::link::Link;
use crate::node::{Node, NodeRef};
use crate::stream::Stream;
use crate::upstream::{UpstreamRegistry, UpstreamRegistryConfig};

/// Root collaborator: the node namespace, the live list-stream hubs, and
/// the rid allocator used when forwarding requests downstream.
pub struct Broker {
    pub root: NodeRef,
    pub(crate) hubs: RefCell<HubRegistry>,
    /// path -> hub key, so a second subscriber to the same path joins the
    /// existing hub instead of re-issuing to the responder.
    pub(crate) path_hubs: RefCell<HashMap<String, (u64, u32)>>,
    next_remote_rid: Cell<u32>,
    pub upstream: UpstreamRegistry,
}

impl Broker {
    pub fn new(config: UpstreamRegistryConfig) -> anyhow::Result<Rc<Self>> {
        let root = Node::new("");
        let sys = Node::new("sys");
        Node::add_child(&root, Rc::clone(&sys));

        let broker = Rc::new(Self {
            root,
            hubs: RefCell::new(HubRegistry::new()),
            path_hubs: RefCell::new(HashMap::new()),
            next_remote_rid: Cell::new(1),
            upstream: UpstreamRegistry::new(config),
        });
        UpstreamRegistry::install(&broker, &sys)?;
        Ok(broker)
    }

    /// Allocate a fresh remote rid for a request forwarded downstream.
    pub(crate) fn next_remote_rid(&self) -> u32 {
        let rid = self.next_remote_rid.get();
        self.next_remote_rid.set(rid.wrapping_add(1).max(1));
        rid
    }

    /// Parse and route one incoming batch frame.
    pub fn handle(self: &Rc<Self>, link: &Rc<Link>, frame: &Value) {
        dispatcher::handle(self, link, frame);
    }

    /// A link finished its handshake and is ready to receive traffic.
    pub fn on_link_connected(&self, link: &Rc<Link>) {
        debug!(link_id = link.id, "link connected");
    }

    /// Cascade-tear-down everything a disconnecting link owned.
    pub fn on_link_disconnected(&self, link: &Rc<Link>) {
        debug!(link_id = link.id, "link disconnected");

        // This link was a requester: leave every hub it subscribed to, and
        // drop any invoke it had in flight.
        for (rid, stream) in link.local_streams.borrow_mut().drain() {
            match stream {
                Stream::List { remote_rid, responder, .. } => {
                    if let Some(responder) = responder.upgrade() {
                        self.leave_hub((responder.id, remote_rid), rid);
                    }
                }
                Stream::Invoke { remote_rid, responder, .. } => {
                    if let Some(responder) = responder.upgrade() {
                        responder.remote_streams.borrow_mut().remove(remote_rid);
                    }
                }
            }
        }

        // This link was a responder: every hub it served is now orphaned.
        for hub in self.hubs.borrow_mut().remove_all_for_responder(link.id) {
            self.path_hubs.borrow_mut().retain(|_, key| key.0 != link.id);
            for (requester_rid, weak) in hub.subscribers() {
                if let Some(requester) = weak.upgrade() {
                    requester.local_streams.borrow_mut().remove(requester_rid);
                }
            }
        }
        for (_, stream) in link.remote_streams.borrow_mut().drain() {
            if let Stream::Invoke { requester, requester_rid, .. } = stream {
                if let Some(requester) = requester.upgrade() {
                    requester.local_streams.borrow_mut().remove(requester_rid);
                }
            }
        }
    }

    fn leave_hub(&self, key: (u64, u32), requester_rid: u32) {
        let now_empty = match self.hubs.borrow_mut().get_mut(key) {
            Some(hub) => hub.unsubscribe(requester_rid),
            None => return,
        };
        if now_empty {
            if let Some(hub) = self.hubs.borrow_mut().remove(key) {
                if let Some(responder) = hub.responder.upgrade() {
                    responder.remote_streams.borrow_mut().remove(hub.remote_rid);
                    responder.send(&crate::frame::Frame {
                        requests: Some(vec![crate::frame::Request {
                            rid: hub.remote_rid,
                            method: Some("close".to_owned()),
                            path: None,
                            params: None,
                        }]),
                        responses: None,
                    });
                }
            }
            self.path_hubs.borrow_mut().retain(|_, k| *k != key);
        }
    }
}
