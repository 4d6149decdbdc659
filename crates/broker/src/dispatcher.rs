// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: parses a batch frame and routes each entry.
//!
//! Free functions operating on `&Broker` rather than methods on it, so the
//! stateless "how to route one entry" logic stays separate from the
//! stateful root handle it mutates — matching the spec's component table,
//! which lists `Dispatcher` and the state it touches as distinct boxes.

use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use crate::broker::Broker;
use crate::error::{BrokerError, InternalFault};
use crate::frame::{Frame, Request, Response};
use crate::link::Link;
use crate::node::{self, Node};
use crate::stream::Stream;

/// Entry point: parse `raw` as a batch frame and route its contents.
///
/// A malformed frame (not an object, or `requests`/`responses` present but
/// not an array) is dropped wholesale, logged, and the link stays open. A
/// malformed *entry* inside an otherwise valid array is skipped
/// individually — it never aborts the rest of the batch.
pub fn handle(broker: &Rc<Broker>, link: &Rc<Link>, raw: &Value) {
    let Some(obj) = raw.as_object() else {
        warn!(fault = %InternalFault::Malformed, "frame is not a JSON object");
        return;
    };

    let requests = match obj.get("requests") {
        None => None,
        Some(v) => match v.as_array() {
            Some(a) => Some(a),
            None => {
                warn!(fault = %InternalFault::Malformed, "requests is not an array");
                return;
            }
        },
    };
    let responses = match obj.get("responses") {
        None => None,
        Some(v) => match v.as_array() {
            Some(a) => Some(a),
            None => {
                warn!(fault = %InternalFault::Malformed, "responses is not an array");
                return;
            }
        },
    };

    if link.is_requester {
        if let Some(entries) = requests {
            for entry in entries {
                match serde_json::from_value::<Request>(entry.clone()) {
                    Ok(req) => handle_request(broker, link, &req),
                    Err(err) => warn!(%err, "skipping malformed request entry"),
                }
            }
        }
    }

    if link.is_responder {
        if let Some(entries) = responses {
            for entry in entries {
                match serde_json::from_value::<Response>(entry.clone()) {
                    Ok(resp) => handle_response(broker, link, &resp),
                    Err(err) => warn!(%err, "skipping malformed response entry"),
                }
            }
        }
    }
}

fn handle_request(broker: &Rc<Broker>, link: &Rc<Link>, req: &Request) {
    let Some(method) = req.method.as_deref() else {
        // Missing method is silently skipped.
        return;
    };
    match method {
        "list" => handle_list(broker, link, req),
        "invoke" => handle_invoke(broker, link, req),
        other => warn!(method = other, rid = req.rid, "unhandled method"),
    }
}

fn send_error(link: &Rc<Link>, rid: u32, err: BrokerError) {
    link.send(&Frame::with_responses(vec![err.to_closed_response(rid)]));
}

fn handle_list(broker: &Rc<Broker>, link: &Rc<Link>, req: &Request) {
    let Some(path) = req.path.as_deref() else {
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    };

    let Some(target) = node::resolve(&broker.root, path) else {
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    };

    if link.local_streams.borrow().get(req.rid).is_some() {
        warn!(rid = req.rid, "rid already in use by an in-flight stream on this link");
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    }

    let responder_weak = target.borrow().responder_link.clone();
    let Some(responder_weak) = responder_weak else {
        // Locally served: answer immediately from the node's children.
        let updates: Vec<Value> = target
            .borrow()
            .children
            .iter()
            .map(|(name, child)| {
                let descriptor = child_descriptor(child);
                Value::Array(vec![Value::String(name.clone()), descriptor])
            })
            .collect();
        let response = Response {
            rid: req.rid,
            stream: Some("open".to_owned()),
            updates: Some(updates),
            error: None,
            extra: Default::default(),
        };
        link.send(&Frame::with_responses(vec![response]));
        return;
    };

    let Some(responder) = responder_weak.upgrade() else {
        send_error(link, req.rid, BrokerError::NotConnected);
        return;
    };

    let existing_key = broker.path_hubs.borrow().get(path).copied();
    let key = match existing_key {
        Some(key) => key,
        None => {
            let remote_rid = broker.next_remote_rid();
            let key = (responder.id, remote_rid);
            let hub = crate::hub::ListStreamHub::new(path.to_owned(), remote_rid, Rc::downgrade(&responder));
            broker.hubs.borrow_mut().insert(key, hub);
            broker.path_hubs.borrow_mut().insert(path.to_owned(), key);
            if responder
                .remote_streams
                .borrow_mut()
                .insert(remote_rid, Stream::List { path: path.to_owned(), remote_rid, responder: Rc::downgrade(&responder) })
                .is_err()
            {
                warn!(rid = remote_rid, "remote rid collision allocating a list stream");
                broker.hubs.borrow_mut().remove(key);
                broker.path_hubs.borrow_mut().remove(path);
                send_error(link, req.rid, BrokerError::InvalidParameter);
                return;
            }
            responder.send(&Frame {
                requests: Some(vec![Request {
                    rid: remote_rid,
                    method: Some("list".to_owned()),
                    path: Some(path.to_owned()),
                    params: None,
                }]),
                responses: None,
            });
            key
        }
    };

    let bootstrap = broker.hubs.borrow_mut().get_mut(key).and_then(|hub| hub.subscribe(link, req.rid));
    if let Some(bootstrap) = bootstrap {
        link.send(&Frame::with_responses(vec![bootstrap]));
    }
    if link
        .local_streams
        .borrow_mut()
        .insert(req.rid, Stream::List { path: path.to_owned(), remote_rid: key.1, responder: Rc::downgrade(&responder) })
        .is_err()
    {
        // Guarded against above, but never silently treat this as success.
        warn!(rid = req.rid, "rid already in use recording local list stream");
    }
}

/// Build a child's list-response descriptor from its metadata (falling back
/// to its value). Keeps the underlying node private to the tree.
fn child_descriptor(child: &node::NodeRef) -> Value {
    let node = child.borrow();
    if !node.metadata.is_empty() {
        let map: serde_json::Map<String, Value> = node.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        return Value::Object(map);
    }
    node.value.clone().unwrap_or(Value::Null)
}

fn handle_invoke(broker: &Rc<Broker>, link: &Rc<Link>, req: &Request) {
    let Some(path) = req.path.as_deref() else {
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    };
    let params = req.params.clone().unwrap_or_else(|| Value::Object(Default::default()));
    if !params.is_object() {
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    }

    let Some(target) = node::resolve(&broker.root, path) else {
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    };

    if link.local_streams.borrow().get(req.rid).is_some() {
        warn!(rid = req.rid, "rid already in use by an in-flight stream on this link");
        send_error(link, req.rid, BrokerError::InvalidParameter);
        return;
    }

    let responder_weak = target.borrow().responder_link.clone();
    if let Some(responder_weak) = responder_weak {
        let Some(responder) = responder_weak.upgrade() else {
            send_error(link, req.rid, BrokerError::NotConnected);
            return;
        };
        let remote_rid = broker.next_remote_rid();
        let remote_stream = Stream::Invoke {
            remote_rid,
            responder: Rc::downgrade(&responder),
            requester: Rc::downgrade(link),
            requester_rid: req.rid,
            closed: false,
        };
        if responder.remote_streams.borrow_mut().insert(remote_rid, remote_stream).is_err() {
            warn!(rid = remote_rid, "remote rid collision allocating an invoke stream");
            send_error(link, req.rid, BrokerError::InvalidParameter);
            return;
        }
        let local_stream = Stream::Invoke {
            remote_rid,
            responder: Rc::downgrade(&responder),
            requester: Rc::downgrade(link),
            requester_rid: req.rid,
            closed: false,
        };
        if link.local_streams.borrow_mut().insert(req.rid, local_stream).is_err() {
            // Guarded against above, but never silently treat this as success.
            warn!(rid = req.rid, "rid already in use recording local invoke stream");
            responder.remote_streams.borrow_mut().remove(remote_rid);
            send_error(link, req.rid, BrokerError::InvalidParameter);
            return;
        }
        responder.send(&Frame {
            requests: Some(vec![Request {
                rid: remote_rid,
                method: Some("invoke".to_owned()),
                path: Some(path.to_owned()),
                params: Some(params),
            }]),
            responses: None,
        });
        return;
    }

    match Node::invoke(&target, link, &params) {
        Ok(value) => {
            let updates = if value.is_null() { None } else { Some(vec![value]) };
            let response = Response {
                rid: req.rid,
                stream: Some("closed".to_owned()),
                updates,
                error: None,
                extra: Default::default(),
            };
            link.send(&Frame::with_responses(vec![response]));
        }
        Err(err) => send_error(link, req.rid, err),
    }
}

fn handle_response(broker: &Rc<Broker>, link: &Rc<Link>, resp: &Response) {
    let key = (link.id, resp.rid);
    if let Some(hub) = broker.hubs.borrow_mut().get_mut(key) {
        hub.apply(resp);
        return;
    }

    let invoke_entry = match link.remote_streams.borrow().get(resp.rid) {
        Some(Stream::Invoke { requester, requester_rid, .. }) => Some((requester.clone(), *requester_rid)),
        _ => None,
    };
    let Some((requester_weak, requester_rid)) = invoke_entry else {
        // Unknown rid: silently dropped.
        return;
    };

    if let Some(requester) = requester_weak.upgrade() {
        let mut outgoing = resp.clone();
        outgoing.rid = requester_rid;
        requester.send(&Frame::with_responses(vec![outgoing]));
        if resp.is_closed() {
            requester.local_streams.borrow_mut().remove(requester_rid);
        }
    }
    if resp.is_closed() {
        link.remote_streams.borrow_mut().remove(resp.rid);
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
