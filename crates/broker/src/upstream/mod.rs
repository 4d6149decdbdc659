// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/sys/upstream/*`: a config-only action surface for registering upstream
//! broker connections.
//!
//! This module builds and persists the node subtree; it does not open any
//! connection to the registered upstream — dialing out is transport work,
//! out of scope here.

mod persist;

use std::path::PathBuf;
use std::rc::Rc;

use serde_json::Value;

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::node::{Node, NodeRef};

pub use persist::PersistedUpstream;

/// Where upstream connection configs are read from and written to.
#[derive(Debug, Clone)]
pub struct UpstreamRegistryConfig {
    pub upstream_dir: PathBuf,
}

impl UpstreamRegistryConfig {
    pub fn new(upstream_dir: impl Into<PathBuf>) -> Self {
        Self { upstream_dir: upstream_dir.into() }
    }
}

/// Owns the on-disk location upstream configs live under. The node subtree
/// itself lives in the broker's node tree like any other node; this struct
/// only needs to remember where persistence happens.
pub struct UpstreamRegistry {
    config: UpstreamRegistryConfig,
}

impl UpstreamRegistry {
    pub fn new(config: UpstreamRegistryConfig) -> Self {
        Self { config }
    }

    /// Build `/sys/upstream`, its `add_connection` action, and restore any
    /// previously persisted upstreams from disk.
    pub fn install(broker: &Rc<Broker>, sys: &NodeRef) -> anyhow::Result<()> {
        let upstream_node = Node::new("upstream");
        Node::add_child(sys, Rc::clone(&upstream_node));

        let add_action = Node::new("add_connection");
        add_action.borrow_mut().metadata.insert("$invokable".to_owned(), Value::String("config".to_owned()));
        add_action.borrow_mut().metadata.insert("$params".to_owned(), add_connection_params());
        Node::add_child(&upstream_node, Rc::clone(&add_action));

        for persisted in persist::load_all(&broker.upstream.config.upstream_dir)? {
            if upstream_node.borrow().children.contains_key(&persisted.name) {
                continue;
            }
            build_upstream_node(&upstream_node, &broker.upstream.config.upstream_dir, &persisted);
        }

        let broker_weak = Rc::downgrade(broker);
        let upstream_weak = Rc::downgrade(&upstream_node);
        add_action.borrow_mut().set_invoke(Box::new(move |_link, _node, params| {
            let broker = broker_weak.upgrade().ok_or(BrokerError::NotConnected)?;
            let upstream_node = upstream_weak.upgrade().ok_or(BrokerError::NotConnected)?;
            handle_add_connection(&broker, &upstream_node, params)
        }));

        Ok(())
    }
}

fn add_connection_params() -> Value {
    serde_json::json!([
        {"name": "name", "type": "string", "description": "Upstream Broker Name", "placeholder": "UpstreamBroker"},
        {"name": "url", "type": "string", "description": "Url to the Upstream Broker", "placeholder": "http://upstream.broker.com/conn"},
        {"name": "brokerName", "type": "string", "description": "The name of the link when connected to the Upstream Broker", "placeholder": "ThisBroker"},
        {"name": "token", "type": "string", "description": "Broker Token (if needed)", "placeholder": "OptionalAuthToken"},
    ])
}

fn handle_add_connection(broker: &Rc<Broker>, upstream_node: &NodeRef, params: &Value) -> Result<Value, BrokerError> {
    let name = params.get("name").and_then(Value::as_str);
    let broker_name = params.get("brokerName").and_then(Value::as_str);
    let url = params.get("url").and_then(Value::as_str);
    let token = params.get("token").and_then(Value::as_str);
    let enabled = params.get("enabled").and_then(Value::as_bool).unwrap_or(true);

    let (Some(name), Some(broker_name), Some(url)) = (name, broker_name, url) else {
        return Err(BrokerError::InvalidParameter);
    };
    if upstream_node.borrow().children.contains_key(name) {
        // A name collision is reported the same way a missing field is.
        return Err(BrokerError::InvalidParameter);
    }

    let persisted = persist::PersistedUpstream {
        name: name.to_owned(),
        broker_name: broker_name.to_owned(),
        url: url.to_owned(),
        token: token.map(str::to_owned),
        enabled,
    };

    build_upstream_node(upstream_node, &broker.upstream.config.upstream_dir, &persisted);
    if let Err(err) = persist::save(&broker.upstream.config.upstream_dir, &persisted) {
        tracing::warn!(name, %err, "failed to persist upstream config");
    }
    tracing::info!(name, "upstream added");
    Ok(Value::Null)
}

/// Build the `name`/`brokerName`/`url`/`token`/`enabled`/`delete` subtree
/// for one upstream entry and attach it under `parent`.
fn build_upstream_node(parent: &NodeRef, dir: &std::path::Path, entry: &PersistedUpstream) {
    let node = Node::new(entry.name.clone());
    Node::add_child(parent, Rc::clone(&node));

    add_string_field(&node, "name", &entry.name);
    add_string_field(&node, "brokerName", &entry.broker_name);
    add_string_field(&node, "url", &entry.url);
    add_string_field(&node, "token", entry.token.as_deref().unwrap_or(""));
    add_bool_field(&node, "enabled", entry.enabled);

    let delete_action = Node::new("delete");
    delete_action.borrow_mut().metadata.insert("$invokable".to_owned(), Value::String("config".to_owned()));
    Node::add_child(&node, Rc::clone(&delete_action));

    let dir = dir.to_owned();
    let node_weak = Rc::downgrade(&node);
    let name = entry.name.clone();
    delete_action.borrow_mut().set_invoke(Box::new(move |_link, _self_node, _params| {
        if let Some(node) = node_weak.upgrade() {
            Node::unlink(&node);
        }
        if let Err(err) = persist::delete(&dir, &name) {
            tracing::warn!(name, %err, "failed to delete upstream config");
        }
        tracing::info!(name, "upstream deleted");
        Ok(Value::Null)
    }));
}

fn add_string_field(parent: &NodeRef, name: &str, value: &str) {
    let child = Node::new(name);
    {
        let mut n = child.borrow_mut();
        n.metadata.insert("$writable".to_owned(), Value::String("write".to_owned()));
        n.metadata.insert("$type".to_owned(), Value::String("string".to_owned()));
        n.value = Some(Value::String(value.to_owned()));
    }
    Node::add_child(parent, child);
}

fn add_bool_field(parent: &NodeRef, name: &str, value: bool) {
    let child = Node::new(name);
    {
        let mut n = child.borrow_mut();
        n.metadata.insert("$writable".to_owned(), Value::String("write".to_owned()));
        n.metadata.insert("$type".to_owned(), Value::String("bool".to_owned()));
        n.value = Some(Value::Bool(value));
    }
    Node::add_child(parent, child);
}

#[cfg(test)]
#[path = "upstream_tests.rs"]
mod tests;
