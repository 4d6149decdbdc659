// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node-tree subset the dispatcher needs.
//!
//! A `Node` owns its children in insertion order (`IndexMap`), carries
//! `$`-prefixed metadata, an optional scalar value, and an optional invoke
//! callback. Dispatch holds nodes behind `Rc<RefCell<_>>` — the tree is only
//! ever touched from the single event-loop thread, so no locking is needed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::BrokerError;
use crate::link::Link;

pub type NodeRef = Rc<RefCell<Node>>;

/// A function invoked synchronously for a local `invoke` request.
///
/// Modeled as a boxed closure rather than a bare function pointer, so each
/// action node can close over whatever state it needs.
pub type InvokeCallback = Box<dyn Fn(&Rc<Link>, &NodeRef, &Value) -> Result<Value, BrokerError>>;

/// `$invokable`/`$writable` permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Config,
    Read,
    Write,
    Never,
}

impl Permission {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "config" => Some(Self::Config),
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Read => "read",
            Self::Write => "write",
            Self::Never => "never",
        }
    }
}

/// One node in the broker's namespace tree.
pub struct Node {
    pub name: String,
    pub parent: Option<Weak<RefCell<Node>>>,
    pub children: IndexMap<String, NodeRef>,
    pub metadata: IndexMap<String, Value>,
    pub value: Option<Value>,
    /// Set when this node is served by a downstream responder rather than
    /// answered locally; `None` means "answer from `children`/`invoke`".
    pub responder_link: Option<Weak<Link>>,
    #[allow(clippy::type_complexity)]
    invoke: Option<InvokeCallback>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> NodeRef {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            parent: None,
            children: IndexMap::new(),
            metadata: IndexMap::new(),
            value: None,
            responder_link: None,
            invoke: None,
        }))
    }

    /// Attach `child` under `parent`, setting the back-reference.
    pub fn add_child(parent: &NodeRef, child: NodeRef) {
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        let name = child.borrow().name.clone();
        parent.borrow_mut().children.insert(name, child);
    }

    /// Detach this node from its parent, freeing the subtree.
    pub fn unlink(node: &NodeRef) {
        let parent = node.borrow().parent.clone();
        if let Some(parent) = parent.and_then(|p| p.upgrade()) {
            let name = node.borrow().name.clone();
            parent.borrow_mut().children.shift_remove(&name);
        }
    }

    pub fn set_invoke(&mut self, cb: InvokeCallback) {
        self.invoke = Some(cb);
    }

    pub fn invokable(&self) -> Option<Permission> {
        self.metadata.get("$invokable").and_then(Value::as_str).and_then(Permission::parse)
    }

    /// Invoke this node's callback, if any and permitted.
    ///
    /// The callback is taken out of the node for the duration of the call so
    /// it may freely borrow (or re-borrow-mut) `node` itself without
    /// panicking on a held `RefCell` guard.
    pub fn invoke(
        node: &NodeRef,
        link: &Rc<Link>,
        params: &Value,
    ) -> Result<Value, BrokerError> {
        match node.borrow().invokable() {
            None | Some(Permission::Never) => return Err(BrokerError::PermissionDenied),
            Some(_) => {}
        }
        let cb = node.borrow_mut().invoke.take();
        let Some(cb) = cb else {
            return Err(BrokerError::PermissionDenied);
        };
        let result = cb(link, node, params);
        node.borrow_mut().invoke = Some(cb);
        result
    }
}

/// Resolve a `/`-separated path from `root`. Empty segments are skipped so
/// both `"/a/b"` and `"a/b/"` resolve identically.
pub fn resolve(root: &NodeRef, path: &str) -> Option<NodeRef> {
    let mut current = Rc::clone(root);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let next = current.borrow().children.get(segment).cloned()?;
        current = next;
    }
    Some(current)
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
