// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A DSA-style broker core: dispatch requester/responder traffic, multiplex
//! list streams to many subscribers, and drive both off a cooperative
//! single-threaded event loop.
//!
//! Transport I/O, the wire JSON codec's byte framing, handshake/auth, and a
//! CLI are all out of scope — this crate starts from an already-parsed
//! [`serde_json::Value`] batch frame and a [`link::Sink`] to write frames
//! back out through.

mod broker;
mod dispatcher;
mod error;
mod event_loop;
mod frame;
mod hub;
mod link;
mod node;
mod stream;
mod upstream;

pub use broker::Broker;
pub use error::{BrokerError, InternalFault};
pub use event_loop::{Blocker, ChannelBlocker, EventLoop, NeverBlock, SleepBlocker};
pub use frame::{ErrorDetail, Frame, ListUpdate, Request, Response};
pub use hub::{HubKey, HubRegistry, ListStreamHub};
pub use link::{Link, Sink};
pub use node::{InvokeCallback, Node, NodeRef, Permission};
pub use stream::{Stream, StreamTable};
pub use upstream::{PersistedUpstream, UpstreamRegistry, UpstreamRegistryConfig};
