// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol types for a batch frame.
//!
//! `requests` and `responses` are independently optional; either side of a
//! `Frame` may be processed without the other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One batch frame exchanged with a link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<Request>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<Response>>,
}

impl Frame {
    pub fn with_responses(responses: Vec<Response>) -> Self {
        Self { requests: None, responses: Some(responses) }
    }
}

/// One requester-originated request entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub rid: u32,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// One responder-originated response entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub rid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Any other wire fields this core doesn't interpret, preserved verbatim
    /// so fanout never drops payload the responder attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Response {
    /// True once the stream's terminal state has been reached.
    pub fn is_closed(&self) -> bool {
        self.stream.as_deref() == Some("closed")
    }
}

/// Error object carried on a closed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// One entry of a list response's `updates` array.
pub enum ListUpdate<'a> {
    /// `[name, value]` — set or overwrite.
    Set(&'a str, &'a Value),
    /// `{"name": ..., "change": "remove"}` — delete.
    Remove(&'a str),
    /// Any other object form: accepted, not reflected in cache.
    Unrecognized,
}

/// Classify one raw `updates` entry for cache/fanout handling.
pub fn classify_update(entry: &Value) -> Option<ListUpdate<'_>> {
    if let Some(arr) = entry.as_array() {
        if arr.len() == 2 {
            if let Some(name) = arr[0].as_str() {
                return Some(ListUpdate::Set(name, &arr[1]));
            }
        }
        return None;
    }
    if let Some(obj) = entry.as_object() {
        let name = obj.get("name").and_then(Value::as_str);
        let change = obj.get("change").and_then(Value::as_str);
        return match (name, change) {
            (Some(name), Some("remove")) => Some(ListUpdate::Remove(name)),
            (Some(_), _) => Some(ListUpdate::Unrecognized),
            _ => None,
        };
    }
    None
}
