// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream config persistence: one JSON file per upstream connection,
//! written atomically (write tmp + rename).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One `/sys/upstream/<name>` connection's persisted configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedUpstream {
    pub name: String,
    #[serde(rename = "brokerName")]
    pub broker_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Turn an upstream name into a safe filename: every byte outside
/// `[A-Za-z0-9_-]` becomes `%XX`. Mirrors the slug sanitizing a connected
/// agent name goes through before it touches the filesystem elsewhere in
/// this codebase — a plain `String::replace` isn't enough here because
/// upstream names are free-form user input, not pre-validated slugs.
pub fn encode_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn path_for(dir: &Path, name: &str) -> PathBuf {
    dir.join(encode_filename(name))
}

/// Load every persisted upstream config in `dir`. Missing directory reads
/// as "no upstreams yet", not an error; a file that fails to parse is
/// skipped with a warning rather than aborting the whole load.
pub fn load_all(dir: &Path) -> anyhow::Result<Vec<PersistedUpstream>> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) == Some("tmp") {
            continue;
        }
        let contents = match std::fs::read_to_string(entry.path()) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), %err, "failed to read upstream config");
                continue;
            }
        };
        match serde_json::from_str::<PersistedUpstream>(&contents) {
            Ok(parsed) => out.push(parsed),
            Err(err) => tracing::warn!(path = %entry.path().display(), %err, "failed to parse upstream config"),
        }
    }
    Ok(out)
}

pub fn save(dir: &Path, entry: &PersistedUpstream) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = path_for(dir, &entry.name);
    let json = serde_json::to_string_pretty(entry)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn delete(dir: &Path, name: &str) -> anyhow::Result<()> {
    let path = path_for(dir, name);
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
