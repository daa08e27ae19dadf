// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsers for storage tool output

use super::{LockError, LockOwner, StorageImage, StoragePool};
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

// `client.<id>  <lock id>  <ipv4>:<port>/<session>` with trailing whitespace
#[allow(clippy::expect_used)]
static LOCK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(client\.[0-9]+)\s+([[:alnum:]._-]+)\s+([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}):[0-9]+/([0-9]+)\s*$",
    )
    .expect("constant regex pattern is valid")
});

/// Parse `ceph osd lspools -f json`
pub fn parse_pools(output: &str) -> Result<Vec<StoragePool>, LockError> {
    serde_json::from_str(output.trim()).map_err(|source| LockError::Parse {
        context: "pool listing",
        source,
    })
}

/// Parse `rbd ls -l --format json`
pub fn parse_images(output: &str) -> Result<Vec<StorageImage>, LockError> {
    let trimmed = output.trim();
    // rbd prints nothing at all for an empty pool
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|source| LockError::Parse {
        context: "image listing",
        source,
    })
}

/// Parse `rbd lock list <image>`.
///
/// Every matching line overwrites the previous match, so only the last
/// listed holder survives; images are assumed to have a single exclusive
/// owner. Lines that do not match, including ones whose address is not a
/// valid IPv4 address, are ignored.
pub fn parse_lock_owner(output: &str) -> Option<LockOwner> {
    let mut owner = None;
    for line in output.lines() {
        let Some(caps) = LOCK_LINE.captures(line) else {
            continue;
        };
        let Ok(address) = caps[3].parse::<Ipv4Addr>() else {
            tracing::debug!(line, "ignoring lock line with invalid address");
            continue;
        };
        owner = Some(LockOwner {
            client_id: caps[1].to_string(),
            lock_id: caps[2].to_string(),
            address,
            session: caps[4].to_string(),
        });
    }
    owner
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
