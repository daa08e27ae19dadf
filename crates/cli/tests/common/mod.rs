// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.
//!
//! Fake `ceph` and `rbd` shell scripts stand in for the storage cluster.
//! Every `rbd lock remove` invocation is appended to `removals.log`.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Images in the fake `rbd` pool and the lock holder of each
pub const LOCK_LISTING_HOST: &str = "There is 1 exclusive lock on this image.
Locker       ID       Address
client.4123  auto-1   10.0.0.5:0/3141592
";

pub const LOCK_LISTING_OTHER: &str = "There is 1 exclusive lock on this image.
Locker       ID       Address
client.77    auto-2   10.0.0.6:0/2718281
";

/// A temporary directory holding fake storage tools
pub struct FakeCluster {
    pub dir: TempDir,
}

impl FakeCluster {
    /// Two images locked by different clients and one unlocked image;
    /// removing a lock exits with `remove_exit`.
    pub fn new(remove_exit: i32) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");

        write_script(
            dir.path(),
            "ceph",
            r#"echo '[{"poolnum":1,"poolname":"rbd"}]'"#,
        );

        let listing_host = dir.path().join("lock-host.txt");
        let listing_other = dir.path().join("lock-other.txt");
        fs::write(&listing_host, LOCK_LISTING_HOST).expect("Failed to write listing");
        fs::write(&listing_other, LOCK_LISTING_OTHER).expect("Failed to write listing");
        let removals = dir.path().join("removals.log");

        let rbd = format!(
            r#"case "$3 $4" in
  "ls -l")
    echo '[{{"image":"vol-1","size":1024,"format":2,"lock_type":"exclusive"}},{{"image":"vol-2","size":1024,"format":2,"lock_type":"exclusive"}},{{"image":"vol-3","size":1024,"format":2}}]'
    ;;
  "lock list")
    case "$5" in
      vol-1) cat '{host}' ;;
      vol-2) cat '{other}' ;;
    esac
    ;;
  "lock remove")
    echo "$2 $5 $6 $7" >> '{removals}'
    exit {code}
    ;;
  *)
    echo "unexpected: $*" >&2
    exit 2
    ;;
esac"#,
            host = listing_host.display(),
            other = listing_other.display(),
            removals = removals.display(),
            code = remove_exit,
        );
        write_script(dir.path(), "rbd", &rbd);

        Self { dir }
    }

    pub fn rbd(&self) -> PathBuf {
        self.dir.path().join("rbd")
    }

    pub fn ceph(&self) -> PathBuf {
        self.dir.path().join("ceph")
    }

    /// Lines recorded by `rbd lock remove`: `<pool> <image> <lock-id> <client>`
    pub fn removals(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("removals.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    let mut perms = fs::metadata(&path)
        .expect("Failed to stat script")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to chmod script");
}
