//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common fixtures for temp databases and stand-in tool binaries

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use tempfile::TempDir;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Name that is unique within this test process run
pub fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", prefix, nanos, n)
}

/// Path for a throwaway SQLite database inside `dir`
pub fn temp_db_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.db", unique_name("veribits_test")))
}

/// Write an executable shell script named `name` into `dir`.
///
/// Tests point the executor's `bin_dir` at `dir` so that allow-listed
/// command names like `dig` resolve to a scripted stand-in.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let contents = format!("#!/bin/sh\n{}\n", body);
    std::fs::write(&path, contents).expect("write stand-in script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)
            .expect("stat stand-in script")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod stand-in script");
    }

    path
}
