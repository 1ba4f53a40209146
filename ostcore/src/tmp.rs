//! Per-boot staging directory allocation (spec §4.1 "Staging and
//! transactions", §5 "Concurrency").
//!
//! Writers stage new loose objects under `tmp/staging-<bootid>-<n>` before
//! linking them into `objects/`. Each staging directory is held open with
//! an advisory `flock(2)` for its lifetime so a crashed writer's directory
//! can be distinguished, on the next boot or the next process, from one
//! still in active use: the lock only survives as long as the holding
//! process does.

use crate::error::{Error, Result};
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use cap_std_ext::dirext::CapStdExtDirExt;
use rustix::fs::FlockOperation;
use std::os::fd::AsFd;

/// A staging directory held open and locked for the lifetime of this
/// value. Dropping it releases the lock (but does not delete the
/// directory; cleanup is driven by `core/tmp-expiry-secs`, see
/// [`sweep_expired`]).
#[derive(Debug)]
pub struct StagingDir {
    dir: Dir,
    name: String,
}

impl StagingDir {
    /// The staging directory's name, relative to `tmp/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The open directory handle.
    pub fn dir(&self) -> &Dir {
        &self.dir
    }
}

/// Allocate or reuse a staging directory under `tmp/` for `boot_id`.
///
/// Tries `staging-<boot_id>-0`, `staging-<boot_id>-1`, ... until one is
/// created fresh or an existing one is successfully locked. A directory
/// that exists but is held by another live process (lock contended) is
/// skipped rather than reused, matching the "race-retry" protocol: losing
/// a race to create a given name just means trying the next suffix.
pub fn acquire(tmp: &Dir, boot_id: &str) -> Result<StagingDir> {
    for n in 0u32.. {
        let name = format!("staging-{boot_id}-{n}");
        tmp.create_dir_all(&name)?;
        let dir = tmp.open_dir(&name)?;
        match rustix::fs::flock(dir.as_fd(), FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => return Ok(StagingDir { dir, name }),
            Err(rustix::io::Errno::WOULDBLOCK) => continue,
            Err(e) => return Err(Error::Io(e.into())),
        }
    }
    unreachable!("u32 staging suffix space exhausted")
}

/// Delete staging directories under `tmp/` older than
/// `core/tmp-expiry-secs` that are not currently locked by a live holder.
/// A directory that is still locked is left alone even if its mtime is
/// old: its process is still using it.
pub fn sweep_expired(tmp: &Dir, expiry_secs: u64) -> Result<u32> {
    let now = std::time::SystemTime::now();
    let mut removed = 0u32;
    for entry in tmp.entries()? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("staging-") {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_dir() {
            continue;
        }
        let age = now
            .duration_since(meta.modified()?)
            .unwrap_or_default()
            .as_secs();
        if age < expiry_secs {
            continue;
        }
        let Ok(dir) = tmp.open_dir(name.as_ref()) else {
            continue;
        };
        match rustix::fs::flock(dir.as_fd(), FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => {
                drop(dir);
                tmp.remove_dir_all(name.as_ref())?;
                removed += 1;
            }
            Err(rustix::io::Errno::WOULDBLOCK) => continue,
            Err(e) => return Err(Error::Io(e.into())),
        }
    }
    Ok(removed)
}
