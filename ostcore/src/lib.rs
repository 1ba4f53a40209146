//! # ostcore: a content-addressed object store for versioned OS trees
//!
//! This crate is the storage engine at the center of an OSTree-shaped
//! system: loose objects (files, directory trees, directory identities,
//! and commits) addressed by SHA-256 digest, four on-disk storage modes
//! trading off privilege requirements against fidelity, a staging area
//! for atomic writes, a remotes registry, an OpenPGP signature engine,
//! and a summary-file builder.
//!
//! Out of scope: HTTP pull, mutable in-memory tree construction, static
//! deltas, and sysroot/bootloader deployment. Those are external
//! collaborators that would consume this crate's [`Repo`] and
//! [`objects::store::ObjectStore`] types, not part of them.

pub mod cache;
pub mod config;
pub mod error;
mod faultinjection;
pub mod gpg;
pub mod objects;
pub mod refs;
pub mod remotes;
pub mod repo;
pub mod summary;
pub mod tmp;

pub use error::{CancellationToken, Error, Result};
pub use objects::store::{ObjectStore, StorageMode};
pub use repo::{Repo, RepoConfig};
