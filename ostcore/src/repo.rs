//! The repository handle: directory descriptors, configuration, parent
//! chain, and the operations that open or create a repository on disk
//! (spec §4.1 "Repository lifecycle").

use crate::cache::DirMetaCache;
use crate::config::KeyFile;
use crate::error::{Error, Result};
use crate::objects::store::{ObjectStore, StorageMode};
use crate::remotes::RemoteRegistry;
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use cap_std_ext::dirext::CapStdExtDirExt;
use std::sync::Mutex;
use tracing::debug;

/// Tunables read from `config`'s `[core]` group (spec §6 "Config keys").
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// `core/mode`.
    pub mode: StorageMode,
    /// `core/repo_version`; only `1` is supported.
    pub repo_version: u64,
    /// `core/fsync`, default `true`.
    pub fsync: bool,
    /// `core/disable-xattrs`, default `false`.
    pub disable_xattrs: bool,
    /// `archive/zlib-level`, default `6`, clamped to `1..=9`.
    pub zlib_level: u32,
    /// `core/tmp-expiry-secs`, default `86400`.
    pub tmp_expiry_secs: u64,
    /// `core/min-free-space-percent`, default `3`, must be `<= 99`.
    pub min_free_space_percent: u8,
    /// `core/tombstone-commits`, default `false`.
    pub tombstone_commits: bool,
    /// `core/collection-id`, if this repo participates in a collection.
    pub collection_id: Option<String>,
    /// `core/parent`, a filesystem path to a fallback repo opened
    /// recursively and consulted when this repo misses an object lookup.
    pub parent_path: Option<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Bare,
            repo_version: 1,
            fsync: true,
            disable_xattrs: false,
            zlib_level: 6,
            tmp_expiry_secs: 86400,
            min_free_space_percent: 3,
            tombstone_commits: false,
            collection_id: None,
            parent_path: None,
        }
    }
}

impl RepoConfig {
    /// Parse `[core]` tunables out of a loaded keyfile.
    pub fn from_keyfile(kf: &KeyFile) -> Result<Self> {
        let repo_version = kf.optional_u64("core", "repo_version")?.unwrap_or(1);
        if repo_version != 1 {
            return Err(Error::Unsupported(format!(
                "unsupported core/repo_version: {repo_version}"
            )));
        }
        if kf.optional_bool("core", "archive")?.unwrap_or(false) {
            return Err(Error::Unsupported(
                "core/archive=true: the uncompressed v1 archive format was retired".into(),
            ));
        }
        let mode_str = kf.optional_string("core", "mode").unwrap_or_else(|| "bare".to_string());
        let mode = StorageMode::parse(&mode_str)?;
        let zlib_level = kf
            .optional_u64("archive", "zlib-level")?
            .map(|v| v.clamp(1, 9) as u32)
            .unwrap_or(6);
        let min_free_space_percent = kf
            .optional_u64("core", "min-free-space-percent")?
            .unwrap_or(3);
        if min_free_space_percent > 99 {
            return Err(Error::invalid_config(
                "core/min-free-space-percent must be <= 99",
            ));
        }
        Ok(Self {
            mode,
            repo_version,
            fsync: kf.optional_bool("core", "fsync")?.unwrap_or(true),
            disable_xattrs: kf.optional_bool("core", "disable-xattrs")?.unwrap_or(false),
            zlib_level,
            tmp_expiry_secs: kf.optional_u64("core", "tmp-expiry-secs")?.unwrap_or(86400),
            min_free_space_percent: min_free_space_percent as u8,
            tombstone_commits: kf.optional_bool("core", "tombstone-commits")?.unwrap_or(false),
            collection_id: kf.optional_string("core", "collection-id"),
            parent_path: kf.optional_string("core", "parent"),
        })
    }

    /// Render back into a keyfile's `[core]`/`[archive]` groups.
    pub fn to_keyfile(&self) -> KeyFile {
        let mut kf = KeyFile::new();
        kf.set("core", "repo_version", self.repo_version.to_string());
        kf.set("core", "mode", self.mode.as_str());
        kf.set("core", "fsync", self.fsync.to_string());
        kf.set("core", "disable-xattrs", self.disable_xattrs.to_string());
        kf.set("core", "tmp-expiry-secs", self.tmp_expiry_secs.to_string());
        kf.set("core", "min-free-space-percent", self.min_free_space_percent.to_string());
        kf.set("core", "tombstone-commits", self.tombstone_commits.to_string());
        if let Some(id) = &self.collection_id {
            kf.set("core", "collection-id", id.clone());
        }
        if let Some(path) = &self.parent_path {
            kf.set("core", "parent", path.clone());
        }
        kf.set("archive", "zlib-level", self.zlib_level.to_string());
        kf
    }
}

/// An open repository. Cheap to clone the underlying mutex-guarded state
/// is not supported directly; callers share a `Repo` behind an `Arc` if
/// concurrent access from multiple threads is needed (spec §5
/// "Concurrency": the store itself does not spawn threads or lock
/// internally beyond the staging-directory flock).
#[derive(Debug)]
pub struct Repo {
    root: Dir,
    config: Mutex<RepoConfig>,
    keyfile: Mutex<KeyFile>,
    parent: Option<Box<Repo>>,
    remotes: RemoteRegistry,
    dirmeta_cache: DirMetaCache,
    writable: bool,
    boot_id: String,
}

const CONFIG_PATH: &str = "config";

impl Repo {
    /// Create a new repository at `root` with the given storage mode.
    ///
    /// If `root` already holds an initialized repository, this completes
    /// any missing scaffolding directories and returns it unchanged,
    /// retaining its original mode rather than erroring (spec §8
    /// "Creating over an existing repo succeeds and does not change its
    /// mode"), so a caller can always call `create` without first
    /// checking whether one exists.
    pub fn create(root: Dir, mode: StorageMode) -> Result<Self> {
        if root.try_exists(CONFIG_PATH)? {
            return Self::open(root);
        }
        root.create_dir_all("objects")?;
        root.create_dir_all("tmp")?;
        root.create_dir_all("refs/heads")?;
        root.create_dir_all("refs/mirrors")?;
        root.create_dir_all("refs/remotes")?;
        root.create_dir_all("extensions")?;
        root.create_dir_all("state")?;

        if mode == StorageMode::BareUser {
            probe_user_xattr_support(&root)?;
        }

        let config = RepoConfig { mode, ..Default::default() };
        let keyfile = config.to_keyfile();
        root.atomic_write(CONFIG_PATH, keyfile.to_string_repr().as_bytes())?;

        Self::open(root)
    }

    /// Open an existing repository at `root`. If `core/parent` names a
    /// path, that repository is opened recursively and attached as the
    /// fallback for object lookups (spec §4.1 "core/parent").
    pub fn open(root: Dir) -> Result<Self> {
        let text = root
            .read_to_string(CONFIG_PATH)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::not_found("repository config"),
                _ => e.into(),
            })?;
        let keyfile = KeyFile::parse(&text)?;
        let config = RepoConfig::from_keyfile(&keyfile)?;
        let writable = probe_writable(&root);
        let boot_id = read_boot_id();
        debug!(mode = config.mode.as_str(), writable, "opened repository");

        let remotes = RemoteRegistry::load(&root)?;

        let parent = match &config.parent_path {
            Some(path) => {
                let parent_root = Dir::open_ambient_dir(path, cap_std::ambient_authority())?;
                Some(Box::new(Self::open(parent_root)?))
            }
            None => None,
        };

        Ok(Self {
            root,
            config: Mutex::new(config),
            keyfile: Mutex::new(keyfile),
            parent,
            remotes,
            dirmeta_cache: DirMetaCache::new(),
            writable,
            boot_id,
        })
    }

    /// Attach a parent repository, consulted when this repo misses an
    /// object lookup (spec §4.1 "Parent repositories").
    pub fn with_parent(mut self, parent: Repo) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> RepoConfig {
        self.config.lock().unwrap().clone()
    }

    /// Re-read `config` from disk, picking up out-of-process edits.
    pub fn reload_config(&self) -> Result<()> {
        let text = self.root.read_to_string(CONFIG_PATH)?;
        let keyfile = KeyFile::parse(&text)?;
        let config = RepoConfig::from_keyfile(&keyfile)?;
        *self.config.lock().unwrap() = config;
        *self.keyfile.lock().unwrap() = keyfile;
        Ok(())
    }

    /// Persist the current in-memory config (including any remote
    /// mutations) back to `config`.
    pub fn save_config(&self) -> Result<()> {
        self.check_free_space()?;
        let keyfile = self.keyfile.lock().unwrap().clone();
        self.root.atomic_write(CONFIG_PATH, keyfile.to_string_repr().as_bytes())?;
        Ok(())
    }

    /// True if this process can write to the repository: the root
    /// directory is writable by the effective uid, independent of
    /// whether a given operation will additionally fail on
    /// `min-free-space-percent`.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The boot id captured when this handle was opened, used to name
    /// this process's staging directory (spec §4.1 "Staging").
    pub fn boot_id(&self) -> &str {
        &self.boot_id
    }

    /// The registered remotes.
    pub fn remotes(&self) -> &RemoteRegistry {
        &self.remotes
    }

    /// Resolve a remote by name, applying the `file://`-as-name bypass
    /// and cascading to the parent repo chain per spec §4.3
    /// "Inheritance".
    pub fn get_remote(&self, name: &str) -> Option<crate::remotes::Remote> {
        if name.starts_with("file://") {
            return Some(crate::remotes::Remote::transient_file(name));
        }
        let local = self.remotes.get(name);
        let parent_remote = self.parent.as_ref().and_then(|p| p.get_remote(name));
        match (local, parent_remote) {
            (Some(local), Some(parent)) => Some(local.inherit_from(&parent)),
            (Some(local), None) => Some(local),
            (None, parent_remote) => parent_remote,
        }
    }

    /// True if `root` is the same filesystem object as the system
    /// repository path (`/ostree/repo`), compared by device and inode
    /// rather than by string path so bind mounts and symlinked paths
    /// still match (spec §6 supplemented: "system repo detection").
    pub fn is_system_repo(&self) -> bool {
        is_same_inode(&self.root, camino::Utf8Path::new("/ostree/repo"))
    }

    /// Construct a loose-object store view over this repository's
    /// `objects/`, wired up with its dirmeta cache and (if present) its
    /// parent's object store.
    pub fn object_store(&self) -> Result<ObjectStore> {
        let objects = self.root.open_dir("objects")?;
        let config = self.config();
        let mut store = ObjectStore::new(objects, config.mode, config.fsync, config.disable_xattrs, config.zlib_level)
            .with_dirmeta_cache(self.dirmeta_cache.clone())
            .with_min_free_space(config.min_free_space_percent);
        if let Some(parent) = &self.parent {
            store = store.with_parent(parent.object_store()?);
        }
        Ok(store)
    }

    /// Import a single object from another repository's object store
    /// into this one (spec §4.2 "Import"). `trusted` controls whether
    /// hardlinking is attempted and whether a byte-copy re-verifies the
    /// digest; see [`ObjectStore::import_object_from`].
    pub fn import_object_from(&self, source: &Repo, id: crate::objects::ObjectId, trusted: bool) -> Result<()> {
        let dest = self.object_store()?;
        let src = source.object_store()?;
        dest.import_object_from(&src, id, trusted)
    }

    /// Open (creating if necessary) the `tmp/` directory used for
    /// staging directories.
    pub fn tmp_dir(&self) -> Result<Dir> {
        self.root.create_dir_all("tmp")?;
        Ok(self.root.open_dir("tmp")?)
    }

    /// The repository's root directory handle, for callers (refs, gpg,
    /// summary, remotes) that need direct access below this module.
    pub(crate) fn root_dir(&self) -> &Dir {
        &self.root
    }

    /// Available free space on the filesystem backing this repository,
    /// as a percentage of total capacity.
    pub fn free_space_percent(&self) -> Result<u8> {
        let stat = rustix::fs::fstatvfs(std::os::fd::AsFd::as_fd(&self.root)).map_err(std::io::Error::from)?;
        if stat.f_blocks == 0 {
            return Ok(100);
        }
        let pct = (stat.f_bavail as u128 * 100) / stat.f_blocks as u128;
        Ok(pct.min(100) as u8)
    }

    /// True if `digest` has a `state/<digest>.commitpartial` marker,
    /// meaning the commit's closure is not fully fetched yet (spec
    /// invariant 2).
    pub fn is_partial(&self, digest: crate::objects::Digest) -> Result<bool> {
        Ok(self.root.try_exists(partial_marker_path(digest))?)
    }

    /// Mark `digest` as partially fetched.
    pub fn mark_partial(&self, digest: crate::objects::Digest) -> Result<()> {
        self.root.create_dir_all("state")?;
        self.root.atomic_write(partial_marker_path(digest), b"")?;
        Ok(())
    }

    /// Clear the partial marker for `digest`, e.g. once a pull completes.
    /// Missing is not an error.
    pub fn clear_partial(&self, digest: crate::objects::Digest) -> Result<()> {
        match self.root.remove_file(partial_marker_path(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enforce `core/min-free-space-percent` before a write. Writers call
    /// this at the top of any operation that adds loose objects (spec §6
    /// supplemented: "min-free-space enforcement in all writer paths").
    pub fn check_free_space(&self) -> Result<()> {
        let required = self.config().min_free_space_percent;
        if required == 0 {
            return Ok(());
        }
        let available = self.free_space_percent()?;
        if available < required {
            return Err(Error::Unsupported(format!(
                "insufficient free space: {available}% available, {required}% required"
            )));
        }
        Ok(())
    }

    /// Begin a transaction: acquires this boot's staging directory and
    /// returns a handle whose [`ObjectStore`] writes land in staging
    /// first, consulted ahead of `objects/` on every read, until
    /// [`Transaction::commit`] promotes them (spec §4.1 "Staging and
    /// transactions", §4.2 "Addressing & lookup order").
    pub fn begin_transaction(&self) -> Result<Transaction<'_>> {
        let tmp = self.tmp_dir()?;
        let staging = crate::tmp::acquire(&tmp, &self.boot_id)?;
        Ok(Transaction { repo: self, staging })
    }

    /// Regenerate the `summary` file from the current `refs/heads` and
    /// write it atomically (spec §4.1 "Summary builder").
    pub fn write_summary(&self) -> Result<()> {
        self.check_free_space()?;
        let store = self.object_store()?;
        let config = self.config();
        let summary = crate::summary::build(&self.root, |digest| store.load_commit(digest), config.collection_id.as_deref())?;
        self.root.atomic_write("summary", &summary.to_bytes())?;
        Ok(())
    }
}

/// An in-progress write transaction: new loose objects are staged under
/// a locked per-boot directory and only linked into `objects/` when the
/// transaction is committed, so a crash mid-write leaves `objects/`
/// untouched (spec §4.1 "Staging and transactions").
pub struct Transaction<'repo> {
    repo: &'repo Repo,
    staging: crate::tmp::StagingDir,
}

impl<'repo> Transaction<'repo> {
    /// An object store that stages writes here and falls back to
    /// `objects/`, then the parent chain, on reads.
    pub fn store(&self) -> Result<ObjectStore> {
        let objects = self.repo.root.open_dir("objects")?;
        let config = self.repo.config();
        let mut store = ObjectStore::new(objects, config.mode, config.fsync, config.disable_xattrs, config.zlib_level)
            .with_dirmeta_cache(self.repo.dirmeta_cache.clone())
            .with_min_free_space(config.min_free_space_percent)
            .with_staging(self.staging.dir().try_clone()?);
        if let Some(parent) = &self.repo.parent {
            store = store.with_parent(parent.object_store()?);
        }
        Ok(store)
    }

    /// Promote every staged object into `objects/`. The (now empty)
    /// staging directory is left for [`crate::tmp::sweep_expired`] rather
    /// than removed here, matching the lock-outlives-directory protocol.
    pub fn commit(self) -> Result<()> {
        let objects = self.repo.root.open_dir("objects")?;
        crate::objects::store::promote_staged(&objects, self.staging.dir())
    }

    /// Abandon the transaction: any staged objects are left behind for
    /// the next [`crate::tmp::sweep_expired`] pass rather than promoted.
    pub fn abort(self) {}
}

/// `bare-user` identity requires the `user.*` xattr namespace; probe it by
/// writing a throwaway file with a test `user.ostreemeta` value, per spec
/// §4.1 "create(mode)": failure here is fatal, not degraded-mode.
fn probe_user_xattr_support(root: &Dir) -> Result<()> {
    const PROBE_NAME: &str = ".ostcore-xattr-probe";
    root.atomic_write(PROBE_NAME, b"probe")?;
    let outcome = (|| -> std::io::Result<()> {
        let file = root.open(PROBE_NAME)?;
        rustix::fs::fsetxattr(
            std::os::fd::AsFd::as_fd(&file),
            "user.ostreemeta",
            b"probe",
            rustix::fs::XattrFlags::empty(),
        )
        .map_err(std::io::Error::from)
    })();
    let _ = root.remove_file(PROBE_NAME);
    outcome.map_err(|e| {
        Error::Unsupported(format!(
            "filesystem does not support the user.* xattr namespace required by bare-user mode: {e}"
        ))
    })
}

fn partial_marker_path(digest: crate::objects::Digest) -> camino::Utf8PathBuf {
    camino::Utf8PathBuf::from(format!("state/{digest}.commitpartial"))
}

fn probe_writable(dir: &Dir) -> bool {
    rustix::fs::accessat(
        dir,
        ".",
        rustix::fs::Access::WRITE_OK,
        rustix::fs::AtFlags::empty(),
    )
    .is_ok()
}

fn read_boot_id() -> String {
    std::fs::read_to_string("/proc/sys/kernel/random/boot_id")
        .map(|s| s.trim().replace('-', ""))
        .unwrap_or_else(|_| "unknown-boot".to_string())
}

fn is_same_inode(dir: &Dir, other: &camino::Utf8Path) -> bool {
    let Ok(dir_stat) = rustix::fs::fstat(dir) else {
        return false;
    };
    let Ok(other_stat) = rustix::fs::stat(other.as_std_path()) else {
        return false;
    };
    dir_stat.st_dev == other_stat.st_dev && dir_stat.st_ino == other_stat.st_ino
}

#[cfg(test)]
mod tests {
    use super::*;
    use cap_std_ext::cap_tempfile;

    #[test]
    fn create_then_open_round_trips_mode() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::ArchiveZ2).unwrap();
        assert_eq!(repo.config().mode, StorageMode::ArchiveZ2);

        let reopened = Repo::open(td.try_clone().unwrap()).unwrap();
        assert_eq!(reopened.config().mode, StorageMode::ArchiveZ2);
    }

    #[test]
    fn create_over_an_existing_repo_succeeds_and_keeps_the_original_mode() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        Repo::create(td.try_clone().unwrap(), StorageMode::Bare).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::ArchiveZ2).unwrap();
        assert_eq!(repo.config().mode, StorageMode::Bare);
    }

    #[test]
    fn open_missing_config_is_not_found() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let err = Repo::open(td.try_clone().unwrap()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn rejects_obsolete_repo_version() {
        let mut kf = KeyFile::new();
        kf.set("core", "repo_version", "2");
        kf.set("core", "mode", "bare");
        assert!(RepoConfig::from_keyfile(&kf).is_err());
    }

    #[test]
    fn rejects_obsolete_archive_flag() {
        let mut kf = KeyFile::new();
        kf.set("core", "mode", "bare");
        kf.set("core", "archive", "true");
        assert!(RepoConfig::from_keyfile(&kf).is_err());
    }

    #[test]
    fn commitpartial_marker_round_trips() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::Bare).unwrap();
        let digest = crate::objects::Digest::of(b"commit bytes");
        assert!(!repo.is_partial(digest).unwrap());
        repo.mark_partial(digest).unwrap();
        assert!(repo.is_partial(digest).unwrap());
        repo.clear_partial(digest).unwrap();
        assert!(!repo.is_partial(digest).unwrap());
    }

    #[test]
    fn clear_partial_on_missing_marker_is_ok() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::Bare).unwrap();
        let digest = crate::objects::Digest::of(b"never marked");
        assert!(repo.clear_partial(digest).is_ok());
    }

    #[test]
    fn transaction_commit_promotes_staged_object_into_objects() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::Bare).unwrap();
        let txn = repo.begin_transaction().unwrap();
        let store = txn.store().unwrap();

        let dirtree = crate::objects::DirTree::default();
        let bytes = dirtree.to_bytes();
        let digest = crate::objects::Digest::of(&bytes);
        let id = crate::objects::digest::ObjectId::new(digest, crate::objects::digest::ObjectType::DirTree);
        store.import_bytes(id, &bytes).unwrap();
        assert!(store.has_object(id).unwrap());

        let bare_store = repo.object_store().unwrap();
        assert!(!bare_store.has_object(id).unwrap());

        txn.commit().unwrap();
        let bare_store = repo.object_store().unwrap();
        assert!(bare_store.has_object(id).unwrap());
    }

    #[test]
    fn remote_option_inherits_from_parent_but_bool_does_not() {
        let parent_fs_dir = tempfile::tempdir().unwrap();
        let parent_root = Dir::open_ambient_dir(parent_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        let parent_repo = Repo::create(parent_root, StorageMode::Bare).unwrap();
        parent_repo
            .remotes()
            .add(crate::remotes::Remote::new("upstream", "https://a.example/"))
            .unwrap();
        parent_repo.remotes().save(parent_repo.root_dir()).unwrap();

        let child_fs_dir = tempfile::tempdir().unwrap();
        let child_root = Dir::open_ambient_dir(child_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        let child_repo = Repo::create(child_root, StorageMode::Bare).unwrap();
        {
            let mut kf = child_repo.keyfile.lock().unwrap();
            kf.set("core", "parent", parent_fs_dir.path().to_str().unwrap());
        }
        child_repo.save_config().unwrap();
        let mut no_url_override = crate::remotes::Remote::new("upstream", "https://a.example/");
        no_url_override.url = None;
        no_url_override.gpg_verify = false;
        child_repo.remotes().add(no_url_override).unwrap();
        child_repo.remotes().save(child_repo.root_dir()).unwrap();

        let reopened_root = Dir::open_ambient_dir(child_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        let reopened = Repo::open(reopened_root).unwrap();
        let resolved = reopened.get_remote("upstream").unwrap();
        assert_eq!(resolved.url.as_deref(), Some("https://a.example/"));
        assert!(!resolved.gpg_verify);
    }

    #[test]
    fn file_url_bypass_returns_transient_remote() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let repo = Repo::create(td.try_clone().unwrap(), StorageMode::Bare).unwrap();
        let remote = repo.get_remote("file:///var/repo").unwrap();
        assert!(!remote.gpg_verify);
        assert_eq!(remote.url.as_deref(), Some("file:///var/repo"));
    }

    #[test]
    fn parent_path_in_config_opens_recursively() {
        let parent_fs_dir = tempfile::tempdir().unwrap();
        let parent_root = Dir::open_ambient_dir(parent_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        Repo::create(parent_root, StorageMode::Bare).unwrap();

        let child_fs_dir = tempfile::tempdir().unwrap();
        let child_root = Dir::open_ambient_dir(child_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        let child_repo = Repo::create(child_root, StorageMode::Bare).unwrap();
        {
            let mut kf = child_repo.keyfile.lock().unwrap();
            kf.set("core", "parent", parent_fs_dir.path().to_str().unwrap());
        }
        child_repo.save_config().unwrap();

        let reopened_root = Dir::open_ambient_dir(child_fs_dir.path(), cap_std::ambient_authority()).unwrap();
        let reopened = Repo::open(reopened_root).unwrap();
        assert!(reopened.parent.is_some());
    }
}
