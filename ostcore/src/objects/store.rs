//! The loose-object store: storage-mode dispatch and the
//! staging→main→parent lookup cascade (spec §3, §4.2, §5).

use super::content::{self, FileContent, FileInfo, Payload};
use super::digest::{Digest, ObjectId, ObjectType};
use super::format::{Commit, DetachedMeta, DirMeta, DirTree, Tombstone, Xattr};
use crate::cache::DirMetaCache;
use crate::error::{Error, Result};
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use cap_std_ext::dirext::CapStdExtDirExt;
use std::collections::BTreeSet;
use std::io::Read;
use std::os::fd::AsFd;

/// How file content and directory identity are represented on disk
/// (spec §3 "Storage mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Plain files on disk; identity is the real uid/gid/mode, real xattrs.
    Bare,
    /// Plain files owned by the repo's own uid; real identity and xattrs
    /// are packed into the `user.ostreemeta` xattr (spec invariant 4).
    BareUser,
    /// Like `BareUser`, but identity and xattrs are canonicalized away
    /// entirely rather than preserved (spec invariant 4).
    BareUserOnly,
    /// Zlib-compressed content blobs with a length-framed header
    /// (`.filez`); directory identity stored the same as `Bare`.
    ArchiveZ2,
}

impl StorageMode {
    /// Parse a `core/mode` config value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bare" => Ok(Self::Bare),
            "bare-user" => Ok(Self::BareUser),
            "bare-user-only" => Ok(Self::BareUserOnly),
            "archive-z2" => Ok(Self::ArchiveZ2),
            "archive" => Err(Error::Unsupported(
                "mode 'archive' (v1, uncompressed) was retired; use archive-z2".into(),
            )),
            other => Err(Error::invalid_config(format!("unknown core/mode: {other}"))),
        }
    }

    /// The config string for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bare => "bare",
            Self::BareUser => "bare-user",
            Self::BareUserOnly => "bare-user-only",
            Self::ArchiveZ2 => "archive-z2",
        }
    }

    /// True for [`Self::ArchiveZ2`].
    pub fn is_archive(self) -> bool {
        matches!(self, Self::ArchiveZ2)
    }

    /// True when identity/xattrs must be canonicalized away on write and
    /// presented as canonical on read, regardless of what's on disk.
    pub fn canonicalizes_identity(self) -> bool {
        matches!(self, Self::BareUserOnly)
    }

    /// True when real identity/xattrs live in the `user.ostreemeta` xattr
    /// rather than the inode itself.
    pub fn identity_in_xattr(self) -> bool {
        matches!(self, Self::BareUser)
    }
}

const USER_OSTREEMETA: &str = "user.ostreemeta";
/// Loads strictly larger than this size use an mmap instead of a heap
/// buffer; a blob of exactly this size still reads into a buffer (spec
/// §4.2 "Large metadata", boundary behavior "16 KiB uses the
/// read-into-buffer path; 16 KiB + 1 uses mmap").
const MMAP_THRESHOLD: u64 = 16 * 1024;

/// Bytes backing a loaded object: either owned or borrowed from a
/// memory-mapped file, chosen by [`MMAP_THRESHOLD`].
pub enum RawBytes {
    /// Heap-allocated; used for objects at or below the mmap threshold.
    Owned(Vec<u8>),
    /// Memory-mapped; used for objects larger than the mmap threshold.
    Mapped(memmap2::Mmap),
}

impl std::ops::Deref for RawBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Mapped(m) => m,
        }
    }
}

impl std::fmt::Debug for RawBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawBytes({} bytes)", self.len())
    }
}

/// A loose-object store over a single `objects/` directory, optionally
/// backed by a staging directory (consulted first) and a parent store
/// (consulted last), matching the commit-traversal fallback chain
/// used for repo inheritance (spec §4.1 "Parent repositories").
#[derive(Debug)]
pub struct ObjectStore {
    objects_dir: Dir,
    staging_dir: Option<Dir>,
    parent: Option<Box<ObjectStore>>,
    mode: StorageMode,
    fsync: bool,
    disable_xattrs: bool,
    zlib_level: u32,
    dirmeta_cache: DirMetaCache,
    min_free_space_percent: u8,
}

impl ObjectStore {
    /// Build a store rooted at an already-opened `objects/` directory.
    pub fn new(objects_dir: Dir, mode: StorageMode, fsync: bool, disable_xattrs: bool, zlib_level: u32) -> Self {
        Self {
            objects_dir,
            staging_dir: None,
            parent: None,
            mode,
            fsync,
            disable_xattrs,
            zlib_level,
            dirmeta_cache: DirMetaCache::new(),
            min_free_space_percent: 0,
        }
    }

    /// Enforce `core/min-free-space-percent` before writes (spec §9 open
    /// question: "apply it consistently to all atomic writes" rather than
    /// just some writer paths). `0` disables the check.
    pub fn with_min_free_space(mut self, percent: u8) -> Self {
        self.min_free_space_percent = percent;
        self
    }

    /// Attach a staging directory to be consulted before `objects/`.
    pub fn with_staging(mut self, staging_dir: Dir) -> Self {
        self.staging_dir = Some(staging_dir);
        self
    }

    /// Attach a parent store to be consulted after `objects/` and staging.
    pub fn with_parent(mut self, parent: ObjectStore) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Attach a shared dirmeta cache.
    pub fn with_dirmeta_cache(mut self, cache: DirMetaCache) -> Self {
        self.dirmeta_cache = cache;
        self
    }

    /// This store's storage mode.
    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    fn check_free_space(&self) -> Result<()> {
        if self.min_free_space_percent == 0 {
            return Ok(());
        }
        let target_dir = self.staging_dir.as_ref().unwrap_or(&self.objects_dir);
        let stat = rustix::fs::fstatvfs(target_dir.as_fd()).map_err(std::io::Error::from)?;
        if stat.f_blocks == 0 {
            return Ok(());
        }
        let available = ((stat.f_bavail as u128 * 100) / stat.f_blocks as u128).min(100) as u8;
        if available < self.min_free_space_percent {
            return Err(Error::Unsupported(format!(
                "insufficient free space: {available}% available, {}% required",
                self.min_free_space_percent
            )));
        }
        Ok(())
    }

    fn find_dir_with(&self, path: &camino::Utf8Path) -> Result<Option<&Dir>> {
        if let Some(staging) = &self.staging_dir {
            if staging.try_exists(path)? {
                return Ok(Some(staging));
            }
        }
        if self.objects_dir.try_exists(path)? {
            return Ok(Some(&self.objects_dir));
        }
        if let Some(parent) = &self.parent {
            return parent.find_dir_with(path);
        }
        Ok(None)
    }

    /// True if the object exists in this store or any ancestor.
    pub fn has_object(&self, id: ObjectId) -> Result<bool> {
        let path = id.loose_path(self.mode.is_archive());
        Ok(self.find_dir_with(&path)?.is_some())
    }

    /// Total on-disk size of an object, in bytes.
    pub fn query_size(&self, id: ObjectId) -> Result<u64> {
        let path = id.loose_path(self.mode.is_archive());
        let dir = self
            .find_dir_with(&path)?
            .ok_or_else(|| Error::not_found(format!("{}.{}", id.digest, id.kind.extension(self.mode.is_archive()))))?;
        Ok(dir.metadata(&path)?.len())
    }

    fn read_bytes(&self, path: &camino::Utf8Path) -> Result<RawBytes> {
        let dir = self
            .find_dir_with(path)?
            .ok_or_else(|| Error::not_found(path.to_string()))?;
        let file = dir.open(path)?;
        let len = file.metadata()?.len();
        if len > MMAP_THRESHOLD {
            // SAFETY: the file is not concurrently truncated by this
            // process; loose objects are written-once under their final
            // name via write-temp-then-rename.
            #[allow(unsafe_code)]
            let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(Error::Io)?;
            Ok(RawBytes::Mapped(mmap))
        } else {
            let mut buf = Vec::with_capacity(len as usize);
            let mut file = file;
            file.read_to_end(&mut buf)?;
            Ok(RawBytes::Owned(buf))
        }
    }

    /// Load a metadata object's decoded variant bytes.
    fn load_metadata_bytes(&self, digest: Digest, kind: ObjectType) -> Result<RawBytes> {
        let id = ObjectId::new(digest, kind);
        self.read_bytes(&id.loose_path(self.mode.is_archive()))
    }

    /// Load and decode a `COMMIT` object.
    pub fn load_commit(&self, digest: Digest) -> Result<Commit> {
        let bytes = self.load_metadata_bytes(digest, ObjectType::Commit)?;
        Commit::from_bytes(&bytes)
    }

    /// Load and decode a `COMMIT_META` (detached metadata) object, if one
    /// exists for this commit.
    pub fn load_commit_meta(&self, digest: Digest) -> Result<Option<DetachedMeta>> {
        let id = ObjectId::new(digest, ObjectType::CommitMeta);
        if !self.has_object(id)? {
            return Ok(None);
        }
        let bytes = self.load_metadata_bytes(digest, ObjectType::CommitMeta)?;
        Ok(Some(DetachedMeta::from_bytes(&bytes)?))
    }

    /// Load and decode a `DIR_TREE` object.
    pub fn load_dirtree(&self, digest: Digest) -> Result<DirTree> {
        let bytes = self.load_metadata_bytes(digest, ObjectType::DirTree)?;
        DirTree::from_bytes(&bytes)
    }

    /// Load and decode a `DIR_META` object, consulting (and populating)
    /// the dirmeta cache when one is enabled.
    pub fn load_dirmeta(&self, digest: Digest) -> Result<DirMeta> {
        if let Some(cached) = self.dirmeta_cache.get(&digest) {
            return Ok(cached);
        }
        let bytes = self.load_metadata_bytes(digest, ObjectType::DirMeta)?;
        let meta = DirMeta::from_bytes(&bytes)?;
        self.dirmeta_cache.insert(digest, meta.clone());
        Ok(meta)
    }

    /// Load and decode a `TOMBSTONE_COMMIT` marker, if present.
    pub fn load_tombstone(&self, digest: Digest) -> Result<Option<Tombstone>> {
        let id = ObjectId::new(digest, ObjectType::TombstoneCommit);
        if !self.has_object(id)? {
            return Ok(None);
        }
        let bytes = self.load_metadata_bytes(digest, ObjectType::TombstoneCommit)?;
        Ok(Some(Tombstone::from_bytes(&bytes)?))
    }

    /// Load and decode a `FILE` object, dispatching on storage mode.
    pub fn load_file(&self, digest: Digest) -> Result<FileContent> {
        let id = ObjectId::new(digest, ObjectType::File);
        let path = id.loose_path(self.mode.is_archive());
        let dir = self
            .find_dir_with(&path)?
            .ok_or_else(|| Error::not_found(digest.to_string()))?;

        if self.mode.is_archive() {
            let bytes = self.read_bytes(&path)?;
            return content::decode_archive(&bytes);
        }

        let stat = rustix::fs::statat(dir.as_fd(), path.as_str(), rustix::fs::AtFlags::SYMLINK_NOFOLLOW)
            .map_err(std::io::Error::from)?;
        let is_symlink = (stat.st_mode as u32) & libc::S_IFMT == libc::S_IFLNK;

        if is_symlink {
            let target = dir.read_link(&path)?;
            let target = {
                use std::os::unix::ffi::OsStrExt;
                target.as_os_str().as_bytes().to_vec()
            };
            // Symlinks never carry the user.ostreemeta xattr trick (most
            // filesystems reject setxattr on a symlink); identity comes
            // straight from the link inode's own lstat result.
            let info = if self.mode.canonicalizes_identity() {
                FileInfo { uid: 0, gid: 0, mode: libc::S_IFLNK | 0o777, size: target.len() as u64 }
            } else {
                FileInfo { uid: stat.st_uid, gid: stat.st_gid, mode: stat.st_mode as u32, size: target.len() as u64 }
            };
            return Ok(FileContent { info, xattrs: Vec::new(), payload: Payload::Symlink(target) });
        }

        let mut file = dir.open(&path)?;
        let size = stat.st_size as u64;
        let (info, xattrs) = self.load_identity(&file, stat.st_mode as u32, size)?;
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        Ok(FileContent { info, xattrs, payload: Payload::Regular(buf) })
    }

    fn load_identity(&self, file: &cap_std::fs::File, raw_mode: u32, size: u64) -> Result<(FileInfo, Vec<Xattr>)> {
        if self.mode.canonicalizes_identity() {
            return Ok((FileInfo { uid: 0, gid: 0, mode: raw_mode, size }, Vec::new()));
        }
        if self.mode.identity_in_xattr() {
            let raw = read_xattr(file, USER_OSTREEMETA)?
                .ok_or_else(|| Error::corruption(format!("missing {USER_OSTREEMETA}")))?;
            let meta = content::decode_bare_user_meta(&raw)?;
            return Ok((FileInfo { uid: meta.uid, gid: meta.gid, mode: meta.mode, size }, meta.xattrs));
        }
        let stat = rustix::fs::fstat(file.as_fd()).map_err(std::io::Error::from)?;
        let info = FileInfo { uid: stat.st_uid, gid: stat.st_gid, mode: stat.st_mode as u32, size };
        let xattrs = if self.disable_xattrs { Vec::new() } else { list_xattrs(file)? };
        Ok((info, xattrs))
    }

    /// Overwrite a commit's detached metadata (`COMMIT_META`). Unlike
    /// [`Self::import_bytes`], this always writes: detached metadata is
    /// keyed by the *commit's* digest, not a hash of its own bytes, so
    /// appending a new GPG signature legitimately changes its content in
    /// place (spec §4.4 "Sign commit").
    pub fn write_commit_meta(&self, digest: Digest, meta: &DetachedMeta) -> Result<()> {
        self.check_free_space()?;
        let target_dir = self.staging_dir.as_ref().unwrap_or(&self.objects_dir);
        let path = ObjectId::new(digest, ObjectType::CommitMeta).loose_path(self.mode.is_archive());
        ensure_parent(target_dir, &path)?;
        target_dir.atomic_write(&path, meta.to_bytes())?;
        if self.fsync {
            let f = target_dir.open(&path)?;
            f.sync_all()?;
        }
        Ok(())
    }

    /// Does this digest already name an object under this store (or a
    /// parent) with a *different* kind? Used by writers to reject
    /// type-confusion before linking a new object into place.
    pub fn kind_conflict(&self, digest: Digest, kind: ObjectType) -> Result<bool> {
        for other in [
            ObjectType::File,
            ObjectType::DirTree,
            ObjectType::DirMeta,
            ObjectType::Commit,
            ObjectType::CommitMeta,
            ObjectType::TombstoneCommit,
        ] {
            if other == kind {
                continue;
            }
            if self.has_object(ObjectId::new(digest, other))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete a commit's `COMMIT`, `COMMIT_META`, and (if present)
    /// `TOMBSTONE_COMMIT` objects. Does not touch the dirtree/dirmeta/file
    /// objects it referenced; those are reclaimed by a separate prune
    /// pass external to this store (spec non-goal: no GC here).
    pub fn delete_commit(&self, digest: Digest, write_tombstone: bool) -> Result<()> {
        let objects_dir = self
            .staging_dir
            .as_ref()
            .filter(|d| d.try_exists(ObjectId::new(digest, ObjectType::Commit).loose_path(self.mode.is_archive())).unwrap_or(false))
            .unwrap_or(&self.objects_dir);
        let commit_path = ObjectId::new(digest, ObjectType::Commit).loose_path(self.mode.is_archive());
        if write_tombstone {
            let tombstone = Tombstone { commit: digest };
            let tpath = ObjectId::new(digest, ObjectType::TombstoneCommit).loose_path(self.mode.is_archive());
            ensure_parent(objects_dir, &tpath)?;
            objects_dir.atomic_write(&tpath, tombstone.to_bytes())?;
        }
        remove_optional(objects_dir, &commit_path)?;
        let meta_path = ObjectId::new(digest, ObjectType::CommitMeta).loose_path(self.mode.is_archive());
        remove_optional(objects_dir, &meta_path)?;
        Ok(())
    }

    /// Enumerate all objects present in this store, merged with its
    /// parent chain, optionally filtered by kind and/or a leading-hex
    /// prefix of the digest (spec §4.2 "Enumeration").
    pub fn enumerate_objects(&self, kind: Option<ObjectType>, prefix: Option<&str>) -> Result<BTreeSet<ObjectId>> {
        let mut out = BTreeSet::new();
        self.enumerate_into(&mut out, kind, prefix)?;
        Ok(out)
    }

    fn enumerate_into(&self, out: &mut BTreeSet<ObjectId>, kind: Option<ObjectType>, prefix: Option<&str>) -> Result<()> {
        for dir in [self.staging_dir.as_ref(), Some(&self.objects_dir)].into_iter().flatten() {
            enumerate_dir(dir, out, kind, prefix, self.mode.is_archive())?;
        }
        if let Some(parent) = &self.parent {
            parent.enumerate_into(out, kind, prefix)?;
        }
        Ok(())
    }

    /// Write a loose object's bytes atomically into `objects/`, skipping
    /// the write if an identical object is already present anywhere in
    /// the lookup chain (loose objects are content-addressed and
    /// immutable, so a pre-existing object needs no rewrite).
    pub fn import_bytes(&self, id: ObjectId, data: &[u8]) -> Result<()> {
        if self.has_object(id)? {
            return Ok(());
        }
        self.check_free_space()?;
        crate::faultinjection::check(crate::faultinjection::PRE_COMMIT)?;
        let path = id.loose_path(self.mode.is_archive());
        let target_dir = self.staging_dir.as_ref().unwrap_or(&self.objects_dir);
        ensure_parent(target_dir, &path)?;
        target_dir.atomic_write(&path, data)?;
        if self.fsync {
            let f = target_dir.open(&path)?;
            f.sync_all()?;
        }
        Ok(())
    }

    /// Import an object from another store (spec §4.2 "Import").
    ///
    /// When `trusted` and hardlinking is feasible — the source object is
    /// owned by this process's own uid, and either the two stores share
    /// the same storage mode, the object is a metadata kind (not a
    /// regular file), or this is the `BARE_USER` → `BARE_USER_ONLY`
    /// regular-file conversion — attempt `linkat` directly: `EEXIST`
    /// counts as success, and `EMLINK`/`EXDEV`/`EPERM` fall through to a
    /// copy. Otherwise, `has_object` is checked first and the import is
    /// a no-op if the object is already present; failing that, the
    /// object is copied byte-for-byte, with the digest re-verified
    /// unless `trusted`. Commit objects additionally copy their
    /// `COMMIT_META` twin.
    pub fn import_object_from(&self, source: &ObjectStore, id: ObjectId, trusted: bool) -> Result<()> {
        let path = id.loose_path(self.mode.is_archive());
        let src_dir = source
            .find_dir_with(&path)?
            .ok_or_else(|| Error::not_found(format!("source object {}", id.digest)))?;

        if trusted && self.hardlink_feasible(source, src_dir, &path, id.kind)? {
            self.check_free_space()?;
            ensure_parent(&self.objects_dir, &path)?;
            match src_dir.hard_link(&path, &self.objects_dir, &path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) if matches!(e.raw_os_error(), Some(libc::EMLINK) | Some(libc::EXDEV) | Some(libc::EPERM)) => {
                    self.copy_object(src_dir, &path, id, trusted)?;
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            if self.has_object(id)? {
                return Ok(());
            }
            self.copy_object(src_dir, &path, id, trusted)?;
        }

        if id.kind == ObjectType::Commit {
            if let Some(meta) = source.load_commit_meta(id.digest)? {
                self.write_commit_meta(id.digest, &meta)?;
            }
        }
        Ok(())
    }

    /// Whether `import_object_from` may hardlink `path` out of `src_dir`
    /// rather than copy it: metadata kinds are always eligible (they
    /// carry no standalone on-disk identity of their own); a regular
    /// file is eligible when it is owned by this process and either the
    /// source and destination modes match, or this is the `BARE_USER` →
    /// `BARE_USER_ONLY` conversion and the file is not a symlink (spec
    /// §4.2 "Import" step 1).
    fn hardlink_feasible(&self, source: &ObjectStore, src_dir: &Dir, path: &camino::Utf8Path, kind: ObjectType) -> Result<bool> {
        if kind != ObjectType::File {
            return Ok(true);
        }
        let stat = rustix::fs::statat(src_dir.as_fd(), path.as_str(), rustix::fs::AtFlags::SYMLINK_NOFOLLOW)
            .map_err(std::io::Error::from)?;
        if stat.st_uid != rustix::process::getuid().as_raw() {
            return Ok(false);
        }
        if self.mode == source.mode {
            return Ok(true);
        }
        if source.mode == StorageMode::BareUser && self.mode == StorageMode::BareUserOnly {
            let is_symlink = (stat.st_mode as u32) & libc::S_IFMT == libc::S_IFLNK;
            return Ok(!is_symlink);
        }
        Ok(false)
    }

    /// Byte-copy `path` from `src_dir` into this store's `objects/`,
    /// re-verifying the digest unless `trusted`.
    fn copy_object(&self, src_dir: &Dir, path: &camino::Utf8Path, id: ObjectId, trusted: bool) -> Result<()> {
        self.check_free_space()?;
        let bytes = {
            let mut f = src_dir.open(path)?;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            buf
        };
        if !trusted {
            let actual = Digest::of(&bytes);
            if actual != id.digest {
                return Err(Error::corruption(format!("source object {} has mismatched digest {actual}", id.digest)));
            }
        }
        ensure_parent(&self.objects_dir, path)?;
        self.objects_dir.atomic_write(path, &bytes)?;
        if self.fsync {
            let f = self.objects_dir.open(path)?;
            f.sync_all()?;
        }
        Ok(())
    }
}

/// Promote every loose object present under `staging_dir` into
/// `objects_dir`, hardlinking where possible and falling back to a byte
/// copy across filesystem boundaries, then remove it from staging
/// (spec §4.5 "Staging directories", the transaction commit step).
/// Objects already present in `objects_dir` are left as-is and simply
/// dropped from staging, since loose objects are content-addressed and
/// immutable.
pub fn promote_staged(objects_dir: &Dir, staging_dir: &Dir) -> Result<()> {
    let mut prefixes = Vec::new();
    for entry in staging_dir.entries()? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if name.len() == 2 {
            prefixes.push(name);
        }
    }
    for prefix in prefixes {
        let Some(sub) = staging_dir.open_dir_optional(&prefix)? else { continue };
        let mut files = Vec::new();
        for file in sub.entries()? {
            let file = file?;
            if file.file_type()?.is_file() || file.file_type()?.is_symlink() {
                files.push(file.file_name().to_string_lossy().into_owned());
            }
        }
        for name in files {
            let rel = camino::Utf8PathBuf::from(format!("{prefix}/{name}"));
            if objects_dir.try_exists(&rel)? {
                staging_dir.remove_file(&rel)?;
                continue;
            }
            ensure_parent(objects_dir, &rel)?;
            match staging_dir.hard_link(&rel, objects_dir, &rel) {
                Ok(()) => {
                    staging_dir.remove_file(&rel)?;
                }
                Err(_) => {
                    let mut buf = Vec::new();
                    sub.open(&name)?.read_to_end(&mut buf)?;
                    objects_dir.atomic_write(&rel, &buf)?;
                    staging_dir.remove_file(&rel)?;
                }
            }
        }
    }
    Ok(())
}

fn ensure_parent(dir: &Dir, path: &camino::Utf8Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        dir.create_dir_all(parent)?;
    }
    Ok(())
}

fn remove_optional(dir: &Dir, path: &camino::Utf8Path) -> Result<()> {
    match dir.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Scan the two-hex-prefix subdirectories directly under `dir`, which is
/// expected to already be an object store root (the repo's `objects/`,
/// or a staging directory), not a repository root.
fn enumerate_dir(
    dir: &Dir,
    out: &mut BTreeSet<ObjectId>,
    kind_filter: Option<ObjectType>,
    prefix: Option<&str>,
    is_archive: bool,
) -> Result<()> {
    for entry in dir.entries()? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let subdir_name = entry.file_name();
        let subdir_name = subdir_name.to_string_lossy();
        if subdir_name.len() != 2 {
            continue;
        }
        if let Some(prefix) = prefix {
            if prefix.len() >= 2 && !prefix.starts_with(subdir_name.as_ref()) {
                continue;
            }
        }
        let Some(subdir) = dir.open_dir_optional(subdir_name.as_ref())? else {
            continue;
        };
        for file in subdir.entries()? {
            let file = file?;
            if !file.file_type()?.is_file() && !file.file_type()?.is_symlink() {
                continue;
            }
            let name = file.file_name();
            let name = name.to_string_lossy();
            let Some((stem, ext)) = name.rsplit_once('.') else {
                continue;
            };
            if stem.len() != 62 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            let kind = match ext {
                "file" | "filez" => ObjectType::File,
                "dirtree" => ObjectType::DirTree,
                "dirmeta" => ObjectType::DirMeta,
                "commit" => ObjectType::Commit,
                "commitmeta" => ObjectType::CommitMeta,
                "committombstone" => ObjectType::TombstoneCommit,
                _ => continue,
            };
            if let Some(k) = kind_filter {
                if k != kind {
                    continue;
                }
            }
            let full_hex = format!("{subdir_name}{stem}");
            if let Some(prefix) = prefix {
                if !full_hex.starts_with(prefix) {
                    continue;
                }
            }
            let Ok(digest) = Digest::parse(&full_hex) else {
                continue;
            };
            let _ = is_archive;
            out.insert(ObjectId::new(digest, kind));
        }
    }
    Ok(())
}

fn list_xattrs(file: &cap_std::fs::File) -> Result<Vec<Xattr>> {
    let mut namebuf = vec![0u8; 4096];
    let n = loop {
        match rustix::fs::flistxattr(file.as_fd(), &mut namebuf) {
            Ok(n) => break n,
            Err(rustix::io::Errno::RANGE) => {
                namebuf.resize(namebuf.len() * 2, 0);
                continue;
            }
            Err(e) => return Err(Error::Io(e.into())),
        }
    };
    let mut out = Vec::new();
    for name in namebuf[..n].split(|&b| b == 0).filter(|s| !s.is_empty()) {
        let name = std::str::from_utf8(name).map_err(|_| Error::corruption("non-utf8 xattr name"))?;
        if let Some(value) = read_xattr(file, name)? {
            out.push((name.as_bytes().to_vec(), value));
        }
    }
    Ok(out)
}

fn read_xattr(file: &cap_std::fs::File, name: &str) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; 4096];
    loop {
        match rustix::fs::fgetxattr(file.as_fd(), name, &mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(Some(buf));
            }
            Err(rustix::io::Errno::RANGE) => {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            Err(rustix::io::Errno::NODATA) => return Ok(None),
            Err(e) => return Err(Error::Io(e.into())),
        }
    }
}
