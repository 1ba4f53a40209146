//! Object addressing: digests, kinds, and the loose-object path layout.

use crate::error::{Error, Result};
use camino::Utf8PathBuf;
use std::fmt;

/// The kind of an object, corresponding to a loose-object file extension.
///
/// `CommitMeta` and `TombstoneCommit` are auxiliary kinds per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Regular file, symlink, or device.
    File,
    /// Directory listing.
    DirTree,
    /// Directory identity (uid/gid/mode/xattrs).
    DirMeta,
    /// Commit: root dirtree/dirmeta, parent, timestamp, subject/body.
    Commit,
    /// Detached metadata co-located with a commit.
    CommitMeta,
    /// Marker for a deleted commit when tombstones are enabled.
    TombstoneCommit,
}

impl ObjectType {
    /// The on-disk extension for this kind, given the repository's
    /// storage mode (only `File` varies: `.filez` under archive-z2).
    pub fn extension(self, is_archive: bool) -> &'static str {
        match self {
            ObjectType::File if is_archive => "filez",
            ObjectType::File => "file",
            ObjectType::DirTree => "dirtree",
            ObjectType::DirMeta => "dirmeta",
            ObjectType::Commit => "commit",
            ObjectType::CommitMeta => "commitmeta",
            ObjectType::TombstoneCommit => "committombstone",
        }
    }

    /// True for the "metadata" kinds loaded via [`crate::objects::store::ObjectStore::load_variant`]
    /// rather than [`crate::objects::store::ObjectStore::load_file`].
    pub fn is_metadata(self) -> bool {
        !matches!(self, ObjectType::File)
    }
}

/// A 256-bit content digest, rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex digest.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid_config(format!("invalid digest: {s}")));
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_val(chunk[0]);
            let lo = hex_val(chunk[1]);
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// Compute the SHA-256 digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        use sha2::Digest as _;
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        let out: [u8; 32] = hasher.finalize().into();
        Self(out)
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The two-hex-character directory prefix (`objects/XX/`).
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// The remaining 62-hex-character file stem.
    pub fn stem(&self) -> String {
        let full = hex::encode(self.0);
        full[2..].to_string()
    }

    /// The full 64-character hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A digest paired with the object kind it names; the full identity of a
/// loose object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// The content digest.
    pub digest: Digest,
    /// The kind of object this digest names.
    pub kind: ObjectType,
}

impl ObjectId {
    /// Construct an object identity.
    pub fn new(digest: Digest, kind: ObjectType) -> Self {
        Self { digest, kind }
    }

    /// The path relative to the object store's root directory (the
    /// repository's `objects/`, or a staging directory holding loose
    /// objects in progress): `XX/YYYY….ext`.
    pub fn loose_path(&self, is_archive: bool) -> Utf8PathBuf {
        let mut p = Utf8PathBuf::new();
        p.push(self.digest.prefix());
        p.push(format!(
            "{}.{}",
            self.digest.stem(),
            self.kind.extension(is_archive)
        ));
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders() {
        let hex = "a".repeat(64);
        let d = Digest::parse(&hex).unwrap();
        assert_eq!(d.to_hex(), hex);
        assert_eq!(d.prefix(), "aa");
        assert_eq!(d.stem().len(), 62);
    }

    #[test]
    fn rejects_bad_length() {
        assert!(Digest::parse("abcd").is_err());
    }

    #[test]
    fn loose_path_layout() {
        let d = Digest::parse(&"ab".repeat(32)).unwrap();
        let oid = ObjectId::new(d, ObjectType::Commit);
        assert_eq!(oid.loose_path(false).as_str(), format!("ab/{}.commit", "ab".repeat(31)));
    }

    #[test]
    fn filez_only_under_archive() {
        let d = Digest::parse(&"11".repeat(32)).unwrap();
        let oid = ObjectId::new(d, ObjectType::File);
        assert!(oid.loose_path(false).as_str().ends_with(".file"));
        assert!(oid.loose_path(true).as_str().ends_with(".filez"));
    }

    #[test]
    fn hashing_is_deterministic() {
        let a = Digest::of(b"hello world");
        let b = Digest::of(b"hello world");
        assert_eq!(a, b);
        let c = Digest::of(b"hello world!");
        assert_ne!(a, c);
    }
}
