//! Structured views over the metadata variants (spec §6).
//!
//! Each type here is the "tagged variant type with accessors" the design
//! notes (spec §9) call for in place of `GVariant` introspection. Field
//! order in [`Value::Tuple`] construction is normative; each `to_value`/
//! `from_value` pair documents the tuple signature it implements.

use super::digest::Digest;
use super::variant::Value;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A single extended attribute, `(name, value)`.
pub type Xattr = (Vec<u8>, Vec<u8>);

pub(crate) fn xattrs_to_value(xattrs: &[Xattr]) -> Value {
    Value::Array(
        xattrs
            .iter()
            .map(|(k, v)| Value::Tuple(vec![Value::Bytes(k.clone()), Value::Bytes(v.clone())]))
            .collect(),
    )
}

pub(crate) fn xattrs_from_value(v: &Value) -> Result<Vec<Xattr>> {
    v.as_array()?
        .iter()
        .map(|entry| {
            let t = entry.as_tuple()?;
            let (k, v) = (
                t.first().ok_or_else(|| Error::corruption("xattr missing key"))?,
                t.get(1).ok_or_else(|| Error::corruption("xattr missing value"))?,
            );
            Ok((k.as_bytes()?.to_vec(), v.as_bytes()?.to_vec()))
        })
        .collect()
}

/// `DIR_META`: POSIX identity of a directory (or, for bare-user, of a
/// regular file stashed in its `user.ostreemeta` xattr — same layout,
/// called `FILEMETA` in spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirMeta {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// POSIX mode bits (including the type bits for `FILEMETA` use).
    pub mode: u32,
    /// Extended attributes.
    pub xattrs: Vec<Xattr>,
}

impl DirMeta {
    /// Canonical all-zero identity used by `BARE_USER_ONLY`.
    pub fn canonical() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: 0o644,
            xattrs: Vec::new(),
        }
    }

    /// Encode as the `(uuua(ayay))` tuple.
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::U32(self.uid),
            Value::U32(self.gid),
            Value::U32(self.mode),
            xattrs_to_value(&self.xattrs),
        ])
    }

    /// Decode from the `(uuua(ayay))` tuple.
    pub fn from_value(v: &Value) -> Result<Self> {
        let t = v.as_tuple()?;
        if t.len() != 4 {
            return Err(Error::corruption("dirmeta: expected 4 fields"));
        }
        Ok(Self {
            uid: t[0].as_u32()?,
            gid: t[1].as_u32()?,
            mode: t[2].as_u32()?,
            xattrs: xattrs_from_value(&t[3])?,
        })
    }

    /// Serialize to bytes (the `.dirmeta` loose-object payload, and the
    /// `user.ostreemeta` xattr payload for bare-user regular files).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(&Value::from_bytes(data)?)
    }
}

/// `DIR_TREE`: a directory listing of child files and subdirectories.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirTree {
    /// `name -> file digest`, sorted by name.
    pub files: BTreeMap<String, Digest>,
    /// `name -> (dirtree digest, dirmeta digest)`, sorted by name.
    pub dirs: BTreeMap<String, (Digest, Digest)>,
}

impl DirTree {
    /// Encode as the `(a(say)a(sayay))` tuple.
    pub fn to_value(&self) -> Value {
        let files = Value::Array(
            self.files
                .iter()
                .map(|(name, d)| {
                    Value::Tuple(vec![Value::Str(name.clone()), Value::Bytes(d.as_bytes().to_vec())])
                })
                .collect(),
        );
        let dirs = Value::Array(
            self.dirs
                .iter()
                .map(|(name, (tree, meta))| {
                    Value::Tuple(vec![
                        Value::Str(name.clone()),
                        Value::Bytes(tree.as_bytes().to_vec()),
                        Value::Bytes(meta.as_bytes().to_vec()),
                    ])
                })
                .collect(),
        );
        Value::Tuple(vec![files, dirs])
    }

    /// Decode from the `(a(say)a(sayay))` tuple.
    pub fn from_value(v: &Value) -> Result<Self> {
        let t = v.as_tuple()?;
        if t.len() != 2 {
            return Err(Error::corruption("dirtree: expected 2 fields"));
        }
        let mut files = BTreeMap::new();
        for entry in t[0].as_array()? {
            let e = entry.as_tuple()?;
            let name = e[0].as_str()?.to_string();
            let digest = digest_from_bytes(e[1].as_bytes()?)?;
            files.insert(name, digest);
        }
        let mut dirs = BTreeMap::new();
        for entry in t[1].as_array()? {
            let e = entry.as_tuple()?;
            let name = e[0].as_str()?.to_string();
            let tree = digest_from_bytes(e[1].as_bytes()?)?;
            let meta = digest_from_bytes(e[2].as_bytes()?)?;
            dirs.insert(name, (tree, meta));
        }
        Ok(Self { files, dirs })
    }

    /// Serialize to bytes (the `.dirtree` loose-object payload).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(&Value::from_bytes(data)?)
    }
}

fn digest_from_bytes(b: &[u8]) -> Result<Digest> {
    let arr: [u8; 32] = b
        .try_into()
        .map_err(|_| Error::corruption("digest field is not 32 bytes"))?;
    Ok(Digest::from_bytes(arr))
}

/// `COMMIT`: the root object of a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Free-form commit metadata (`a{sv}`).
    pub metadata: BTreeMap<String, Value>,
    /// Parent commit digest, or `None` for the initial commit.
    pub parent: Option<Digest>,
    /// Related commits (unused by the core; preserved for round-tripping).
    pub related: Vec<(String, Digest)>,
    /// One-line subject.
    pub subject: String,
    /// Multi-line body.
    pub body: String,
    /// Commit timestamp, seconds since the epoch.
    pub timestamp: u64,
    /// Root `DIR_TREE` digest.
    pub root_dirtree: Digest,
    /// Root `DIR_META` digest.
    pub root_dirmeta: Digest,
}

impl Commit {
    /// Encode as the `(a{sv}aya(say)sstayay)` tuple.
    pub fn to_value(&self) -> Value {
        let metadata = Value::Dict(self.metadata.clone());
        let parent = Value::Bytes(self.parent.map(|d| d.as_bytes().to_vec()).unwrap_or_default());
        let related = Value::Array(
            self.related
                .iter()
                .map(|(name, d)| {
                    Value::Tuple(vec![Value::Str(name.clone()), Value::Bytes(d.as_bytes().to_vec())])
                })
                .collect(),
        );
        Value::Tuple(vec![
            metadata,
            parent,
            related,
            Value::Str(self.subject.clone()),
            Value::Str(self.body.clone()),
            Value::U64(self.timestamp),
            Value::Bytes(self.root_dirtree.as_bytes().to_vec()),
            Value::Bytes(self.root_dirmeta.as_bytes().to_vec()),
        ])
    }

    /// Decode from the `(a{sv}aya(say)sstayay)` tuple.
    pub fn from_value(v: &Value) -> Result<Self> {
        let t = v.as_tuple()?;
        if t.len() != 8 {
            return Err(Error::corruption("commit: expected 8 fields"));
        }
        let metadata = t[0].as_dict()?.clone();
        let parent_bytes = t[1].as_bytes()?;
        let parent = if parent_bytes.is_empty() {
            None
        } else {
            Some(digest_from_bytes(parent_bytes)?)
        };
        let mut related = Vec::new();
        for entry in t[2].as_array()? {
            let e = entry.as_tuple()?;
            related.push((e[0].as_str()?.to_string(), digest_from_bytes(e[1].as_bytes()?)?));
        }
        Ok(Self {
            metadata,
            parent,
            related,
            subject: t[3].as_str()?.to_string(),
            body: t[4].as_str()?.to_string(),
            timestamp: t[5].as_u64()?,
            root_dirtree: digest_from_bytes(t[6].as_bytes()?)?,
            root_dirmeta: digest_from_bytes(t[7].as_bytes()?)?,
        })
    }

    /// Serialize to bytes (the `.commit` loose-object payload).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(&Value::from_bytes(data)?)
    }
}

/// Detached commit (or summary) metadata: `a{sv}`, normally holding
/// `ostree.gpgsigs` -> array of detached OpenPGP signature packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetachedMeta(pub BTreeMap<String, Value>);

/// The well-known key under which detached signatures are stored.
pub const GPGSIGS_KEY: &str = "ostree.gpgsigs";

impl DetachedMeta {
    /// Signatures currently attached under [`GPGSIGS_KEY`].
    pub fn gpgsigs(&self) -> Vec<Vec<u8>> {
        match self.0.get(GPGSIGS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_bytes().ok().map(|b| b.to_vec()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Append a detached signature packet.
    pub fn add_gpgsig(&mut self, sig: Vec<u8>) {
        let entry = self
            .0
            .entry(GPGSIGS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::Bytes(sig));
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        Value::Dict(self.0.clone()).to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self(Value::from_bytes(data)?.as_dict()?.clone()))
    }
}

/// `TOMBSTONE_COMMIT`: marker recording a deleted commit digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    /// The digest of the commit this tombstone replaces.
    pub commit: Digest,
}

impl Tombstone {
    /// The dict key under which the replaced digest is stored.
    pub const KEY: &'static str = "commit";

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut map = BTreeMap::new();
        map.insert(
            Self::KEY.to_string(),
            Value::Bytes(self.commit.as_bytes().to_vec()),
        );
        Value::Dict(map).to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let dict = Value::from_bytes(data)?.as_dict()?.clone();
        let commit = dict
            .get(Self::KEY)
            .ok_or_else(|| Error::corruption("tombstone missing commit key"))?
            .as_bytes()?;
        Ok(Self {
            commit: digest_from_bytes(commit)?,
        })
    }
}
