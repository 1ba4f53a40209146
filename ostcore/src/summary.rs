//! The summary file builder: a snapshot of every ref and its commit
//! metadata, used by pull clients to avoid a full ref-by-ref HTTP round
//! trip (spec §4.1 "Summary builder").

use crate::error::Result;
use crate::objects::variant::Value;
use crate::objects::{Commit, Digest};
use crate::refs::{self, RefCategory};
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use std::collections::BTreeMap;

/// One ref's entry in the summary: its commit digest plus the metadata
/// the spec calls out as worth advertising (checksum, size, and the
/// commit's own `a{sv}` metadata dict).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    /// The ref's commit digest.
    pub checksum: Digest,
    /// Cumulative on-disk size of the commit's closure, if known.
    /// `0` when not computed (spec non-goal: no closure walk here).
    pub size: u64,
    /// The commit's own metadata dict, copied verbatim.
    pub metadata: BTreeMap<String, Value>,
}

/// A built summary: plain refs plus any collection-id-scoped refs split
/// out separately, matching the real format's `(refs, collection-refs)`
/// partition for peer-to-peer/mirror deployments (spec §4.1 "Summary
/// builder", "Collection map split").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// `name -> entry`, lexicographically ordered by ref name.
    pub refs: BTreeMap<String, SummaryEntry>,
    /// `collection-id -> (name -> entry)`, present only when the
    /// repository has a `core/collection-id` configured.
    pub collection_refs: BTreeMap<String, BTreeMap<String, SummaryEntry>>,
    /// Free-form summary metadata (e.g. `ostree.summary.tombstone-commits`).
    pub metadata: BTreeMap<String, Value>,
}

impl Summary {
    /// Encode as `(a(s(ayt a{sv}))a{sv})` over the plain-refs half;
    /// collection refs are carried in `metadata` under
    /// `ostree.summary.collection-id` plus a parallel collection-map
    /// entry, since this engine does not speak to peer-to-peer pull
    /// clients directly (spec non-goal: no HTTP/P2P transport here).
    pub fn to_value(&self) -> Value {
        let refs = Value::Array(
            self.refs
                .iter()
                .map(|(name, entry)| {
                    Value::Tuple(vec![
                        Value::Str(name.clone()),
                        Value::Tuple(vec![
                            Value::Bytes(entry.checksum.as_bytes().to_vec()),
                            Value::U64(entry.size),
                            Value::Dict(entry.metadata.clone()),
                        ]),
                    ])
                })
                .collect(),
        );
        let collection_refs = Value::Array(
            self.collection_refs
                .iter()
                .map(|(collection_id, refs)| {
                    let inner = Value::Array(
                        refs.iter()
                            .map(|(name, entry)| {
                                Value::Tuple(vec![
                                    Value::Str(name.clone()),
                                    Value::Tuple(vec![
                                        Value::Bytes(entry.checksum.as_bytes().to_vec()),
                                        Value::U64(entry.size),
                                        Value::Dict(entry.metadata.clone()),
                                    ]),
                                ])
                            })
                            .collect(),
                    );
                    Value::Tuple(vec![Value::Str(collection_id.clone()), inner])
                })
                .collect(),
        );
        let mut metadata = self.metadata.clone();
        metadata.insert("ostcore.collection-refs".to_string(), collection_refs);
        Value::Tuple(vec![refs, Value::Dict(metadata)])
    }

    /// Serialize to bytes (the `summary` file payload).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_bytes()
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let v = Value::from_bytes(data)?;
        let t = v.as_tuple()?;
        let mut refs = BTreeMap::new();
        for entry in t[0].as_array()? {
            let e = entry.as_tuple()?;
            let name = e[0].as_str()?.to_string();
            let inner = e[1].as_tuple()?;
            let checksum = crate::objects::digest::Digest::from_bytes(
                inner[0].as_bytes()?.try_into().map_err(|_| crate::error::Error::corruption("bad checksum length"))?,
            );
            refs.insert(
                name,
                SummaryEntry {
                    checksum,
                    size: inner[1].as_u64()?,
                    metadata: inner[2].as_dict()?.clone(),
                },
            );
        }
        let mut metadata = t[1].as_dict()?.clone();
        let mut collection_refs = BTreeMap::new();
        if let Some(cr) = metadata.remove("ostcore.collection-refs") {
            for entry in cr.as_array()? {
                let e = entry.as_tuple()?;
                let collection_id = e[0].as_str()?.to_string();
                let mut inner_map = BTreeMap::new();
                for r in e[1].as_array()? {
                    let r = r.as_tuple()?;
                    let name = r[0].as_str()?.to_string();
                    let inner = r[1].as_tuple()?;
                    let checksum = crate::objects::digest::Digest::from_bytes(
                        inner[0].as_bytes()?.try_into().map_err(|_| crate::error::Error::corruption("bad checksum length"))?,
                    );
                    inner_map.insert(
                        name,
                        SummaryEntry {
                            checksum,
                            size: inner[1].as_u64()?,
                            metadata: inner[2].as_dict()?.clone(),
                        },
                    );
                }
                collection_refs.insert(collection_id, inner_map);
            }
        }
        Ok(Self { refs, collection_refs, metadata })
    }
}

/// Build a summary from a repository's current `refs/heads`. When
/// `collection_id` is set, every local head belongs to that single
/// collection and is routed into `summary.collection_refs` instead of
/// `summary.refs`; with no collection id configured, heads go into
/// `summary.refs` as plain refs.
pub fn build(root: &Dir, commits: impl Fn(Digest) -> Result<Commit>, collection_id: Option<&str>) -> Result<Summary> {
    let mut summary = Summary::default();
    for (name, digest) in refs::list(root, RefCategory::Heads, None)? {
        let commit = commits(digest)?;
        let entry = SummaryEntry { checksum: digest, size: 0, metadata: commit.metadata.clone() };
        match collection_id {
            Some(collection_id) => {
                summary.collection_refs.entry(collection_id.to_string()).or_default().insert(name.name, entry);
            }
            None => {
                summary.refs.insert(name.name, entry);
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cap_std_ext::cap_tempfile;

    fn sample_commit() -> Commit {
        Commit {
            metadata: Default::default(),
            parent: None,
            related: vec![],
            subject: "s".into(),
            body: "".into(),
            timestamp: 1,
            root_dirtree: Digest::of(b"t"),
            root_dirmeta: Digest::of(b"m"),
        }
    }

    #[test]
    fn builds_from_refs_and_round_trips() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let digest = Digest::of(b"commit-a");
        refs::write(&td, &crate::refs::RefName::head("os/stable"), digest).unwrap();

        let summary = build(&td, |_| Ok(sample_commit()), None).unwrap();
        assert_eq!(summary.refs.len(), 1);
        assert!(summary.refs.contains_key("os/stable"));

        let bytes = summary.to_bytes();
        let reloaded = Summary::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded, summary);
    }

    #[test]
    fn collection_id_splits_refs_into_collection_map() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        let digest = Digest::of(b"commit-b");
        refs::write(&td, &crate::refs::RefName::head("os/stable"), digest).unwrap();

        let summary = build(&td, |_| Ok(sample_commit()), Some("org.example.Os")).unwrap();
        assert_eq!(summary.collection_refs.len(), 1);
        assert!(summary.collection_refs["org.example.Os"].contains_key("os/stable"));
        assert!(summary.refs.is_empty(), "a collection-scoped ref must not also appear in the plain refs map");
    }

    #[test]
    fn refs_are_lexicographically_ordered() {
        let td = cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap();
        refs::write(&td, &crate::refs::RefName::head("zzz"), Digest::of(b"z")).unwrap();
        refs::write(&td, &crate::refs::RefName::head("aaa"), Digest::of(b"a")).unwrap();
        let summary = build(&td, |_| Ok(sample_commit()), None).unwrap();
        let names: Vec<_> = summary.refs.keys().cloned().collect();
        assert_eq!(names, vec!["aaa".to_string(), "zzz".to_string()]);
    }
}
