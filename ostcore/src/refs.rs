//! Ref storage: `refs/heads`, `refs/mirrors`, `refs/remotes/<remote>`
//! (spec §4.1 "Refs").

use crate::error::{Error, Result};
use crate::objects::Digest;
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use cap_std_ext::dirext::CapStdExtDirExt;

/// Which `refs/` subtree a ref lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCategory {
    /// `refs/heads/<name>` — locally-owned refs.
    Heads,
    /// `refs/mirrors/<name>` — mirrored refs not advertised in summaries.
    Mirrors,
    /// `refs/remotes/<remote>/<name>` — refs pulled from a remote.
    Remotes,
}

impl RefCategory {
    fn root(self) -> &'static str {
        match self {
            Self::Heads => "refs/heads",
            Self::Mirrors => "refs/mirrors",
            Self::Remotes => "refs/remotes",
        }
    }
}

/// A fully-qualified ref name: category plus its path components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefName {
    /// Which subtree this ref lives under.
    pub category: RefCategory,
    /// For [`RefCategory::Remotes`], the remote name; `None` otherwise.
    pub remote: Option<String>,
    /// The ref's own name, may itself contain `/` (e.g. `fedora/38/x86_64/silverblue`).
    pub name: String,
}

impl RefName {
    /// A `refs/heads/<name>` ref.
    pub fn head(name: impl Into<String>) -> Self {
        Self { category: RefCategory::Heads, remote: None, name: name.into() }
    }

    /// A `refs/mirrors/<name>` ref.
    pub fn mirror(name: impl Into<String>) -> Self {
        Self { category: RefCategory::Mirrors, remote: None, name: name.into() }
    }

    /// A `refs/remotes/<remote>/<name>` ref.
    pub fn remote(remote: impl Into<String>, name: impl Into<String>) -> Self {
        Self { category: RefCategory::Remotes, remote: Some(remote.into()), name: name.into() }
    }

    fn relative_path(&self) -> camino::Utf8PathBuf {
        let mut p = camino::Utf8PathBuf::from(self.category.root());
        if let Some(remote) = &self.remote {
            p.push(remote);
        }
        p.push(&self.name);
        p
    }
}

/// Resolve a ref to its commit digest, returning `None` if unset.
pub fn resolve(root: &Dir, r#ref: &RefName) -> Result<Option<Digest>> {
    let path = r#ref.relative_path();
    match root.read_to_string(&path) {
        Ok(text) => Ok(Some(Digest::parse(text.trim())?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Point a ref at `digest`, creating parent directories as needed.
/// Writes atomically (write-temp-then-rename), so a reader never
/// observes a torn write (spec §4.1 "Atomic writes").
pub fn write(root: &Dir, r#ref: &RefName, digest: Digest) -> Result<()> {
    let path = r#ref.relative_path();
    if let Some(parent) = path.parent() {
        root.create_dir_all(parent)?;
    }
    root.atomic_write(&path, format!("{digest}\n").as_bytes())?;
    Ok(())
}

/// Delete a ref. Errors with [`Error::NotFound`] if it did not exist.
pub fn delete(root: &Dir, r#ref: &RefName) -> Result<()> {
    let path = r#ref.relative_path();
    root.remove_file(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found(format!("ref {}", r#ref.name)),
        _ => e.into(),
    })
}

/// List all refs under a category (and, for [`RefCategory::Remotes`], a
/// specific remote), sorted by name.
pub fn list(root: &Dir, category: RefCategory, remote: Option<&str>) -> Result<Vec<(RefName, Digest)>> {
    let mut base = camino::Utf8PathBuf::from(category.root());
    if let Some(remote) = remote {
        base.push(remote);
    }
    let Some(dir) = root.open_dir_optional(&base)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    walk_refs(&dir, &base, category, remote, &mut out)?;
    out.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    Ok(out)
}

fn walk_refs(
    dir: &Dir,
    rel_base: &camino::Utf8Path,
    category: RefCategory,
    remote: Option<&str>,
    out: &mut Vec<(RefName, Digest)>,
) -> Result<()> {
    for entry in dir.entries()? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_dir() {
            let Some(sub) = dir.open_dir_optional(name.as_ref())? else { continue };
            let mut nested_base = rel_base.to_owned();
            nested_base.push(name.as_ref());
            walk_refs(&sub, &nested_base, category, remote, out)?;
            continue;
        }
        let text = dir.read_to_string(name.as_ref())?;
        let Ok(digest) = Digest::parse(text.trim()) else { continue };
        let mut full_name = rel_base.to_owned();
        full_name.push(name.as_ref());
        let ref_name_str = strip_category_root(&full_name, category, remote);
        let ref_name = RefName {
            category,
            remote: remote.map(str::to_string),
            name: ref_name_str,
        };
        out.push((ref_name, digest));
    }
    Ok(())
}

fn strip_category_root(full: &camino::Utf8Path, category: RefCategory, remote: Option<&str>) -> String {
    let mut prefix = camino::Utf8PathBuf::from(category.root());
    if let Some(remote) = remote {
        prefix.push(remote);
    }
    full.strip_prefix(&prefix)
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|_| full.as_str().to_string())
}
