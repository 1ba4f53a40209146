//! The remotes registry: config-embedded `[remote "name"]` groups plus
//! drop-in files under `remotes.d/*.conf` (spec §4.1 "Remotes").

use crate::config::KeyFile;
use crate::error::{Error, Result};
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use cap_std_ext::dirext::CapStdExtDirExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

const REMOTE_GROUP_PREFIX: &str = "remote \"";
const REMOTES_D: &str = "remotes.d";

/// A single remote's configuration.
///
/// `url` and `metalink` are optional rather than mandatory so that a
/// child repo can define a remote group that only overrides a few keys
/// (e.g. `gpg-verify`) and inherit the rest from a parent repo's remote
/// of the same name (spec §4.3 "Inheritance").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    /// The remote's name. `file://` pseudo-remotes bypass the registry
    /// entirely and use the literal URL as their "name" (spec invariant:
    /// "file:// as name bypass").
    pub name: String,
    /// The remote's pull URL, if set directly (as opposed to `metalink`).
    pub url: Option<String>,
    /// A metalink URL: stored separately from `url` because `metalink=`
    /// and `url=` are mutually exclusive ways of locating the same
    /// content (spec §4.3: "a metalink form is split into a separate
    /// metalink key at add time").
    pub metalink: Option<String>,
    /// `gpg-verify`, default `true` for non-`file://` remotes.
    pub gpg_verify: bool,
    /// `gpg-verify-summary`, default `false`.
    pub gpg_verify_summary: bool,
    /// Explicit keyring file name under the repo's keyring directory, if
    /// set; otherwise keyring lookup falls back to the per-remote and
    /// global search order (spec §4.1 "GPG keyring search order").
    pub gpgkeypath: Option<String>,
    /// `collection-id`, for peer-to-peer/mirror scenarios.
    pub collection_id: Option<String>,
    /// `contenturl`, if content is fetched from a different URL than
    /// metadata (detached summaries, deltas).
    pub contenturl: Option<String>,
    /// True if this remote was loaded from a `remotes.d/*.conf` drop-in
    /// rather than the main `config` file; drop-in remotes cannot be
    /// rewritten in place through [`RemoteRegistry::save`] (spec
    /// invariant: drop-ins are read-only from this engine's perspective).
    pub from_drop_in: bool,
}

impl Remote {
    /// Build the transient, unregistered remote a `file://`-prefixed name
    /// denotes (spec §4.3 "URL-as-name bypass"): the name is itself the
    /// URL, and GPG verification is off.
    pub fn transient_file(url: &str) -> Self {
        Self {
            name: url.to_string(),
            url: Some(url.to_string()),
            metalink: None,
            gpg_verify: false,
            gpg_verify_summary: false,
            gpgkeypath: None,
            collection_id: None,
            contenturl: None,
            from_drop_in: false,
        }
    }

    /// Build a new remote from an add-time URL, splitting a `metalink=`
    /// prefixed value into the `metalink` field instead of `url` (spec
    /// §4.3).
    pub fn new(name: impl Into<String>, url_or_metalink: impl Into<String>) -> Self {
        let name = name.into();
        let raw = url_or_metalink.into();
        let (url, metalink) = match raw.strip_prefix("metalink=") {
            Some(rest) => (None, Some(rest.to_string())),
            None => (Some(raw), None),
        };
        Self {
            name,
            url,
            metalink,
            gpg_verify: true,
            gpg_verify_summary: false,
            gpgkeypath: None,
            collection_id: None,
            contenturl: None,
            from_drop_in: false,
        }
    }

    fn from_keyfile_group(kf: &KeyFile, group: &str, from_drop_in: bool) -> Result<Self> {
        let name = group
            .strip_prefix(REMOTE_GROUP_PREFIX)
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| Error::invalid_config(format!("malformed remote group: {group}")))?
            .to_string();
        Ok(Self {
            name,
            url: kf.optional_string(group, "url"),
            metalink: kf.optional_string(group, "metalink"),
            gpg_verify: kf.optional_bool(group, "gpg-verify")?.unwrap_or(true),
            gpg_verify_summary: kf.optional_bool(group, "gpg-verify-summary")?.unwrap_or(false),
            gpgkeypath: kf.optional_string(group, "gpgkeypath"),
            collection_id: kf.optional_string(group, "collection-id"),
            contenturl: kf.optional_string(group, "contenturl"),
            from_drop_in,
        })
    }

    fn group_name(&self) -> String {
        format!("{REMOTE_GROUP_PREFIX}{}\"", self.name)
    }

    fn write_into(&self, kf: &mut KeyFile) {
        let group = self.group_name();
        if let Some(u) = &self.url {
            kf.set(&group, "url", u.clone());
        }
        if let Some(m) = &self.metalink {
            kf.set(&group, "metalink", m.clone());
        }
        kf.set(&group, "gpg-verify", self.gpg_verify.to_string());
        kf.set(&group, "gpg-verify-summary", self.gpg_verify_summary.to_string());
        if let Some(p) = &self.gpgkeypath {
            kf.set(&group, "gpgkeypath", p.clone());
        }
        if let Some(id) = &self.collection_id {
            kf.set(&group, "collection-id", id.clone());
        }
        if let Some(u) = &self.contenturl {
            kf.set(&group, "contenturl", u.clone());
        }
    }

    /// Fill in `url`/`metalink`/`gpgkeypath`/`collection_id`/`contenturl`
    /// from `parent` wherever this remote leaves them unset. Boolean
    /// fields are never cascaded: an explicit local value (or its
    /// locally-applied default) always wins (spec §4.3 concrete scenario
    /// 3).
    pub(crate) fn inherit_from(mut self, parent: &Remote) -> Self {
        self.url = self.url.or_else(|| parent.url.clone());
        self.metalink = self.metalink.or_else(|| parent.metalink.clone());
        self.gpgkeypath = self.gpgkeypath.or_else(|| parent.gpgkeypath.clone());
        self.collection_id = self.collection_id.or_else(|| parent.collection_id.clone());
        self.contenturl = self.contenturl.or_else(|| parent.contenturl.clone());
        self
    }
}

/// The in-memory remotes table: `name -> Remote`, mutex-guarded so the
/// registry can be shared across threads the way the repository handle
/// itself is (spec §5 "Concurrency").
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    inner: Mutex<BTreeMap<String, Remote>>,
}

impl RemoteRegistry {
    /// Load remotes from `config`'s embedded `[remote "..."]` groups and
    /// every `*.conf` file under `remotes.d/`. A remote name defined in
    /// both places is a configuration error (spec invariant 5: "remote
    /// duplicates across config and remotes.d fail to load"), not a
    /// precedence rule to resolve silently.
    pub fn load(root: &Dir) -> Result<Self> {
        let mut table = BTreeMap::new();

        if let Some(d) = root.open_dir_optional(REMOTES_D)? {
            let mut names: Vec<_> = d
                .entries()?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name())
                .collect();
            names.sort();
            for name in names {
                let name = name.to_string_lossy();
                if !name.ends_with(".conf") {
                    continue;
                }
                let text = d.read_to_string(name.as_ref())?;
                let kf = KeyFile::parse(&text)?;
                for group in kf.groups() {
                    if group.starts_with(REMOTE_GROUP_PREFIX) {
                        let remote = Remote::from_keyfile_group(&kf, group, true)?;
                        table.insert(remote.name.clone(), remote);
                    }
                }
            }
        }

        if root.try_exists("config")? {
            let text = root.read_to_string("config")?;
            let kf = KeyFile::parse(&text)?;
            for group in kf.groups() {
                if group.starts_with(REMOTE_GROUP_PREFIX) {
                    let remote = Remote::from_keyfile_group(&kf, group, false)?;
                    if table.contains_key(&remote.name) {
                        return Err(Error::invalid_config(format!(
                            "remote {} is defined both in config and in remotes.d",
                            remote.name
                        )));
                    }
                    table.insert(remote.name.clone(), remote);
                }
            }
        }

        Ok(Self { inner: Mutex::new(table) })
    }

    /// Look up a remote by name, without any parent cascade. A
    /// `file://`-prefixed "name" always bypasses the registry: the
    /// caller should treat it as a literal URL rather than calling this
    /// method (spec invariant: "file:// as name bypass").
    pub fn get(&self, name: &str) -> Option<Remote> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    /// All registered remote names, in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    /// Add a new remote. Errors if the name is already registered.
    pub fn add(&self, remote: Remote) -> Result<()> {
        let mut table = self.inner.lock().unwrap();
        if table.contains_key(&remote.name) {
            return Err(Error::exists(format!("remote {}", remote.name)));
        }
        table.insert(remote.name.clone(), remote);
        Ok(())
    }

    /// Replace an existing remote's configuration in place.
    pub fn change(&self, remote: Remote) -> Result<()> {
        let mut table = self.inner.lock().unwrap();
        if !table.contains_key(&remote.name) {
            return Err(Error::not_found(format!("remote {}", remote.name)));
        }
        table.insert(remote.name.clone(), remote);
        Ok(())
    }

    /// Remove a remote by name. Errors if it was loaded from a
    /// `remotes.d/` drop-in, since those files are not owned by this
    /// registry.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut table = self.inner.lock().unwrap();
        match table.get(name) {
            None => Err(Error::not_found(format!("remote {name}"))),
            Some(r) if r.from_drop_in => Err(Error::Unsupported(format!(
                "remote {name} is defined in remotes.d and cannot be deleted from config"
            ))),
            Some(_) => {
                table.remove(name);
                Ok(())
            }
        }
    }

    /// Persist all config-embedded (non-drop-in) remotes into `config`,
    /// leaving any pre-existing non-remote groups and all drop-in
    /// remotes untouched. Writes atomically so a crash mid-write never
    /// leaves a half-written config behind (spec §4.1 "Atomic writes").
    pub fn save(&self, root: &Dir) -> Result<()> {
        let text = root.read_to_string("config").unwrap_or_default();
        let mut kf = KeyFile::parse(&text)?;
        let stale: Vec<String> = kf
            .groups()
            .filter(|g| g.starts_with(REMOTE_GROUP_PREFIX))
            .map(str::to_string)
            .collect();
        for g in stale {
            kf.remove_group(&g);
        }
        for remote in self.inner.lock().unwrap().values() {
            if !remote.from_drop_in {
                remote.write_into(&mut kf);
            }
        }
        root.atomic_write("config", kf.to_string_repr().as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cap_std_ext::cap_tempfile;

    fn new_root() -> cap_tempfile::TempDir {
        cap_tempfile::tempdir(cap_std::ambient_authority()).unwrap()
    }

    fn sample_remote(name: &str) -> Remote {
        Remote::new(name, format!("https://example.invalid/{name}"))
    }

    #[test]
    fn add_then_save_then_reload_round_trips() {
        let root = new_root();
        let registry = RemoteRegistry::load(&root).unwrap();
        registry.add(sample_remote("foo")).unwrap();
        registry.save(&root).unwrap();

        let reloaded = RemoteRegistry::load(&root).unwrap();
        let remote = reloaded.get("foo").unwrap();
        assert_eq!(remote.url.as_deref(), Some("https://example.invalid/foo"));
    }

    #[test]
    fn metalink_prefixed_url_is_split_into_its_own_key() {
        let remote = Remote::new("foo", "metalink=https://example.invalid/foo/metalink.xml");
        assert_eq!(remote.url, None);
        assert_eq!(remote.metalink.as_deref(), Some("https://example.invalid/foo/metalink.xml"));

        let root = new_root();
        let registry = RemoteRegistry::load(&root).unwrap();
        registry.add(remote).unwrap();
        registry.save(&root).unwrap();

        let text = root.read_to_string("config").unwrap();
        assert!(text.contains("metalink=https://example.invalid/foo/metalink.xml"));
        assert!(!text.contains("\nurl="));
    }

    #[test]
    fn file_url_name_bypasses_registry() {
        let root = new_root();
        let registry = RemoteRegistry::load(&root).unwrap();
        assert!(registry.get("file:///var/repo").is_none());
    }

    #[test]
    fn inherit_from_fills_only_unset_fields() {
        let parent = Remote::new("upstream", "https://a.example/");
        let mut child = Remote::new("upstream", "https://a.example/");
        child.url = None;
        child.gpg_verify = false;
        let merged = child.inherit_from(&parent);
        assert_eq!(merged.url.as_deref(), Some("https://a.example/"));
        assert!(!merged.gpg_verify);
    }

    #[test]
    fn duplicate_add_fails() {
        let root = new_root();
        let registry = RemoteRegistry::load(&root).unwrap();
        registry.add(sample_remote("foo")).unwrap();
        assert!(registry.add(sample_remote("foo")).is_err());
    }

    #[test]
    fn drop_in_remote_is_not_deletable() {
        let root = new_root();
        root.create_dir_all(REMOTES_D).unwrap();
        let d = root.open_dir(REMOTES_D).unwrap();
        d.write("foo.conf", "[remote \"foo\"]\nurl=https://example.invalid/foo\n")
            .unwrap();

        let registry = RemoteRegistry::load(&root).unwrap();
        assert!(registry.get("foo").unwrap().from_drop_in);
        assert!(registry.delete("foo").is_err());
    }

    #[test]
    fn name_collision_between_config_and_drop_in_fails_to_load() {
        let root = new_root();
        root.create_dir_all(REMOTES_D).unwrap();
        let d = root.open_dir(REMOTES_D).unwrap();
        d.write("foo.conf", "[remote \"foo\"]\nurl=https://dropin.invalid/foo\n")
            .unwrap();
        root.atomic_write(
            "config",
            b"[remote \"foo\"]\nurl=https://embedded.invalid/foo\n",
        )
        .unwrap();

        let err = RemoteRegistry::load(&root).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
