//! Script registry and discovery
//!
//! Maps logical script names to their entry points. Discovery scans one
//! directory (non-recursively) for manifest files; the logical name of a
//! script is its file stem with `-` normalised to `_`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::process::PlatformAccess;
use super::{ProcessScript, Script};
use crate::common::{Error, Result};

/// File extensions recognised as script manifests
pub const MANIFEST_EXTENSIONS: &[&str] = &["toml", "yaml", "yml"];

/// Normalise a script name for registration and lookup
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// A registered script
#[derive(Clone)]
pub struct ScriptHandle {
    name: String,
    source: Option<PathBuf>,
    description: Option<String>,
    entry_point: Arc<dyn Script>,
}

impl ScriptHandle {
    /// Wrap an in-process script
    pub fn new(name: &str, entry_point: Arc<dyn Script>) -> Self {
        Self {
            name: normalize_name(name),
            source: None,
            description: None,
            entry_point,
        }
    }

    fn from_process(script: ProcessScript, source: PathBuf) -> Self {
        Self {
            name: script.name().to_string(),
            description: script.description().map(str::to_string),
            source: Some(source),
            entry_point: Arc::new(script),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manifest the script was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn entry_point(&self) -> &Arc<dyn Script> {
        &self.entry_point
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHandle")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Lookup from logical script name to entry point
///
/// Built once before a run and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct ScriptRegistry {
    scripts: BTreeMap<String, ScriptHandle>,
    platform: Option<PlatformAccess>,
}

/// Outcome of scanning a scripts directory
#[derive(Debug)]
pub struct Discovery {
    pub registry: ScriptRegistry,
    /// Scripts that were found but could not be registered
    pub failures: Vec<Error>,
}

impl Discovery {
    /// The registry, or the first load failure if any script was broken
    pub fn into_registry(self) -> Result<ScriptRegistry> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(self.registry),
        }
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` for script manifests and build a new registry
    ///
    /// Two manifests that normalise to the same name fail the whole
    /// discovery. A manifest that cannot be loaded is recorded in
    /// [`Discovery::failures`] and the remaining scripts are still
    /// registered.
    pub fn discover(dir: &Path) -> Result<Discovery> {
        Self::discover_with(dir, None)
    }

    /// Like [`discover`](Self::discover), lending discovered scripts the
    /// platform endpoint and its token cache
    pub fn discover_with(dir: &Path, platform: Option<PlatformAccess>) -> Result<Discovery> {
        let mut registry = Self {
            scripts: BTreeMap::new(),
            platform,
        };
        let failures = registry.rediscover(dir)?;
        Ok(Discovery { registry, failures })
    }

    /// Replace the whole mapping with the scripts found in `dir`
    ///
    /// On error the current mapping is left untouched.
    pub fn rediscover(&mut self, dir: &Path) -> Result<Vec<Error>> {
        let manifests = find_manifests(dir)?;

        let mut scripts = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, path) in manifests {
            match ProcessScript::load(&name, &path) {
                Ok(script) => {
                    let script = script.with_platform(self.platform.clone());
                    tracing::debug!(script = %name, manifest = %path.display(), "Script registered");
                    scripts.insert(name, ScriptHandle::from_process(script, path));
                }
                Err(e) => {
                    tracing::warn!(manifest = %path.display(), "{}", e);
                    failures.push(e);
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            registered = scripts.len(),
            failed = failures.len(),
            "Script discovery finished"
        );
        self.scripts = scripts;
        Ok(failures)
    }

    /// Register a script; a name already in use is a load error
    pub fn register(&mut self, handle: ScriptHandle) -> Result<()> {
        if let Some(existing) = self.scripts.get(&handle.name) {
            return Err(Error::script_load(
                &handle.name,
                format!(
                    "name already registered{}",
                    existing
                        .source()
                        .map(|p| format!(" by {}", p.display()))
                        .unwrap_or_default()
                ),
            ));
        }
        self.scripts.insert(handle.name.clone(), handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ScriptHandle> {
        self.scripts.get(&normalize_name(name))
    }

    /// Look up a script, failing with [`Error::ScriptNotFound`]
    pub fn resolve(&self, name: &str) -> Result<&ScriptHandle> {
        self.get(name)
            .ok_or_else(|| Error::ScriptNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptHandle> {
        self.scripts.values()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Manifests in `dir`, keyed by logical name, with collisions rejected
fn find_manifests(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(format!(
            "Cannot read script directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        let recognised = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| MANIFEST_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if !hidden && recognised && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let name = normalize_name(stem);
        if let Some(previous) = manifests.get(&name) {
            return Err(Error::script_load(
                &name,
                format!(
                    "defined by both '{}' and '{}'",
                    previous.display(),
                    path.display()
                ),
            ));
        }
        manifests.insert(name, path);
    }

    Ok(manifests)
}
