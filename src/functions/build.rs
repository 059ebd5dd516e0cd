//! # Build Data
//!
//! What a runtime hands back after compiling a function, what the
//! descriptor keeps of it, and the source-file diff between two builds.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::route::Route;

/// Module format of the compiled output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    Cjs,
    Esm,
}

/// Result of one runtime build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Entry file of the built module
    pub main_file: PathBuf,

    /// Handler API version declared by the function
    #[serde(rename = "runtimeAPIVersion", default = "default_api_version")]
    pub runtime_api_version: u32,

    #[serde(default)]
    pub output_module_format: ModuleFormat,

    /// Extra files shipped with the function
    #[serde(default)]
    pub included_files: Option<Vec<PathBuf>>,

    #[serde(default)]
    pub routes: Option<Vec<Route>>,

    #[serde(default)]
    pub excluded_routes: Option<Vec<Route>>,

    /// Cron expression declared in the function source
    #[serde(default)]
    pub schedule: Option<String>,

    /// Source files the build read
    #[serde(default)]
    pub src_files: Vec<PathBuf>,
}

fn default_api_version() -> u32 {
    1
}

impl BuildResult {
    /// Minimal result for an entry file
    pub fn new(main_file: impl Into<PathBuf>) -> Self {
        let main_file = main_file.into();
        Self {
            src_files: vec![main_file.clone()],
            main_file,
            runtime_api_version: default_api_version(),
            output_module_format: ModuleFormat::default(),
            included_files: None,
            routes: None,
            excluded_routes: None,
            schedule: None,
        }
    }
}

/// Committed metadata of the last successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildData {
    pub main_file: PathBuf,
    pub runtime_api_version: u32,
    pub output_module_format: ModuleFormat,
    pub included_files: Vec<PathBuf>,
    pub routes: Option<Vec<Route>>,
    pub schedule: Option<String>,
    pub src_files: BTreeSet<PathBuf>,
}

impl From<&BuildResult> for BuildData {
    fn from(result: &BuildResult) -> Self {
        Self {
            main_file: result.main_file.clone(),
            runtime_api_version: result.runtime_api_version,
            output_module_format: result.output_module_format,
            included_files: result.included_files.clone().unwrap_or_default(),
            routes: result.routes.clone(),
            schedule: result.schedule.clone(),
            src_files: result.src_files.iter().cloned().collect(),
        }
    }
}

impl BuildData {
    /// Extension of the entry file, with leading dot
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.main_file)
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
}

/// Source files added and removed between two builds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SrcFilesDiff {
    pub added: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
}

impl SrcFilesDiff {
    /// Compute `next - previous` and `previous - next`
    pub fn between(previous: &BTreeSet<PathBuf>, next: &BTreeSet<PathBuf>) -> Self {
        Self {
            added: next.difference(previous).cloned().collect(),
            deleted: previous.difference(next).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Successful outcome of `Function::build`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSummary {
    pub included_files: Vec<PathBuf>,
    pub src_files_diff: SrcFilesDiff,
}

/// Fingerprint-keyed cache of earlier build results
///
/// Owned by the caller and passed through to the runtime untouched. The
/// runtime reads earlier results from it and records new ones; clones
/// share the same map.
#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    entries: Arc<RwLock<HashMap<String, BuildResult>>>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<BuildResult> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(fingerprint).cloned())
    }

    pub fn insert(&self, fingerprint: impl Into<String>, result: BuildResult) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(fingerprint.into(), result);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
