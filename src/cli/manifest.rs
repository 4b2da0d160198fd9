//! Module graph manifest.
//!
//! A JSON description of the module graph, produced by a bundler or build
//! tool, used to seed the engine at startup:
//!
//! ```json
//! {
//!   "modules": [
//!     { "id": "src/store.js", "kind": "store" },
//!     {
//!       "id": "src/app.jsx",
//!       "kind": "component",
//!       "deps": ["src/store.js"],
//!       "accept": ["src/store.js"]
//!     }
//!   ]
//! }
//! ```
//!
//! `accept` is either the string `"self"`, a list of dependency ids, or
//! absent (no acceptance declared). `path` defaults to the id.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::HmrEngine;
use crate::graph::{Accept, ModuleGraph, ModuleId, ModuleKind};

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub modules: Vec<ManifestModule>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestModule {
    pub id: String,

    /// File path backing the module; defaults to the id.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub kind: ModuleKind,

    #[serde(default)]
    pub deps: Vec<String>,

    #[serde(default)]
    pub accept: Option<AcceptSpec>,
}

/// Acceptance as written in the manifest.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AcceptSpec {
    /// `"self"` or `"none"`.
    Tag(AcceptTag),
    /// Explicit list of accepted dependency ids.
    Deps(Vec<String>),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum AcceptTag {
    #[serde(rename = "self")]
    SelfAccept,
    #[serde(rename = "none")]
    None,
}

impl AcceptSpec {
    fn to_accept(&self) -> Accept {
        match self {
            AcceptSpec::Tag(AcceptTag::SelfAccept) => Accept::SelfAccept,
            AcceptSpec::Tag(AcceptTag::None) => Accept::None,
            AcceptSpec::Deps(deps) => {
                Accept::Deps(deps.iter().map(ModuleId::new).collect())
            }
        }
    }
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Build a standalone graph from the manifest (diagnostics).
    pub fn build_graph(&self) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        self.register_into(
            |id, path, kind, deps| graph.register_module(id, path, kind, deps),
        );
        let accepts = self.accepts();
        for (id, accept) in accepts {
            graph.accept_hmr(id, accept);
        }
        graph
    }

    /// Seed a running engine with the manifest's modules.
    pub fn apply(&self, engine: &HmrEngine) {
        self.register_into(
            |id, path, kind, deps| engine.register_module(id, path, kind, deps),
        );
        for (id, accept) in self.accepts() {
            engine.accept_hmr(id, accept);
        }
    }

    /// Registration happens in manifest order, so dependency placeholders
    /// are filled in as their own entries arrive.
    fn register_into(&self, mut register: impl FnMut(ModuleId, PathBuf, ModuleKind, Vec<ModuleId>)) {
        for module in &self.modules {
            let id = ModuleId::new(&module.id);
            let path = module
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(&module.id));
            let deps = module.deps.iter().map(ModuleId::new).collect();
            register(id, path, module.kind, deps);
        }
    }

    fn accepts(&self) -> Vec<(ModuleId, Accept)> {
        self.modules
            .iter()
            .filter_map(|module| {
                let spec = module.accept.as_ref()?;
                Some((ModuleId::new(&module.id), spec.to_accept()))
            })
            .collect()
    }
}
