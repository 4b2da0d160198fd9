//! `classify` command: dry-run a change against a manifest.
//!
//! Answers "what would happen if this module changed" without running a
//! server: prints the classification and, for scoped updates, the boundary
//! modules in the order clients would apply them.

use std::path::Path;

use anyhow::Result;

use crate::graph::{Classification, ModuleId, order_boundary};
use crate::log;

use super::manifest::Manifest;

pub fn run(manifest_path: &Path, module: &str) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let graph = manifest.build_graph();
    let id = ModuleId::new(module);

    match graph.get_affected_modules(&id)? {
        Classification::SelfUpdate(id) => {
            log!("classify"; "self-update: {}", id);
        }
        Classification::Boundary(set) => {
            let ordered = order_boundary(&graph, &set.modules, &set.interior);
            log!("classify"; "boundary update, {} module(s):", ordered.len());
            for id in ordered {
                let kind = graph
                    .get(&id)
                    .map(|node| format!("{:?}", node.kind).to_lowercase())
                    .unwrap_or_default();
                println!("- {} ({})", id, kind);
            }
        }
        Classification::FullReload => {
            log!("classify"; "full reload");
        }
    }

    Ok(())
}
