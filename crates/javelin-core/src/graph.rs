use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// A node in the dependency DAG: an artifact plus its transitive
/// dependencies in the order the build tool reported them.
///
/// The same transitive artifact may appear as distinct nodes under multiple
/// parents; the graph performs no cross-parent deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub artifact: Artifact,
    /// True when this node was reached through another node.
    #[serde(default)]
    pub indirect: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn direct(artifact: Artifact) -> Self {
        Self {
            artifact,
            indirect: false,
            children: Vec::new(),
        }
    }

    pub fn indirect(artifact: Artifact) -> Self {
        Self {
            artifact,
            indirect: true,
            children: Vec::new(),
        }
    }
}

/// Mapping from build-file URI to that file's root dependency nodes.
///
/// Iteration order is stable (sorted by URI); sibling order within a list is
/// preserved from the build tool's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub roots: BTreeMap<String, Vec<DependencyNode>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, nodes: Vec<DependencyNode>) {
        self.roots.entry(uri.into()).or_default().extend(nodes);
    }

    pub fn is_empty(&self) -> bool {
        self.roots.values().all(|nodes| nodes.is_empty())
    }

    /// Pre-order flattening of one file's DAG. Every non-root node in the
    /// result is marked indirect; sibling and depth-first order is kept.
    pub fn flatten(&self, uri: &str) -> Vec<DependencyNode> {
        let mut flat = Vec::new();
        if let Some(nodes) = self.roots.get(uri) {
            for node in nodes {
                push_flat(node, false, &mut flat);
            }
        }
        flat
    }

    /// Flatten every file's DAG, keyed by URI.
    pub fn flatten_all(&self) -> BTreeMap<String, Vec<DependencyNode>> {
        self.roots
            .keys()
            .map(|uri| (uri.clone(), self.flatten(uri)))
            .collect()
    }

    /// Render the graph as a box-drawing tree, one section per build file.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for (uri, nodes) in &self.roots {
            out.push_str(uri);
            out.push('\n');
            let count = nodes.len();
            for (i, node) in nodes.iter().enumerate() {
                render_subtree(&mut out, node, "", i == count - 1);
            }
        }
        out
    }
}

fn push_flat(node: &DependencyNode, indirect: bool, out: &mut Vec<DependencyNode>) {
    let mut flat = node.clone();
    flat.children = Vec::new();
    flat.indirect = indirect || node.indirect;
    out.push(flat);
    for child in &node.children {
        push_flat(child, true, out);
    }
}

fn render_subtree(out: &mut String, node: &DependencyNode, prefix: &str, is_last: bool) {
    let connector = if is_last { "└── " } else { "├── " };
    out.push_str(&format!("{prefix}{connector}{}\n", node.artifact));
    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_subtree(out, child, &child_prefix, i == count - 1);
    }
}
