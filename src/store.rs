//! Read-only profile access for the orchestration core.
//!
//! The persistent profile database lives outside this crate; the core
//! only needs id lookup over immutable nodes. The in-memory store backs
//! both the CLI (profiles loaded from a YAML file) and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bean::{ProfileId, ProfileNode};
use crate::session::SessionOptions;

pub trait ProfileStore: Send + Sync {
    fn get_node(&self, id: ProfileId) -> Option<&ProfileNode>;
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    nodes: HashMap<ProfileId, ProfileNode>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: ProfileNode) {
        self.nodes.insert(node.id, node);
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = ProfileNode>) -> Self {
        let mut store = Self::new();
        for node in nodes {
            store.insert(node);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_node(&self, id: ProfileId) -> Option<&ProfileNode> {
        self.nodes.get(&id)
    }
}

/// On-disk profile document: the full set of profiles, the selected root,
/// and session options.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileFile {
    pub profiles: Vec<ProfileNode>,
    pub selected: ProfileId,
    #[serde(default)]
    pub options: SessionOptions,
}

impl ProfileFile {
    pub fn selected_node(&self) -> Option<&ProfileNode> {
        self.profiles.iter().find(|node| node.id == self.selected)
    }
}

/// Loads and parses a profile file, checking id uniqueness and that the
/// selected profile exists.
pub async fn load_profile_file(path: &str) -> std::io::Result<ProfileFile> {
    let contents = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Could not read profile file {path}: {e}"),
            ));
        }
    };

    let contents = String::from_utf8(contents).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Could not parse profile file {path} as UTF8: {e}"),
        )
    })?;

    let file: ProfileFile = serde_yaml::from_str(&contents).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Could not parse profile file {path}: {e}"),
        )
    })?;

    let mut seen = HashMap::new();
    for node in file.profiles.iter() {
        if let Some(previous) = seen.insert(node.id, node.label()) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Duplicate profile id {} ({} and {})",
                    node.id,
                    previous,
                    node.label()
                ),
            ));
        }
    }

    if file.selected_node().is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Selected profile {} does not exist", file.selected),
        ));
    }

    Ok(file)
}
