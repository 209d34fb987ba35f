// Namespace projection
// Turns the flat, "/"-delimited object namespace into a folder hierarchy

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::providers::ObjectRecord;

/// Folder holding an object name: everything before the last "/", or "" for the root
pub fn folder_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
}

/// Enclosing folder of a folder path; `None` for the root
pub fn parent_of(path: &str) -> Option<&str> {
    if path.is_empty() {
        None
    } else {
        Some(folder_of(path))
    }
}

/// Strip surrounding "/" from a user-supplied folder path
pub fn normalize_folder_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Records exactly one level below `path`: the name is `path/` plus one segment
/// (or a single segment for the root). Grandchildren are excluded.
pub fn direct_children_of<'a>(records: &'a [ObjectRecord], path: &str) -> Vec<&'a ObjectRecord> {
    records.iter().filter(|r| folder_of(&r.name) == path).collect()
}

/// One folder of the projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub path: String,
    /// Path of the enclosing folder, `None` for the root
    pub parent: Option<String>,
    /// Objects directly in this folder, sorted by name
    pub files: Vec<ObjectRecord>,
    /// Paths of the immediate subfolders
    pub folders: BTreeSet<String>,
}

impl FolderNode {
    fn new(path: &str, parent: Option<&str>) -> Self {
        Self {
            path: path.to_string(),
            parent: parent.map(str::to_string),
            files: Vec::new(),
            folders: BTreeSet::new(),
        }
    }

    /// Last segment of the folder path ("" for the root)
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Contents of one folder level, as consumed by the tree controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderListing {
    pub path: String,
    pub files: Vec<ObjectRecord>,
    pub folders: Vec<String>,
}

/// Folder index over a full record set. Rebuilt from scratch whenever the record set changes.
#[derive(Debug, Clone)]
pub struct NamespaceProjection {
    nodes: BTreeMap<String, FolderNode>,
    record_count: usize,
}

impl NamespaceProjection {
    pub fn project(records: impl IntoIterator<Item = ObjectRecord>) -> Self {
        let mut nodes: BTreeMap<String, FolderNode> = BTreeMap::new();
        nodes.insert(String::new(), FolderNode::new("", None));
        let mut record_count = 0;

        for record in records {
            let folder = folder_of(&record.name).to_string();

            // Create the folder and any missing ancestors
            let mut path = folder.as_str();
            while !nodes.contains_key(path) {
                let parent = folder_of(path);
                nodes.insert(path.to_string(), FolderNode::new(path, Some(parent)));
                path = parent;
            }

            if let Some(node) = nodes.get_mut(&folder) {
                node.files.push(record);
                record_count += 1;
            }
        }

        let links: Vec<(String, String)> = nodes.values()
            .filter_map(|n| n.parent.clone().map(|p| (p, n.path.clone())))
            .collect();
        for (parent, child) in links {
            if let Some(node) = nodes.get_mut(&parent) {
                node.folders.insert(child);
            }
        }

        for node in nodes.values_mut() {
            node.files.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Self { nodes, record_count }
    }

    pub fn root(&self) -> &FolderNode {
        &self.nodes[""]
    }

    pub fn folder(&self, path: &str) -> Option<&FolderNode> {
        self.nodes.get(path)
    }

    /// All folder paths, root first, in lexicographic order
    pub fn folder_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn direct_children_of(&self, path: &str) -> &[ObjectRecord] {
        self.nodes.get(path).map(|n| n.files.as_slice()).unwrap_or(&[])
    }

    pub fn child_folders_of(&self, path: &str) -> Vec<&str> {
        self.nodes.get(path)
            .map(|n| n.folders.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// One folder level. Unknown paths yield an empty listing.
    pub fn listing(&self, path: &str) -> FolderListing {
        match self.nodes.get(path) {
            Some(node) => FolderListing {
                path: node.path.clone(),
                files: node.files.clone(),
                folders: node.folders.iter().cloned().collect(),
            },
            None => FolderListing {
                path: path.to_string(),
                ..Default::default()
            },
        }
    }
}
