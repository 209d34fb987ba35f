// Lazy folder tree
// Per-folder expand/collapse state with on-demand loading of folder contents

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::namespace::{normalize_folder_path, parent_of, FolderListing, NamespaceProjection};
use crate::providers::{ObjectRecord, ObjectStore, StorageError};

/// Source of folder contents for the tree
#[async_trait]
pub trait FolderLoader: Send {
    async fn load_folder(&mut self, path: &str) -> Result<FolderListing, StorageError>;
}

#[async_trait]
impl FolderLoader for NamespaceProjection {
    async fn load_folder(&mut self, path: &str) -> Result<FolderListing, StorageError> {
        Ok(self.listing(path))
    }
}

/// Loads one folder per call by listing the store with the folder's prefix
pub struct StoreFolderLoader<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ObjectStore + ?Sized> StoreFolderLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<'a, S: ObjectStore + ?Sized> FolderLoader for StoreFolderLoader<'a, S> {
    async fn load_folder(&mut self, path: &str) -> Result<FolderListing, StorageError> {
        let prefix = if path.is_empty() { None } else { Some(format!("{}/", path)) };
        let records = self.store.list(prefix.as_deref()).await?;
        Ok(NamespaceProjection::project(records).listing(path))
    }
}

/// Expansion state of one folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FolderState {
    pub expanded: bool,
    pub loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderPhase {
    CollapsedUnloaded,
    CollapsedLoaded,
    ExpandedLoaded,
}

impl FolderState {
    pub fn phase(&self) -> FolderPhase {
        match (self.expanded, self.loaded) {
            (true, _) => FolderPhase::ExpandedLoaded,
            (false, true) => FolderPhase::CollapsedLoaded,
            (false, false) => FolderPhase::CollapsedUnloaded,
        }
    }
}

/// One rendered line of the visible tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeRow<'a> {
    Folder {
        path: &'a str,
        depth: usize,
        state: FolderState,
    },
    File {
        record: &'a ObjectRecord,
        depth: usize,
    },
}

#[derive(Debug, Clone, Default)]
struct FolderContents {
    files: Vec<ObjectRecord>,
    folders: Vec<String>,
}

/// Tree view state machine: `collapsed-unloaded -> collapsed-loaded <-> expanded-loaded`.
///
/// Visibility is derived: the root is always visible, any other folder is visible
/// when its parent is expanded and visible.
pub struct LazyTreeController<L: FolderLoader> {
    loader: L,
    states: BTreeMap<String, FolderState>,
    contents: BTreeMap<String, FolderContents>,
}

impl<L: FolderLoader> LazyTreeController<L> {
    pub fn new(loader: L) -> Self {
        let mut states = BTreeMap::new();
        states.insert(String::new(), FolderState::default());
        Self {
            loader,
            states,
            contents: BTreeMap::new(),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Expand a folder, fetching its contents the first time.
    /// A failed fetch leaves the folder collapsed and unloaded.
    pub async fn expand(&mut self, path: &str) -> Result<(), StorageError> {
        let path = normalize_folder_path(path);
        let loaded = self.states.get(path).map(|s| s.loaded).unwrap_or(false);

        if !loaded {
            let listing = self.loader.load_folder(path).await?;
            debug!("Loaded folder '{}': {} files, {} subfolders", path, listing.files.len(), listing.folders.len());

            for folder in &listing.folders {
                self.states.entry(folder.clone()).or_default();
            }
            self.contents.insert(path.to_string(), FolderContents {
                files: listing.files,
                folders: listing.folders,
            });
        }

        let state = self.states.entry(path.to_string()).or_default();
        let was_expanded = state.expanded;
        state.loaded = true;
        state.expanded = true;

        // Opening a folder shows its children collapsed, even ones expanded while hidden
        if !was_expanded {
            if let Some(contents) = self.contents.get(path) {
                for folder in &contents.folders {
                    if let Some(child) = self.states.get_mut(folder) {
                        child.expanded = false;
                    }
                }
            }
        }
        Ok(())
    }

    /// Expand every ancestor of `path` and then `path` itself
    pub async fn reveal(&mut self, path: &str) -> Result<(), StorageError> {
        let path = normalize_folder_path(path);
        let mut chain = vec![path.to_string()];
        let mut current = path;
        while let Some(parent) = parent_of(current) {
            chain.push(parent.to_string());
            current = parent;
        }
        for folder in chain.iter().rev() {
            self.expand(folder).await?;
        }
        Ok(())
    }

    /// Collapse a folder and every descendant. Loaded contents are kept.
    pub fn collapse(&mut self, path: &str) {
        let path = normalize_folder_path(path);
        if path.is_empty() {
            self.collapse_all();
            return;
        }

        if let Some(state) = self.states.get_mut(path) {
            state.expanded = false;
        }
        let prefix = format!("{}/", path);
        for (_, state) in self.states.range_mut(prefix.clone()..).take_while(|(p, _)| p.starts_with(&prefix)) {
            state.expanded = false;
        }
    }

    /// Expand every folder whose contents are already loaded. Never fetches.
    pub fn expand_all(&mut self) {
        for state in self.states.values_mut().filter(|s| s.loaded) {
            state.expanded = true;
        }
    }

    pub fn collapse_all(&mut self) {
        for state in self.states.values_mut() {
            state.expanded = false;
        }
    }

    pub fn state(&self, path: &str) -> Option<FolderState> {
        self.states.get(normalize_folder_path(path)).copied()
    }

    pub fn is_visible(&self, path: &str) -> bool {
        let mut current = normalize_folder_path(path);
        while let Some(parent) = parent_of(current) {
            if !self.states.get(parent).is_some_and(|s| s.expanded) {
                return false;
            }
            current = parent;
        }
        true
    }

    pub fn files_in(&self, path: &str) -> &[ObjectRecord] {
        self.contents.get(normalize_folder_path(path)).map(|c| c.files.as_slice()).unwrap_or(&[])
    }

    pub fn subfolders_of(&self, path: &str) -> &[String] {
        self.contents.get(normalize_folder_path(path)).map(|c| c.folders.as_slice()).unwrap_or(&[])
    }

    /// Depth-first rows of everything currently visible below the root
    pub fn visible_rows(&self) -> Vec<TreeRow<'_>> {
        let mut rows = Vec::new();
        if self.states.get("").is_some_and(|s| s.expanded) {
            self.push_rows("", 0, &mut rows);
        }
        rows
    }

    fn push_rows<'a>(&'a self, path: &str, depth: usize, rows: &mut Vec<TreeRow<'a>>) {
        let Some(contents) = self.contents.get(path) else {
            return;
        };
        for folder in &contents.folders {
            let state = self.states.get(folder.as_str()).copied().unwrap_or_default();
            rows.push(TreeRow::Folder { path: folder, depth, state });
            if state.expanded {
                self.push_rows(folder, depth + 1, rows);
            }
        }
        for record in &contents.files {
            rows.push(TreeRow::File { record, depth });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::transport::memory::{MemoryTransport, TEST_ACCOUNT, TEST_KEY};
    use crate::providers::{AzureBlobGateway, DEFAULT_CONTENT_TYPE};
    use crate::credential_store::Credential;
    use url::Url;

    fn record(name: &str) -> ObjectRecord {
        ObjectRecord {
            name: name.to_string(),
            size_bytes: 1,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            last_modified: None,
            etag: None,
            url: String::new(),
        }
    }

    fn projection() -> NamespaceProjection {
        NamespaceProjection::project(
            ["a.txt", "docs/b.txt", "docs/sub/c.txt", "docs/sub/deep/d.txt", "photos/e.jpg"]
                .iter()
                .map(|n| record(n)),
        )
    }

    /// Counts loads per folder
    struct CountingLoader {
        inner: NamespaceProjection,
        fetches: Vec<String>,
    }

    #[async_trait]
    impl FolderLoader for CountingLoader {
        async fn load_folder(&mut self, path: &str) -> Result<FolderListing, StorageError> {
            self.fetches.push(path.to_string());
            self.inner.load_folder(path).await
        }
    }

    fn controller() -> LazyTreeController<CountingLoader> {
        LazyTreeController::new(CountingLoader { inner: projection(), fetches: Vec::new() })
    }

    #[tokio::test]
    async fn test_initial_state() {
        let tree = controller();
        assert_eq!(tree.state("").unwrap().phase(), FolderPhase::CollapsedUnloaded);
        assert!(tree.is_visible(""));
        assert!(tree.visible_rows().is_empty());
        assert!(tree.loader().fetches.is_empty());
    }

    #[tokio::test]
    async fn test_expand_twice_fetches_once() {
        let mut tree = controller();
        tree.expand("docs").await.unwrap();
        tree.expand("docs").await.unwrap();
        assert_eq!(tree.loader().fetches, vec!["docs".to_string()]);
        assert_eq!(tree.state("docs").unwrap().phase(), FolderPhase::ExpandedLoaded);
    }

    #[tokio::test]
    async fn test_expand_reveals_only_immediate_children() {
        let mut tree = controller();
        tree.expand("").await.unwrap();

        assert!(tree.is_visible("docs"));
        assert!(tree.is_visible("photos"));
        assert!(!tree.is_visible("docs/sub"));
        assert_eq!(tree.state("docs").unwrap().phase(), FolderPhase::CollapsedUnloaded);
        assert_eq!(tree.subfolders_of(""), ["docs".to_string(), "photos".to_string()]);
        assert_eq!(tree.files_in("").len(), 1);

        tree.expand("docs").await.unwrap();
        assert!(tree.is_visible("docs/sub"));
        assert!(!tree.is_visible("docs/sub/deep"));
        assert_eq!(tree.state("docs/sub").unwrap().phase(), FolderPhase::CollapsedUnloaded);
    }

    #[tokio::test]
    async fn test_collapse_cascade_keeps_loaded() {
        let mut tree = controller();
        tree.reveal("docs/sub/deep").await.unwrap();
        assert_eq!(tree.loader().fetches.len(), 4);

        tree.collapse("docs");
        let sub = tree.state("docs/sub").unwrap();
        let deep = tree.state("docs/sub/deep").unwrap();
        assert!(sub.loaded && !sub.expanded);
        assert!(deep.loaded && !deep.expanded);
        assert!(tree.is_visible("docs"));
        assert!(!tree.is_visible("docs/sub"));
        assert!(!tree.is_visible("docs/sub/deep"));

        // Re-expanding does not refetch and leaves descendants collapsed
        tree.expand("docs").await.unwrap();
        assert_eq!(tree.loader().fetches.len(), 4);
        assert!(tree.is_visible("docs/sub"));
        assert!(!tree.is_visible("docs/sub/deep"));
    }

    #[tokio::test]
    async fn test_collapse_does_not_touch_siblings_with_shared_prefix() {
        let mut tree = LazyTreeController::new(NamespaceProjection::project(
            ["docs/a.txt", "docs-old/b.txt"].iter().map(|n| record(n)),
        ));
        tree.expand("").await.unwrap();
        tree.expand("docs").await.unwrap();
        tree.expand("docs-old").await.unwrap();

        tree.collapse("docs");
        assert!(tree.state("docs-old").unwrap().expanded);
    }

    #[tokio::test]
    async fn test_expand_all_does_not_fetch() {
        let mut tree = controller();
        tree.reveal("docs/sub").await.unwrap();
        tree.collapse_all();
        let fetched = tree.loader().fetches.len();

        tree.expand_all();
        assert_eq!(tree.loader().fetches.len(), fetched);
        assert!(tree.state("docs/sub").unwrap().expanded);
        // Known but never loaded
        assert_eq!(tree.state("photos").unwrap().phase(), FolderPhase::CollapsedUnloaded);
        assert_eq!(tree.state("docs/sub/deep").unwrap().phase(), FolderPhase::CollapsedUnloaded);

        tree.collapse_all();
        assert!(tree.visible_rows().is_empty());
    }

    #[tokio::test]
    async fn test_visible_rows_depth_first() {
        let mut tree = controller();
        tree.reveal("docs").await.unwrap();

        let rows: Vec<(String, usize)> = tree.visible_rows().iter().map(|row| match row {
            TreeRow::Folder { path, depth, .. } => (format!("{}/", path), *depth),
            TreeRow::File { record, depth } => (record.name.clone(), *depth),
        }).collect();

        assert_eq!(rows, vec![
            ("docs/".to_string(), 0),
            ("docs/sub/".to_string(), 1),
            ("docs/b.txt".to_string(), 1),
            ("photos/".to_string(), 0),
            ("a.txt".to_string(), 0),
        ]);
    }

    #[tokio::test]
    async fn test_expanding_parent_hides_grandchildren() {
        let mut tree = controller();
        tree.expand("").await.unwrap();
        tree.expand("docs/sub").await.unwrap();
        assert!(!tree.is_visible("docs/sub"));

        tree.expand("docs").await.unwrap();
        assert!(tree.is_visible("docs/sub"));
        assert!(!tree.is_visible("docs/sub/deep"));
        assert_eq!(tree.state("docs/sub").unwrap().phase(), FolderPhase::CollapsedLoaded);

        // Already loaded, so opening it again does not refetch
        tree.expand("docs/sub").await.unwrap();
        assert!(tree.is_visible("docs/sub/deep"));
        assert_eq!(tree.loader().fetches, vec!["", "docs/sub", "docs"]);
    }

    #[tokio::test]
    async fn test_reexpanding_open_folder_keeps_children_open() {
        let mut tree = controller();
        tree.reveal("docs/sub").await.unwrap();
        tree.reveal("photos").await.unwrap();
        assert!(tree.state("docs/sub").unwrap().expanded);
        assert!(tree.is_visible("docs/sub/deep"));
    }

    struct FailingLoader;

    #[async_trait]
    impl FolderLoader for FailingLoader {
        async fn load_folder(&mut self, _path: &str) -> Result<FolderListing, StorageError> {
            Err(StorageError::TransientNetwork("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_load_leaves_folder_unloaded() {
        let mut tree = LazyTreeController::new(FailingLoader);
        assert!(tree.expand("docs").await.is_err());
        assert!(tree.state("docs").is_none());
        assert_eq!(tree.state("").unwrap().phase(), FolderPhase::CollapsedUnloaded);
    }

    #[tokio::test]
    async fn test_store_loader_lists_with_prefix() {
        let gateway = AzureBlobGateway::new(
            Credential::new(TEST_ACCOUNT, TEST_KEY),
            Url::parse("https://acme.blob.core.windows.net").unwrap(),
            "documents",
            MemoryTransport::new().with_container("documents"),
        );
        for name in ["a.txt", "docs/b.txt", "docs/sub/c.txt"] {
            gateway.put(name, b"x".to_vec(), "text/plain").await.unwrap();
        }

        let mut tree = LazyTreeController::new(StoreFolderLoader::new(&gateway));
        tree.expand("").await.unwrap();
        tree.expand("docs").await.unwrap();
        tree.expand("docs").await.unwrap();

        let files: Vec<&str> = tree.files_in("docs").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(files, vec!["docs/b.txt"]);
        assert_eq!(tree.subfolders_of("docs"), ["docs/sub".to_string()]);

        let lists: Vec<String> = gateway.transport().requests().into_iter()
            .filter(|(_, target)| target.contains("comp=list"))
            .map(|(_, target)| target)
            .collect();
        assert_eq!(lists, vec![
            "/documents?restype=container&comp=list".to_string(),
            "/documents?restype=container&comp=list&prefix=docs%2F".to_string(),
        ]);
    }
}
