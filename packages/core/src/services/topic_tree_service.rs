//! Topic Tree Service - Lifecycle, Naming and Transport
//!
//! This module provides the public surface for topic trees:
//!
//! - Creation (root category node + identity + name, guest view bootstrap)
//! - Lookup by identity, by exact name, and the system default
//! - Listing in creation order
//! - Rename (blind upsert, last writer wins)
//! - JSON export/import envelopes
//!
//! # Default Resolution
//!
//! The default topic tree is never stored: it is always the tree with the
//! smallest identity, recomputed on every call. Deleting the default
//! silently promotes the next-oldest tree.

use crate::db::DatabaseService;
use crate::kinds::{topic, TreeKindRegistry, TOPIC_KIND_HANDLE};
use crate::models::Tree;
use crate::services::access_service::AccessService;
use crate::services::error::TreeServiceError;
use crate::services::tree_service::TreeService;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Envelope attribute for the tree kind
const TYPE_ATTR: &str = "type";

/// Envelope attribute for the tree name
const NAME_ATTR: &str = "name";

/// Lifecycle and transport surface for topic trees
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use topictree_core::db::DatabaseService;
/// use topictree_core::services::{AccessService, TopicTreeService};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./topictree.db")).await?);
///     let access = Arc::new(AccessService::new(db.clone()));
///     let service = TopicTreeService::new(db, access);
///
///     let tree = service.create("Regions").await?;
///     assert_eq!(service.get_default().await?.map(|t| t.tree_id), Some(tree.tree_id));
///     Ok(())
/// }
/// ```
pub struct TopicTreeService {
    access: Arc<AccessService>,
    trees: TreeService,
}

impl TopicTreeService {
    /// Build the service with the built-in kind registry
    pub fn new(db: Arc<DatabaseService>, access: Arc<AccessService>) -> Self {
        let kinds = Arc::new(TreeKindRegistry::new());
        Self {
            access,
            trees: TreeService::new(db, kinds),
        }
    }

    /// Kind-agnostic engine (shared lookup, root nodes, deletion)
    pub fn trees(&self) -> &TreeService {
        &self.trees
    }

    fn db(&self) -> &Arc<DatabaseService> {
        self.trees.db()
    }

    /// Create a topic tree named `name`
    ///
    /// The root category node, the tree identity and the name are committed
    /// atomically. The guest view grant on the root node is applied after
    /// the commit; a grant failure is logged and does not undo the creation.
    ///
    /// Names are not required to be unique.
    pub async fn create(&self, name: &str) -> Result<Tree, TreeServiceError> {
        let tree_id = topic::create_topic_tree(self.db(), &self.access, name).await?;
        match self.get_by_id(tree_id).await? {
            Some(tree) => Ok(tree),
            None => Err(TreeServiceError::tree_not_found(tree_id)),
        }
    }

    /// Topic tree by identity
    ///
    /// Trees of other kinds resolve to None here.
    pub async fn get_by_id(&self, tree_id: i64) -> Result<Option<Tree>, TreeServiceError> {
        let tree = self.trees.get_by_id(tree_id).await?;
        Ok(tree.filter(|t| t.kind_handle == TOPIC_KIND_HANDLE))
    }

    /// Topic tree by exact name
    ///
    /// Comparison is exact (case-sensitive, no trimming). Names are not
    /// unique; ties resolve to the smallest identity.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Tree>, TreeServiceError> {
        match self.db().db_topic_tree_id_by_name(name).await? {
            Some(tree_id) => self.get_by_id(tree_id).await,
            None => Ok(None),
        }
    }

    /// The system default topic tree
    ///
    /// Always the tree with the smallest identity; None when no topic trees
    /// exist.
    pub async fn get_default(&self) -> Result<Option<Tree>, TreeServiceError> {
        match self.db().db_default_topic_tree_id().await? {
            Some(tree_id) => self.get_by_id(tree_id).await,
            None => Ok(None),
        }
    }

    /// All topic trees in creation order
    ///
    /// Identity breaks creation-time ties. Rows that no longer hydrate are
    /// skipped with a warning rather than failing the listing.
    pub async fn list(&self) -> Result<Vec<Tree>, TreeServiceError> {
        let ids = self.db().db_list_topic_tree_ids().await?;

        let mut trees = Vec::with_capacity(ids.len());
        for tree_id in ids {
            match self.get_by_id(tree_id).await? {
                Some(tree) => trees.push(tree),
                None => warn!("Skipping unresolvable topic tree {}", tree_id),
            }
        }

        Ok(trees)
    }

    /// Rename a tree
    ///
    /// Blind upsert; under concurrent renames the last writer wins. The
    /// passed record is updated in place on success.
    pub async fn rename(&self, tree: &mut Tree, name: &str) -> Result<(), TreeServiceError> {
        let kind = match self.trees.kinds().get(&tree.kind_handle) {
            Some(kind) => kind,
            None => return Err(TreeServiceError::unknown_kind(tree.kind_handle.clone())),
        };

        kind.persist_name(self.db(), tree.tree_id, name).await?;
        tree.name = name.to_string();
        Ok(())
    }

    /// Export a tree as a JSON envelope
    ///
    /// The envelope carries the kind handle, the name, and kind-specific
    /// attributes (the default marker appears on the system default tree
    /// and only there).
    pub async fn export(&self, tree: &Tree) -> Result<Value, TreeServiceError> {
        let mut sink = Map::new();
        sink.insert(
            TYPE_ATTR.to_string(),
            Value::String(tree.kind_handle.clone()),
        );
        sink.insert(NAME_ATTR.to_string(), Value::String(tree.name.clone()));
        self.export_details(tree, &mut sink).await?;
        Ok(Value::Object(sink))
    }

    /// Write kind-specific export attributes into an existing envelope
    pub async fn export_details(
        &self,
        tree: &Tree,
        sink: &mut Map<String, Value>,
    ) -> Result<(), TreeServiceError> {
        let kind = match self.trees.kinds().get(&tree.kind_handle) {
            Some(kind) => kind,
            None => return Err(TreeServiceError::unknown_kind(tree.kind_handle.clone())),
        };

        kind.export(self.db(), tree, sink).await
    }

    /// Import a tree from a JSON envelope
    ///
    /// An envelope with a truthy default marker binds to the current system
    /// default instead of creating anything. Otherwise a new tree is
    /// created from the name attribute, guest view bootstrap included.
    pub async fn import(&self, source: &Value) -> Result<Tree, TreeServiceError> {
        let handle = source
            .get(TYPE_ATTR)
            .and_then(Value::as_str)
            .unwrap_or(TOPIC_KIND_HANDLE);

        let kind = match self.trees.kinds().get(handle) {
            Some(kind) => kind,
            None => return Err(TreeServiceError::unknown_kind(handle)),
        };

        kind.import(&self.trees, &self.access, source).await
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "topic_tree_service_test.rs"]
mod topic_tree_service_test;
