//! Tree Engine - Kind-Agnostic Tree Operations
//!
//! This module provides the shared engine under every tree kind:
//!
//! - Identity creation for an existing root node
//! - Lookup with kind dispatch (identity row + hydrate hook)
//! - Deletion (kind data hook, then the identity and node subtree)
//! - Root node retrieval
//!
//! The engine never interprets kind data itself; it resolves the stored
//! handle through the [`TreeKindRegistry`] and calls the hooks.

use crate::db::{parse_timestamp, DatabaseService};
use crate::kinds::TreeKindRegistry;
use crate::models::{Tree, TreeDetails, TreeNode};
use crate::services::error::TreeServiceError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Kind-agnostic tree engine
pub struct TreeService {
    db: Arc<DatabaseService>,
    kinds: Arc<TreeKindRegistry>,
}

impl TreeService {
    pub fn new(db: Arc<DatabaseService>, kinds: Arc<TreeKindRegistry>) -> Self {
        Self { db, kinds }
    }

    /// Database handle shared with kind hooks
    pub fn db(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    /// Registry resolving kind handles
    pub fn kinds(&self) -> &Arc<TreeKindRegistry> {
        &self.kinds
    }

    /// Persist a new tree identity for an existing root node
    ///
    /// The handle must name a registered kind; kind data is NOT written
    /// here, callers persist it through the kind's hooks.
    pub async fn add(&self, kind_handle: &str, root_node_id: &str) -> Result<i64, TreeServiceError> {
        if !self.kinds.contains(kind_handle) {
            return Err(TreeServiceError::unknown_kind(kind_handle));
        }

        let tree_id = self.db.db_insert_tree(kind_handle, root_node_id).await?;
        Ok(tree_id)
    }

    /// Fetch a tree identity and hydrate it through its registered kind
    ///
    /// Returns None when the identity row does not exist, when no kind is
    /// registered for the stored handle, or when the kind has no data for
    /// the tree (hydration failed). Callers cannot distinguish those cases
    /// here; the skip is logged for the two inconsistent ones.
    pub async fn get_by_id(&self, tree_id: i64) -> Result<Option<Tree>, TreeServiceError> {
        let row = match self.db.db_get_tree(tree_id).await? {
            Some(row) => row,
            None => return Ok(None),
        };
        let identity = TreeIdentity::from_row(&row)?;

        let kind = match self.kinds.get(&identity.kind_handle) {
            Some(kind) => kind,
            None => {
                warn!(
                    "No tree kind registered for handle '{}' (tree {})",
                    identity.kind_handle, tree_id
                );
                return Ok(None);
            }
        };

        match kind.hydrate(&self.db, tree_id).await? {
            Some(details) => Ok(Some(identity.into_tree(details))),
            None => Ok(None),
        }
    }

    /// Root node of a tree
    pub async fn root_node(&self, tree: &Tree) -> Result<Option<TreeNode>, TreeServiceError> {
        let row = match self.db.db_get_node(&tree.root_node_id).await? {
            Some(row) => row,
            None => return Ok(None),
        };
        Ok(Some(node_from_row(&row)?))
    }

    /// Delete a tree
    ///
    /// Kind data is removed through the delete hook, then the identity row
    /// and the root node subtree go in one transaction. Idempotent.
    ///
    /// # Returns
    ///
    /// Whether a tree existed to delete
    pub async fn delete(&self, tree_id: i64) -> Result<bool, TreeServiceError> {
        let row = match self.db.db_get_tree(tree_id).await? {
            Some(row) => row,
            None => return Ok(false),
        };
        let identity = TreeIdentity::from_row(&row)?;

        if let Some(kind) = self.kinds.get(&identity.kind_handle) {
            kind.delete_data(&self.db, tree_id).await?;
        } else {
            // The identity cascade still removes kind rows keyed on tree_id
            warn!(
                "Deleting tree {} with unregistered kind '{}'",
                tree_id, identity.kind_handle
            );
        }

        self.db
            .db_delete_tree(tree_id, &identity.root_node_id)
            .await?;

        Ok(true)
    }
}

/// Raw identity row, before kind hydration
struct TreeIdentity {
    tree_id: i64,
    kind_handle: String,
    root_node_id: String,
    created_at: DateTime<Utc>,
}

impl TreeIdentity {
    /// Convert a trees row (tree_id, kind_handle, root_node_id, created_at)
    fn from_row(row: &libsql::Row) -> Result<Self, TreeServiceError> {
        let tree_id: i64 = row
            .get(0)
            .map_err(|e| TreeServiceError::query_failed(format!("Failed to read tree_id: {}", e)))?;
        let kind_handle: String = row.get(1).map_err(|e| {
            TreeServiceError::query_failed(format!("Failed to read kind_handle: {}", e))
        })?;
        let root_node_id: String = row.get(2).map_err(|e| {
            TreeServiceError::query_failed(format!("Failed to read root_node_id: {}", e))
        })?;
        let created_at_str: String = row.get(3).map_err(|e| {
            TreeServiceError::query_failed(format!("Failed to read created_at: {}", e))
        })?;
        let created_at = parse_timestamp(&created_at_str)?;

        Ok(Self {
            tree_id,
            kind_handle,
            root_node_id,
            created_at,
        })
    }

    fn into_tree(self, details: TreeDetails) -> Tree {
        Tree {
            tree_id: self.tree_id,
            kind_handle: self.kind_handle,
            root_node_id: self.root_node_id,
            created_at: self.created_at,
            name: details.name,
        }
    }
}

/// Convert a tree_nodes row (id, node_type, parent_id, tree_id, name, created_at)
fn node_from_row(row: &libsql::Row) -> Result<TreeNode, TreeServiceError> {
    let id: String = row
        .get(0)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read node id: {}", e)))?;
    let node_type: String = row
        .get(1)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read node_type: {}", e)))?;
    let parent_id: Option<String> = row
        .get(2)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read parent_id: {}", e)))?;
    let tree_id: Option<i64> = row
        .get(3)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read tree_id: {}", e)))?;
    let name: String = row
        .get(4)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read name: {}", e)))?;
    let created_at_str: String = row
        .get(5)
        .map_err(|e| TreeServiceError::query_failed(format!("Failed to read created_at: {}", e)))?;
    let created_at = parse_timestamp(&created_at_str)?;

    Ok(TreeNode {
        id,
        node_type,
        parent_id,
        tree_id,
        name,
        created_at,
    })
}
