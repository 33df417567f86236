//! Access Service - Permission Grants on Tree Nodes
//!
//! Thin grant layer used when trees are created: resolves group access
//! entities, builds an access list for a permission key and assigns it to a
//! node. Assignments are per (key, node) pair; assigning again replaces the
//! previous list.
//!
//! Permission keys are seeded at schema initialization; this service only
//! looks them up.

use crate::db::DatabaseService;
use crate::services::error::TreeServiceError;
use std::sync::Arc;

/// Access entity type handle for group-backed entities
pub const GROUP_ENTITY_TYPE: &str = "group";

/// A named permission key (seeded at schema initialization)
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionKey {
    pub id: i64,
    pub handle: String,
    pub name: String,
}

/// Permission grant surface over the access tables
pub struct AccessService {
    db: Arc<DatabaseService>,
}

impl AccessService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Resolve a group access entity, creating it on first use
    pub async fn get_or_create_group_entity(
        &self,
        group_id: i64,
    ) -> Result<i64, TreeServiceError> {
        let id = self
            .db
            .db_get_or_create_access_entity(GROUP_ENTITY_TYPE, group_id)
            .await?;
        Ok(id)
    }

    /// Look up a permission key by handle
    pub async fn key_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<PermissionKey>, TreeServiceError> {
        let row = match self.db.db_get_permission_key(handle).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let id: i64 = row
            .get(0)
            .map_err(|e| TreeServiceError::query_failed(format!("Failed to read key id: {}", e)))?;
        let handle: String = row.get(1).map_err(|e| {
            TreeServiceError::query_failed(format!("Failed to read key handle: {}", e))
        })?;
        let name: String = row.get(2).map_err(|e| {
            TreeServiceError::query_failed(format!("Failed to read key name: {}", e))
        })?;

        Ok(Some(PermissionKey { id, handle, name }))
    }

    /// Grant a group the given permission on a node
    ///
    /// Creates a fresh access list containing the group entity and assigns
    /// it to the (key, node) pair, replacing any previous assignment.
    pub async fn grant_group_access(
        &self,
        group_id: i64,
        key_handle: &str,
        node_id: &str,
    ) -> Result<(), TreeServiceError> {
        let entity_id = self.get_or_create_group_entity(group_id).await?;

        let key = self.key_by_handle(key_handle).await?.ok_or_else(|| {
            TreeServiceError::access_bootstrap_failed(format!(
                "permission key '{}' is not installed",
                key_handle
            ))
        })?;

        let list_id = self.db.db_create_access_list(key.id).await?;
        self.db.db_add_access_list_entry(list_id, entity_id).await?;
        self.db.db_assign_access(key.id, node_id, list_id).await?;

        Ok(())
    }

    /// Whether a group holds the given permission on a node
    pub async fn group_has_access(
        &self,
        group_id: i64,
        key_handle: &str,
        node_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let has = self
            .db
            .db_group_has_access(group_id, key_handle, node_id)
            .await?;
        Ok(has)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbCreateNodeParams;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    async fn create_test_access() -> (AccessService, Arc<DatabaseService>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        (AccessService::new(db.clone()), db, temp_dir)
    }

    async fn insert_node(db: &DatabaseService, id: &str) {
        db.db_create_node(DbCreateNodeParams {
            id,
            node_type: "category",
            parent_id: None,
            tree_id: None,
            name: "",
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_group_entity_resolution_is_stable() {
        let (access, _db, _temp) = create_test_access().await;

        let first = access.get_or_create_group_entity(1).await.unwrap();
        let second = access.get_or_create_group_entity(1).await.unwrap();
        let other = access.get_or_create_group_entity(2).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_seeded_key_resolves_by_handle() {
        let (access, _db, _temp) = create_test_access().await;

        let key = access
            .key_by_handle("view_topic_category_tree_node")
            .await
            .unwrap()
            .expect("seeded key");
        assert_eq!(key.handle, "view_topic_category_tree_node");
        assert!(!key.name.is_empty());

        assert!(access.key_by_handle("no_such_key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_then_check() {
        let (access, db, _temp) = create_test_access().await;
        insert_node(&db, "n1").await;

        assert!(!access
            .group_has_access(1, "view_topic_category_tree_node", "n1")
            .await
            .unwrap());

        assert_ok!(
            access
                .grant_group_access(1, "view_topic_category_tree_node", "n1")
                .await
        );

        assert!(access
            .group_has_access(1, "view_topic_category_tree_node", "n1")
            .await
            .unwrap());
        // Scoped to the granted group and node
        assert!(!access
            .group_has_access(2, "view_topic_category_tree_node", "n1")
            .await
            .unwrap());
        assert!(!access
            .group_has_access(1, "view_topic_category_tree_node", "n2")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_grant_fails_without_installed_key() {
        let (access, db, _temp) = create_test_access().await;
        insert_node(&db, "n1").await;

        let result = access.grant_group_access(1, "view_unknown_thing", "n1").await;
        assert!(matches!(
            result,
            Err(TreeServiceError::AccessBootstrapFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_reassignment_replaces_previous_list() {
        let (access, db, _temp) = create_test_access().await;
        insert_node(&db, "n1").await;

        access
            .grant_group_access(1, "view_topic_category_tree_node", "n1")
            .await
            .unwrap();

        // A later grant for another group replaces the list on the pair
        // keyed by (key, node), so the first group loses access.
        access
            .grant_group_access(2, "view_topic_category_tree_node", "n1")
            .await
            .unwrap();

        assert!(!access
            .group_has_access(1, "view_topic_category_tree_node", "n1")
            .await
            .unwrap());
        assert!(access
            .group_has_access(2, "view_topic_category_tree_node", "n1")
            .await
            .unwrap());
    }
}
