//! Comprehensive tests for TopicTreeService
//!
//! Tests cover:
//! - Creation (identity, root node, name, guest view bootstrap)
//! - Lookup by identity, exact name and the computed default
//! - Listing order and skip-on-inconsistency
//! - Rename semantics (upsert, last writer wins)
//! - Export/import envelopes including default binding
//! - Deletion through the engine and the kind hook

#[cfg(test)]
mod tests {
    use crate::db::{DatabaseService, DbCreateNodeParams};
    use crate::kinds::{
        TopicKind, TreeKind, GUEST_GROUP_ID, TOPIC_KIND_HANDLE, VIEW_TOPIC_CATEGORY_TREE_NODE,
    };
    use crate::models::{DisplayFormat, CATEGORY_NODE_TYPE};
    use crate::services::{AccessService, TopicTreeService, TreeServiceError};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    /// Helper to create test services
    /// Returns (service, access, db, _temp_dir) - temp_dir must be kept alive for test duration
    async fn create_test_services() -> (
        TopicTreeService,
        Arc<AccessService>,
        Arc<DatabaseService>,
        TempDir,
    ) {
        init_tracing();

        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Arc::new(DatabaseService::new(db_path).await.unwrap());
        let access = Arc::new(AccessService::new(db.clone()));
        let service = TopicTreeService::new(db.clone(), access.clone());

        (service, access, db, temp_dir)
    }

    #[tokio::test]
    async fn test_create_persists_identity_name_and_root() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let tree = service.create("Projects").await.unwrap();

        assert!(tree.tree_id >= 1);
        assert_eq!(tree.kind_handle, TOPIC_KIND_HANDLE);
        assert_eq!(tree.name, "Projects");

        let root = service
            .trees()
            .root_node(&tree)
            .await
            .unwrap()
            .expect("root node");
        assert_eq!(root.node_type, CATEGORY_NODE_TYPE);
        assert!(root.is_root());
        assert_eq!(root.tree_id, Some(tree.tree_id));
    }

    #[tokio::test]
    async fn test_create_grants_guest_view_on_root() {
        let (service, access, _db, _temp) = create_test_services().await;

        let tree = service.create("Visible").await.unwrap();

        assert!(access
            .group_has_access(
                GUEST_GROUP_ID,
                VIEW_TOPIC_CATEGORY_TREE_NODE,
                &tree.root_node_id
            )
            .await
            .unwrap());
        assert!(!access
            .group_has_access(7, VIEW_TOPIC_CATEGORY_TREE_NODE, &tree.root_node_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_get_by_id_missing_returns_none() {
        let (service, _access, _db, _temp) = create_test_services().await;

        assert!(service.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_name_is_exact() {
        let (service, _access, _db, _temp) = create_test_services().await;

        service.create("Colors").await.unwrap();

        assert!(service.get_by_name("Colors").await.unwrap().is_some());
        assert!(service.get_by_name("colors").await.unwrap().is_none());
        assert!(service.get_by_name("Color").await.unwrap().is_none());
        assert!(service.get_by_name(" Colors").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_name_duplicates_resolve_to_smallest_identity() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let first = service.create("Duplicate").await.unwrap();
        let second = service.create("Duplicate").await.unwrap();
        assert!(second.tree_id > first.tree_id);

        let found = service.get_by_name("Duplicate").await.unwrap().unwrap();
        assert_eq!(found.tree_id, first.tree_id);
    }

    #[tokio::test]
    async fn test_default_tracks_smallest_surviving_identity() {
        let (service, _access, _db, _temp) = create_test_services().await;

        assert!(service.get_default().await.unwrap().is_none());

        let t1 = service.create("One").await.unwrap();
        let t2 = service.create("Two").await.unwrap();
        let t3 = service.create("Three").await.unwrap();

        let default = service.get_default().await.unwrap().unwrap();
        assert_eq!(default.tree_id, t1.tree_id);

        // Deleting the default silently promotes the next-oldest tree
        assert!(service.trees().delete(t1.tree_id).await.unwrap());
        let default = service.get_default().await.unwrap().unwrap();
        assert_eq!(default.tree_id, t2.tree_id);

        assert!(service.trees().delete(t2.tree_id).await.unwrap());
        assert!(service.trees().delete(t3.tree_id).await.unwrap());
        assert!(service.get_default().await.unwrap().is_none());

        // Identities are never reused, even once all trees are gone
        let t4 = service.create("Four").await.unwrap();
        assert!(t4.tree_id > t3.tree_id);
    }

    #[tokio::test]
    async fn test_list_returns_creation_order() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let a = service.create("Alpha").await.unwrap();
        let b = service.create("Beta").await.unwrap();
        let c = service.create("Gamma").await.unwrap();

        let listed = service.list().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.tree_id).collect();
        let names: Vec<&str> = listed.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(ids, vec![a.tree_id, b.tree_id, c.tree_id]);
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[tokio::test]
    async fn test_list_skips_unresolvable_rows() {
        let (service, _access, db, _temp) = create_test_services().await;

        let t1 = service.create("Keep A").await.unwrap();
        let t2 = service.create("Orphan").await.unwrap();
        let t3 = service.create("Keep B").await.unwrap();

        // Sever the identity row from its kind so hydration fails
        let conn = db.connect_with_timeout().await.unwrap();
        conn.execute(
            "UPDATE trees SET kind_handle = 'retired' WHERE tree_id = ?",
            [t2.tree_id],
        )
        .await
        .unwrap();

        let listed = service.list().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|t| t.tree_id).collect();
        assert_eq!(ids, vec![t1.tree_id, t3.tree_id]);
    }

    #[tokio::test]
    async fn test_rename_persists_and_updates_record() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let mut tree = service.create("Old Name").await.unwrap();
        service.rename(&mut tree, "New Name").await.unwrap();

        assert_eq!(tree.name, "New Name");
        assert_eq!(
            service.get_by_id(tree.tree_id).await.unwrap().unwrap().name,
            "New Name"
        );
        assert!(service.get_by_name("Old Name").await.unwrap().is_none());
        assert_eq!(
            service
                .get_by_name("New Name")
                .await
                .unwrap()
                .unwrap()
                .tree_id,
            tree.tree_id
        );
    }

    #[tokio::test]
    async fn test_rename_last_writer_wins() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let mut first = service.create("Start").await.unwrap();
        let mut second = service.get_by_id(first.tree_id).await.unwrap().unwrap();

        service.rename(&mut first, "From A").await.unwrap();
        service.rename(&mut second, "From B").await.unwrap();

        assert_eq!(
            service.get_by_id(first.tree_id).await.unwrap().unwrap().name,
            "From B"
        );
    }

    #[tokio::test]
    async fn test_display_name_round_trips_markup_safely() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let tree = service.create("R&D <Labs>").await.unwrap();
        let fetched = service.get_by_id(tree.tree_id).await.unwrap().unwrap();

        assert_eq!(fetched.display_name(DisplayFormat::Text), "R&D <Labs>");
        assert_eq!(
            fetched.display_name(DisplayFormat::Html),
            "R&amp;D &lt;Labs&gt;"
        );
    }

    #[tokio::test]
    async fn test_export_marks_only_the_default_tree() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let t1 = service.create("Primary").await.unwrap();
        let t2 = service.create("Secondary").await.unwrap();

        let first = service.export(&t1).await.unwrap();
        assert_eq!(first.get("type").and_then(Value::as_str), Some("topic"));
        assert_eq!(first.get("name").and_then(Value::as_str), Some("Primary"));
        assert_eq!(first.get("default"), Some(&json!(true)));

        let second = service.export(&t2).await.unwrap();
        assert_eq!(second.get("name").and_then(Value::as_str), Some("Secondary"));
        assert!(second.get("default").is_none());

        // The details hook writes into an existing envelope as well
        let mut sink = Map::new();
        service.export_details(&t1, &mut sink).await.unwrap();
        assert_eq!(sink.get("default"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_import_creates_new_tree_from_envelope() {
        let (service, access, _db, _temp) = create_test_services().await;

        let _t1 = service.create("Primary").await.unwrap();
        let t2 = service.create("Flavors").await.unwrap();

        let envelope = service.export(&t2).await.unwrap();
        let imported = service.import(&envelope).await.unwrap();

        assert_ne!(imported.tree_id, t2.tree_id);
        assert_eq!(imported.name, "Flavors");
        assert_eq!(service.list().await.unwrap().len(), 3);

        // The imported tree gets the same guest bootstrap as a created one
        assert!(access
            .group_has_access(
                GUEST_GROUP_ID,
                VIEW_TOPIC_CATEGORY_TREE_NODE,
                &imported.root_node_id
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_import_default_binds_to_current_default() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let t1 = service.create("First").await.unwrap();
        let t2 = service.create("Second").await.unwrap();

        let envelope = service.export(&t1).await.unwrap();
        assert_eq!(envelope.get("default"), Some(&json!(true)));

        // The marker binds to whatever is default at import time, not to
        // the exported tree
        assert!(service.trees().delete(t1.tree_id).await.unwrap());
        let bound = service.import(&envelope).await.unwrap();

        assert_eq!(bound.tree_id, t2.tree_id);
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_default_with_no_trees_fails() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let result = service
            .import(&json!({"type": "topic", "default": true}))
            .await;
        assert!(matches!(result, Err(TreeServiceError::ImportFailed(_))));
    }

    #[tokio::test]
    async fn test_import_without_name_fails() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let result = service.import(&json!({"type": "topic"})).await;
        assert!(matches!(result, Err(TreeServiceError::ImportFailed(_))));
    }

    #[tokio::test]
    async fn test_import_unknown_kind_fails() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let result = service
            .import(&json!({"type": "mystery", "name": "X"}))
            .await;
        assert!(matches!(result, Err(TreeServiceError::UnknownKind { .. })));
    }

    #[tokio::test]
    async fn test_import_accepts_legacy_truthy_strings() {
        let (service, _access, _db, _temp) = create_test_services().await;

        let t1 = service.create("Legacy").await.unwrap();

        let bound = service
            .import(&json!({"type": "topic", "default": "1"}))
            .await
            .unwrap();
        assert_eq!(bound.tree_id, t1.tree_id);

        // "0" is falsy, so the import falls through to the name attribute
        let result = service
            .import(&json!({"type": "topic", "default": "0"}))
            .await;
        assert!(matches!(result, Err(TreeServiceError::ImportFailed(_))));
    }

    #[tokio::test]
    async fn test_engine_lookup_requires_kind_data() {
        let (service, _access, db, _temp) = create_test_services().await;

        // An identity row without kind data hydrates to nothing
        db.db_create_node(DbCreateNodeParams {
            id: "bare-root",
            node_type: CATEGORY_NODE_TYPE,
            parent_id: None,
            tree_id: None,
            name: "",
        })
        .await
        .unwrap();
        let tree_id = service
            .trees()
            .add(TOPIC_KIND_HANDLE, "bare-root")
            .await
            .unwrap();

        assert!(service.trees().get_by_id(tree_id).await.unwrap().is_none());
        assert!(service.get_by_id(tree_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_engine_add_rejects_unknown_kind() {
        let (service, _access, db, _temp) = create_test_services().await;

        db.db_create_node(DbCreateNodeParams {
            id: "stray-root",
            node_type: CATEGORY_NODE_TYPE,
            parent_id: None,
            tree_id: None,
            name: "",
        })
        .await
        .unwrap();

        let result = service.trees().add("retired", "stray-root").await;
        assert!(matches!(result, Err(TreeServiceError::UnknownKind { .. })));
    }

    #[tokio::test]
    async fn test_delete_removes_identity_nodes_and_grants() {
        let (service, access, db, _temp) = create_test_services().await;

        let tree = service.create("Doomed").await.unwrap();
        let root_id = tree.root_node_id.clone();

        assert!(service.trees().delete(tree.tree_id).await.unwrap());

        assert!(service.get_by_id(tree.tree_id).await.unwrap().is_none());
        assert!(db.db_get_node(&root_id).await.unwrap().is_none());
        assert!(!access
            .group_has_access(GUEST_GROUP_ID, VIEW_TOPIC_CATEGORY_TREE_NODE, &root_id)
            .await
            .unwrap());

        // Deleting again is a no-op
        assert!(!service.trees().delete(tree.tree_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_data_hook_is_scoped_to_one_tree() {
        let (service, _access, db, _temp) = create_test_services().await;

        let t1 = service.create("One").await.unwrap();
        let t2 = service.create("Two").await.unwrap();

        let kind = TopicKind;
        kind.delete_data(&db, t1.tree_id).await.unwrap();

        assert!(kind.hydrate(&db, t1.tree_id).await.unwrap().is_none());
        assert!(kind.hydrate(&db, t2.tree_id).await.unwrap().is_some());

        // The hook is idempotent
        kind.delete_data(&db, t1.tree_id).await.unwrap();
    }
}
