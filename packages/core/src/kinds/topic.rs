//! Topic Tree Kind
//!
//! The built-in kind for topic trees. Kind data is a single named row in
//! `topic_trees`; the system default topic tree is always the one with the
//! smallest identity, recomputed on demand rather than stored.
//!
//! Creation bootstraps read access: the guest group is granted the category
//! view permission on the new root node. The grant runs after the create
//! transaction commits and never fails the creation.

use crate::db::{DatabaseError, DatabaseService};
use crate::kinds::TreeKind;
use crate::models::{Tree, TreeDetails, TreeNode};
use crate::services::access_service::AccessService;
use crate::services::error::TreeServiceError;
use crate::services::tree_service::TreeService;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

/// Handle stored in trees.kind_handle for topic trees
pub const TOPIC_KIND_HANDLE: &str = "topic";

/// Group granted read access on every new topic tree root
pub const GUEST_GROUP_ID: i64 = 1;

/// Permission key guarding visibility of topic category tree nodes
pub const VIEW_TOPIC_CATEGORY_TREE_NODE: &str = "view_topic_category_tree_node";

/// Envelope attribute marking the system default tree
const DEFAULT_ATTR: &str = "default";

/// Envelope attribute carrying the tree name
const NAME_ATTR: &str = "name";

/// The built-in topic tree kind
pub struct TopicKind;

#[async_trait]
impl TreeKind for TopicKind {
    fn handle(&self) -> &'static str {
        TOPIC_KIND_HANDLE
    }

    async fn hydrate(
        &self,
        db: &DatabaseService,
        tree_id: i64,
    ) -> Result<Option<TreeDetails>, DatabaseError> {
        let name = db.db_get_topic_tree_name(tree_id).await?;
        Ok(name.map(|name| TreeDetails { name }))
    }

    async fn persist_name(
        &self,
        db: &DatabaseService,
        tree_id: i64,
        name: &str,
    ) -> Result<(), DatabaseError> {
        db.db_upsert_topic_tree_name(tree_id, name).await
    }

    async fn delete_data(&self, db: &DatabaseService, tree_id: i64) -> Result<(), DatabaseError> {
        db.db_delete_topic_tree_row(tree_id).await?;
        Ok(())
    }

    async fn export(
        &self,
        db: &DatabaseService,
        tree: &Tree,
        sink: &mut Map<String, Value>,
    ) -> Result<(), TreeServiceError> {
        if db.db_default_topic_tree_id().await? == Some(tree.tree_id) {
            sink.insert(DEFAULT_ATTR.to_string(), Value::Bool(true));
        }
        Ok(())
    }

    /// Materialize a tree from an import envelope.
    ///
    /// A truthy default marker binds to the current system default instead
    /// of creating anything; otherwise a new tree is created from the name
    /// attribute.
    async fn import(
        &self,
        engine: &TreeService,
        access: &AccessService,
        source: &Value,
    ) -> Result<Tree, TreeServiceError> {
        if is_truthy(source.get(DEFAULT_ATTR)) {
            let tree_id = match engine.db().db_default_topic_tree_id().await? {
                Some(tree_id) => tree_id,
                None => {
                    return Err(TreeServiceError::import_failed(
                        "no default topic tree exists to bind to",
                    ))
                }
            };
            return match engine.get_by_id(tree_id).await? {
                Some(tree) => Ok(tree),
                None => Err(TreeServiceError::tree_not_found(tree_id)),
            };
        }

        let name = source
            .get(NAME_ATTR)
            .and_then(Value::as_str)
            .ok_or_else(|| TreeServiceError::import_failed("missing name attribute"))?;

        let tree_id = create_topic_tree(engine.db(), access, name).await?;
        match engine.get_by_id(tree_id).await? {
            Some(tree) => Ok(tree),
            None => Err(TreeServiceError::tree_not_found(tree_id)),
        }
    }
}

/// Create a topic tree
///
/// The root category node, the identity row and the name land in one
/// transaction. The guest view grant on the new root follows the commit and
/// must not fail the creation: a grant failure is logged and the tree stands.
pub(crate) async fn create_topic_tree(
    db: &DatabaseService,
    access: &AccessService,
    name: &str,
) -> Result<i64, TreeServiceError> {
    let root = TreeNode::new_root_category();
    let tree_id = db
        .db_create_topic_tree(TOPIC_KIND_HANDLE, &root.id, &root.node_type, name)
        .await?;

    if let Err(e) = access
        .grant_group_access(GUEST_GROUP_ID, VIEW_TOPIC_CATEGORY_TREE_NODE, &root.id)
        .await
    {
        warn!(
            "Guest view grant failed for topic tree {} (root {}): {}",
            tree_id, root.id, e
        );
    }

    Ok(tree_id)
}

/// Truthiness of an envelope attribute
///
/// Accepts true, nonzero numbers, and nonempty strings other than "0".
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy_accepts_bool_number_and_string_forms() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!(-2.5))));
        assert!(is_truthy(Some(&json!("1"))));
        assert!(is_truthy(Some(&json!("yes"))));
    }

    #[test]
    fn test_truthy_rejects_zero_empty_and_missing() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(0.0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!("0"))));
        assert!(!is_truthy(Some(&json!(null))));
    }
}
