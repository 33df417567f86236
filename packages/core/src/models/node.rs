//! Tree Node Data Structures
//!
//! This module defines the `TreeNode` struct backing the `tree_nodes` table.
//! Every tree owns a root node of the category type; further nodes hang off
//! it through `parent_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node type handle for category nodes (tree roots and groupings)
pub const CATEGORY_NODE_TYPE: &str = "category";

/// Node type handle for topic leaf nodes
pub const TOPIC_NODE_TYPE: &str = "topic";

/// A row of the tree_nodes table
///
/// # Fields
///
/// - `id`: Unique identifier (UUID string)
/// - `node_type`: Type handle (e.g. "category", "topic")
/// - `parent_id`: Optional reference to the parent node; None for roots
/// - `tree_id`: Identity of the owning tree, set once the tree row exists
/// - `name`: Node label; root category nodes are unnamed, the tree row
///   carries the display name
/// - `created_at`: Timestamp when the node was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub node_type: String,
    pub parent_id: Option<String>,
    pub tree_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl TreeNode {
    /// Create a new node with a generated UUID
    pub fn new(node_type: String, name: String, parent_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_type,
            parent_id,
            tree_id: None,
            name,
            created_at: Utc::now(),
        }
    }

    /// Root category node for a new tree
    pub fn new_root_category() -> Self {
        Self::new(CATEGORY_NODE_TYPE.to_string(), String::new(), None)
    }

    /// Whether this node is a tree root
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_category_creation() {
        let node = TreeNode::new_root_category();

        assert!(!node.id.is_empty());
        assert_eq!(node.node_type, CATEGORY_NODE_TYPE);
        assert!(node.name.is_empty());
        assert!(node.tree_id.is_none());
        assert!(node.is_root());
    }

    #[test]
    fn test_child_node_is_not_root() {
        let parent = TreeNode::new_root_category();
        let child = TreeNode::new(
            TOPIC_NODE_TYPE.to_string(),
            "Rust".to_string(),
            Some(parent.id.clone()),
        );

        assert_ne!(child.id, parent.id);
        assert!(!child.is_root());
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    }
}
