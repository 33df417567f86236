//! Data Models
//!
//! This module contains the core data structures used throughout TopicTree:
//!
//! - `Tree` - hydrated tree identity with kind-loaded details
//! - `TreeNode` - rows of the tree_nodes table (roots and their subtrees)
//!
//! Kind-specific data stays in kind tables (see `topic_trees`); models carry
//! only what every caller needs.

mod node;
mod tree;

pub use node::{TreeNode, CATEGORY_NODE_TYPE, TOPIC_NODE_TYPE};
pub use tree::{DisplayFormat, Tree, TreeDetails};
