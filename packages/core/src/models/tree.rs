//! Tree Data Structures
//!
//! This module defines the core `Tree` struct and related types. A `Tree`
//! combines the kind-agnostic identity row with the details its kind loads
//! for it (currently the name).
//!
//! # Examples
//!
//! ```rust
//! use topictree_core::models::{DisplayFormat, Tree};
//! use chrono::Utc;
//!
//! let tree = Tree {
//!     tree_id: 1,
//!     kind_handle: "topic".to_string(),
//!     root_node_id: "a6f2...".to_string(),
//!     created_at: Utc::now(),
//!     name: "R&D".to_string(),
//! };
//!
//! assert_eq!(tree.display_name(DisplayFormat::Text), "R&D");
//! assert_eq!(tree.display_name(DisplayFormat::Html), "R&amp;D");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output format for tree display names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormat {
    /// Entity-escaped, safe to embed in markup
    Html,
    /// Raw text as stored
    Text,
}

/// Kind-specific data loaded by a hydrate hook
///
/// Every kind names its trees; kinds with richer data still surface the
/// name through this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeDetails {
    pub name: String,
}

/// A hydrated tree: identity row plus kind-loaded details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    /// Monotonic identity (never reused, smaller = older)
    pub tree_id: i64,

    /// Handle of the kind that owns this tree
    pub kind_handle: String,

    /// ID of the root node in tree_nodes
    pub root_node_id: String,

    /// Timestamp when the identity row was created
    pub created_at: DateTime<Utc>,

    /// Kind-level name (not unique across trees)
    pub name: String,
}

impl Tree {
    /// Name formatted for the given output context
    pub fn display_name(&self, format: DisplayFormat) -> String {
        match format {
            DisplayFormat::Html => escape_html(&self.name),
            DisplayFormat::Text => self.name.clone(),
        }
    }
}

/// Escape the HTML-significant characters
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_named(name: &str) -> Tree {
        Tree {
            tree_id: 1,
            kind_handle: "topic".to_string(),
            root_node_id: "root".to_string(),
            created_at: Utc::now(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_display_name_text_is_verbatim() {
        let tree = tree_named("<Fancy> & \"Co\"");
        assert_eq!(tree.display_name(DisplayFormat::Text), "<Fancy> & \"Co\"");
    }

    #[test]
    fn test_display_name_html_escapes_markup() {
        let tree = tree_named("<Fancy> & \"Co's\"");
        assert_eq!(
            tree.display_name(DisplayFormat::Html),
            "&lt;Fancy&gt; &amp; &quot;Co&#39;s&quot;"
        );
    }

    #[test]
    fn test_escape_html_leaves_plain_text_alone() {
        assert_eq!(escape_html("Plain name 42"), "Plain name 42");
        assert_eq!(escape_html(""), "");
    }
}
