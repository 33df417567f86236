//! Tree Kind System
//!
//! This module provides the trait-based kind system for typed trees:
//!
//! - `TreeKind` trait - the per-kind hooks the engine dispatches to
//! - `TreeKindRegistry` - kind lookup by handle, built-ins pre-registered
//! - [`topic`] - the built-in topic tree kind
//!
//! A tree identity row stores a kind handle; every operation that needs
//! kind-specific data (hydration, naming, deletion, transport) resolves the
//! handle through the registry and calls the hook. Registering a new kind is
//! all it takes to store additional tree types alongside topic trees.

pub mod topic;

use crate::db::{DatabaseError, DatabaseService};
use crate::models::{Tree, TreeDetails};
use crate::services::access_service::AccessService;
use crate::services::error::TreeServiceError;
use crate::services::tree_service::TreeService;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub use topic::{TopicKind, GUEST_GROUP_ID, TOPIC_KIND_HANDLE, VIEW_TOPIC_CATEGORY_TREE_NODE};

/// Hooks implemented once per tree kind
///
/// Hooks receive the database handle explicitly; kinds themselves stay
/// stateless and shareable.
#[async_trait]
pub trait TreeKind: Send + Sync {
    /// Stable handle stored in the trees.kind_handle column
    fn handle(&self) -> &'static str;

    /// Load kind-specific details for a tree identity.
    ///
    /// Returns None when no kind data exists; the identity is then not
    /// usable as this kind and lookups treat the tree as absent.
    async fn hydrate(
        &self,
        db: &DatabaseService,
        tree_id: i64,
    ) -> Result<Option<TreeDetails>, DatabaseError>;

    /// Persist the kind-level name for an existing tree (upsert)
    async fn persist_name(
        &self,
        db: &DatabaseService,
        tree_id: i64,
        name: &str,
    ) -> Result<(), DatabaseError>;

    /// Remove kind-specific data for a tree. Idempotent.
    async fn delete_data(&self, db: &DatabaseService, tree_id: i64) -> Result<(), DatabaseError>;

    /// Write kind-specific attributes into an export envelope
    async fn export(
        &self,
        db: &DatabaseService,
        tree: &Tree,
        sink: &mut Map<String, Value>,
    ) -> Result<(), TreeServiceError>;

    /// Materialize a tree from an import envelope
    async fn import(
        &self,
        engine: &TreeService,
        access: &AccessService,
        source: &Value,
    ) -> Result<Tree, TreeServiceError>;
}

/// Kind lookup by handle
pub struct TreeKindRegistry {
    kinds: HashMap<&'static str, Arc<dyn TreeKind>>,
}

impl TreeKindRegistry {
    /// Registry with the built-in kinds registered
    pub fn new() -> Self {
        let mut registry = Self {
            kinds: HashMap::new(),
        };
        registry.register(Arc::new(TopicKind));
        registry
    }

    /// Register a kind under its handle, replacing any previous registration
    pub fn register(&mut self, kind: Arc<dyn TreeKind>) {
        self.kinds.insert(kind.handle(), kind);
    }

    /// Kind registered for a handle
    pub fn get(&self, handle: &str) -> Option<Arc<dyn TreeKind>> {
        self.kinds.get(handle).cloned()
    }

    /// Whether a handle has a registered kind
    pub fn contains(&self, handle: &str) -> bool {
        self.kinds.contains_key(handle)
    }
}

impl Default for TreeKindRegistry {
    fn default() -> Self {
        Self::new()
    }
}
