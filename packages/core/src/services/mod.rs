//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `TreeService` - Kind-agnostic tree identity engine (add, hydrate, delete)
//! - `TopicTreeService` - Topic tree lifecycle, naming, default resolution and transport
//! - `AccessService` - Group access entities, permission keys and grants
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and orchestrating complex operations.

pub mod access_service;
pub mod error;
pub mod topic_tree_service;
pub mod tree_service;

pub use access_service::{AccessService, PermissionKey, GROUP_ENTITY_TYPE};
pub use error::TreeServiceError;
pub use topic_tree_service::TopicTreeService;
pub use tree_service::TreeService;
