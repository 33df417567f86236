//! TopicTree Core Business Logic Layer
//!
//! This crate provides tree identity management, topic tree lifecycle and
//! access bootstrap for the TopicTree content organization system.
//!
//! # Architecture
//!
//! - **Typed Trees**: A shared identity table, with per-kind data resolved
//!   through the [`kinds::TreeKind`] trait
//! - **Smallest-Identity Default**: The default topic tree is computed, never
//!   stored, so deleting it silently promotes the next-oldest tree
//! - **libsql/Turso**: Embedded SQLite-compatible database with sync capability
//! - **Cascading Deletes**: Node, kind and access rows are removed through
//!   foreign keys rather than application sweeps
//!
//! # Modules
//!
//! - [`models`] - Data structures (Tree, TreeNode, DisplayFormat)
//! - [`kinds`] - Tree kind system and trait-based hooks
//! - [`services`] - Business services (TopicTreeService, TreeService, AccessService)
//! - [`db`] - Database layer with libsql integration

pub mod models;
pub mod kinds;
pub mod services;
pub mod db;

// Re-export commonly used types
pub use models::*;
pub use kinds::*;
pub use services::*;
