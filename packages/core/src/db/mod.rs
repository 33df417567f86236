//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Fixed schema for tree identities, tree nodes, kind data and access grants
//! - WAL mode and foreign keys for safe concurrent use
//!
//! The `db_*` methods on [`DatabaseService`] contain the raw SQL; business
//! rules live in the service layer on top of them.

mod database;
mod error;

pub(crate) use database::parse_timestamp;
pub use database::{DatabaseService, DbCreateNodeParams};
pub use error::DatabaseError;
