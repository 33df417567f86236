//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql for TopicTree's embedded storage.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf chosen by the host
//! - **Fixed schema**: CREATE TABLE IF NOT EXISTS only, no migrations
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled for referential integrity
//!
//! # Database Connection Patterns
//!
//! **Always use `connect_with_timeout()` in async functions** to avoid SQLite
//! thread-safety violations when the Tokio runtime moves futures between
//! threads. The 5-second busy timeout allows concurrent operations to wait
//! and retry instead of failing immediately with `SQLITE_BUSY` errors.
//!
//! Use `connect()` only in single-threaded, synchronous contexts where the
//! connection will not be used across await points.

use crate::db::error::DatabaseError;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use topictree_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/topictree.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Parameters for tree node insertion
pub struct DbCreateNodeParams<'a> {
    pub id: &'a str,
    pub node_type: &'a str,
    pub parent_id: Option<&'a str>,
    pub tree_id: Option<i64>,
    pub name: &'a str,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys)
    /// 5. Seed the built-in permission keys
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the database file
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        // Check if the database file already exists (before we open it).
        // The WAL checkpoint after schema creation is only needed for new files.
        let is_new_database = !db_path.exists();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        // Open database connection using Builder pattern
        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        // Initialize schema (only checkpoints if is_new_database = true)
        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    /// This helper method encapsulates that pattern for cleaner code.
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Creates tables and indexes using CREATE TABLE IF NOT EXISTS,
    /// ensuring idempotent initialization (safe to call multiple times).
    ///
    /// # Arguments
    ///
    /// * `is_new_database` - Whether this is a newly created database file.
    ///   If true, performs a WAL checkpoint to flush schema to disk (prevents
    ///   race conditions in tests). If false, skips checkpoint for performance.
    ///
    /// # Schema
    ///
    /// - `tree_nodes` table: Node rows keyed by UUID, subtree cascade on parent
    /// - `trees` table: Tree identity rows (monotonic INTEGER identity)
    /// - `topic_trees` table: Kind-level data for topic trees (the name)
    /// - Access tables: entities, permission keys, lists, entries, assignments
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Enable WAL mode for better concurrency
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        // Set busy timeout to 5 seconds (5000ms)
        // This makes SQLite wait up to 5s instead of failing immediately on lock
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        // Enable foreign key constraints
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        // Create tree_nodes table (referenced by trees.root_node_id)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                parent_id TEXT,
                tree_id INTEGER,
                name TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                -- Parent deletion cascades to the whole subtree
                FOREIGN KEY (parent_id) REFERENCES tree_nodes(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create tree_nodes table: {}", e))
        })?;

        // Create trees table (kind-agnostic identity rows)
        // AUTOINCREMENT keeps identities monotonic so the smallest identity
        // is always the oldest surviving tree.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trees (
                tree_id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind_handle TEXT NOT NULL,
                root_node_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (root_node_id) REFERENCES tree_nodes(id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create trees table: {}", e))
        })?;

        // Create topic_trees table (kind data: one named row per topic tree)
        // Names are intentionally not UNIQUE; lookups break ties by identity.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS topic_trees (
                tree_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                FOREIGN KEY (tree_id) REFERENCES trees(tree_id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create topic_trees table: {}", e))
        })?;

        // Create access_entities table (group-backed principals)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS access_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                group_id INTEGER NOT NULL,
                UNIQUE (entity_type, group_id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create access_entities table: {}", e))
        })?;

        // Create permission_keys table (seeded below)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS permission_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create permission_keys table: {}", e))
        })?;

        // Create access_lists table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS access_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key_id INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (key_id) REFERENCES permission_keys(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create access_lists table: {}", e))
        })?;

        // Create access_list_entries table (entities included in a list)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS access_list_entries (
                list_id INTEGER NOT NULL,
                entity_id INTEGER NOT NULL,
                PRIMARY KEY (list_id, entity_id),
                FOREIGN KEY (list_id) REFERENCES access_lists(id) ON DELETE CASCADE,
                FOREIGN KEY (entity_id) REFERENCES access_entities(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create access_list_entries table: {}",
                e
            ))
        })?;

        // Create access_assignments table (one list per key+node pair)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS access_assignments (
                key_id INTEGER NOT NULL,
                node_id TEXT NOT NULL,
                list_id INTEGER NOT NULL,
                PRIMARY KEY (key_id, node_id),
                FOREIGN KEY (key_id) REFERENCES permission_keys(id) ON DELETE CASCADE,
                FOREIGN KEY (node_id) REFERENCES tree_nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (list_id) REFERENCES access_lists(id) ON DELETE CASCADE
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create access_assignments table: {}",
                e
            ))
        })?;

        // Create core indexes
        self.create_core_indexes(&conn).await?;

        // Seed built-in permission keys
        self.seed_permission_keys(&conn).await?;

        // Force WAL checkpoint only for newly created databases. This prevents
        // race conditions where rapid database swaps in tests cause
        // "no such table" errors due to WAL entries not being flushed.
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create core indexes
    ///
    /// These indexes are essential for query performance and never change
    /// (no ALTER TABLE required on user machines).
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        // Index on parent_id (subtree queries and cascade deletes)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tree_nodes_parent ON tree_nodes(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_tree_nodes_parent': {}",
                e
            ))
        })?;

        // Index on tree_id (nodes of a tree)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tree_nodes_tree ON tree_nodes(tree_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_tree_nodes_tree': {}",
                e
            ))
        })?;

        // Index on kind_handle (kind-scoped listings)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trees_kind ON trees(kind_handle)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create index 'idx_trees_kind': {}", e))
        })?;

        // Index on topic tree names (exact-name lookup)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_topic_trees_name ON topic_trees(name)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_topic_trees_name': {}",
                e
            ))
        })?;

        // Index on assignment node (per-node access checks)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_assignments_node ON access_assignments(node_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_assignments_node': {}",
                e
            ))
        })?;

        Ok(())
    }

    /// Seed built-in permission keys
    ///
    /// Installs the view key for topic category tree nodes. Idempotent -
    /// uses INSERT OR IGNORE to safely handle repeated initialization.
    async fn seed_permission_keys(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT OR IGNORE INTO permission_keys (handle, name) VALUES (?, ?)",
            (
                "view_topic_category_tree_node",
                "View Topic Category Tree Node",
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to seed permission keys: {}",
                e
            ))
        })?;

        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// Only use this in synchronous, single-threaded contexts. In async
    /// functions or Tokio runtime contexts, use `connect_with_timeout()`
    /// instead to avoid SQLite thread-safety violations.
    ///
    /// Returns a new connection that can be used for queries.
    /// Multiple connections can be used concurrently thanks to WAL mode.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    ///
    /// This is the safe default for async code. Sets a 5-second busy timeout
    /// so concurrent operations wait and retry instead of failing immediately
    /// when the database is locked, which also prevents SQLite thread-safety
    /// violations when the Tokio runtime moves futures between threads at
    /// `.await` points.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        // The synchronous connect() call is safe here: it only creates the
        // connection handle, the actual SQLite operations happen later.
        let conn = self.connect()?;

        // Set busy timeout on this connection
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    //
    // TREE NODE OPERATIONS
    // SQL for tree node rows. Designed to be wrapped by the service layer.
    //

    /// Insert a tree node
    ///
    /// # Arguments
    ///
    /// * `params` - Node insertion parameters (see DbCreateNodeParams)
    ///
    /// # Notes
    ///
    /// - created_at is set automatically by the database
    /// - Does NOT create a tree identity (see `db_create_topic_tree`)
    pub async fn db_create_node(
        &self,
        params: DbCreateNodeParams<'_>,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT INTO tree_nodes (id, node_type, parent_id, tree_id, name)
             VALUES (?, ?, ?, ?, ?)",
            (
                params.id,
                params.node_type,
                params.parent_id,
                params.tree_id,
                params.name,
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        Ok(())
    }

    /// Retrieve a single tree node by ID
    ///
    /// # Returns
    ///
    /// * `Ok(Some(row))` - Node found, returns the libsql Row
    /// * `Ok(None)` - Node not found in database
    /// * `Err(DatabaseError)` - Query execution failed
    ///
    /// Row columns: id, node_type, parent_id, tree_id, name, created_at
    pub async fn db_get_node(&self, id: &str) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(
                "SELECT id, node_type, parent_id, tree_id, name, created_at
                 FROM tree_nodes WHERE id = ?",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Delete a tree node
    ///
    /// # Returns
    ///
    /// Number of rows affected (0 = node didn't exist, >0 = node deleted)
    ///
    /// # Notes
    ///
    /// - DELETE CASCADE automatically removes the subtree (parent_id foreign key)
    /// - DELETE CASCADE automatically removes access assignments on the node
    /// - Idempotent: deleting a non-existent node returns 0 (success)
    pub async fn db_delete_node(&self, id: &str) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let rows_affected = conn
            .execute("DELETE FROM tree_nodes WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node: {}", e)))?;

        Ok(rows_affected)
    }

    //
    // TREE IDENTITY OPERATIONS
    // SQL for the kind-agnostic trees table.
    //

    /// Insert a tree identity row for an existing root node
    ///
    /// # Returns
    ///
    /// The new tree identity (AUTOINCREMENT, never reused)
    pub async fn db_insert_tree(
        &self,
        kind_handle: &str,
        root_node_id: &str,
    ) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT INTO trees (kind_handle, root_node_id) VALUES (?, ?)",
            (kind_handle, root_node_id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert tree: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Retrieve a tree identity row
    ///
    /// Row columns: tree_id, kind_handle, root_node_id, created_at
    pub async fn db_get_tree(&self, tree_id: i64) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(
                "SELECT tree_id, kind_handle, root_node_id, created_at
                 FROM trees WHERE tree_id = ?",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_tree query: {}", e))
            })?;

        let mut rows = stmt.query([tree_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_tree query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Create a topic tree in a single transaction
    ///
    /// Inserts the root node, the tree identity row and the topic name row,
    /// then links the root node back to its tree. Either all four statements
    /// land or none do.
    ///
    /// # Arguments
    ///
    /// * `kind_handle` - Handle stored on the identity row
    /// * `root_node_id` - ID of the root node to insert
    /// * `root_node_type` - Node type of the root node
    /// * `name` - Topic tree name (stored in topic_trees)
    ///
    /// # Returns
    ///
    /// The new tree identity
    ///
    /// # Notes
    ///
    /// Access grants are NOT part of this transaction; the service layer
    /// applies them after the commit.
    pub async fn db_create_topic_tree(
        &self,
        kind_handle: &str,
        root_node_id: &str,
        root_node_type: &str,
        name: &str,
    ) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Begin transaction
        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let insert_root = conn
            .execute(
                "INSERT INTO tree_nodes (id, node_type) VALUES (?, ?)",
                (root_node_id, root_node_type),
            )
            .await;
        if let Err(e) = insert_root {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to insert root node {}: {}",
                root_node_id, e
            )));
        }

        let insert_tree = conn
            .execute(
                "INSERT INTO trees (kind_handle, root_node_id) VALUES (?, ?)",
                (kind_handle, root_node_id),
            )
            .await;
        if let Err(e) = insert_tree {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to insert tree identity: {}",
                e
            )));
        }

        let tree_id = conn.last_insert_rowid();

        let insert_name = conn
            .execute(
                "INSERT OR REPLACE INTO topic_trees (tree_id, name) VALUES (?, ?)",
                (tree_id, name),
            )
            .await;
        if let Err(e) = insert_name {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to insert topic tree name: {}",
                e
            )));
        }

        let link_root = conn
            .execute(
                "UPDATE tree_nodes SET tree_id = ? WHERE id = ?",
                (tree_id, root_node_id),
            )
            .await;
        if let Err(e) = link_root {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to link root node to tree {}: {}",
                tree_id, e
            )));
        }

        // Commit transaction
        conn.execute("COMMIT", ()).await.map_err(|e| {
            std::mem::drop(conn.execute("ROLLBACK", ()));
            DatabaseError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(tree_id)
    }

    /// Delete a tree identity and its node subtree in a single transaction
    ///
    /// Removes the identity row first (the kind data row cascades with it),
    /// then the root node (the subtree and access assignments cascade).
    ///
    /// # Returns
    ///
    /// Number of identity rows removed (0 = tree didn't exist)
    pub async fn db_delete_tree(
        &self,
        tree_id: i64,
        root_node_id: &str,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Begin transaction
        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let delete_identity = conn
            .execute("DELETE FROM trees WHERE tree_id = ?", [tree_id])
            .await;
        let rows_affected = match delete_identity {
            Ok(rows) => rows,
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to delete tree {}: {}",
                    tree_id, e
                )));
            }
        };

        let delete_root = conn
            .execute("DELETE FROM tree_nodes WHERE id = ?", [root_node_id])
            .await;
        if let Err(e) = delete_root {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to delete root node {}: {}",
                root_node_id, e
            )));
        }

        // Commit transaction
        conn.execute("COMMIT", ()).await.map_err(|e| {
            std::mem::drop(conn.execute("ROLLBACK", ()));
            DatabaseError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(rows_affected)
    }

    //
    // TOPIC TREE OPERATIONS
    // SQL for the topic_trees kind data table.
    //

    /// Name of a topic tree, or None when no kind row exists
    pub async fn db_get_topic_tree_name(
        &self,
        tree_id: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT name FROM topic_trees WHERE tree_id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare name query: {}", e))
            })?;

        let mut rows = stmt.query([tree_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute name query: {}", e))
        })?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    /// Upsert the name row for a topic tree
    ///
    /// Blind INSERT OR REPLACE: works for both first write and rename,
    /// and the last writer wins under concurrency.
    pub async fn db_upsert_topic_tree_name(
        &self,
        tree_id: i64,
        name: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT OR REPLACE INTO topic_trees (tree_id, name) VALUES (?, ?)",
            (tree_id, name),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to upsert topic tree name: {}", e))
        })?;

        Ok(())
    }

    /// Delete the kind data row for a topic tree
    ///
    /// Idempotent: returns the number of rows removed.
    pub async fn db_delete_topic_tree_row(&self, tree_id: i64) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let rows_affected = conn
            .execute("DELETE FROM topic_trees WHERE tree_id = ?", [tree_id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete topic tree row: {}", e))
            })?;

        Ok(rows_affected)
    }

    /// Identity of the default topic tree (the smallest identity)
    ///
    /// Returns None when no topic trees exist.
    pub async fn db_default_topic_tree_id(&self) -> Result<Option<i64>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT tree_id FROM topic_trees ORDER BY tree_id ASC LIMIT 1")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare default query: {}", e))
            })?;

        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute default query: {}", e))
        })?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let tree_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            Ok(Some(tree_id))
        } else {
            Ok(None)
        }
    }

    /// Identity of the topic tree with the given exact name
    ///
    /// Names are not unique; ties resolve to the smallest identity.
    pub async fn db_topic_tree_id_by_name(
        &self,
        name: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT tree_id FROM topic_trees WHERE name = ? ORDER BY tree_id ASC LIMIT 1")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare by_name query: {}", e))
            })?;

        let mut rows = stmt.query([name]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute by_name query: {}", e))
        })?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let tree_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            Ok(Some(tree_id))
        } else {
            Ok(None)
        }
    }

    /// Identities of all topic trees in creation order
    ///
    /// Ordered by identity creation time; identity breaks ties because
    /// CURRENT_TIMESTAMP has one-second resolution.
    pub async fn db_list_topic_tree_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(
                "SELECT topic_trees.tree_id FROM topic_trees
                 JOIN trees ON trees.tree_id = topic_trees.tree_id
                 ORDER BY trees.created_at ASC, trees.tree_id ASC",
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare list query: {}", e))
            })?;

        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute list query: {}", e))
        })?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let tree_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;
            ids.push(tree_id);
        }

        Ok(ids)
    }

    //
    // ACCESS OPERATIONS
    // SQL for access entities, permission keys, lists and assignments.
    //

    /// Resolve an access entity, creating it on first use
    ///
    /// # Returns
    ///
    /// The entity ID (stable across repeated calls for the same pair)
    pub async fn db_get_or_create_access_entity(
        &self,
        entity_type: &str,
        group_id: i64,
    ) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT OR IGNORE INTO access_entities (entity_type, group_id) VALUES (?, ?)",
            (entity_type, group_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to insert access entity: {}", e))
        })?;

        let mut stmt = conn
            .prepare("SELECT id FROM access_entities WHERE entity_type = ? AND group_id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare entity query: {}", e))
            })?;

        let mut rows = stmt.query((entity_type, group_id)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute entity query: {}", e))
        })?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            .ok_or_else(|| {
                DatabaseError::sql_execution(format!(
                    "Access entity ({}, {}) missing after upsert",
                    entity_type, group_id
                ))
            })?;

        row.get(0)
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Permission key row by handle
    ///
    /// Row columns: id, handle, name
    pub async fn db_get_permission_key(
        &self,
        handle: &str,
    ) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT id, handle, name FROM permission_keys WHERE handle = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare key query: {}", e))
            })?;

        let mut rows = stmt.query([handle]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute key query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Create an empty access list for a permission key
    pub async fn db_create_access_list(&self, key_id: i64) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("INSERT INTO access_lists (key_id) VALUES (?)", [key_id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create access list: {}", e))
            })?;

        Ok(conn.last_insert_rowid())
    }

    /// Add an entity to an access list (idempotent)
    pub async fn db_add_access_list_entry(
        &self,
        list_id: i64,
        entity_id: i64,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT OR IGNORE INTO access_list_entries (list_id, entity_id) VALUES (?, ?)",
            (list_id, entity_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to add access list entry: {}", e))
        })?;

        Ok(())
    }

    /// Assign an access list to a (key, node) pair
    ///
    /// Replaces any previous assignment for the pair.
    pub async fn db_assign_access(
        &self,
        key_id: i64,
        node_id: &str,
        list_id: i64,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "INSERT OR REPLACE INTO access_assignments (key_id, node_id, list_id) VALUES (?, ?, ?)",
            (key_id, node_id, list_id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to assign access list: {}", e))
        })?;

        Ok(())
    }

    /// Whether a group holds a permission on a node
    ///
    /// Walks assignment -> list -> entries -> group entity for the key handle.
    pub async fn db_group_has_access(
        &self,
        group_id: i64,
        key_handle: &str,
        node_id: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let query = "
            SELECT COUNT(*)
            FROM access_assignments aa
            JOIN permission_keys pk ON pk.id = aa.key_id
            JOIN access_list_entries ale ON ale.list_id = aa.list_id
            JOIN access_entities ae ON ae.id = ale.entity_id
            WHERE pk.handle = ? AND aa.node_id = ? AND ae.group_id = ?
        ";

        let mut stmt = conn.prepare(query).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare access check: {}", e))
        })?;

        let mut rows = stmt
            .query((key_handle, node_id, group_id))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute access check: {}", e))
            })?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            .ok_or_else(|| DatabaseError::sql_execution("Access check returned no rows"))?;

        let count: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?;

        Ok(count > 0)
    }
}

/// Parse a timestamp column produced by SQLite
///
/// CURRENT_TIMESTAMP yields "YYYY-MM-DD HH:MM:SS"; RFC3339 is accepted for
/// rows written by external tools.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::timestamp_parse(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    async fn create_test_db() -> Result<(DatabaseService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
        Ok((db, temp_dir))
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");

        let first = DatabaseService::new(db_path.clone()).await?;
        drop(first);
        let second = DatabaseService::new(db_path).await?;

        // The seeded key survives the second pass without duplication
        let conn = second.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare("SELECT COUNT(*) FROM permission_keys WHERE handle = ?")
            .await?;
        let mut rows = stmt.query(["view_topic_category_tree_node"]).await?;
        let row = rows.next().await?.expect("count row");
        let count: i64 = row.get(0)?;
        assert_eq!(count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() -> Result<()> {
        let (db, _temp) = create_test_db().await?;
        let conn = db.connect_with_timeout().await?;

        // Cascade deletes depend on this being on for every connection
        let mut stmt = conn.prepare("PRAGMA foreign_keys").await?;
        let mut rows = stmt.query(()).await?;
        let row = rows.next().await?.expect("pragma row");
        let enabled: i64 = row.get(0)?;
        assert_eq!(enabled, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_node_deletion_cascades_to_subtree() -> Result<()> {
        let (db, _temp) = create_test_db().await?;

        db.db_create_node(DbCreateNodeParams {
            id: "parent",
            node_type: "category",
            parent_id: None,
            tree_id: None,
            name: "Parent",
        })
        .await?;
        db.db_create_node(DbCreateNodeParams {
            id: "child",
            node_type: "topic",
            parent_id: Some("parent"),
            tree_id: None,
            name: "Child",
        })
        .await?;

        let deleted = db.db_delete_node("parent").await?;
        assert_eq!(deleted, 1);
        assert!(db.db_get_node("child").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_create_topic_tree_links_root_node() -> Result<()> {
        let (db, _temp) = create_test_db().await?;

        let tree_id = db
            .db_create_topic_tree("topic", "root-1", "category", "Seasons")
            .await?;
        assert!(tree_id >= 1);
        assert_eq!(
            db.db_get_topic_tree_name(tree_id).await?,
            Some("Seasons".to_string())
        );

        let row = db.db_get_node("root-1").await?.expect("root node");
        let node_type: String = row.get(1)?;
        let linked_tree: Option<i64> = row.get(3)?;
        assert_eq!(node_type, "category");
        assert_eq!(linked_tree, Some(tree_id));

        Ok(())
    }

    #[tokio::test]
    async fn test_default_topic_tree_id_is_smallest() -> Result<()> {
        let (db, _temp) = create_test_db().await?;

        assert_eq!(db.db_default_topic_tree_id().await?, None);

        let t1 = db
            .db_create_topic_tree("topic", "r1", "category", "One")
            .await?;
        let t2 = db
            .db_create_topic_tree("topic", "r2", "category", "Two")
            .await?;
        assert!(t2 > t1);
        assert_eq!(db.db_default_topic_tree_id().await?, Some(t1));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_tree_removes_identity_nodes_and_kind_row() -> Result<()> {
        let (db, _temp) = create_test_db().await?;

        let tree_id = db
            .db_create_topic_tree("topic", "r1", "category", "Gone")
            .await?;

        let affected = db.db_delete_tree(tree_id, "r1").await?;
        assert_eq!(affected, 1);
        assert!(db.db_get_tree(tree_id).await?.is_none());
        assert!(db.db_get_node("r1").await?.is_none());
        assert_eq!(db.db_get_topic_tree_name(tree_id).await?, None);

        // Second delete is a no-op
        let affected = db.db_delete_tree(tree_id, "r1").await?;
        assert_eq!(affected, 0);

        Ok(())
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let sqlite = parse_timestamp("2025-03-14 09:26:53").unwrap();
        assert_eq!(sqlite.to_rfc3339(), "2025-03-14T09:26:53+00:00");

        let rfc = parse_timestamp("2025-03-14T09:26:53Z").unwrap();
        assert_eq!(sqlite, rfc);

        assert!(parse_timestamp("not a timestamp").is_err());
    }
}
