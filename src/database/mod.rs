/*!
 * Database module for persistent workflow state.
 *
 * This module provides SQLite-based persistence for:
 * - Translation memory entries and their embeddings
 * - Role policies and function configurations written by bootstrap
 * - Workflow run records
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;
