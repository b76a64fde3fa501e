//! Repository layer: sessions, data access contracts, SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for teams and members.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every repository works inside one caller-owned `Session`.
//! - Write paths validate the model before any SQL runs.
//! - Lookups report "no match" per cardinality: `NotFound` for single,
//!   `None` for optional, an empty vector for lists.

use rusqlite::Connection;
use uuid::Uuid;

pub mod error;
pub(crate) mod exec;
pub mod member_repo;
pub mod session;
pub mod team_repo;

pub use error::{RepoError, RepoResult};

pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }
    Ok(())
}

pub(crate) fn parse_key(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
