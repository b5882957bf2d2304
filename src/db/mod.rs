//! Storage seam for the handler.
//!
//! The handler only talks to the [`Connector`], [`Connection`] and
//! [`Transaction`] traits. `clickhouse_backend` implements them on top of
//! the ClickHouse HTTP client; `memory` is an in-process stand-in for tests.

use std::fmt;

use async_trait::async_trait;
use clickhouse::Row;
use serde::Serialize;

pub mod clickhouse_backend;
pub mod dsn;
#[cfg(test)]
pub mod memory;

pub use clickhouse_backend::ClickHouseConnector;
pub use dsn::{DsnError, Endpoint};

/// Columns written for every metric point, in bind order.
pub const INSERT_COLUMNS: [&str; 4] = ["ts", "metric", "value", "tags"];

const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("clickhouse: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),
    #[error("statement not prepared")]
    NotPrepared,
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("{0}")]
    Rejected(String),
}

/// A table identifier that is safe to interpolate into statement text.
///
/// Either `table` or `database.table`, every part matching
/// `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid table name {name:?}: {reason}")]
pub struct TableNameError {
    name: String,
    reason: &'static str,
}

impl TableName {
    pub fn parse(name: &str) -> Result<Self, TableNameError> {
        let fail = |reason| TableNameError {
            name: name.to_string(),
            reason,
        };

        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 {
            return Err(fail("expected `table` or `database.table`"));
        }
        for part in parts {
            let mut chars = part.chars();
            match chars.next() {
                None => return Err(fail("empty identifier")),
                Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                    return Err(fail("identifier must start with a letter or underscore"))
                }
                Some(_) => {}
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(fail("identifier may only contain letters, digits and underscores"));
            }
            if part.len() > MAX_IDENTIFIER_LEN {
                return Err(fail("identifier too long"));
            }
        }
        Ok(TableName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the target table. Field names match [`INSERT_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct MetricRow {
    pub ts: i64,
    pub metric: String,
    pub value: f64,
    pub tags: String,
}

/// The parameterized insert used for every point of an event.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    table: TableName,
}

impl InsertStatement {
    pub fn new(table: &TableName) -> Self {
        InsertStatement {
            table: table.clone(),
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let placeholders = vec!["?"; INSERT_COLUMNS.len()].join(", ");
        write!(
            f,
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            INSERT_COLUMNS.join(", "),
            placeholders
        )
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Opens a handle to the database and checks that it answers.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, DbError>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    type Transaction: Transaction;

    async fn begin(&self) -> Result<Self::Transaction, DbError>;
}

/// A unit of work. Dropping it without calling [`Transaction::commit`]
/// discards everything executed so far.
#[async_trait]
pub trait Transaction: Send {
    /// Readies `statement` for execution. Backends check the target table
    /// here so a missing table or column fails before any row is sent.
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), DbError>;

    async fn execute(&mut self, row: &MetricRow) -> Result<(), DbError>;

    async fn commit(self) -> Result<(), DbError>;
}
