use async_trait::async_trait;
use clickhouse::{Client, Row};
use log::debug;
use serde::Deserialize;

use super::{
    Connection, Connector, DbError, Endpoint, InsertStatement, MetricRow, TableName, Transaction,
    INSERT_COLUMNS,
};

/// Connects to ClickHouse over its HTTP interface.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClickHouseConnector;

pub struct ClickHouseConnection {
    client: Client,
}

/// Rows are held until commit and sent as a single `INSERT`, so a
/// transaction dropped before commit never reaches the server.
pub struct ClickHouseTransaction {
    client: Client,
    table: Option<TableName>,
    rows: Vec<MetricRow>,
}

/// One entry of `system.columns` for the target table.
#[derive(Debug, Row, Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
struct ColumnInfo {
    name: String,
    column_type: String,
}

const COLUMNS_QUERY: &str =
    "SELECT name, type AS column_type FROM system.columns WHERE database = ? AND table = ?";
const COLUMNS_QUERY_CURRENT_DB: &str = "SELECT name, type AS column_type FROM system.columns \
     WHERE database = currentDatabase() AND table = ?";

/// RowBinary type each column of [`MetricRow`] is encoded as.
fn expected_type(column: &str) -> &'static str {
    match column {
        "ts" => "Int64",
        "value" => "Float64",
        _ => "String",
    }
}

fn type_matches(column: &str, column_type: &str) -> bool {
    let expected = expected_type(column);
    // LowCardinality(String) is sent as a plain String in RowBinary.
    column_type == expected || (expected == "String" && column_type == "LowCardinality(String)")
}

/// Rows are sent as RowBinary, which carries no type information; a column
/// of another type would misread the byte stream instead of failing.
fn check_columns(table: &TableName, columns: &[ColumnInfo]) -> Result<(), DbError> {
    if columns.is_empty() {
        return Err(DbError::Schema(format!("table {} does not exist", table)));
    }
    for column in INSERT_COLUMNS {
        let found = columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| DbError::Schema(format!("table {} has no column {}", table, column)))?;
        if !type_matches(column, &found.column_type) {
            return Err(DbError::Schema(format!(
                "column {}.{} has type {}, expected {}",
                table,
                column,
                found.column_type,
                expected_type(column)
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Connector for ClickHouseConnector {
    type Connection = ClickHouseConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<ClickHouseConnection, DbError> {
        let mut client = Client::default().with_url(endpoint.url.as_str());
        if let Some(user) = &endpoint.user {
            client = client.with_user(user.as_str());
        }
        if let Some(password) = &endpoint.password {
            client = client.with_password(password.as_str());
        }
        if let Some(database) = &endpoint.database {
            client = client.with_database(database.as_str());
        }

        debug!("Connecting to {:?}", endpoint);
        client.query("SELECT 1").execute().await?;
        Ok(ClickHouseConnection { client })
    }
}

#[async_trait]
impl Connection for ClickHouseConnection {
    type Transaction = ClickHouseTransaction;

    async fn begin(&self) -> Result<ClickHouseTransaction, DbError> {
        Ok(ClickHouseTransaction {
            client: self.client.clone(),
            table: None,
            rows: Vec::new(),
        })
    }
}

impl ClickHouseTransaction {
    async fn fetch_columns(&self, table: &TableName) -> Result<Vec<ColumnInfo>, DbError> {
        let query = match table.as_str().split_once('.') {
            Some((database, name)) => self.client.query(COLUMNS_QUERY).bind(database).bind(name),
            None => self
                .client
                .query(COLUMNS_QUERY_CURRENT_DB)
                .bind(table.as_str()),
        };
        Ok(query.fetch_all::<ColumnInfo>().await?)
    }
}

#[async_trait]
impl Transaction for ClickHouseTransaction {
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), DbError> {
        debug!("Preparing {}", statement);
        let columns = self.fetch_columns(statement.table()).await?;
        check_columns(statement.table(), &columns)?;
        self.table = Some(statement.table().clone());
        Ok(())
    }

    async fn execute(&mut self, row: &MetricRow) -> Result<(), DbError> {
        if self.table.is_none() {
            return Err(DbError::NotPrepared);
        }
        self.rows.push(row.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), DbError> {
        let table = match self.table {
            Some(table) if !self.rows.is_empty() => table,
            _ => return Ok(()),
        };
        let mut insert = self.client.insert::<MetricRow>(table.as_str())?;
        for row in &self.rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        debug!("Sent {} rows to {}", self.rows.len(), table);
        Ok(())
    }
}
