use clap::Parser;
use log::{debug, warn, LevelFilter};

use crate::db::{Endpoint, TableName};
use crate::error::{HandlerError, Result};
use crate::event::Event;

pub const DSN_ENV: &str = "CLICKHOUSE_DSN";
pub const TABLE_ENV: &str = "CLICKHOUSE_TABLE";
pub const USER_ENV: &str = "CLICKHOUSE_USER";
pub const PASSWORD_ENV: &str = "CLICKHOUSE_PASSWORD";
pub const DATABASE_ENV: &str = "CLICKHOUSE_DATABASE";

/// Check and entity annotations under this prefix override plugin options,
/// e.g. `sensu.io/plugins/sensu-clickhouse-handler/config/table`.
pub const ANNOTATION_PREFIX: &str = "sensu.io/plugins/sensu-clickhouse-handler/config/";

#[derive(Debug, Parser)]
#[command(
    name = "sensu-clickhouse-handler",
    author,
    version,
    about = "The Sensu Go ClickHouse handler",
    long_about = None
)]
pub struct CliArgs {
    /// The clickhouse dsn
    #[arg(short, long, default_value = "")]
    pub dsn: String,

    /// The clickhouse table
    #[arg(short, long, default_value = "")]
    pub table: String,

    /// User name, overrides the one in the dsn
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password, overrides the one in the dsn
    #[arg(short, long)]
    pub password: Option<String>,

    /// Database, overrides the one in the dsn
    #[arg(long)]
    pub database: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

/// Raw option values before validation. Built from the command line, then
/// patched by annotations and the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerConfig {
    pub dsn: String,
    pub table: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Validated configuration; the only thing the insert pipeline accepts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: Endpoint,
    pub table: TableName,
}

impl From<&CliArgs> for HandlerConfig {
    fn from(args: &CliArgs) -> Self {
        HandlerConfig {
            dsn: args.dsn.clone(),
            table: args.table.clone(),
            user: args.user.clone().filter(|v| !v.is_empty()),
            password: args.password.clone().filter(|v| !v.is_empty()),
            database: args.database.clone().filter(|v| !v.is_empty()),
        }
    }
}

impl HandlerConfig {
    /// Applies `ANNOTATION_PREFIX` overrides from the check, then the entity,
    /// so entity annotations win. The password is never read from an event.
    pub fn apply_annotations(&mut self, event: &Event) {
        let check = event.check.as_ref().map(|c| &c.metadata.annotations);
        let entity = event.entity.as_ref().map(|e| &e.metadata.annotations);

        for annotations in check.into_iter().chain(entity) {
            for (key, value) in annotations {
                let Some(option) = key.strip_prefix(ANNOTATION_PREFIX) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                match option {
                    "dsn" => self.dsn = value.clone(),
                    "table" => self.table = value.clone(),
                    "user" => self.user = Some(value.clone()),
                    "database" => self.database = Some(value.clone()),
                    "password" => warn!("Ignoring secret option in annotation {}", key),
                    other => debug!("Unknown annotation option {}", other),
                }
            }
        }
    }

    /// Resolves environment overrides and checks the required options.
    ///
    /// A non-empty environment variable replaces the configured value. The
    /// dsn and table must be non-empty afterwards, the table must be a safe
    /// identifier and the dsn must parse.
    pub fn validate_with_env<F>(&mut self, env: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());

        if let Some(dsn) = lookup(DSN_ENV) {
            self.dsn = dsn;
        }
        if let Some(table) = lookup(TABLE_ENV) {
            self.table = table;
        }
        if let Some(user) = lookup(USER_ENV) {
            self.user = Some(user);
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.password = Some(password);
        }
        if let Some(database) = lookup(DATABASE_ENV) {
            self.database = Some(database);
        }

        if self.dsn.is_empty() {
            return Err(HandlerError::Configuration(format!(
                "dsn missing: --dsn or {} environment variable is required",
                DSN_ENV
            )));
        }
        if self.table.is_empty() {
            return Err(HandlerError::Configuration(format!(
                "table missing: --table or {} environment variable is required",
                TABLE_ENV
            )));
        }

        let table =
            TableName::parse(&self.table).map_err(|e| HandlerError::Configuration(e.to_string()))?;
        let mut endpoint = Endpoint::parse(&self.dsn)
            .map_err(|e| HandlerError::Configuration(format!("invalid dsn: {}", e)))?;

        if self.user.is_some() {
            endpoint.user = self.user.clone();
        }
        if self.password.is_some() {
            endpoint.password = self.password.clone();
        }
        if self.database.is_some() {
            endpoint.database = self.database.clone();
        }

        Ok(Settings { endpoint, table })
    }

    /// Same as [`HandlerConfig::validate_with_env`] against the process environment.
    pub fn validate(&mut self) -> Result<Settings> {
        self.validate_with_env(|key| std::env::var(key).ok())
    }
}
