use std::path::Path;

use regex::Regex;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, warn};

use crate::error::{ProvisionError, ProvisionResult};

/// SQLite-backed settings store used while provisioning a device image.
///
/// Table and column names come from caller code but still go through an
/// identifier check before being spliced into SQL; values always travel
/// as bound parameters.
#[derive(Debug)]
pub struct SettingsDb {
    connection: Connection,
}

impl SettingsDb {
    /// Open an existing database file. A missing file is an error rather
    /// than an implicit create; provisioning edits databases pulled from a
    /// device image and must not invent empty ones.
    pub fn open(path: &Path) -> ProvisionResult<Self> {
        if !path.is_file() {
            return Err(ProvisionError::file(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let connection = Connection::open(path)?;
        Ok(Self { connection })
    }

    /// Set `value` for the row whose `name` column matches, in the common
    /// Android settings schema. Returns whether a row changed.
    pub fn simple_update(&self, table: &str, name: &str, value: &str) -> ProvisionResult<bool> {
        if !is_identifier(table) {
            warn!(table = %table, "rejecting non-identifier table name");
            return Ok(false);
        }
        let sql = format!("UPDATE {table} SET value = ?1 WHERE name = ?2");
        let changed = self.connection.execute(&sql, params![value, name])?;
        debug!(table = %table, name = %name, changed = changed, "settings update");
        Ok(changed > 0)
    }

    /// Insert one row with the given columns. Returns whether a row was
    /// written; mismatched or empty column lists are rejected.
    pub fn simple_insert(
        &self,
        table: &str,
        columns: &[&str],
        values: &[&str],
    ) -> ProvisionResult<bool> {
        if !is_identifier(table) || columns.iter().any(|column| !is_identifier(column)) {
            warn!(table = %table, "rejecting non-identifier table or column name");
            return Ok(false);
        }
        if columns.is_empty() || columns.len() != values.len() {
            warn!(
                table = %table,
                columns = columns.len(),
                values = values.len(),
                "rejecting insert with mismatched columns"
            );
            return Ok(false);
        }
        let placeholders = (1..=values.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let inserted = self
            .connection
            .execute(&sql, params_from_iter(values.iter()))?;
        Ok(inserted > 0)
    }
}

fn is_identifier(name: &str) -> bool {
    match Regex::new(r"^[A-Za-z0-9_]+$") {
        Ok(pattern) => pattern.is_match(name),
        Err(_) => false,
    }
}
