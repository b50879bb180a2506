//! T-SQL text for each engine operation.
//!
//! Every function here is pure: it takes already-trusted [`Fragment`]s and
//! returns the batch the engine sends. Caller fragments are spliced verbatim.

use crate::error::{DalError, Result};
use crate::identifier::{escape_literal, quote_mssql, Fragment};

/// Separator between entries of a column-name or column-value list.
pub const LIST_SEPARATOR: &str = ", ";

/// Split a comma-space separated list into its entries.
pub fn split_list(list: &str) -> Vec<&str> {
    list.split(LIST_SEPARATOR).collect()
}

/// Conditional database create, run on a server-scoped connection.
pub fn create_database(database: &str) -> Result<String> {
    Ok(format!(
        "IF NOT EXISTS (SELECT name FROM master.dbo.sysdatabases WHERE name='{}') CREATE DATABASE {}",
        escape_literal(database),
        quote_mssql(database)?
    ))
}

/// Conditional table create: only when no user table of that name exists.
pub fn create_table(table: Fragment<'_>, structure: Fragment<'_>) -> String {
    format!(
        "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {} ({})",
        escape_literal(table.as_str()),
        table,
        structure
    )
}

/// Unconditional alter; `changes` is alter syntax such as `ADD Age INT`.
pub fn alter_table(table: Fragment<'_>, changes: Fragment<'_>) -> String {
    format!("ALTER TABLE {} {}", table, changes)
}

/// Key-guarded insert with explicit identity values.
///
/// The first entry of `names`/`values` is the key pair. The insert only runs
/// when no row already carries that key, so an existing key yields a NULL
/// `SCOPE_IDENTITY()`.
pub fn insert_guarded(
    table: Fragment<'_>,
    names: Fragment<'_>,
    values: Fragment<'_>,
) -> Result<String> {
    let key_name = first_entry(names.as_str(), "column names")?;
    let key_value = first_entry(values.as_str(), "column values")?;

    Ok(format!(
        "SET IDENTITY_INSERT {table} ON; \
         IF NOT EXISTS (SELECT {key_name} FROM {table} WHERE {key_name}={key}) \
         INSERT INTO {table} ({names}) VALUES ({values}); \
         SET IDENTITY_INSERT {table} OFF; \
         SELECT SCOPE_IDENTITY();",
        key = key_literal(key_value),
    ))
}

/// Plain insert returning the generated identity.
pub fn insert_parent(table: Fragment<'_>, names: Fragment<'_>, values: Fragment<'_>) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({}); SELECT SCOPE_IDENTITY();",
        table, names, values
    )
}

/// Update with raw assignments and criteria.
pub fn update(table: Fragment<'_>, assignments: Fragment<'_>, criteria: Fragment<'_>) -> String {
    format!("UPDATE {} SET {} WHERE {}", table, assignments, criteria)
}

/// Delete by equality on one key column.
pub fn delete(table: Fragment<'_>, key_name: Fragment<'_>, key_value: Fragment<'_>) -> String {
    format!("DELETE FROM {} WHERE {}={}", table, key_name, key_value)
}

/// Default retrieval query.
pub fn select_all(table: Fragment<'_>) -> String {
    format!("SELECT * FROM {}", table)
}

fn first_entry<'a>(list: &'a str, what: &str) -> Result<&'a str> {
    split_list(list)
        .into_iter()
        .next()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .ok_or_else(|| DalError::Config(format!("{} list is empty", what)))
}

// The key is compared as a string literal; values that are already literals
// ('abc', N'abc') are used as written.
fn key_literal(value: &str) -> String {
    let quoted = value.len() >= 2 && value.ends_with('\'');
    if quoted && (value.starts_with('\'') || value.starts_with("N'")) {
        value.to_string()
    } else {
        format!("'{}'", escape_literal(value))
    }
}
