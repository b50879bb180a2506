//! Write-back of snapshot changes.
//!
//! [`apply`] reconciles a mutated [`Snapshot`] against its backing table the
//! way a data adapter with a command builder does: the table's columns, key
//! and identity are read from the catalog, and every changed row becomes one
//! parameterized INSERT, UPDATE or DELETE, run in row order.
//!
//! Values are bound as `@Pn` parameters because they come from the snapshot,
//! not from caller text. UPDATE and DELETE match on the row's original key
//! values; one that affects no row is reported as a concurrency violation.

use tracing::{debug, info};

use crate::backend::Session;
use crate::error::{DalError, Result};
use crate::identifier::{quote_mssql, Fragment};
use crate::snapshot::{DataRow, RowState, Snapshot};
use crate::statement;
use crate::value::SqlValue;

/// Columns of a user table with their key and identity flags.
const CATALOG_QUERY: &str = r#"
    SELECT
        c.name,
        CAST(c.is_identity AS INT),
        CASE WHEN EXISTS (
            SELECT 1
            FROM sys.indexes i
            JOIN sys.index_columns ic
                ON ic.object_id = i.object_id AND ic.index_id = i.index_id
            WHERE i.object_id = c.object_id
              AND i.is_primary_key = 1
              AND ic.column_id = c.column_id
        ) THEN 1 ELSE 0 END
    FROM sys.columns c
    WHERE c.object_id = OBJECT_ID(@P1, N'U')
    ORDER BY c.column_id
"#;

/// One column of the backing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub is_identity: bool,
    pub is_primary_key: bool,
}

/// Backing-table metadata the commands are generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<CatalogColumn>,
}

impl TableSchema {
    /// Read the catalog entry of `table`.
    pub async fn load(session: &mut dyn Session, table: &str) -> Result<Self> {
        let result = session
            .query(CATALOG_QUERY, &[SqlValue::from(table)])
            .await?;

        let columns: Vec<CatalogColumn> = result
            .rows
            .iter()
            .map(|row| CatalogColumn {
                name: row
                    .first()
                    .and_then(SqlValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
                is_identity: row.get(1).and_then(SqlValue::as_i64) == Some(1),
                is_primary_key: row.get(2).and_then(SqlValue::as_i64) == Some(1),
            })
            .collect();

        if columns.is_empty() {
            return Err(DalError::TableNotFound(table.to_string()));
        }

        debug!("Loaded {} catalog columns for {}", columns.len(), table);
        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &CatalogColumn> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    pub fn identity_column(&self) -> Option<&CatalogColumn> {
        self.columns.iter().find(|c| c.is_identity)
    }
}

/// Kind of generated statement, named as a data adapter names its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Insert,
    Update,
    Delete,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Insert => "InsertCommand",
            CommandKind::Update => "UpdateCommand",
            CommandKind::Delete => "DeleteCommand",
        }
    }
}

/// A generated statement and its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

// Catalog column mapped onto a snapshot column.
struct Mapped {
    quoted: String,
    column: usize,
    is_identity: bool,
    is_key: bool,
}

/// Generates per-row commands for one snapshot / backing table pair.
pub struct CommandBuilder {
    table: String,
    columns: Vec<Mapped>,
    identity: Option<usize>,
}

impl CommandBuilder {
    /// Map the catalog columns onto the snapshot's columns by name. Catalog
    /// columns the snapshot does not carry are left out of every command.
    pub fn new(schema: &TableSchema, snapshot: &Snapshot) -> Result<Self> {
        let table = Fragment::trusted(snapshot.name())?.to_string();

        let mut columns = Vec::new();
        for col in &schema.columns {
            let Some(column) = snapshot.column_index(&col.name) else {
                continue;
            };
            columns.push(Mapped {
                quoted: quote_mssql(&col.name)?,
                column,
                is_identity: col.is_identity,
                is_key: col.is_primary_key,
            });
        }

        let identity = columns.iter().find(|c| c.is_identity).map(|c| c.column);
        Ok(Self {
            table,
            columns,
            identity,
        })
    }

    /// Snapshot column that receives the store-generated identity.
    pub fn identity_column(&self) -> Option<usize> {
        self.identity
    }

    /// Command for one row; `None` for unchanged rows.
    pub fn for_row(&self, row: &DataRow) -> Result<Option<Command>> {
        match row.state() {
            RowState::Unchanged => Ok(None),
            RowState::Added => Ok(Some(self.insert(row))),
            RowState::Modified => self.update(row).map(Some),
            RowState::Deleted => self.delete(row).map(Some),
        }
    }

    /// `INSERT` of the non-identity columns, followed by `SELECT SCOPE_IDENTITY()`.
    pub fn insert(&self, row: &DataRow) -> Command {
        let insertable: Vec<&Mapped> = self.columns.iter().filter(|c| !c.is_identity).collect();

        let sql = if insertable.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES; SELECT SCOPE_IDENTITY();", self.table)
        } else {
            let names: Vec<&str> = insertable.iter().map(|c| c.quoted.as_str()).collect();
            let placeholders: Vec<String> = (1..=insertable.len()).map(|i| format!("@P{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}); SELECT SCOPE_IDENTITY();",
                self.table,
                names.join(statement::LIST_SEPARATOR),
                placeholders.join(statement::LIST_SEPARATOR)
            )
        };

        Command {
            kind: CommandKind::Insert,
            sql,
            params: insertable.iter().map(|c| cell(row.values(), c.column)).collect(),
        }
    }

    /// `UPDATE` of every non-identity column, key columns included, matched
    /// on the original key.
    ///
    /// Identity values are store-generated, so an edited identity cell is an
    /// error rather than a change that would be dropped.
    pub fn update(&self, row: &DataRow) -> Result<Command> {
        let keys = self.keys()?;

        if let Some(identity) = self.columns.iter().find(|c| c.is_identity) {
            if cell(row.values(), identity.column) != cell(row.original_values(), identity.column) {
                return Err(DalError::snapshot(format!(
                    "Identity column {} of table '{}' cannot be updated",
                    identity.quoted, self.table
                )));
            }
        }

        let settable: Vec<&Mapped> = self.columns.iter().filter(|c| !c.is_identity).collect();
        if settable.is_empty() {
            return Err(DalError::snapshot(format!(
                "Table '{}' has no updatable columns",
                self.table
            )));
        }

        let mut params = Vec::with_capacity(settable.len() + keys.len());
        let mut param_idx = 1;

        let assignments: Vec<String> = settable
            .iter()
            .map(|c| {
                let p = format!("{}=@P{}", c.quoted, param_idx);
                param_idx += 1;
                params.push(cell(row.values(), c.column));
                p
            })
            .collect();

        let criteria = key_criteria(&keys, row, &mut params, &mut param_idx);

        Ok(Command {
            kind: CommandKind::Update,
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                self.table,
                assignments.join(statement::LIST_SEPARATOR),
                criteria
            ),
            params,
        })
    }

    /// `DELETE` matched on the original key.
    pub fn delete(&self, row: &DataRow) -> Result<Command> {
        let keys = self.keys()?;
        let mut params = Vec::with_capacity(keys.len());
        let mut param_idx = 1;
        let criteria = key_criteria(&keys, row, &mut params, &mut param_idx);

        Ok(Command {
            kind: CommandKind::Delete,
            sql: format!("DELETE FROM {} WHERE {}", self.table, criteria),
            params,
        })
    }

    fn keys(&self) -> Result<Vec<&Mapped>> {
        let keys: Vec<&Mapped> = self.columns.iter().filter(|c| c.is_key).collect();
        if keys.is_empty() {
            return Err(DalError::NoPrimaryKey(self.table.clone()));
        }
        Ok(keys)
    }
}

fn key_criteria(keys: &[&Mapped], row: &DataRow, params: &mut Vec<SqlValue>, param_idx: &mut usize) -> String {
    keys.iter()
        .map(|k| {
            let p = format!("{}=@P{}", k.quoted, param_idx);
            *param_idx += 1;
            params.push(cell(row.original_values(), k.column));
            p
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn cell(values: &[SqlValue], column: usize) -> SqlValue {
    values.get(column).cloned().unwrap_or(SqlValue::Null)
}

/// Write every pending change of `snapshot` through `session`.
///
/// Rows are committed one by one as their statement succeeds, so after a
/// fault the rows before it are committed and the rest stay pending. Returns
/// the number of rows written.
pub async fn apply(session: &mut dyn Session, snapshot: &mut Snapshot) -> Result<usize> {
    let table = Fragment::trusted(snapshot.name())?;
    let schema = TableSchema::load(session, table.as_str()).await?;

    // Same select a data adapter would be built on; nothing is fetched.
    let probe = format!("{} WHERE 1=0", statement::select_all(table));
    session.query(&probe, &[]).await?;

    let builder = CommandBuilder::new(&schema, snapshot)?;
    let mut written = 0;
    let mut idx = 0;

    while idx < snapshot.rows().len() {
        let command = match snapshot.row(idx) {
            Some(row) => builder.for_row(row)?,
            None => None,
        };

        if let Some(command) = command {
            debug!("{} on {}: {}", command.kind.name(), schema.table, command.sql);
            match command.kind {
                CommandKind::Insert => {
                    let result = session.query(&command.sql, &command.params).await?;
                    let identity = result.scalar().and_then(SqlValue::as_i64);
                    if let (Some(column), Some(identity)) = (builder.identity_column(), identity) {
                        snapshot.refresh_value(idx, column, SqlValue::I64(identity));
                    }
                }
                CommandKind::Update | CommandKind::Delete => {
                    let affected = session.execute(&command.sql, &command.params).await?;
                    if affected == 0 {
                        return Err(DalError::Concurrency {
                            table: schema.table.clone(),
                            command: command.kind.name(),
                            affected,
                        });
                    }
                }
            }
            written += 1;
        }

        if snapshot.accept_row(idx) {
            idx += 1;
        }
    }

    snapshot.accept_changes();
    info!("Saved {} changed rows to {}", written, schema.table);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ResultColumn, ResultSet};
    use crate::value::SqlType;

    fn schema() -> TableSchema {
        TableSchema {
            table: "Customers".into(),
            columns: vec![
                CatalogColumn {
                    name: "Id".into(),
                    is_identity: true,
                    is_primary_key: true,
                },
                CatalogColumn {
                    name: "Name".into(),
                    is_identity: false,
                    is_primary_key: false,
                },
                CatalogColumn {
                    name: "Age".into(),
                    is_identity: false,
                    is_primary_key: false,
                },
            ],
        }
    }

    fn snapshot() -> Snapshot {
        let result = ResultSet {
            columns: vec![
                ResultColumn::new("Id", SqlType::I32),
                ResultColumn::new("Name", SqlType::String),
                ResultColumn::new("Age", SqlType::I32),
            ],
            rows: vec![
                vec![SqlValue::I32(1), "Ann".into(), SqlValue::I32(30)],
                vec![SqlValue::I32(2), "Bob".into(), SqlValue::Null],
            ],
        };
        let mut snap = Snapshot::from_result_set("Customers", result);
        snap.prepare_for_update().unwrap();
        snap
    }

    #[test]
    fn test_insert_skips_identity_column() {
        let mut snap = snapshot();
        let i = snap
            .add_row(vec![SqlValue::Null, "Cy".into(), SqlValue::I32(41)])
            .unwrap();
        let builder = CommandBuilder::new(&schema(), &snap).unwrap();
        let cmd = builder.for_row(snap.row(i).unwrap()).unwrap().unwrap();

        assert_eq!(cmd.kind, CommandKind::Insert);
        assert_eq!(
            cmd.sql,
            "INSERT INTO Customers ([Name], [Age]) VALUES (@P1, @P2); SELECT SCOPE_IDENTITY();"
        );
        assert_eq!(cmd.params, vec![SqlValue::from("Cy"), SqlValue::I32(41)]);
        assert_eq!(builder.identity_column(), Some(0));
    }

    #[test]
    fn test_update_matches_original_key() {
        let mut snap = snapshot();
        snap.set_value(1, "Age", 22).unwrap();
        let builder = CommandBuilder::new(&schema(), &snap).unwrap();
        let cmd = builder.for_row(snap.row(1).unwrap()).unwrap().unwrap();

        assert_eq!(
            cmd.sql,
            "UPDATE Customers SET [Name]=@P1, [Age]=@P2 WHERE [Id]=@P3"
        );
        assert_eq!(
            cmd.params,
            vec![SqlValue::from("Bob"), SqlValue::I32(22), SqlValue::I64(2)]
        );
    }

    #[test]
    fn test_delete_uses_original_values() {
        let mut snap = snapshot();
        snap.set_value(0, "Name", "Changed").unwrap();
        snap.delete_row(0).unwrap();
        let builder = CommandBuilder::new(&schema(), &snap).unwrap();
        let cmd = builder.for_row(snap.row(0).unwrap()).unwrap().unwrap();

        assert_eq!(cmd.kind, CommandKind::Delete);
        assert_eq!(cmd.sql, "DELETE FROM Customers WHERE [Id]=@P1");
        assert_eq!(cmd.params, vec![SqlValue::I64(1)]);
    }

    #[test]
    fn test_unchanged_row_has_no_command() {
        let snap = snapshot();
        let builder = CommandBuilder::new(&schema(), &snap).unwrap();
        assert!(builder.for_row(snap.row(0).unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_update_sets_non_identity_key() {
        let mut schema = schema();
        schema.columns[0].is_identity = false;
        let mut snap = snapshot();
        snap.set_value(0, "Id", 10).unwrap();
        let builder = CommandBuilder::new(&schema, &snap).unwrap();
        let cmd = builder.for_row(snap.row(0).unwrap()).unwrap().unwrap();

        assert_eq!(
            cmd.sql,
            "UPDATE Customers SET [Id]=@P1, [Name]=@P2, [Age]=@P3 WHERE [Id]=@P4"
        );
        assert_eq!(
            cmd.params,
            vec![
                SqlValue::I64(10),
                SqlValue::from("Ann"),
                SqlValue::I32(30),
                SqlValue::I64(1)
            ]
        );
    }

    #[test]
    fn test_update_of_identity_value_is_rejected() {
        let mut snap = snapshot();
        snap.set_value(0, "Id", 10).unwrap();
        let builder = CommandBuilder::new(&schema(), &snap).unwrap();
        let err = builder.for_row(snap.row(0).unwrap()).unwrap_err();
        assert!(matches!(err, DalError::Snapshot(ref m) if m.contains("[Id]")));
    }

    #[test]
    fn test_update_without_settable_column_is_rejected() {
        let schema = TableSchema {
            table: "Customers".into(),
            columns: vec![CatalogColumn {
                name: "Id".into(),
                is_identity: true,
                is_primary_key: true,
            }],
        };
        let mut snap = snapshot();
        snap.set_value(0, "Name", "x").unwrap();
        let builder = CommandBuilder::new(&schema, &snap).unwrap();
        assert!(builder.for_row(snap.row(0).unwrap()).is_err());
    }

    #[test]
    fn test_update_without_key_is_rejected() {
        let mut schema = schema();
        for col in &mut schema.columns {
            col.is_primary_key = false;
        }
        let mut snap = snapshot();
        snap.set_value(0, "Name", "x").unwrap();
        let builder = CommandBuilder::new(&schema, &snap).unwrap();
        let err = builder.for_row(snap.row(0).unwrap()).unwrap_err();
        assert!(matches!(err, DalError::NoPrimaryKey(_)));
    }

    #[test]
    fn test_columns_missing_from_snapshot_are_left_out() {
        let mut schema = schema();
        schema.columns.push(CatalogColumn {
            name: "CreatedAt".into(),
            is_identity: false,
            is_primary_key: false,
        });
        let mut snap = snapshot();
        let i = snap.add_row(vec![SqlValue::Null, "Di".into(), SqlValue::Null]).unwrap();
        let builder = CommandBuilder::new(&schema, &snap).unwrap();
        let cmd = builder.insert(snap.row(i).unwrap());
        assert!(!cmd.sql.contains("CreatedAt"));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(CommandKind::Update.name(), "UpdateCommand");
        assert_eq!(CommandKind::Delete.name(), "DeleteCommand");
    }
}
