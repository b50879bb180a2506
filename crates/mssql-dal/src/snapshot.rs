//! In-memory table snapshots.
//!
//! A [`Snapshot`] is an ordered set of typed columns plus rows, detached from
//! the database. Rows record their own change state so a mutated snapshot can
//! be reconciled back into its backing table (see [`crate::sync`]).
//!
//! # Auto-increment
//!
//! A column with `auto_increment` set fills NULL cells of newly added rows.
//! The next value is `max(seed, highest key present) + step`, so a snapshot
//! loaded from keys `[1, 2, 5]` and seeded from its last row hands out 6, 7, ...

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::backend::ResultSet;
use crate::error::{DalError, Result};
use crate::value::{SqlType, SqlValue};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataColumn {
    /// Column name as returned by the query.
    pub name: String,

    /// Value type.
    pub data_type: SqlType,

    /// Rejects edits when set.
    pub read_only: bool,

    /// Generates values for NULL cells of added rows.
    pub auto_increment: bool,

    /// Last value considered issued.
    pub auto_increment_seed: i64,

    /// Increment between generated values.
    pub auto_increment_step: i64,
}

impl DataColumn {
    /// A writable column without auto-increment.
    pub fn new(name: impl Into<String>, data_type: SqlType) -> Self {
        Self {
            name: name.into(),
            data_type,
            read_only: false,
            auto_increment: false,
            auto_increment_seed: 0,
            auto_increment_step: 1,
        }
    }
}

/// Change state of a row relative to the backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowState {
    /// Loaded and untouched, or committed.
    Unchanged,
    /// Created in memory, not yet in the backing table.
    Added,
    /// Loaded and edited.
    Modified,
    /// Loaded and removed in memory.
    Deleted,
}

/// A row with its current and (once touched) original values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    current: Vec<SqlValue>,
    original: Option<Vec<SqlValue>>,
    state: RowState,
}

impl DataRow {
    fn unchanged(values: Vec<SqlValue>) -> Self {
        Self {
            current: values,
            original: None,
            state: RowState::Unchanged,
        }
    }

    /// Current values, in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.current
    }

    /// Current value of one column.
    pub fn get(&self, column: usize) -> Option<&SqlValue> {
        self.current.get(column)
    }

    /// Values as last loaded or committed.
    pub fn original_values(&self) -> &[SqlValue] {
        self.original.as_deref().unwrap_or(&self.current)
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    fn accept(&mut self) {
        self.original = None;
        self.state = RowState::Unchanged;
    }
}

/// An in-memory table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    name: String,
    columns: Vec<DataColumn>,
    rows: Vec<DataRow>,
    primary_key: Option<usize>,
}

impl Snapshot {
    /// An empty snapshot with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An empty snapshot with the given columns.
    pub fn with_columns(name: impl Into<String>, columns: Vec<DataColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Self::default()
        }
    }

    /// Load a result set; every row starts out `Unchanged`.
    pub fn from_result_set(name: impl Into<String>, result: ResultSet) -> Self {
        let columns = result
            .columns
            .into_iter()
            .map(|c| DataColumn::new(c.name, c.data_type))
            .collect();
        let rows = result.rows.into_iter().map(DataRow::unchanged).collect();

        Self {
            name: name.into(),
            columns,
            rows,
            primary_key: None,
        }
    }

    /// Name of the backing table.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    /// Mutable access to column metadata.
    pub fn column_mut(&mut self, column: usize) -> Option<&mut DataColumn> {
        self.columns.get_mut(column)
    }

    /// Index of a column, matched case-insensitively as SQL Server does.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All rows, including rows marked `Deleted`.
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }

    /// Number of rows not marked `Deleted`.
    pub fn len(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.state != RowState::Deleted)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The primary-key column, if one is set.
    pub fn primary_key(&self) -> Option<&DataColumn> {
        self.primary_key.and_then(|i| self.columns.get(i))
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
    }

    /// Make `column` the primary key. Existing values must be unique and non-NULL.
    pub fn set_primary_key(&mut self, column: usize) -> Result<()> {
        let name = self.column_name(column)?.to_string();
        for (i, row) in self.live_rows() {
            let key = &row.current[column];
            if key.is_null() {
                return Err(DalError::snapshot(format!(
                    "Column '{}' contains NULL and cannot be the primary key",
                    name
                )));
            }
            if self.find_key(column, key, Some(i)).is_some() {
                return Err(DalError::snapshot(format!(
                    "Column '{}' contains duplicate value {} and cannot be the primary key",
                    name, key
                )));
            }
        }
        self.primary_key = Some(column);
        Ok(())
    }

    /// Whether every column rejects edits.
    pub fn is_read_only(&self) -> bool {
        !self.columns.is_empty() && self.columns.iter().all(|c| c.read_only)
    }

    /// Append a new row in the `Added` state.
    ///
    /// NULL cells of auto-increment columns are filled with the next generated
    /// value. Returns the index of the new row.
    pub fn add_row(&mut self, values: Vec<SqlValue>) -> Result<usize> {
        self.check_writable()?;
        if values.len() != self.columns.len() {
            return Err(DalError::snapshot(format!(
                "Row has {} values but table '{}' has {} columns",
                values.len(),
                self.name,
                self.columns.len()
            )));
        }

        let mut values = values;
        for column in 0..self.columns.len() {
            if values[column].is_null() && self.columns[column].auto_increment {
                values[column] = SqlValue::I64(self.next_auto_increment_value(column)?);
            } else {
                let taken = std::mem::replace(&mut values[column], SqlValue::Null);
                values[column] = coerce(&self.columns[column], taken);
            }
        }

        if let Some(pk) = self.primary_key {
            self.check_key(pk, &values[pk], None)?;
        }

        self.rows.push(DataRow {
            current: values,
            original: None,
            state: RowState::Added,
        });
        Ok(self.rows.len() - 1)
    }

    /// Edit one cell.
    pub fn set_value(&mut self, row: usize, column: &str, value: impl Into<SqlValue>) -> Result<()> {
        let col = self
            .column_index(column)
            .ok_or_else(|| DalError::snapshot(format!("Column '{}' does not belong to table '{}'", column, self.name)))?;
        if self.columns[col].read_only {
            return Err(DalError::snapshot(format!("Column '{}' is read only", column)));
        }
        let state = self.row_state(row)?;
        if state == RowState::Deleted {
            return Err(DalError::snapshot(format!("Row {} has been deleted", row)));
        }

        let value = coerce(&self.columns[col], value.into());
        if self.primary_key == Some(col) {
            self.check_key(col, &value, Some(row))?;
        }

        let target = &mut self.rows[row];
        if target.state == RowState::Unchanged {
            target.original = Some(target.current.clone());
            target.state = RowState::Modified;
        }
        target.current[col] = value;
        Ok(())
    }

    /// Remove a row. Added rows vanish (later indices shift down); loaded rows
    /// are kept as `Deleted` until the change is committed.
    pub fn delete_row(&mut self, row: usize) -> Result<()> {
        self.check_writable()?;
        match self.row_state(row)? {
            RowState::Added => {
                self.rows.remove(row);
            }
            RowState::Deleted => {
                return Err(DalError::snapshot(format!("Row {} has already been deleted", row)));
            }
            RowState::Unchanged | RowState::Modified => {
                let target = &mut self.rows[row];
                if target.original.is_none() {
                    target.original = Some(target.current.clone());
                }
                target.state = RowState::Deleted;
            }
        }
        Ok(())
    }

    /// Whether any row differs from the backing table.
    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| r.state != RowState::Unchanged)
    }

    /// Indices of changed rows, in row order.
    pub fn changes(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state != RowState::Unchanged)
            .map(|(i, _)| i)
            .collect()
    }

    /// Commit every pending change: deleted rows go, the rest become `Unchanged`.
    pub fn accept_changes(&mut self) {
        self.rows.retain(|r| r.state != RowState::Deleted);
        for row in &mut self.rows {
            row.accept();
        }
    }

    /// Undo every pending change.
    pub fn reject_changes(&mut self) {
        self.rows.retain(|r| r.state != RowState::Added);
        for row in &mut self.rows {
            if let Some(original) = row.original.take() {
                row.current = original;
            }
            row.state = RowState::Unchanged;
        }
    }

    /// Commit a single row. Returns `false` when the row was removed.
    pub fn accept_row(&mut self, row: usize) -> bool {
        match self.rows.get(row).map(|r| r.state) {
            Some(RowState::Deleted) => {
                self.rows.remove(row);
                false
            }
            Some(_) => {
                self.rows[row].accept();
                true
            }
            None => false,
        }
    }

    /// Set up write-back metadata on a freshly loaded snapshot.
    ///
    /// The first column becomes an integer auto-increment primary key seeded
    /// from the last row's key with step 1, and every column becomes writable.
    pub fn prepare_for_update(&mut self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(DalError::snapshot(format!("Table '{}' has no columns", self.name)));
        }

        for row in &mut self.rows {
            let key = &row.current[0];
            if key.is_null() {
                continue;
            }
            let coerced = key.as_i64().ok_or_else(|| {
                DalError::snapshot(format!(
                    "Key value {} of table '{}' is not an integer",
                    key, self.name
                ))
            })?;
            row.current[0] = SqlValue::I64(coerced);
        }

        self.columns[0].data_type = SqlType::I64;
        self.set_primary_key(0)?;

        let seed = self.rows.last().and_then(|r| r.current[0].as_i64());
        let key = &mut self.columns[0];
        key.auto_increment = true;
        if let Some(seed) = seed {
            key.auto_increment_seed = seed;
        }
        key.auto_increment_step = 1;

        for column in &mut self.columns {
            column.read_only = false;
        }
        Ok(())
    }

    /// Mark every column read-only.
    pub fn mark_read_only(&mut self) {
        for column in &mut self.columns {
            column.read_only = true;
        }
    }

    /// The value the next added row would receive in an auto-increment column.
    pub fn next_auto_increment_value(&self, column: usize) -> Result<i64> {
        let meta = self.columns.get(column).ok_or_else(|| {
            DalError::snapshot(format!("Column {} does not belong to table '{}'", column, self.name))
        })?;
        let highest = self
            .rows
            .iter()
            .filter_map(|r| r.current.get(column).and_then(SqlValue::as_i64))
            .max();

        let base = match highest {
            Some(h) if h > meta.auto_increment_seed => h,
            _ => meta.auto_increment_seed,
        };
        base.checked_add(meta.auto_increment_step).ok_or_else(|| {
            DalError::snapshot(format!(
                "Auto-increment column '{}' of table '{}' is exhausted",
                meta.name, self.name
            ))
        })
    }

    /// Overwrite a cell without touching the row state, used to refresh
    /// store-generated values after a write.
    pub(crate) fn refresh_value(&mut self, row: usize, column: usize, value: SqlValue) {
        if let Some(target) = self.rows.get_mut(row) {
            target.current[column] = value;
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(DalError::snapshot(format!("Table '{}' is read only", self.name)));
        }
        Ok(())
    }

    fn column_name(&self, column: usize) -> Result<&str> {
        self.columns
            .get(column)
            .map(|c| c.name.as_str())
            .ok_or_else(|| DalError::snapshot(format!("Column index {} is out of range", column)))
    }

    fn row_state(&self, row: usize) -> Result<RowState> {
        self.rows
            .get(row)
            .map(|r| r.state)
            .ok_or_else(|| DalError::snapshot(format!("Row index {} is out of range", row)))
    }

    fn live_rows(&self) -> impl Iterator<Item = (usize, &DataRow)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state != RowState::Deleted)
    }

    fn find_key(&self, column: usize, key: &SqlValue, skip: Option<usize>) -> Option<usize> {
        self.live_rows()
            .filter(|(i, _)| Some(*i) != skip)
            .find(|(_, r)| keys_equal(&r.current[column], key))
            .map(|(i, _)| i)
    }

    fn check_key(&self, column: usize, key: &SqlValue, skip: Option<usize>) -> Result<()> {
        let name = &self.columns[column].name;
        if key.is_null() {
            return Err(DalError::snapshot(format!("Column '{}' does not allow nulls", name)));
        }
        if self.find_key(column, key, skip).is_some() {
            return Err(DalError::snapshot(format!(
                "Column '{}' is constrained to be unique. Value '{}' is already present",
                name, key
            )));
        }
        Ok(())
    }
}

// Serialized as the table a reader would see: deleted rows are left out.
impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let rows: Vec<&[SqlValue]> = self.live_rows().map(|(_, r)| r.values()).collect();
        let mut table = serializer.serialize_struct("Snapshot", 3)?;
        table.serialize_field("name", &self.name)?;
        table.serialize_field("columns", &self.columns)?;
        table.serialize_field("rows", &rows)?;
        table.end()
    }
}

fn coerce(column: &DataColumn, value: SqlValue) -> SqlValue {
    match (column.data_type, value.as_i64()) {
        (SqlType::I64, Some(v)) if !matches!(value, SqlValue::I64(_)) => SqlValue::I64(v),
        _ => value,
    }
}

fn keys_equal(a: &SqlValue, b: &SqlValue) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
