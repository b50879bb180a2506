//! Identifier quoting and the trusted-fragment boundary.
//!
//! Two kinds of text end up inside statements built by this crate:
//!
//! - **Generated identifiers**: column names the engine discovers from the
//!   catalog while synchronizing a snapshot. These are validated and
//!   bracket-quoted with [`quote_mssql`].
//! - **Caller fragments**: table names, column lists, value lists, SET
//!   assignments, WHERE criteria and whole queries handed to the engine by
//!   its caller. These are spliced in verbatim. The engine does no escaping
//!   and no parameter binding on them; callers compose multi-clause criteria
//!   and expressions through them, so their correctness and safety is the
//!   caller's responsibility. [`Fragment`] marks every such splice point.

use std::fmt;

use crate::error::{DalError, Result};

/// Maximum SQL Server identifier length in characters.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier the engine is about to quote.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding 128 characters
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DalError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DalError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(DalError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Escape a value for use inside a single-quoted T-SQL string literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Caller-supplied SQL text that is spliced into a statement verbatim.
///
/// Constructing one is the explicit trust decision: the text is neither
/// escaped nor bound as a parameter. The only rejection is a NUL byte, which
/// is never valid T-SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a>(&'a str);

impl<'a> Fragment<'a> {
    /// Accept caller text as a trusted statement fragment.
    pub fn trusted(text: &'a str) -> Result<Self> {
        if text.contains('\0') {
            return Err(DalError::Config(format!(
                "SQL fragment contains null byte: {:?}",
                text
            )));
        }
        Ok(Self(text))
    }

    /// The raw text.
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl fmt::Display for Fragment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
