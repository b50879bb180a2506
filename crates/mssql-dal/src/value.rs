//! SQL value types held by table snapshots.
//!
//! Values are owned: a snapshot outlives the result set it was loaded from and
//! is mutated by the caller before being written back.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::Serializer;
use serde::Serialize;
use uuid::Uuid;

/// Column type tag.
///
/// Carried by snapshot columns so NULL cells still know what they would hold,
/// and so the first column can be retyped to an integer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl SqlType {
    /// Whether the type holds whole numbers.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, SqlType::I16 | SqlType::I32 | SqlType::I64)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Bool => "bit",
            SqlType::I16 => "smallint",
            SqlType::I32 => "int",
            SqlType::I64 => "bigint",
            SqlType::F32 => "real",
            SqlType::F64 => "float",
            SqlType::String => "nvarchar",
            SqlType::Bytes => "varbinary",
            SqlType::Uuid => "uniqueidentifier",
            SqlType::Decimal => "decimal",
            SqlType::DateTime => "datetime2",
            SqlType::DateTimeOffset => "datetimeoffset",
            SqlType::Date => "date",
            SqlType::Time => "time",
        };
        f.write_str(name)
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Database NULL.
    Null,

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float).
    F64(f64),

    /// Character data.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UNIQUEIDENTIFIER value.
    Uuid(Uuid),

    /// Exact numeric (decimal, numeric, money).
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Type of this value, `None` for NULL.
    #[must_use]
    pub fn sql_type(&self) -> Option<SqlType> {
        let ty = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::I16(_) => SqlType::I16,
            SqlValue::I32(_) => SqlType::I32,
            SqlValue::I64(_) => SqlType::I64,
            SqlValue::F32(_) => SqlType::F32,
            SqlValue::F64(_) => SqlType::F64,
            SqlValue::String(_) => SqlType::String,
            SqlValue::Bytes(_) => SqlType::Bytes,
            SqlValue::Uuid(_) => SqlType::Uuid,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::DateTime(_) => SqlType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlType::DateTimeOffset,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
        };
        Some(ty)
    }

    /// Coerce to a 64-bit integer.
    ///
    /// Integers widen, integral decimals and floats convert, numeric text
    /// parses. Anything else, including NULL and fractional numbers, is `None`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SqlValue::F64(f) if f.fract() == 0.0 => Decimal::try_from(*f).ok()?.to_i64(),
            SqlValue::F32(f) if f.fract() == 0.0 => Decimal::try_from(*f).ok()?.to_i64(),
            SqlValue::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<Decimal>()
                        .ok()
                        .filter(|d| d.fract().is_zero())
                        .and_then(|d| d.to_i64())
                })
            }
            _ => None,
        }
    }

    /// Borrow the text of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::String(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("0x")?;
                for b in v {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
        }
    }
}

// JSON rendering keeps numbers as numbers and everything lossy as text.
impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::I16(v) => serializer.serialize_i16(*v),
            SqlValue::I32(v) => serializer.serialize_i32(*v),
            SqlValue::I64(v) => serializer.serialize_i64(*v),
            SqlValue::F32(v) => serializer.serialize_f32(*v),
            SqlValue::F64(v) => serializer.serialize_f64(*v),
            SqlValue::String(v) => serializer.serialize_str(v),
            other => serializer.collect_str(other),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_as_i64_widens_integers() {
        assert_eq!(SqlValue::I16(7).as_i64(), Some(7));
        assert_eq!(SqlValue::I32(-3).as_i64(), Some(-3));
        assert_eq!(SqlValue::I64(i64::MAX).as_i64(), Some(i64::MAX));
    }

    #[test]
    fn test_as_i64_identity_decimal() {
        // SCOPE_IDENTITY() comes back as numeric(38,0)
        let d = Decimal::from_str("42").unwrap();
        assert_eq!(SqlValue::Decimal(d).as_i64(), Some(42));

        let fractional = Decimal::from_str("4.5").unwrap();
        assert_eq!(SqlValue::Decimal(fractional).as_i64(), None);
    }

    #[test]
    fn test_as_i64_text_and_null() {
        assert_eq!(SqlValue::from(" 12 ").as_i64(), Some(12));
        assert_eq!(SqlValue::from("12.0").as_i64(), Some(12));
        assert_eq!(SqlValue::from("abc").as_i64(), None);
        assert_eq!(SqlValue::Null.as_i64(), None);
        assert_eq!(SqlValue::Bool(true).as_i64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Bool(true).to_string(), "1");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xDEAD");
        assert_eq!(SqlValue::from("x").to_string(), "x");
    }

    #[test]
    fn test_serialize_json() {
        let row = vec![
            SqlValue::I32(1),
            SqlValue::Null,
            SqlValue::from("Ann"),
            SqlValue::Decimal(Decimal::from_str("9.99").unwrap()),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[1,null,"Ann","9.99"]"#);
    }

    #[test]
    fn test_sql_type() {
        assert_eq!(SqlValue::Null.sql_type(), None);
        assert_eq!(SqlValue::I64(1).sql_type(), Some(SqlType::I64));
        assert!(SqlType::I32.is_integer());
        assert!(!SqlType::Decimal.is_integer());
    }

    #[test]
    fn test_from_option() {
        let v: SqlValue = Option::<i32>::None.into();
        assert!(v.is_null());
        let v: SqlValue = Some(5i64).into();
        assert_eq!(v, SqlValue::I64(5));
    }
}
