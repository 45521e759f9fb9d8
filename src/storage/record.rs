//! Record model: the fixed biography field set and scalar field values.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::StoreError;

/// Field values keyed by field, as supplied to [`Store::store`](super::Store::store).
///
/// Fields absent from the map are persisted as NULL.
pub type FieldMap = BTreeMap<Field, FieldValue>;

/// A column of the record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    BirthYear,
    BirthPlace,
    DeathYear,
    DeathPlace,
    Occupation,
    Achievement,
    Education,
    Nationality,
    KnownFor,
}

impl Field {
    /// Every column, key first, in table order.
    pub const ALL: [Field; 10] = [
        Field::Name,
        Field::BirthYear,
        Field::BirthPlace,
        Field::DeathYear,
        Field::DeathPlace,
        Field::Occupation,
        Field::Achievement,
        Field::Education,
        Field::Nationality,
        Field::KnownFor,
    ];

    /// The non-key columns, in table order.
    pub const DATA: [Field; 9] = [
        Field::BirthYear,
        Field::BirthPlace,
        Field::DeathYear,
        Field::DeathPlace,
        Field::Occupation,
        Field::Achievement,
        Field::Education,
        Field::Nationality,
        Field::KnownFor,
    ];

    /// Column name in the `biographies` table.
    pub const fn column(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::BirthYear => "birth_year",
            Field::BirthPlace => "birth_place",
            Field::DeathYear => "death_year",
            Field::DeathPlace => "death_place",
            Field::Occupation => "occupation",
            Field::Achievement => "achievement",
            Field::Education => "education",
            Field::Nationality => "nationality",
            Field::KnownFor => "known_for",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Field {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| StoreError::InvalidField(s.to_string()))
    }
}

/// A scalar column value.
///
/// `Null` is a real value: a record that exists with an unset field yields
/// `Some(FieldValue::Null)` from retrieval, never `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Shared NULL used when binding fields absent from a [`FieldMap`].
pub(crate) static NULL_VALUE: FieldValue = FieldValue::Null;

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Real(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            FieldValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            FieldValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            FieldValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(FieldValue::Null),
            ValueRef::Integer(v) => Ok(FieldValue::Integer(v)),
            ValueRef::Real(v) => Ok(FieldValue::Real(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| FieldValue::Text(text.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// A named record: the unique key plus its optional fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl Record {
    /// Create a record with no fields set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: FieldMap::new(),
        }
    }

    /// Builder-style setter for one field.
    #[must_use]
    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Value to bind for `field`; absent fields bind as NULL.
    pub fn value(&self, field: Field) -> &FieldValue {
        if field == Field::Name {
            return &NULL_VALUE;
        }
        self.fields.get(&field).unwrap_or(&NULL_VALUE)
    }

    /// Whether the key satisfies the non-empty invariant.
    pub fn has_valid_key(&self) -> bool {
        is_valid_key(&self.name)
    }
}

/// Keys must contain at least one non-whitespace character.
pub(crate) fn is_valid_key(name: &str) -> bool {
    !name.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse_roundtrips_column_names() {
        for field in Field::ALL {
            assert_eq!(field.column().parse::<Field>().unwrap(), field);
        }
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        let err = "favorite_color".parse::<Field>().unwrap_err();
        assert_eq!(err, StoreError::InvalidField("favorite_color".into()));
    }

    #[test]
    fn test_absent_field_binds_null() {
        let record = Record::new("Ada Lovelace").with(Field::BirthYear, 1815);
        assert_eq!(record.value(Field::BirthYear), &FieldValue::Integer(1815));
        assert!(record.value(Field::DeathYear).is_null());
    }

    #[test]
    fn test_whitespace_key_is_invalid() {
        assert!(!Record::new("   ").has_valid_key());
        assert!(!Record::new("").has_valid_key());
        assert!(Record::new("Grace Hopper").has_valid_key());
    }

    #[test]
    fn test_record_json_shape() {
        let record = Record::new("Alan Turing")
            .with(Field::BirthYear, 1912)
            .with(Field::Nationality, "British")
            .with(Field::DeathPlace, None::<String>);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fields"]["birth_year"], 1912);
        assert_eq!(json["fields"]["nationality"], "British");
        assert!(json["fields"]["death_place"].is_null());

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
