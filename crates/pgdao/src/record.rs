//! Ordered column-name to value maps.

use serde::Serialize;
use serde::ser::SerializeMap;
use tokio_postgres::Row;

use crate::error::OrmResult;
use crate::value::Value;

/// An entity flattened to `(column, value)` pairs, in column declaration order.
///
/// Records are what the mutation engine inspects to decide which columns are
/// set, and what raw queries return when no entity type applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Set `column` to `value`, replacing an earlier value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Whether `column` is present with a non-null value.
    pub fn is_set(&self, column: &str) -> bool {
        self.get(column).is_some_and(|v| !v.is_null())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Entries whose value is not null.
    pub fn non_null(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(_, v)| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode every column of a result row.
    pub fn from_row(row: &Row) -> OrmResult<Self> {
        let mut record = Self::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            record
                .entries
                .push((column.name().to_string(), Value::from_row(row, idx)?));
        }
        Ok(record)
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut record = Record::new();
        record.set("id", 1i64).set("name", "A").set("id", 2i64);
        assert_eq!(record.columns().collect::<Vec<_>>(), ["id", "name"]);
        assert_eq!(record.get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn non_null_skips_nulls() {
        let record = Record::new()
            .with("id", Value::Null)
            .with("name", "A")
            .with("size", None::<i64>);
        let set: Vec<_> = record.non_null().map(|(c, _)| c).collect();
        assert_eq!(set, ["name"]);
        assert!(record.is_set("name"));
        assert!(!record.is_set("id"));
        assert!(!record.is_set("missing"));
    }

    #[test]
    fn serializes_as_json_object() {
        let record: Record = [("id", Value::Int(1)), ("name", Value::from("A"))]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": 1, "name": "A"}));
    }
}
