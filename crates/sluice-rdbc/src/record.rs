//! Decoded records and the groups streams hand out
//!
//! A [`Record`] is what leaves the database layer. Raw [`Row`]s are turned
//! into records by a [`RecordDecoder`], which renders binary identifier
//! columns as lowercase hex so consumers never see raw key bytes.

use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Identifier column normalized by default
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "user_id";

/// One decoded row: ordered column names mapped to values
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record from parallel column and value lists
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Number of fields
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the record has no fields
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in result order
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in result order
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Look up a field by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Look up a text field
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Numeric view of a field.
    ///
    /// `Ok(None)` for SQL NULL, [`Error::Schema`] when the field is absent and
    /// [`Error::TypeConversion`] when the value is not numeric.
    pub fn get_f64(&self, name: &str) -> Result<Option<f64>> {
        let value = self
            .get(name)
            .ok_or_else(|| Error::schema(format!("record has no field '{}'", name)))?;

        if value.is_null() {
            return Ok(None);
        }

        value.as_f64().map(Some).ok_or_else(|| {
            Error::type_conversion(format!(
                "field '{}' holds {} which is not numeric",
                name,
                value.sql_type()
            ))
        })
    }

    /// Iterate over `(column, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// Turns raw driver rows into [`Record`]s
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    identifier_columns: Vec<String>,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self {
            identifier_columns: vec![DEFAULT_IDENTIFIER_COLUMN.to_string()],
        }
    }
}

impl RecordDecoder {
    /// Decoder normalizing the default `user_id` column
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that passes every value through untouched
    pub fn passthrough() -> Self {
        Self {
            identifier_columns: Vec::new(),
        }
    }

    /// Also normalize `column` as a binary identifier
    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self
            .identifier_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&column))
        {
            self.identifier_columns.push(column);
        }
        self
    }

    /// Columns treated as binary identifiers
    pub fn identifier_columns(&self) -> &[String] {
        &self.identifier_columns
    }

    fn is_identifier(&self, column: &str) -> bool {
        self.identifier_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Decode one row
    pub fn decode(&self, row: Row) -> Record {
        let (columns, values) = row.into_parts();
        let values = columns
            .iter()
            .zip(values)
            .map(|(column, value)| {
                if self.is_identifier(column) {
                    normalize_identifier(value)
                } else {
                    value
                }
            })
            .collect();
        Record::new(columns, values)
    }
}

fn normalize_identifier(value: Value) -> Value {
    match value {
        Value::Bytes(bytes) => Value::String(hex::encode(bytes)),
        Value::Uuid(uuid) => Value::String(uuid.simple().to_string()),
        other => other,
    }
}

/// A group of records fetched together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    index: usize,
    records: Vec<Record>,
}

impl Batch {
    /// Create a batch with its zero-based position in the stream
    pub fn new(index: usize, records: Vec<Record>) -> Self {
        Self { index, records }
    }

    /// Zero-based position in the stream
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Records in fetch order
    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only the records matching `predicate`, preserving order
    pub fn retain<F>(mut self, mut predicate: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        self.records.retain(|r| predicate(r));
        self
    }

    /// Take the records out
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// A batch addressed by its offset in a paginated sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    offset: u64,
    page_size: usize,
    records: Vec<Record>,
}

impl Page {
    /// Create a page
    pub fn new(offset: u64, page_size: usize, records: Vec<Record>) -> Self {
        Self {
            offset,
            page_size,
            records,
        }
    }

    /// Offset of the first record in the full ordering
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Requested page size
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Offset of the following page, saturating at `u64::MAX`
    #[inline]
    pub fn next_offset(&self) -> u64 {
        self.offset.saturating_add(self.page_size as u64)
    }

    /// Records in order
    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records actually returned
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether fewer rows came back than were asked for
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.records.len() < self.page_size
    }

    /// Take the records out
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for Page {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn user_row(id: Vec<u8>, age: Value) -> Row {
        Row::new(
            vec!["user_id".into(), "name".into(), "age".into()],
            vec![Value::Bytes(id), Value::String("Ada".into()), age],
        )
    }

    #[test]
    fn test_decode_hexes_binary_identifier() {
        let record = RecordDecoder::new().decode(user_row(
            vec![0x00, 0xAB, 0x10, 0xff],
            Value::Int32(30),
        ));

        assert_eq!(record.get_str("user_id"), Some("00ab10ff"));
        assert_eq!(record.get_str("name"), Some("Ada"));
    }

    #[test]
    fn test_decode_uuid_identifier() {
        let uuid = uuid::Uuid::from_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let row = Row::new(vec!["USER_ID".into()], vec![Value::Uuid(uuid)]);

        let record = RecordDecoder::new().decode(row);
        assert_eq!(
            record.get_str("user_id"),
            Some("67e5504410b1426f9247bb680e5fe0c8")
        );
    }

    #[test]
    fn test_passthrough_and_custom_identifier() {
        let row = Row::new(
            vec!["user_id".into(), "session".into()],
            vec![Value::Bytes(vec![1]), Value::Bytes(vec![2])],
        );

        let record = RecordDecoder::passthrough().decode(row.clone());
        assert_eq!(record.get("user_id"), Some(&Value::Bytes(vec![1])));

        let record = RecordDecoder::new()
            .with_identifier_column("session")
            .decode(row);
        assert_eq!(record.get_str("user_id"), Some("01"));
        assert_eq!(record.get_str("session"), Some("02"));
    }

    #[test]
    fn test_get_f64() {
        let age = Value::Decimal(Decimal::from_str("25.5").unwrap());
        let record = RecordDecoder::new().decode(user_row(vec![1], age));
        assert_eq!(record.get_f64("age").unwrap(), Some(25.5));

        let record = RecordDecoder::new().decode(user_row(vec![1], Value::Null));
        assert_eq!(record.get_f64("age").unwrap(), None);

        let err = record.get_f64("salary").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Schema);

        let err = record.get_f64("name").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TypeConversion);
    }

    #[test]
    fn test_record_to_json() {
        let record = RecordDecoder::new().decode(user_row(vec![0xbe, 0xef], Value::Int32(41)));
        let json = record.to_json();

        assert_eq!(json["user_id"], "beef");
        assert_eq!(json["age"], 41);
    }

    #[test]
    fn test_batch_retain() {
        let records = (0..4)
            .map(|i| Record::new(vec!["age".into()], vec![Value::Int32(i * 10)]))
            .collect();
        let batch = Batch::new(3, records).retain(|r| r.get_f64("age").ok().flatten() > Some(15.0));

        assert_eq!(batch.index(), 3);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_page_offsets() {
        let page = Page::new(10, 5, vec![Record::new(vec![], vec![])]);
        assert_eq!(page.next_offset(), 15);
        assert!(page.is_partial());
        assert!(!page.is_empty());
    }

    #[test]
    fn test_page_next_offset_saturates() {
        let page = Page::new(u64::MAX - 2, 5, vec![]);
        assert_eq!(page.next_offset(), u64::MAX);

        let page = Page::new(0, usize::MAX, vec![]);
        assert_eq!(page.next_offset(), usize::MAX as u64);
    }
}
