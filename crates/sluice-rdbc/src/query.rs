//! SQL text plus its bound parameters

use crate::types::Value;

/// A query to run against a lease: SQL text and positional parameters.
///
/// Placeholders use the backend's own syntax (`?` for MySQL, `$n` for
/// PostgreSQL).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
}

impl Query {
    /// Create a query without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// SQL text
    #[inline]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters, in placeholder order
    #[inline]
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_bind() {
        let query = Query::new("SELECT * FROM user_data WHERE age > ?")
            .bind(25_i32)
            .bind("x");

        assert_eq!(query.sql(), "SELECT * FROM user_data WHERE age > ?");
        assert_eq!(
            query.params(),
            &[Value::Int32(25), Value::String("x".into())]
        );
    }

    #[test]
    fn test_query_from_str() {
        let query: Query = "SELECT 1".into();
        assert!(query.params().is_empty());
    }
}
