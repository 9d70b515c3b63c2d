//! SQL dialect abstraction for sluice-rdbc
//!
//! The little vendor-specific SQL the streamers need:
//! - Identifier quoting
//! - Parameter placeholders (`?` vs `$n`)
//! - `LIMIT … OFFSET …` clauses for paginated queries

use crate::connection::DatabaseType;

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the placeholder for a 1-based parameter index (e.g., $1, ?)
    fn placeholder(&self, index: usize) -> String;

    /// Append bound `LIMIT`/`OFFSET` placeholders to a query that already
    /// uses `existing_params` parameters.
    ///
    /// The limit is bound first, then the offset.
    fn paged_sql(&self, sql: &str, existing_params: usize) -> String {
        format!(
            "{} LIMIT {} OFFSET {}",
            sql.trim_end().trim_end_matches(';'),
            self.placeholder(existing_params + 1),
            self.placeholder(existing_params + 2)
        )
    }

    /// `SELECT *` over a table, ordered by a column when one is given
    fn select_all_sql(&self, table: &str, order_by: Option<&str>) -> String {
        let mut sql = format!("SELECT * FROM {}", self.quote_identifier(table));
        if let Some(column) = order_by {
            sql.push_str(&format!(" ORDER BY {} ASC", self.quote_identifier(column)));
        }
        sql
    }
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

/// MySQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Get a dialect by name; unknown names fall back to MySQL
pub fn dialect_for(name: &str) -> Box<dyn SqlDialect> {
    match name.to_lowercase().as_str() {
        "postgres" | "postgresql" => Box::new(PostgresDialect),
        _ => Box::new(MySqlDialect),
    }
}

/// Get the dialect for a database type
pub fn dialect_for_database(database_type: DatabaseType) -> Box<dyn SqlDialect> {
    match database_type {
        DatabaseType::PostgreSQL => Box::new(PostgresDialect),
        DatabaseType::MySQL | DatabaseType::Unknown => Box::new(MySqlDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_dialect() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.quote_identifier("user_data"), "\"user_data\"");
        assert_eq!(dialect.placeholder(1), "$1");
    }

    #[test]
    fn test_mysql_dialect() {
        let dialect = MySqlDialect;
        assert_eq!(dialect.quote_identifier("user_data"), "`user_data`");
        assert_eq!(dialect.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(dialect.placeholder(1), "?");
    }

    #[test]
    fn test_paged_sql_placeholders() {
        let base = "SELECT * FROM user_data ORDER BY user_id";
        assert_eq!(
            MySqlDialect.paged_sql(base, 0),
            "SELECT * FROM user_data ORDER BY user_id LIMIT ? OFFSET ?"
        );
        assert_eq!(
            PostgresDialect.paged_sql("SELECT * FROM t WHERE age > $1;", 1),
            "SELECT * FROM t WHERE age > $1 LIMIT $2 OFFSET $3"
        );
    }

    #[test]
    fn test_select_all_sql() {
        assert_eq!(
            MySqlDialect.select_all_sql("user_data", Some("user_id")),
            "SELECT * FROM `user_data` ORDER BY `user_id` ASC"
        );
        assert_eq!(
            PostgresDialect.select_all_sql("user_data", None),
            "SELECT * FROM \"user_data\""
        );
    }

    #[test]
    fn test_dialect_selection() {
        assert_eq!(dialect_for("postgres").name(), "PostgreSQL");
        assert_eq!(dialect_for("mysql").name(), "MySQL");
        assert_eq!(
            dialect_for_database(DatabaseType::PostgreSQL).name(),
            "PostgreSQL"
        );
    }
}
