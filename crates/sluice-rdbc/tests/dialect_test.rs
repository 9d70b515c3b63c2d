//! Unit tests for sluice-rdbc dialect module

use sluice_rdbc::connection::DatabaseType;
use sluice_rdbc::dialect::{
    dialect_for, dialect_for_database, MySqlDialect, PostgresDialect, SqlDialect,
};

#[test]
fn test_postgres_quote_identifier() {
    let dialect = PostgresDialect;

    assert_eq!(dialect.quote_identifier("user_data"), "\"user_data\"");
    assert_eq!(dialect.quote_identifier("User"), "\"User\"");
    assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
}

#[test]
fn test_mysql_quote_identifier() {
    let dialect = MySqlDialect;

    assert_eq!(dialect.quote_identifier("user_data"), "`user_data`");
    assert_eq!(dialect.quote_identifier("order"), "`order`");
}

#[test]
fn test_placeholders() {
    assert_eq!(PostgresDialect.placeholder(1), "$1");
    assert_eq!(PostgresDialect.placeholder(12), "$12");
    assert_eq!(MySqlDialect.placeholder(1), "?");
    assert_eq!(MySqlDialect.placeholder(12), "?");
}

#[test]
fn test_paged_sql_strips_trailing_semicolon() {
    assert_eq!(
        MySqlDialect.paged_sql("SELECT * FROM user_data ORDER BY user_id;  ", 0),
        "SELECT * FROM user_data ORDER BY user_id LIMIT ? OFFSET ?"
    );
}

#[test]
fn test_paged_sql_continues_numbering() {
    assert_eq!(
        PostgresDialect.paged_sql("SELECT * FROM t WHERE a = $1 AND b = $2", 2),
        "SELECT * FROM t WHERE a = $1 AND b = $2 LIMIT $3 OFFSET $4"
    );
}

#[test]
fn test_select_all_sql() {
    assert_eq!(
        PostgresDialect.select_all_sql("user_data", Some("user_id")),
        "SELECT * FROM \"user_data\" ORDER BY \"user_id\" ASC"
    );
}

#[test]
fn test_dialect_for() {
    assert_eq!(dialect_for("postgres").name(), "PostgreSQL");
    assert_eq!(dialect_for("PostgreSQL").name(), "PostgreSQL");
    assert_eq!(dialect_for("mysql").name(), "MySQL");
    assert_eq!(dialect_for("mariadb").name(), "MySQL");
    assert_eq!(dialect_for("unknown").name(), "MySQL");
}

#[test]
fn test_dialect_for_database() {
    assert_eq!(dialect_for_database(DatabaseType::MySQL).name(), "MySQL");
    assert_eq!(
        dialect_for_database(DatabaseType::PostgreSQL).name(),
        "PostgreSQL"
    );
}
