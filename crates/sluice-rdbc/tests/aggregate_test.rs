//! Tests for sluice-rdbc streaming aggregation

mod common;

use common::{ages, users, MemoryFactory};
use rust_decimal::Decimal;
use sluice_rdbc::prelude::*;

const AGES: &str = "SELECT age FROM user_data";

#[tokio::test]
async fn test_average_of_empty_table_is_zero() {
    let factory = MemoryFactory::new(ages(&[]));
    let mean = average(&factory.provisioner(), AGES, "age").await.unwrap();

    assert_eq!(mean, 0.0);
    assert_eq!(factory.tracker().closes(), 1);
}

#[tokio::test]
async fn test_average_of_ages() {
    let factory = MemoryFactory::new(ages(&[
        Value::Int32(20),
        Value::Int32(30),
        Value::Int32(40),
    ]));
    let mean = average(&factory.provisioner(), AGES, "age").await.unwrap();

    assert!((mean - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_average_of_decimal_ages() {
    // 20.0, 21.0, 22.0, 23.0
    let factory = MemoryFactory::new(users(4));
    let mean = average(&factory.provisioner(), "SELECT * FROM user_data", "age")
        .await
        .unwrap();

    assert!((mean - 21.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_average_skips_nulls() {
    let factory = MemoryFactory::new(ages(&[
        Value::Decimal(Decimal::new(255, 1)),
        Value::Null,
        Value::Decimal(Decimal::new(345, 1)),
    ]));
    let mean = average(&factory.provisioner(), AGES, "age").await.unwrap();

    assert!((mean - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_average_missing_field() {
    let factory = MemoryFactory::new(ages(&[Value::Int32(20)]));
    let err = average(&factory.provisioner(), AGES, "salary")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Schema);
    assert_eq!(factory.tracker().closes(), 1);
}

#[tokio::test]
async fn test_average_non_numeric_field() {
    let factory = MemoryFactory::new(users(2));
    let err = average(&factory.provisioner(), "SELECT * FROM user_data", "email")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::TypeConversion);
    assert_eq!(factory.tracker().open(), 0);
}

#[tokio::test]
async fn test_average_propagates_stream_errors() {
    let factory = MemoryFactory::new(users(10)).fail_on_fetch(3);
    let err = average(&factory.provisioner(), "SELECT * FROM user_data", "age")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Query);
    assert_eq!(factory.tracker().closes(), 1);
}

#[tokio::test]
async fn test_average_connection_error() {
    let factory = MemoryFactory::new(users(3)).refuse_connections();
    let err = average(&factory.provisioner(), AGES, "age").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Connection);
}
