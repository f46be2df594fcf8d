use actix_web::error::ErrorBadRequest;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::MySqlPool;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may reach the SET clause; anything else is a
/// bad request. Keys are emitted in `allowed` order so the SQL is stable.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ErrorBadRequest(format!("Field '{}' cannot be updated", unknown)));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for column in allowed {
        let Some(value) = obj.get(*column) else {
            continue;
        };
        columns.push(format!("{} = ?", column));
        values.push(to_sql_value(value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

fn to_sql_value(value: &Value) -> Result<SqlValue, actix_web::Error> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(ErrorBadRequest("Unsupported number"));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(ErrorBadRequest("Unsupported JSON value type")),
    })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// MySQL duplicate-key violations (error 1062) surface as unique violations.
pub fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Foreign-key violations: referenced row missing or row still referenced.
pub fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WORKER_COLUMNS: &[&str] = &["name", "national_id", "sub_warehouse_id", "target_hours"];

    #[test]
    fn builds_set_clause_in_allowed_order() {
        let payload = json!({ "target_hours": 8, "name": "Ana" });
        let update = build_update_sql("workers", &payload, WORKER_COLUMNS, "id", 7).unwrap();

        assert_eq!(update.sql, "UPDATE workers SET name = ?, target_hours = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Ana".into()),
                SqlValue::U64(8),
                SqlValue::U64(7)
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        let payload = json!({ "id": 99 });
        assert!(build_update_sql("workers", &payload, WORKER_COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("workers", &json!({}), WORKER_COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("workers", &json!([1, 2]), WORKER_COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn dates_and_nulls_are_typed() {
        let payload = json!({ "calendar_date": "2025-03-01", "note": null });
        let update =
            build_update_sql("t", &payload, &["calendar_date", "note"], "id", 1).unwrap();
        assert_eq!(
            update.values[0],
            SqlValue::Date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        );
        assert_eq!(update.values[1], SqlValue::Null);
    }
}
