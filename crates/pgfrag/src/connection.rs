//! The driver boundary.
//!
//! [`Connection`] is the single seam between the client layer and
//! tokio-postgres: one statement in, one [`ResultSet`] out. Tests swap in a
//! scripted implementation; production code uses `tokio_postgres::Client`
//! directly or through a deadpool wrapper.

use crate::error::SqlResult;
use crate::row::{ResultSet, Row, RowShape};
use crate::value::SqlValue;
use futures_util::TryStreamExt;
use std::future::Future;
use std::pin::pin;
use tokio_postgres::types::ToSql;

/// Something that can execute one parameterized statement.
pub trait Connection: Send + Sync {
    fn run(
        &self,
        sql: &str,
        params: &[SqlValue],
        shape: RowShape,
    ) -> impl Future<Output = SqlResult<ResultSet>> + Send;
}

impl<C: Connection> Connection for &C {
    async fn run(&self, sql: &str, params: &[SqlValue], shape: RowShape) -> SqlResult<ResultSet> {
        (*self).run(sql, params, shape).await
    }
}

impl Connection for tokio_postgres::Client {
    async fn run(&self, sql: &str, params: &[SqlValue], shape: RowShape) -> SqlResult<ResultSet> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let stream = self.query_raw(sql, params.iter().copied()).await?;
        let mut stream = pin!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(convert_row(&row, shape)?);
        }
        // rows_affected is only known once the stream is drained
        let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);
        Ok(ResultSet { row_count, rows })
    }
}

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::Client {
    async fn run(&self, sql: &str, params: &[SqlValue], shape: RowShape) -> SqlResult<ResultSet> {
        let client: &tokio_postgres::Client = self;
        client.run(sql, params, shape).await
    }
}

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::ClientWrapper {
    async fn run(&self, sql: &str, params: &[SqlValue], shape: RowShape) -> SqlResult<ResultSet> {
        let client: &tokio_postgres::Client = self;
        client.run(sql, params, shape).await
    }
}

fn convert_row(row: &tokio_postgres::Row, shape: RowShape) -> SqlResult<Row> {
    let mut values = Vec::with_capacity(row.columns().len());
    for idx in 0..row.columns().len() {
        values.push(extract_value(row, idx)?);
    }
    Ok(match shape {
        RowShape::Array => Row::Array(values),
        RowShape::Record => Row::Record(
            row.columns()
                .iter()
                .map(|column| column.name().to_string())
                .zip(values)
                .collect(),
        ),
    })
}

/// Decode one column into an [`SqlValue`], dispatching on the wire type name.
/// Unrecognized types fall back to their text representation.
fn extract_value(row: &tokio_postgres::Row, idx: usize) -> SqlResult<SqlValue> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(i64::from(v))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Int),
        "float4" | "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Float),
        "bool" => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bool),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Timestamp),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::Timestamp(v.and_utc())),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Uuid),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Json),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bytes),
        _ => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Text),
    };
    Ok(value)
}
