// ABOUTME: mysql_async-backed implementation of the Database handle
// ABOUTME: Connects with retry and renders every column value as text

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, QueryResult, TextProtocol, Value};
use std::time::Duration;

use super::{Database, DbError, Disconnect, RawRow, RowCursor};

/// A caller-owned MySQL connection.
pub struct MySqlDatabase {
    conn: Conn,
}

impl MySqlDatabase {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Disconnect for MySqlDatabase {
    /// Close the underlying connection gracefully.
    async fn disconnect(self) -> Result<(), DbError> {
        self.conn.disconnect().await.map_err(map_err)
    }
}

/// Open a single MySQL connection from a `mysql://` URL.
pub async fn connect(url: &str) -> Result<MySqlDatabase> {
    let opts = Opts::from_url(url).with_context(|| {
        format!(
            "Invalid MySQL connection URL: {}",
            crate::utils::sanitize_url(url)
        )
    })?;

    let conn = Conn::new(opts).await.with_context(|| {
        format!(
            "Failed to connect to MySQL at {}",
            crate::utils::sanitize_url(url)
        )
    })?;

    tracing::debug!("Connected to {}", crate::utils::sanitize_url(url));
    Ok(MySqlDatabase::new(conn))
}

/// Open a connection, retrying up to 3 times with exponential backoff.
pub async fn connect_with_retry(url: &str) -> Result<MySqlDatabase> {
    crate::utils::retry_with_backoff(|| connect(url), 3, Duration::from_secs(1)).await
}

fn map_err(err: mysql_async::Error) -> DbError {
    match err {
        mysql_async::Error::Server(e) => DbError::server(e.code, e.message),
        other => DbError::new(other.to_string()),
    }
}

/// Render a driver value as the text the server would have sent over the text protocol.
pub(crate) fn value_to_cell(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut s = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            Some(s)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            let mut s = format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            Some(s)
        }
    }
}

struct MySqlCursor<'a> {
    result: QueryResult<'a, 'static, TextProtocol>,
}

#[async_trait]
impl RowCursor for MySqlCursor<'_> {
    async fn next_row(&mut self) -> Result<Option<RawRow>, DbError> {
        let row = self.result.next().await.map_err(map_err)?;
        Ok(row.map(|row| {
            RawRow::new(row.unwrap().into_iter().map(value_to_cell).collect())
        }))
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn query_stream<'a>(
        &'a mut self,
        sql: &str,
    ) -> Result<Box<dyn RowCursor + 'a>, DbError> {
        let result = self
            .conn
            .query_iter(sql.to_owned())
            .await
            .map_err(map_err)?;
        Ok(Box::new(MySqlCursor { result }))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        self.conn.query_drop(sql.to_owned()).await.map_err(map_err)?;
        Ok(self.conn.affected_rows())
    }
}
