use crate::{AppError, AppResult};

use std::collections::BTreeMap;
use std::panic::Location;

use chrono::NaiveDateTime;
use error_location::ErrorLocation;
use serde_json::{Map, Value};
use sqlx::Row;
use sqlx::mysql::MySqlRow;
use sound_logger_core::PercentileSet;
use tracing::debug;

use super::LocalStore;
use super::schema;

const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Columns that never leave the local store.
const LOCAL_ONLY_COLUMNS: [&str; 2] = ["is_sent", "is_aggregated"];

/// Column name and declared type from `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Lower-case MySQL data type (`float`, `datetime`, ...).
    pub data_type: String,
}

/// Discovered table with its column layout.
#[derive(Debug, Clone)]
pub(crate) struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnMeta>,
}

/// One unsent row, ready for remote upload.
#[derive(Debug, Clone)]
pub(crate) struct UnsentRow {
    /// Local synthetic id, used to mark the row sent after confirmation.
    pub id: i64,
    /// Document shape of the row, excluding local bookkeeping columns.
    pub doc: Map<String, Value>,
}

/// Values of one daily Lden row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LdenRow {
    pub timestamp: NaiveDateTime,
    pub lden_ro: f64,
    pub lden_eu: f64,
    pub lday_ro: f64,
    pub timestamp_lday_ro: NaiveDateTime,
    pub lday_eu: f64,
    pub levening_ro: f64,
    pub timestamp_levening_ro: NaiveDateTime,
    pub levening_eu: f64,
    pub lnight_ro: f64,
    pub timestamp_lnight_ro: NaiveDateTime,
    pub lnight_eu: f64,
}

impl LocalStore {
    /// Creates the parameter database when absent.
    pub(crate) async fn ensure_database(&self, db: &str) -> AppResult<()> {
        sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS `{db}`;"))
            .execute(self.pool())
            .await?;
        debug!(db, "Database created or already exists");
        Ok(())
    }

    /// Creates a measurement table when absent.
    pub(crate) async fn ensure_measurement_table(&self, db: &str, table: &str) -> AppResult<()> {
        self.run_ddl(&schema::measurement_table_ddl(db, table)).await
    }

    /// Creates the Lden table when absent.
    pub(crate) async fn ensure_lden_table(&self, db: &str, table: &str) -> AppResult<()> {
        self.run_ddl(&schema::lden_table_ddl(db, table)).await
    }

    /// Creates a percentile table when absent.
    pub(crate) async fn ensure_percentile_table(&self, db: &str, table: &str) -> AppResult<()> {
        self.run_ddl(&schema::percentile_table_ddl(db, table)).await
    }

    /// Creates the connectivity log table when absent.
    pub(crate) async fn ensure_connectivity_table(&self) -> AppResult<()> {
        self.ensure_database("Logs").await?;
        self.run_ddl(&schema::connectivity_table_ddl("Logs", "connectivity"))
            .await
    }

    async fn run_ddl(&self, ddl: &str) -> AppResult<()> {
        sqlx::query(ddl).execute(self.pool()).await?;
        Ok(())
    }

    /// Appends one measurement row with `is_sent = 0, is_aggregated = 0`.
    pub(crate) async fn insert_measurement(
        &self,
        db: &str,
        table: &str,
        timestamp: NaiveDateTime,
        value: f64,
    ) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO `{db}`.`{table}` (timestamp, value, is_sent, is_aggregated) \
             VALUES (?, ?, 0, 0);"
        ))
        .bind(timestamp)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Appends the daily Lden row.
    pub(crate) async fn insert_lden_row(
        &self,
        db: &str,
        table: &str,
        row: &LdenRow,
    ) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO `{db}`.`{table}` \
             (timestamp, lden_ro, lden_eu, lday_ro, timestamp_lday_ro, lday_eu, \
              levening_ro, timestamp_levening_ro, levening_eu, \
              lnight_ro, timestamp_lnight_ro, lnight_eu, is_sent, is_aggregated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0);"
        ))
        .bind(row.timestamp)
        .bind(row.lden_ro)
        .bind(row.lden_eu)
        .bind(row.lday_ro)
        .bind(row.timestamp_lday_ro)
        .bind(row.lday_eu)
        .bind(row.levening_ro)
        .bind(row.timestamp_levening_ro)
        .bind(row.levening_eu)
        .bind(row.lnight_ro)
        .bind(row.timestamp_lnight_ro)
        .bind(row.lnight_eu)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Appends one percentile row.
    pub(crate) async fn insert_percentiles(
        &self,
        db: &str,
        table: &str,
        timestamp: NaiveDateTime,
        set: &PercentileSet,
    ) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO `{db}`.`{table}` \
             (timestamp, L5, L10, L50, L90, L95, is_sent, is_aggregated) \
             VALUES (?, ?, ?, ?, ?, ?, 0, 0);"
        ))
        .bind(timestamp)
        .bind(set.l5)
        .bind(set.l10)
        .bind(set.l50)
        .bind(set.l90)
        .bind(set.l95)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Appends one connectivity transition row.
    pub(crate) async fn insert_connectivity(
        &self,
        event_type: &str,
        status: &str,
        message: &str,
        details: Option<&Value>,
    ) -> AppResult<()> {
        self.ensure_connectivity_table().await?;

        sqlx::query(
            "INSERT INTO `Logs`.`connectivity` \
             (event_type, status, message, details, is_sent, is_aggregated) \
             VALUES (?, ?, ?, ?, 0, 1);",
        )
        .bind(event_type)
        .bind(status)
        .bind(message)
        .bind(details.map(Value::to_string))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Ordered values over the half-open window `[start, end)`.
    pub(crate) async fn fetch_values(
        &self,
        db: &str,
        table: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<f64>> {
        let rows = sqlx::query(&format!(
            "SELECT value FROM `{db}`.`{table}` \
             WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp ASC;"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| Ok(f64::from(row.try_get::<f32, _>("value")?)))
            .collect()
    }

    /// Ordered `(value, timestamp)` pairs over `[start, end)`.
    pub(crate) async fn fetch_values_with_ts(
        &self,
        db: &str,
        table: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> AppResult<Vec<(f64, NaiveDateTime)>> {
        let rows = sqlx::query(&format!(
            "SELECT value, timestamp FROM `{db}`.`{table}` \
             WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp ASC;"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    f64::from(row.try_get::<f32, _>("value")?),
                    row.try_get::<NaiveDateTime, _>("timestamp")?,
                ))
            })
            .collect()
    }

    /// Value stored at an exact timestamp, if any.
    pub(crate) async fn fetch_value_at(
        &self,
        db: &str,
        table: &str,
        timestamp: NaiveDateTime,
    ) -> AppResult<Option<f64>> {
        let row = sqlx::query(&format!(
            "SELECT value FROM `{db}`.`{table}` WHERE timestamp = ? LIMIT 1;"
        ))
        .bind(timestamp)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(f64::from(row.try_get::<f32, _>("value")?))),
            None => Ok(None),
        }
    }

    /// EU indicator components of the Lden row written for `timestamp`.
    pub(crate) async fn fetch_lden_components(
        &self,
        db: &str,
        table: &str,
        timestamp: NaiveDateTime,
    ) -> AppResult<Option<(f64, f64, f64)>> {
        let row = sqlx::query(&format!(
            "SELECT lday_eu, levening_eu, lnight_eu FROM `{db}`.`{table}` \
             WHERE timestamp = ? LIMIT 1;"
        ))
        .bind(timestamp)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lday: Option<f32> = row.try_get("lday_eu")?;
        let levening: Option<f32> = row.try_get("levening_eu")?;
        let lnight: Option<f32> = row.try_get("lnight_eu")?;

        Ok(match (lday, levening, lnight) {
            (Some(d), Some(e), Some(n)) => Some((f64::from(d), f64::from(e), f64::from(n))),
            _ => None,
        })
    }

    /// Up to `limit` unsent rows ordered by id, shaped as upload documents.
    pub(crate) async fn fetch_unsent_rows(
        &self,
        db: &str,
        table: &TableSchema,
        limit: u32,
    ) -> AppResult<Vec<UnsentRow>> {
        if !table.columns.iter().any(|c| c.name == "id") {
            return Err(AppError::StoreError {
                reason: format!("table {}.{} has no id column", db, table.name),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let selected: Vec<&ColumnMeta> = table
            .columns
            .iter()
            .filter(|c| !LOCAL_ONLY_COLUMNS.contains(&c.name.as_str()))
            .collect();
        let column_list = selected
            .iter()
            .map(|c| format!("`{}`", c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = sqlx::query(&format!(
            "SELECT {column_list} FROM `{db}`.`{}` \
             WHERE is_sent = 0 ORDER BY id LIMIT ?;",
            table.name
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let mut doc = Map::new();
                let mut id: i64 = 0;
                for (index, column) in selected.iter().enumerate() {
                    let value = decode_column(row, index, column)?;
                    if column.name == "id" {
                        id = value.as_i64().unwrap_or_default();
                    }
                    doc.insert(column.name.clone(), value);
                }
                Ok(UnsentRow { id, doc })
            })
            .collect()
    }

    /// Marks the confirmed rows as sent.
    pub(crate) async fn mark_sent(&self, db: &str, table: &str, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE `{db}`.`{table}` SET is_sent = 1 WHERE id IN ({placeholders});");

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(self.pool()).await?;

        debug!(db, table, count = ids.len(), "Rows marked as sent");

        Ok(())
    }

    /// Discovers every non-system database with its tables and columns.
    pub(crate) async fn discover(&self) -> AppResult<BTreeMap<String, Vec<TableSchema>>> {
        let mut map = BTreeMap::new();

        let databases: Vec<String> = sqlx::query_scalar(
            "SELECT schema_name FROM information_schema.schemata \
             WHERE schema_name NOT IN (?, ?, ?, ?);",
        )
        .bind(SYSTEM_SCHEMAS[0])
        .bind(SYSTEM_SCHEMAS[1])
        .bind(SYSTEM_SCHEMAS[2])
        .bind(SYSTEM_SCHEMAS[3])
        .fetch_all(self.pool())
        .await?;

        for db in databases {
            let tables: Vec<String> = sqlx::query_scalar(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = ?;",
            )
            .bind(&db)
            .fetch_all(self.pool())
            .await?;

            let mut schemas = Vec::new();
            for table in tables {
                // Administrative tables some deployments carry alongside.
                if table.starts_with("pma__") {
                    continue;
                }

                let columns = sqlx::query(
                    "SELECT column_name, data_type FROM information_schema.columns \
                     WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position;",
                )
                .bind(&db)
                .bind(&table)
                .fetch_all(self.pool())
                .await?
                .iter()
                .map(|row| {
                    Ok(ColumnMeta {
                        name: row.try_get::<String, _>(0)?,
                        data_type: row.try_get::<String, _>(1)?.to_lowercase(),
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;

                schemas.push(TableSchema { name: table, columns });
            }
            map.insert(db, schemas);
        }

        Ok(map)
    }

    /// Deletes rows older than the retention window from one table.
    pub(crate) async fn purge_older_than(
        &self,
        db: &str,
        table: &str,
        days: u32,
    ) -> AppResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM `{db}`.`{table}` WHERE timestamp < NOW() - INTERVAL ? DAY;"
        ))
        .bind(days)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

fn decode_column(row: &MySqlRow, index: usize, column: &ColumnMeta) -> AppResult<Value> {
    let value = match column.data_type.as_str() {
        "float" => row
            .try_get::<Option<f32>, _>(index)?
            .and_then(|v| serde_json::Number::from_f64(f64::from(v)).map(Value::Number))
            .unwrap_or(Value::Null),
        "double" => row
            .try_get::<Option<f64>, _>(index)?
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))
            .unwrap_or(Value::Null),
        "tinyint" | "smallint" | "mediumint" | "int" | "bigint" => row
            .try_get::<Option<i64>, _>(index)?
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "datetime" | "timestamp" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::String(v.format(TIMESTAMP_FORMAT).to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(index)?
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}
