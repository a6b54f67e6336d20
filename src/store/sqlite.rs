// SQLite time-series store. One packets table; tags as canonical JSON,
// fields as a JSON object queried with the JSON1 functions.

use super::{AggregateRow, StoreError, TimeSeriesStore};
use crate::models::{Packet, TagSet, Window, canonical_tags};
use crate::policy::{QueryColumn, ReducerOp, ident_ok};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS packets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                measurement TEXT NOT NULL,
                ts INTEGER NOT NULL,
                tags TEXT NOT NULL,
                fields TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_packets_series_ts ON packets(measurement, tags, ts)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Packets in a measurement, ascending by timestamp. Each tag-filter
    /// entry must match exactly; packets may carry additional tags.
    #[instrument(skip(self, tag_filter), fields(repo = "store", operation = "find_packets"))]
    pub async fn find_packets(
        &self,
        measurement: &str,
        tag_filter: &TagSet,
        from_ts: Option<i64>,
        to_ts: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Packet>, StoreError> {
        let mut sql = String::from(
            "SELECT ts, tags, fields FROM packets WHERE measurement = ? AND ts > ? AND ts <= ?",
        );
        for key in tag_filter.keys() {
            if !ident_ok(key) {
                return Err(StoreError::InvalidIdentifier(key.clone()));
            }
            let _ = write!(sql, " AND json_extract(tags, '$.{}') = ?", key);
        }
        sql.push_str(" ORDER BY ts ASC LIMIT ?");

        let mut query = sqlx::query(&sql)
            .bind(measurement)
            .bind(from_ts.unwrap_or(i64::MIN))
            .bind(to_ts.unwrap_or(i64::MAX));
        for value in tag_filter.values() {
            query = query.bind(value);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_packet_row(&row)?);
        }
        Ok(out)
    }

    /// Delete packets in a measurement older than cutoff_ts.
    #[instrument(skip(self), fields(repo = "store", operation = "delete_before"))]
    pub async fn delete_before(&self, measurement: &str, cutoff_ts: i64) -> Result<u64, StoreError> {
        let r = sqlx::query("DELETE FROM packets WHERE measurement = $1 AND ts < $2")
            .bind(measurement)
            .bind(cutoff_ts)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "store", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for SqliteStore {
    #[instrument(skip(self), fields(repo = "store", operation = "list_distinct_series"))]
    async fn list_distinct_series(&self, measurement: &str) -> Result<Vec<TagSet>, StoreError> {
        let rows =
            sqlx::query("SELECT DISTINCT tags FROM packets WHERE measurement = $1 ORDER BY tags")
                .bind(measurement)
                .fetch_all(&self.pool)
                .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let tags: String = row.try_get("tags")?;
            let parsed: TagSet = serde_json::from_str(&tags)
                .map_err(|e| StoreError::MalformedRow(format!("tags {:?}: {}", tags, e)))?;
            out.push(parsed);
        }
        Ok(out)
    }

    async fn first_timestamp(
        &self,
        measurement: &str,
        tags: &TagSet,
    ) -> Result<Option<i64>, StoreError> {
        let ts = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(ts) FROM packets WHERE measurement = $1 AND tags = $2",
        )
        .bind(measurement)
        .bind(canonical_tags(tags))
        .fetch_one(&self.pool)
        .await?;
        Ok(ts)
    }

    async fn last_timestamp(
        &self,
        measurement: &str,
        tags: &TagSet,
    ) -> Result<Option<i64>, StoreError> {
        let ts = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(ts) FROM packets WHERE measurement = $1 AND tags = $2",
        )
        .bind(measurement)
        .bind(canonical_tags(tags))
        .fetch_one(&self.pool)
        .await?;
        Ok(ts)
    }

    #[instrument(skip(self, tags, columns), fields(repo = "store", operation = "query_aggregate"))]
    async fn query_aggregate(
        &self,
        measurement: &str,
        tags: &TagSet,
        window: Window,
        columns: &[QueryColumn],
    ) -> Result<Vec<AggregateRow>, StoreError> {
        let mut sql = String::from("SELECT COUNT(*) AS sample_count");
        for qc in columns {
            if !ident_ok(&qc.alias) {
                return Err(StoreError::InvalidIdentifier(qc.alias.clone()));
            }
            if !ident_ok(&qc.column) {
                return Err(StoreError::InvalidIdentifier(qc.column.clone()));
            }
            let _ = match qc.op {
                ReducerOp::Mean => write!(
                    sql,
                    ", AVG(json_extract(fields, '$.{col}')) AS \"{alias}\"",
                    col = qc.column,
                    alias = qc.alias
                ),
                ReducerOp::Sum => write!(
                    sql,
                    ", SUM(json_extract(fields, '$.{col}')) AS \"{alias}\"",
                    col = qc.column,
                    alias = qc.alias
                ),
                ReducerOp::Min => write!(
                    sql,
                    ", MIN(json_extract(fields, '$.{col}')) AS \"{alias}\"",
                    col = qc.column,
                    alias = qc.alias
                ),
                ReducerOp::Max => write!(
                    sql,
                    ", MAX(json_extract(fields, '$.{col}')) AS \"{alias}\"",
                    col = qc.column,
                    alias = qc.alias
                ),
                // Aggregate functions cannot express "value at latest ts";
                // a scalar subquery over the same window can.
                ReducerOp::Last => write!(
                    sql,
                    ", (SELECT json_extract(p2.fields, '$.{col}') FROM packets p2 \
                     WHERE p2.measurement = $1 AND p2.tags = $2 AND p2.ts > $3 AND p2.ts <= $4 \
                     AND json_extract(p2.fields, '$.{col}') IS NOT NULL \
                     ORDER BY p2.ts DESC, p2.id DESC LIMIT 1) AS \"{alias}\"",
                    col = qc.column,
                    alias = qc.alias
                ),
            };
        }
        sql.push_str(
            " FROM packets WHERE measurement = $1 AND tags = $2 AND ts > $3 AND ts <= $4",
        );

        let row = sqlx::query(&sql)
            .bind(measurement)
            .bind(canonical_tags(tags))
            .bind(window.start)
            .bind(window.stop)
            .fetch_one(&self.pool)
            .await?;

        let sample_count: i64 = row.try_get("sample_count")?;
        if sample_count == 0 {
            return Ok(vec![]);
        }

        let mut out = AggregateRow::new();
        for qc in columns {
            let value: Option<f64> = row.try_get(qc.alias.as_str())?;
            out.insert(qc.alias.clone(), value);
        }
        Ok(vec![out])
    }

    #[instrument(skip(self, packet), fields(repo = "store", operation = "insert"))]
    async fn insert(&self, measurement: &str, packet: &Packet) -> Result<(), StoreError> {
        let fields = serde_json::to_string(&packet.fields)
            .map_err(|e| StoreError::MalformedRow(format!("fields: {}", e)))?;
        sqlx::query("INSERT INTO packets (measurement, ts, tags, fields) VALUES ($1, $2, $3, $4)")
            .bind(measurement)
            .bind(packet.timestamp)
            .bind(canonical_tags(&packet.tags))
            .bind(fields)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_packet_row(row: &SqliteRow) -> Result<Packet, StoreError> {
    let ts: i64 = row.try_get("ts")?;
    let tags: String = row.try_get("tags")?;
    let fields: String = row.try_get("fields")?;
    let tags: TagSet = serde_json::from_str(&tags)
        .map_err(|e| StoreError::MalformedRow(format!("tags {:?}: {}", tags, e)))?;
    let fields = serde_json::from_str(&fields)
        .map_err(|e| StoreError::MalformedRow(format!("fields {:?}: {}", fields, e)))?;
    Ok(Packet {
        timestamp: ts,
        tags,
        fields,
    })
}
