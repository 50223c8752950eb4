use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqliteConnection,
};
use time::PrimitiveDateTime;
use youless_client::{
    db::table_exists,
    domain::{format_stored_ts, Reading, TableRef},
};

use crate::{
    config::StoreConfig,
    pipeline::{IngestError, MergeResult, ReadingStore},
};

/// Columns every reading table must carry.
const REQUIRED_COLUMNS: [&str; 3] = ["time", "energy_consumption", "unit"];

/// Rows per multi-row INSERT; three binds each keeps well under SQLite's
/// bound-parameter limit.
const INSERT_CHUNK_ROWS: usize = 300;

/// One async mutex per table name, so merges into the same table run one at
/// a time while merges into different tables do not wait on each other.
#[derive(Default)]
struct TableLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TableLocks {
    fn for_table(&self, table: &TableRef) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(table.name().to_string()).or_default().clone()
    }
}

/// Merge engine backed by a SQLite database.
pub struct SqliteMergeSink {
    pool: SqlitePool,
    locks: TableLocks,
}

impl SqliteMergeSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: TableLocks::default(),
        }
    }

    pub async fn connect(cfg: &StoreConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&cfg.uri)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(cfg.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database, kept alive for the pool's
    /// lifetime.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn merge_locked(&self, table: &TableRef, rows: &[StoredRow<'_>]) -> Result<MergeResult, IngestError> {
        // Take the write lock up front so a writer on another table makes us
        // wait out `busy_timeout` instead of failing the lock upgrade.
        // Dropping `tx` on any early return rolls the whole merge back.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let result = if table_exists(&mut *tx, table).await? {
            check_schema(&mut tx, table).await?;
            reconcile(&mut tx, table, rows).await?
        } else {
            tracing::warn!(table = %table, "table does not exist, creating");
            bootstrap(&mut tx, table, rows).await?
        };

        tx.commit().await?;
        Ok(result)
    }
}

/// Collapse duplicate timestamps, the later occurrence winning, and order by
/// time.
fn last_write_wins(batch: &[Reading]) -> Vec<&Reading> {
    let mut by_ts: BTreeMap<PrimitiveDateTime, &Reading> = BTreeMap::new();
    for reading in batch {
        by_ts.insert(reading.ts, reading);
    }
    by_ts.into_values().collect()
}

async fn check_schema(conn: &mut SqliteConnection, table: &TableRef) -> Result<(), IngestError> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
        .bind(table.name())
        .fetch_all(&mut *conn)
        .await?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::SchemaMismatch {
            table: table.name().to_string(),
            reason: format!("missing columns {missing:?}, found {columns:?}"),
        })
    }
}

/// A reading with its timestamp already rendered in the stored layout.
struct StoredRow<'a> {
    time: String,
    value: f64,
    unit: &'a str,
}

fn encode_rows<'a>(rows: &[&'a Reading]) -> Result<Vec<StoredRow<'a>>, IngestError> {
    rows.iter()
        .map(|&r| {
            let time = format_stored_ts(r.ts)
                .map_err(|e| IngestError::StoreUnavailable(format!("cannot encode timestamp {}: {e}", r.ts)))?;
            Ok(StoredRow {
                time,
                value: r.value,
                unit: &r.unit,
            })
        })
        .collect()
}

async fn insert_rows(conn: &mut SqliteConnection, target: &str, rows: &[StoredRow<'_>]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("INSERT INTO {target} (time, energy_consumption, unit) "));
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(r.time.clone())
                .push_bind(r.value)
                .push_bind(r.unit.to_string());
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn bootstrap(conn: &mut SqliteConnection, table: &TableRef, rows: &[StoredRow<'_>]) -> Result<MergeResult, IngestError> {
    let target = table.quoted();
    sqlx::query(&format!(
        "CREATE TABLE {target} (
            time TIMESTAMP NOT NULL PRIMARY KEY,
            energy_consumption REAL NOT NULL,
            unit TEXT NOT NULL
        )"
    ))
    .execute(&mut *conn)
    .await?;

    let inserted = insert_rows(conn, &target, rows).await?;
    Ok(MergeResult { inserted, updated: 0 })
}

/// Stage the batch, update rows with a matching timestamp, then insert the
/// timestamps the table has not seen. Rows outside the batch are untouched.
async fn reconcile(conn: &mut SqliteConnection, table: &TableRef, rows: &[StoredRow<'_>]) -> Result<MergeResult, IngestError> {
    let target = table.quoted();
    let staging = format!("temp.\"merge_{}\"", table.name());

    sqlx::query(&format!("DROP TABLE IF EXISTS {staging}"))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!(
        "CREATE TABLE {staging} (time TEXT PRIMARY KEY, energy_consumption REAL NOT NULL, unit TEXT NOT NULL)"
    ))
    .execute(&mut *conn)
    .await?;
    insert_rows(conn, &staging, rows).await?;

    let updated = sqlx::query(&format!(
        r#"
        UPDATE {target}
        SET energy_consumption = b.energy_consumption,
            unit = b.unit
        FROM {staging} AS b
        WHERE {target}.time = b.time
        "#
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let inserted = sqlx::query(&format!(
        r#"
        INSERT INTO {target} (time, energy_consumption, unit)
        SELECT b.time, b.energy_consumption, b.unit
        FROM {staging} AS b
        WHERE NOT EXISTS (
            SELECT 1 FROM {target} AS old
            WHERE old.time = b.time
        )
        "#
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query(&format!("DROP TABLE {staging}"))
        .execute(&mut *conn)
        .await?;

    Ok(MergeResult { inserted, updated })
}

#[async_trait::async_trait]
impl ReadingStore for SqliteMergeSink {
    async fn merge(&self, table: &TableRef, batch: &[Reading]) -> Result<MergeResult, IngestError> {
        if batch.is_empty() {
            tracing::info!(table = %table, "no data to be stored");
            return Ok(MergeResult::default());
        }

        let rows = encode_rows(&last_write_wins(batch))?;

        let lock = self.locks.for_table(table);
        let _guard = lock.lock().await;

        match self.merge_locked(table, &rows).await {
            Ok(res) => {
                metrics::counter!("youless_merge_inserted_total", "table" => table.name().to_string())
                    .increment(res.inserted);
                metrics::counter!("youless_merge_updated_total", "table" => table.name().to_string())
                    .increment(res.updated);
                tracing::info!(
                    table = %table,
                    updated = res.updated,
                    inserted = res.inserted,
                    "merged batch"
                );
                Ok(res)
            }
            Err(e) => {
                metrics::counter!("youless_merge_errors_total", "table" => table.name().to_string()).increment(1);
                tracing::error!(table = %table, error = %e, "merge rolled back");
                Err(e)
            }
        }
    }
}
