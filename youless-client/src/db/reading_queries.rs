use anyhow::{Context, Result};
use sqlx::{Executor, Sqlite, SqlitePool};
use time::PrimitiveDateTime;

use crate::domain::{format_stored_ts, Reading, ReadingRow, TableRef};

/// Whether `table` has been created yet.
pub async fn table_exists<'e, E>(executor: E, table: &TableRef) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )
    .bind(table.name())
    .fetch_optional(executor)
    .await?;

    Ok(found.is_some())
}

/// Tables created elsewhere may declare the value column INTEGER or NUMERIC,
/// in which case SQLite stores whole numbers as integers.
const VALUE_COLUMN: &str = "CAST(energy_consumption AS REAL) AS energy_consumption";

fn into_readings(rows: Vec<ReadingRow>, table: &TableRef) -> Result<Vec<Reading>> {
    rows.into_iter()
        .map(|row| {
            let time = row.time.clone();
            Reading::try_from(row).with_context(|| format!("bad timestamp {time:?} in table {table}"))
        })
        .collect()
}

/// Fetch a time-ordered slice of a reading table, `start` inclusive and
/// `end` exclusive.
pub async fn readings_between(
    pool: &SqlitePool,
    table: &TableRef,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<Reading>> {
    // Stored timestamps are fixed-width text, so lexical order is time order.
    let sql = format!(
        r#"
        SELECT time, {VALUE_COLUMN}, unit
        FROM {}
        WHERE time >= ?1
          AND time <  ?2
        ORDER BY time
        "#,
        table.quoted()
    );

    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(format_stored_ts(start)?)
        .bind(format_stored_ts(end)?)
        .fetch_all(pool)
        .await?;

    into_readings(rows, table)
}

/// Every row of a reading table in time order.
pub async fn all_readings(pool: &SqlitePool, table: &TableRef) -> Result<Vec<Reading>> {
    let sql = format!(
        "SELECT time, {VALUE_COLUMN}, unit FROM {} ORDER BY time",
        table.quoted()
    );

    let rows = sqlx::query_as::<_, ReadingRow>(&sql).fetch_all(pool).await?;

    into_readings(rows, table)
}

/// Most recent reading, or `None` for an empty table.
pub async fn latest_reading(pool: &SqlitePool, table: &TableRef) -> Result<Option<Reading>> {
    let sql = format!(
        "SELECT time, {VALUE_COLUMN}, unit FROM {} ORDER BY time DESC LIMIT 1",
        table.quoted()
    );

    let row = sqlx::query_as::<_, ReadingRow>(&sql).fetch_optional(pool).await?;

    row.map(|r| into_readings(vec![r], table).map(|mut v| v.remove(0)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use time::macros::datetime;

    async fn seeded_pool(table: &TableRef) -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(&format!(
            "CREATE TABLE {} (time TIMESTAMP, energy_consumption REAL, unit TEXT)",
            table.quoted()
        ))
        .execute(&pool)
        .await
        .unwrap();

        for (time, value) in [
            ("2024-01-01 02:00:00", 3.0),
            ("2024-01-01 00:00:00", 1.0),
            ("2024-01-01 01:00:00", 2.0),
        ] {
            sqlx::query(&format!(
                "INSERT INTO {} (time, energy_consumption, unit) VALUES (?1, ?2, 'kWh')",
                table.quoted()
            ))
            .bind(time)
            .bind(value)
            .execute(&pool)
            .await
            .unwrap();
        }

        pool
    }

    #[tokio::test]
    async fn table_exists_reports_presence() {
        let table = TableRef::new("youless_hour").unwrap();
        let pool = seeded_pool(&table).await;

        assert!(table_exists(&pool, &table).await.unwrap());
        assert!(!table_exists(&pool, &TableRef::new("youless_day").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn readings_between_is_half_open_and_ordered() {
        let table = TableRef::new("youless_hour").unwrap();
        let pool = seeded_pool(&table).await;

        let rows = readings_between(
            &pool,
            &table,
            datetime!(2024-01-01 00:00:00),
            datetime!(2024-01-01 02:00:00),
        )
        .await
        .unwrap();

        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert_eq!(rows[0].ts, datetime!(2024-01-01 00:00:00));
    }

    #[tokio::test]
    async fn all_and_latest_readings() {
        let table = TableRef::new("youless_hour").unwrap();
        let pool = seeded_pool(&table).await;

        let all = all_readings(&pool, &table).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].ts < w[1].ts));

        let latest = latest_reading(&pool, &table).await.unwrap().unwrap();
        assert_eq!(latest.ts, datetime!(2024-01-01 02:00:00));
        assert_eq!(latest.value, 3.0);
    }

    #[tokio::test]
    async fn integer_stored_values_read_back_as_floats() {
        let table = TableRef::new("youless_day").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query("CREATE TABLE youless_day (time TIMESTAMP, energy_consumption INTEGER, unit TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO youless_day VALUES ('2024-01-01 00:00:00', 5, 'kWh'), ('2024-01-02 00:00:00', 100.0, 'kWh')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let stored: String = sqlx::query_scalar("SELECT typeof(energy_consumption) FROM youless_day LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "integer");

        let values: Vec<f64> = all_readings(&pool, &table).await.unwrap().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![5.0, 100.0]);

        let latest = latest_reading(&pool, &table).await.unwrap().unwrap();
        assert_eq!(latest.value, 100.0);

        let day_one = readings_between(
            &pool,
            &table,
            datetime!(2024-01-01 00:00:00),
            datetime!(2024-01-02 00:00:00),
        )
        .await
        .unwrap();
        assert_eq!(day_one.len(), 1);
        assert_eq!(day_one[0].value, 5.0);
    }
}
