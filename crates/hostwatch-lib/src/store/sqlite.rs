//! SQLite-backed sample store
//!
//! One append-only table:
//!
//! | column           | type     | constraint                 |
//! |------------------|----------|----------------------------|
//! | `id`             | INTEGER  | primary key, autoincrement |
//! | `timestamp`      | DATETIME | not null                   |
//! | `cpu_percent`    | FLOAT    | nullable                   |
//! | `memory_percent` | FLOAT    | nullable                   |
//! | `disk_percent`   | FLOAT    | nullable                   |
//!
//! Timestamps are written as UTC text (`YYYY-MM-DD HH:MM:SS.ffffff`), which
//! sorts lexicographically in time order. Rows written by other tools may use
//! other layouts, so range filters are decided on the decoded instant.

use super::{validate_sample, SampleStore};
use crate::error::StoreError;
use crate::models::{is_valid_percent, DateRange, NewSample, Sample, FEATURE_COLUMNS};
use chrono::{DateTime, Days, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default sample table name
pub const DEFAULT_TABLE_NAME: &str = "system_stats";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DAY_PREFIX_FORMAT: &str = "%Y-%m-%d";

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite sample store
///
/// The connection is guarded by a mutex, which serializes writers. Each
/// append runs in its own transaction, so readers never observe a partial row.
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
    table: String,
    insert_sql: String,
}

impl SqliteSampleStore {
    /// Open or create the database and sample table (writer side).
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create directory {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(&create_table_sql(table))?;
        validate_schema(&conn, table)?;

        info!(path = %path.display(), table = %table, "Sample store ready");
        Ok(Self::from_connection(conn, table))
    }

    /// Open an existing database for training or scoring.
    ///
    /// Never creates anything: a missing file or table is reported as
    /// [`StoreError::Unavailable`].
    pub fn open_existing(path: &Path, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;

        if !path.exists() {
            return Err(StoreError::Unavailable(format!(
                "database file {:?} not found",
                path
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::Unavailable(format!(
                "table '{}' not found in {:?}",
                table, path
            )));
        }
        validate_schema(&conn, table)?;

        debug!(path = %path.display(), table = %table, "Opened existing sample store");
        Ok(Self::from_connection(conn, table))
    }

    fn from_connection(conn: Connection, table: &str) -> Self {
        Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            insert_sql: format!(
                "INSERT INTO {table} (timestamp, cpu_percent, memory_percent, disk_percent) \
                 VALUES (?1, ?2, ?3, ?4)"
            ),
        }
    }

    /// Table this store reads and writes
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SampleStore for SqliteSampleStore {
    fn append(&self, sample: &NewSample) -> Result<i64, StoreError> {
        validate_sample(sample)?;

        let mut conn = self.lock();
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction().map_err(StoreError::Write)?;
        tx.execute(
            &self.insert_sql,
            params![
                format_timestamp(sample.timestamp),
                sample.cpu_percent,
                sample.memory_percent,
                sample.disk_percent,
            ],
        )
        .map_err(StoreError::Write)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(StoreError::Write)?;

        Ok(id)
    }

    fn query(&self, range: Option<&DateRange>) -> Result<Vec<Sample>, StoreError> {
        let conn = self.lock();
        let columns = "id, timestamp, cpu_percent, memory_percent, disk_percent";

        let raw_rows = match range {
            Some(range) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {columns} FROM {table} WHERE timestamp >= ?1 AND timestamp < ?2 \
                     ORDER BY timestamp ASC, id ASC",
                    table = self.table
                ))?;
                let (lower, upper) = coarse_bounds(range);
                let rows = stmt.query_map(params![lower, upper], read_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {columns} FROM {table} ORDER BY timestamp ASC, id ASC",
                    table = self.table
                ))?;
                let rows = stmt.query_map([], read_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        drop(conn);

        let mut samples = raw_rows
            .into_iter()
            .map(RawRow::into_sample)
            .filter(|sample| match (sample, range) {
                (Ok(sample), Some(range)) => range.contains(sample.timestamp),
                _ => true,
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Rows written by other tools may use a different text layout
        samples.sort_by_key(|s| (s.timestamp, s.id));
        Ok(samples)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

/// Undecoded row as read from SQLite
struct RawRow {
    id: i64,
    timestamp: String,
    values: [Option<f64>; 3],
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        values: [row.get(2)?, row.get(3)?, row.get(4)?],
    })
}

impl RawRow {
    fn into_sample(self) -> Result<Sample, StoreError> {
        let timestamp = parse_timestamp(&self.timestamp).ok_or_else(|| StoreError::CorruptRow {
            id: self.id,
            detail: format!("unparseable timestamp '{}'", self.timestamp),
        })?;

        let mut values = self.values;
        for (value, column) in values.iter_mut().zip(FEATURE_COLUMNS) {
            if let Some(v) = *value {
                if !is_valid_percent(v) {
                    warn!(id = self.id, column = column, value = v, "Out-of-range value read as absent");
                    *value = None;
                }
            }
        }

        Ok(Sample {
            id: self.id,
            timestamp,
            cpu_percent: values[0],
            memory_percent: values[1],
            disk_percent: values[2],
        })
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL,
            cpu_percent FLOAT,
            memory_percent FLOAT,
            disk_percent FLOAT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}(timestamp);"
    )
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub(crate) fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

/// Check that the table carries every expected column with the right nullability
fn validate_schema(conn: &Connection, table: &str) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let not_null: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok((name, not_null != 0, pk != 0))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let find = |name: &str| columns.iter().find(|(col, _, _)| col == name);
    let mismatch = |detail: String| StoreError::SchemaMismatch {
        table: table.to_string(),
        detail,
    };

    match find("id") {
        Some((_, _, true)) => {}
        Some(_) => return Err(mismatch("column 'id' is not the primary key".to_string())),
        None => return Err(mismatch("missing column 'id'".to_string())),
    }
    match find("timestamp") {
        Some((_, true, _)) => {}
        Some(_) => return Err(mismatch("column 'timestamp' must be NOT NULL".to_string())),
        None => return Err(mismatch("missing column 'timestamp'".to_string())),
    }
    for column in FEATURE_COLUMNS {
        match find(column) {
            Some((_, false, _)) => {}
            Some(_) => return Err(mismatch(format!("column '{column}' must be nullable"))),
            None => return Err(mismatch(format!("missing column '{column}'"))),
        }
    }

    Ok(())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Day-prefix text bounds that contain every row of `range` in any accepted
/// timestamp layout.
///
/// Rows may carry a UTC offset of up to one day, so the bounds are widened by
/// a day on each side. The exact `[start, end)` check runs on decoded rows.
fn coarse_bounds(range: &DateRange) -> (String, String) {
    let lower = range
        .start
        .checked_sub_days(Days::new(1))
        .map(|ts| ts.format(DAY_PREFIX_FORMAT).to_string())
        .unwrap_or_default();
    let upper = range
        .end
        .checked_add_days(Days::new(1))
        .map(|ts| ts.format(DAY_PREFIX_FORMAT).to_string())
        .unwrap_or_else(|| "~".to_string());
    (lower, upper)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteSampleStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteSampleStore::open(&dir.path().join("stats.db"), DEFAULT_TABLE_NAME)
            .unwrap();
        (dir, store)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let (_dir, store) = setup();
        let ts = Utc.timestamp_micros(1_710_072_000_123_456).unwrap();
        let sample = NewSample::new(ts, Some(12.5), None, Some(73.25));

        let id = store.append(&sample).unwrap();
        let samples = store.query(None).unwrap();

        assert_eq!(samples.len(), 1);
        let stored = &samples[0];
        assert_eq!(stored.id, id);
        assert_eq!(stored.timestamp, sample.timestamp);
        assert_eq!(stored.cpu_percent, sample.cpu_percent);
        assert_eq!(stored.memory_percent, None);
        assert_eq!(stored.disk_percent, sample.disk_percent);
    }

    #[test]
    fn test_query_orders_regardless_of_insert_order() {
        let (_dir, store) = setup();
        for (h, cpu) in [(12, 3.0), (9, 1.0), (23, 4.0), (10, 2.0)] {
            store.append(&NewSample::new(at(h, 0), Some(cpu), None, None)).unwrap();
        }

        let samples = store.query(None).unwrap();
        let cpus: Vec<_> = samples.iter().map(|s| s.cpu_percent.unwrap()).collect();
        assert_eq!(cpus, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_ids_increase() {
        let (_dir, store) = setup();
        let a = store.append(&NewSample::new(at(1, 0), None, None, None)).unwrap();
        let b = store.append(&NewSample::new(at(0, 0), None, None, None)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_date_range_filter() {
        let (_dir, store) = setup();
        let day = at(0, 0);
        store.append(&NewSample::new(day - Duration::seconds(1), Some(1.0), None, None)).unwrap();
        store.append(&NewSample::new(day, Some(2.0), None, None)).unwrap();
        store.append(&NewSample::new(at(23, 59), Some(3.0), None, None)).unwrap();
        store.append(&NewSample::new(day + Duration::days(1), Some(4.0), None, None)).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = DateRange::from_days(date, date);
        let samples = store.query(Some(&range)).unwrap();

        let cpus: Vec<_> = samples.iter().map(|s| s.cpu_percent.unwrap()).collect();
        assert_eq!(cpus, vec![2.0, 3.0]);
    }

    #[test]
    fn test_empty_query_is_not_an_error() {
        let (_dir, store) = setup();
        assert!(store.query(None).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_invalid_sample_leaves_no_row() {
        let (_dir, store) = setup();
        let result = store.append(&NewSample::new(at(1, 0), Some(150.0), None, None));
        assert!(matches!(
            result,
            Err(StoreError::InvalidSample { column: "cpu_percent", .. })
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let (_dir, store) = setup();
        store.append(&NewSample::new(at(1, 0), Some(1.0), None, None)).unwrap();

        // Make every further insert fail inside the transaction
        store
            .lock()
            .execute_batch(&format!(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON {DEFAULT_TABLE_NAME}
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
            ))
            .unwrap();

        let result = store.append(&NewSample::new(at(2, 0), Some(2.0), None, None));
        assert!(matches!(result, Err(StoreError::Write(_))));

        let samples = store.query(None).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].cpu_percent, Some(1.0));
    }

    #[test]
    fn test_open_existing_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.db");
        let result = SqliteSampleStore::open_existing(&path, DEFAULT_TABLE_NAME);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_existing_missing_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.db");
        SqliteSampleStore::open(&path, "other_table").unwrap();

        let result = SqliteSampleStore::open_existing(&path, DEFAULT_TABLE_NAME);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_open_existing_reads_writer_rows() {
        let (dir, store) = setup();
        store.append(&NewSample::new(at(1, 0), Some(5.0), Some(6.0), Some(7.0))).unwrap();

        let reader =
            SqliteSampleStore::open_existing(&dir.path().join("stats.db"), DEFAULT_TABLE_NAME)
                .unwrap();
        assert_eq!(reader.count().unwrap(), 1);
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE system_stats (id INTEGER PRIMARY KEY, timestamp DATETIME NOT NULL, cpu_percent FLOAT);",
            )
            .unwrap();

        let result = SqliteSampleStore::open_existing(&path, DEFAULT_TABLE_NAME);
        assert!(matches!(result, Err(StoreError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_reads_rows_without_fractional_seconds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.db");
        let store = SqliteSampleStore::open(&path, DEFAULT_TABLE_NAME).unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-10 08:30:00', 40.0)",
                [],
            )
            .unwrap();

        let samples = store.query(None).unwrap();
        assert_eq!(samples[0].timestamp, at(8, 30));
    }

    #[test]
    fn test_date_range_filter_on_foreign_layouts() {
        let (_dir, store) = setup();
        store
            .lock()
            .execute_batch(
                "INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-10 00:00:00', 1.0);
                 INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-11 00:00:00', 2.0);
                 INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-10T12:00:00+00:00', 3.0);
                 INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-11T01:00:00+02:00', 4.0);
                 INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-09T23:00:00-02:00', 5.0);
                 INSERT INTO system_stats (timestamp, cpu_percent) VALUES ('2024-03-09 23:59:59', 6.0);",
            )
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let samples = store.query(Some(&DateRange::from_days(date, date))).unwrap();

        let cpus: Vec<_> = samples.iter().map(|s| s.cpu_percent.unwrap()).collect();
        assert_eq!(cpus, vec![1.0, 5.0, 3.0, 4.0]);
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let dir = TempDir::new().unwrap();
        let result = SqliteSampleStore::open(&dir.path().join("x.db"), "stats; DROP TABLE x");
        assert!(matches!(result, Err(StoreError::InvalidTableName(_))));
    }

    #[test]
    fn test_concurrent_readers_see_whole_rows() {
        let (_dir, store) = setup();
        let store = Arc::new(store);

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let v = i as f64;
                    store
                        .append(&NewSample::new(at(0, 0) + Duration::seconds(i), Some(v), Some(v), Some(v)))
                        .unwrap();
                }
            })
        };

        for _ in 0..20 {
            for sample in store.query(None).unwrap() {
                assert_eq!(sample.cpu_percent, sample.memory_percent);
                assert_eq!(sample.memory_percent, sample.disk_percent);
            }
        }

        writer.join().unwrap();
        assert_eq!(store.count().unwrap(), 50);
    }
}
