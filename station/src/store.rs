//! Append-only record persistence.
//!
//! `recordDate` is kept as RFC 3339 text for readability, next to
//! `record_ts` (Unix milliseconds) which every filter and ordering uses, so
//! DST offset changes cannot reorder rows.

use std::path::Path;

use chrono::{DateTime, Local};
use log::{info, warn};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::Deserialize;

use crate::error::{Result, StationError};
use crate::record::WeatherRecord;

const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Read filter. The default is every record, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordQuery {
    pub since: Option<DateTime<Local>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub descending: bool,
}

impl RecordQuery {
    /// The `limit` newest records, newest first.
    pub fn latest(limit: usize) -> Self {
        Self {
            since: None,
            limit: Some(limit),
            descending: true,
        }
    }

    pub fn since(since: DateTime<Local>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }
}

pub trait RecordStore {
    /// Persists one validated record. Never retried by the caller.
    fn write(&mut self, record: &WeatherRecord) -> Result<()>;
    fn read(&self, query: &RecordQuery) -> Result<Vec<WeatherRecord>>;
}

/// Rejects invalid records and records older than the newest stored one.
fn check_append(record: &WeatherRecord, newest: Option<DateTime<Local>>) -> Result<()> {
    record.validate()?;
    if let Some(newest) = newest {
        if record.record_date < newest {
            return Err(StationError::DataIntegrity(format!(
                "recordDate {} is older than newest stored record {}",
                record.record_date.to_rfc3339(),
                newest.to_rfc3339()
            )));
        }
    }
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StationError::Storage(format!(
            "database version ({}) is newer than supported schema ({})",
            version, CURRENT_SCHEMA_VERSION
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        version += 1;
        apply_migration(&tx, version)?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => tx.execute_batch(include_str!("schemas/weather_v1.sql"))?,
        _ => {
            return Err(StationError::Storage(format!(
                "no migration defined for version {}",
                version
            )))
        }
    }
    Ok(())
}

fn parse_datetime(value: &str, column: usize) -> std::result::Result<DateTime<Local>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StationError::Storage(format!("{}: {}", path.display(), e)))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("Failed to enable WAL mode: {err}");
        }
        Self::init(conn)
    }

    /// Opens an existing database for reading only: no file is created, no
    /// pragma is set and no migration runs. `None` when the file is missing
    /// or holds no schema yet, which callers serve as an empty snapshot.
    pub fn open_read_only(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            warn!("{} does not exist, reading as empty", path.display());
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StationError::Storage(format!("{}: {}", path.display(), e)))?;
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        match version {
            0 => Ok(None),
            CURRENT_SCHEMA_VERSION => Ok(Some(Self { conn })),
            _ => Err(StationError::Storage(format!(
                "database version ({}) does not match supported schema ({})",
                version, CURRENT_SCHEMA_VERSION
            ))),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    fn newest(&self) -> Result<Option<DateTime<Local>>> {
        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT recordDate FROM weather ORDER BY record_ts DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(newest.map(|s| parse_datetime(&s, 0)).transpose()?)
    }
}

impl RecordStore for SqliteStore {
    fn write(&mut self, record: &WeatherRecord) -> Result<()> {
        check_append(record, self.newest()?)?;
        self.conn.execute(
            "INSERT INTO weather (living_room_temp, bathroom_temp, closet_temp, staircase_temp,
                                  humidity, pressure, recordDate, record_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.living_room_temp,
                record.bathroom_temp,
                record.closet_temp,
                record.staircase_temp,
                record.humidity,
                record.pressure,
                record.record_date.to_rfc3339(),
                record.record_date.timestamp_millis(),
            ],
        )?;
        info!("stored record {}", record.record_date.to_rfc3339());
        Ok(())
    }

    fn read(&self, query: &RecordQuery) -> Result<Vec<WeatherRecord>> {
        let order = if query.descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT living_room_temp, bathroom_temp, closet_temp, staircase_temp,
                    humidity, pressure, recordDate
             FROM weather
             WHERE record_ts >= ?1
             ORDER BY record_ts {order}
             LIMIT ?2"
        );
        let since = query.since.map_or(i64::MIN, |d| d.timestamp_millis());
        // negative LIMIT means no limit in SQLite
        let limit = query
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![since, limit], |row| {
            Ok(WeatherRecord {
                living_room_temp: row.get(0)?,
                bathroom_temp: row.get(1)?,
                closet_temp: row.get(2)?,
                staircase_temp: row.get(3)?,
                humidity: row.get(4)?,
                pressure: row.get(5)?,
                record_date: parse_datetime(&row.get::<_, String>(6)?, 6)?,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

/// Volatile store with the same contract, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<WeatherRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn write(&mut self, record: &WeatherRecord) -> Result<()> {
        let newest = self.records.iter().map(|r| r.record_date).max();
        check_append(record, newest)?;
        self.records.push(record.clone());
        Ok(())
    }

    fn read(&self, query: &RecordQuery) -> Result<Vec<WeatherRecord>> {
        let mut records: Vec<WeatherRecord> = self
            .records
            .iter()
            .filter(|r| query.since.map_or(true, |since| r.record_date >= since))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.record_date);
        if query.descending {
            records.reverse();
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record_at;

    fn seeded<S: RecordStore>(mut store: S) -> anyhow::Result<S> {
        for (day, t) in [(1, 20.0), (2, 21.0), (3, 22.0)] {
            store.write(&record_at(day, 12, t))?;
        }
        Ok(store)
    }

    fn temps(records: &[WeatherRecord]) -> Vec<f64> {
        records.iter().map(|r| r.living_room_temp).collect()
    }

    fn check_contract<S: RecordStore>(store: S) -> anyhow::Result<()> {
        let mut store = seeded(store)?;

        assert_eq!(temps(&store.read(&RecordQuery::default())?), vec![20.0, 21.0, 22.0]);
        assert_eq!(temps(&store.read(&RecordQuery::latest(2))?), vec![22.0, 21.0]);
        assert_eq!(
            temps(&store.read(&RecordQuery::since(record_at(2, 12, 0.0).record_date))?),
            vec![21.0, 22.0]
        );

        let stale = store.write(&record_at(2, 18, 25.0));
        assert!(matches!(stale, Err(StationError::DataIntegrity(_))));

        let mut invalid = record_at(4, 12, 21.0);
        invalid.humidity = -1.0;
        assert!(matches!(store.write(&invalid), Err(StationError::DataIntegrity(_))));

        assert_eq!(store.read(&RecordQuery::default())?.len(), 3);
        Ok(())
    }

    #[test]
    fn sqlite_contract() -> anyhow::Result<()> {
        check_contract(SqliteStore::open_in_memory()?)
    }

    #[test]
    fn memory_contract() -> anyhow::Result<()> {
        check_contract(MemoryStore::new())
    }

    #[test]
    fn sqlite_round_trips_fields() -> anyhow::Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        let record = record_at(5, 9, 21.75);
        store.write(&record)?;
        let read = store.read(&RecordQuery::default())?;
        assert_eq!(read, vec![record]);
        Ok(())
    }

    #[test]
    fn equal_timestamps_are_accepted() -> anyhow::Result<()> {
        let mut store = SqliteStore::open_in_memory()?;
        store.write(&record_at(5, 9, 21.0))?;
        store.write(&record_at(5, 9, 21.5))?;
        assert_eq!(store.read(&RecordQuery::default())?.len(), 2);
        Ok(())
    }

    #[test]
    fn empty_store_reads_empty() -> anyhow::Result<()> {
        let store = SqliteStore::open_in_memory()?;
        assert!(store.read(&RecordQuery::latest(10))?.is_empty());
        Ok(())
    }

    #[test]
    fn read_only_open_never_creates_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("typo.db");
        assert!(SqliteStore::open_read_only(&path)?.is_none());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn read_only_open_of_schemaless_file_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("blank.db");
        drop(Connection::open(&path)?);
        assert!(SqliteStore::open_read_only(&path)?.is_none());
        Ok(())
    }

    #[test]
    fn read_only_store_reads_but_refuses_writes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("enviro.db");
        {
            let mut store = SqliteStore::open(&path)?;
            store.write(&record_at(6, 8, 19.0))?;
        }
        let Some(mut store) = SqliteStore::open_read_only(&path)? else {
            anyhow::bail!("schema missing after write");
        };
        assert_eq!(temps(&store.read(&RecordQuery::default())?), vec![19.0]);
        assert!(matches!(
            store.write(&record_at(7, 8, 20.0)),
            Err(StationError::Storage(_))
        ));
        Ok(())
    }

    #[test]
    fn reopening_keeps_schema() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("enviro.db");
        {
            let mut store = SqliteStore::open(&path)?;
            store.write(&record_at(6, 8, 19.0))?;
        }
        let store = SqliteStore::open(&path)?;
        assert_eq!(temps(&store.read(&RecordQuery::default())?), vec![19.0]);
        Ok(())
    }
}
