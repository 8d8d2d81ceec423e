//! Persistent home for deposited traffic counters.
//!
//! A single table with `app_name` as a bound parameter column, rather than
//! one table per application — sidesteps any need to sanitize names beyond
//! what `rusqlite`'s parameter binding already guarantees, and keeps the
//! schema fixed regardless of how many distinct applications are ever seen.

use crate::accumulator::{TrafficCell, TrafficMap};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

pub type TrafficRow = (String, TrafficCell);

/// Query and write surface the query server and deposit loop need.
/// A trait so tests can substitute an in-memory fake without touching disk.
pub trait Store: Send + Sync {
    fn deposit(&self, ts_unix: i64, rows: &[TrafficRow]) -> Result<()>;
    fn fetch_since(&self, ts: i64) -> Result<TrafficMap>;
    fn fetch_between(&self, start: i64, end: i64) -> Result<TrafficMap>;
    fn list_apps(&self) -> Result<Vec<String>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening store at {}", path.as_ref().display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS traffic (
                app_name TEXT NOT NULL,
                ts       INTEGER NOT NULL,
                bytes_rx INTEGER NOT NULL,
                bytes_tx INTEGER NOT NULL,
                pkt_rx   INTEGER NOT NULL,
                pkt_tx   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_traffic_app_ts ON traffic(app_name, ts);",
        )
        .context("creating traffic table")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn fetch_where(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<TrafficMap> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT app_name, SUM(bytes_rx), SUM(bytes_tx), SUM(pkt_rx), SUM(pkt_tx)
             FROM traffic WHERE {clause} GROUP BY app_name"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                TrafficCell {
                    bytes_rx: row.get::<_, i64>(1)? as u64,
                    bytes_tx: row.get::<_, i64>(2)? as u64,
                    pkt_rx: row.get::<_, i64>(3)? as u64,
                    pkt_tx: row.get::<_, i64>(4)? as u64,
                },
            ))
        })?;

        let mut map = TrafficMap::new();
        for row in rows {
            let (name, cell) = row?;
            if !cell.empty() {
                map.insert(name, cell);
            }
        }
        Ok(map)
    }
}

impl Store for SqliteStore {
    fn deposit(&self, ts_unix: i64, rows: &[TrafficRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("opening deposit transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO traffic (app_name, ts, bytes_rx, bytes_tx, pkt_rx, pkt_tx)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (name, cell) in rows {
                stmt.execute(rusqlite::params![
                    name,
                    ts_unix,
                    cell.bytes_rx as i64,
                    cell.bytes_tx as i64,
                    cell.pkt_rx as i64,
                    cell.pkt_tx as i64
                ])?;
            }
        }
        tx.commit().context("committing deposit transaction")?;
        Ok(())
    }

    fn fetch_since(&self, ts: i64) -> Result<TrafficMap> {
        self.fetch_where("ts >= ?1", &[&ts])
    }

    fn fetch_between(&self, start: i64, end: i64) -> Result<TrafficMap> {
        self.fetch_where("ts >= ?1 AND ts <= ?2", &[&start, &end])
    }

    fn list_apps(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT app_name FROM traffic ORDER BY app_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(bytes_rx: u64, bytes_tx: u64) -> TrafficCell {
        TrafficCell { bytes_rx, bytes_tx, pkt_rx: 1, pkt_tx: 1 }
    }

    #[test]
    fn deposit_then_fetch_since_sums_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("traffic.db")).unwrap();

        store.deposit(100, &[("firefox".into(), cell(10, 5))]).unwrap();
        store.deposit(200, &[("firefox".into(), cell(20, 0))]).unwrap();

        let map = store.fetch_since(150).unwrap();
        assert_eq!(map["firefox"].bytes_rx, 20);
        assert!(!map.contains_key("curl"));
    }

    #[test]
    fn fetch_between_respects_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("traffic.db")).unwrap();

        store.deposit(50, &[("app".into(), cell(1, 0))]).unwrap();
        store.deposit(150, &[("app".into(), cell(2, 0))]).unwrap();
        store.deposit(250, &[("app".into(), cell(4, 0))]).unwrap();

        let map = store.fetch_between(100, 200).unwrap();
        assert_eq!(map["app"].bytes_rx, 2);
    }

    #[test]
    fn list_apps_returns_distinct_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("traffic.db")).unwrap();
        store
            .deposit(1, &[("b-app".into(), cell(1, 1)), ("a-app".into(), cell(1, 1))])
            .unwrap();
        store.deposit(2, &[("a-app".into(), cell(1, 1))]).unwrap();

        assert_eq!(store.list_apps().unwrap(), vec!["a-app".to_string(), "b-app".to_string()]);
    }

    #[test]
    fn deposit_skips_zero_rows_silently() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("traffic.db")).unwrap();
        store.deposit(1, &[]).unwrap();
        assert!(store.list_apps().unwrap().is_empty());
    }
}
