use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::types::Patch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub device: String,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub device: String,
    pub sent_at: DateTime<Utc>,
    pub patch: Patch,
    pub error: Option<String>,
}

impl DispatchRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub fn init(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    info!("Initializing local cache at {}", path.display());
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY,
            device TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS snapshots_device ON snapshots (device, id);
        CREATE TABLE IF NOT EXISTS dispatches (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            device TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            patch TEXT NOT NULL,
            error TEXT
        );",
    )?;
    Ok(())
}

/// Stores the raw body of a successful shadow fetch.
pub fn record_snapshot(conn: &Connection, device: &str, fetched_at: DateTime<Utc>, body: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots (device, fetched_at, body) VALUES (?1, ?2, ?3)",
        params![device, fetched_at, body],
    )?;
    Ok(())
}

pub fn latest_snapshot(conn: &Connection, device: &str) -> Result<Option<CachedSnapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT device, fetched_at, body FROM snapshots WHERE device = ?1 ORDER BY id DESC LIMIT 1",
            params![device],
            |row| {
                Ok(CachedSnapshot {
                    device: row.get(0)?,
                    fetched_at: row.get(1)?,
                    body: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(snapshot)
}

/// Keeps only the newest `keep` snapshots of a device.
pub fn prune_snapshots(conn: &Connection, device: &str, keep: u32) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM snapshots WHERE device = ?1 AND id NOT IN (
            SELECT id FROM snapshots WHERE device = ?1 ORDER BY id DESC LIMIT ?2
        )",
        params![device, keep],
    )?;
    if removed > 0 {
        info!(device, removed, "Pruned cached snapshots");
    }
    Ok(removed)
}

pub fn record_dispatch(
    conn: &Connection,
    device: &str,
    patch: &Patch,
    error: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM dispatches", [], |row| row.get(0))?;
    conn.execute(
        "INSERT INTO dispatches (id, seq, device, sent_at, patch, error) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            seq,
            device,
            Utc::now(),
            serde_json::to_string(patch)?,
            error,
        ],
    )?;
    info!(%id, device, ok = error.is_none(), "Recorded dispatch");
    Ok(id)
}

/// Newest first.
pub fn recent_dispatches(conn: &Connection, device: &str, limit: u32) -> Result<Vec<DispatchRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, device, sent_at, patch, error FROM dispatches WHERE device = ?1 ORDER BY seq DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![device, limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, DateTime<Utc>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, device, sent_at, patch, error) = row?;
        records.push(DispatchRecord {
            id: Uuid::parse_str(&id)?,
            device,
            sent_at,
            patch: serde_json::from_str(&patch)?,
            error,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn patch(unit: &str, field: &str, value: &str) -> Patch {
        let mut changes = BTreeMap::new();
        changes.insert(field.to_string(), value.to_string());
        let mut units = BTreeMap::new();
        units.insert(unit.to_string(), changes);
        Patch(units)
    }

    #[test]
    fn latest_snapshot_per_device() {
        let conn = memory();
        assert!(latest_snapshot(&conn, "vm-01").unwrap().is_none());

        record_snapshot(&conn, "vm-01", Utc::now(), "{\"v\":1}").unwrap();
        record_snapshot(&conn, "vm-02", Utc::now(), "{\"v\":9}").unwrap();
        record_snapshot(&conn, "vm-01", Utc::now(), "{\"v\":2}").unwrap();

        let latest = latest_snapshot(&conn, "vm-01").unwrap().unwrap();
        assert_eq!(latest.body, "{\"v\":2}");
        assert_eq!(latest.device, "vm-01");
    }

    #[test]
    fn prune_keeps_newest() {
        let conn = memory();
        for i in 0..5 {
            record_snapshot(&conn, "vm-01", Utc::now(), &format!("{{\"v\":{i}}}")).unwrap();
        }
        record_snapshot(&conn, "vm-02", Utc::now(), "{}").unwrap();

        assert_eq!(prune_snapshots(&conn, "vm-01", 2).unwrap(), 3);
        assert_eq!(latest_snapshot(&conn, "vm-01").unwrap().unwrap().body, "{\"v\":4}");
        assert!(latest_snapshot(&conn, "vm-02").unwrap().is_some());
    }

    #[test]
    fn dispatch_log_newest_first() {
        let conn = memory();
        let first = record_dispatch(&conn, "vm-01", &patch("Unit_1", "CreditCost", "3"), None).unwrap();
        let second =
            record_dispatch(&conn, "vm-01", &patch("Unit_2", "IsEnable", "0"), Some("503")).unwrap();
        record_dispatch(&conn, "vm-02", &patch("Unit_1", "CountLimit", "9"), None).unwrap();

        let log = recent_dispatches(&conn, "vm-01", 10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, second);
        assert!(!log[0].succeeded());
        assert_eq!(log[1].id, first);
        assert_eq!(log[1].patch, patch("Unit_1", "CreditCost", "3"));

        assert_eq!(recent_dispatches(&conn, "vm-01", 1).unwrap().len(), 1);
    }
}
