use super::{Namespace, StorageBackend, StoreResult};
use crate::client::ClientKey;
use crate::errors::StubError;
use crate::logging::append_run_log;
use crate::request::system_time_unix;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const READ_POOL_SIZE: usize = 4;

/// SQLite-backed storage; production. One row per record, keyed by
/// (client, namespace, position); `persist` rewrites a resource's rows in a
/// single transaction so readers never observe a partial sequence.
pub struct SqliteBackend {
    write_conn: Mutex<Connection>,
    read_pool: ReadPool,
    db_path: PathBuf,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "store.sqlite.open",
            json!({ "path": path.display().to_string() }),
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StubError::Storage(e.to_string()))?;
        }

        let existed_before_open = path.exists();

        // Reject zero-byte files — they indicate prior corruption.
        if existed_before_open {
            let meta =
                std::fs::metadata(&path).map_err(|e| StubError::Storage(e.to_string()))?;
            if meta.len() == 0 {
                return Err(StubError::Storage(format!(
                    "state database is 0 bytes (corrupt): {}",
                    path.display()
                )));
            }
        }

        let mut write_conn = Connection::open(&path).map_err(db_err)?;
        configure_write_connection(&write_conn)?;

        // Run quick_check on existing databases to catch corruption early.
        if existed_before_open {
            let integrity: String = write_conn
                .pragma_query_value(None, "quick_check", |row| row.get(0))
                .map_err(db_err)?;
            if integrity != "ok" {
                return Err(StubError::Storage(format!(
                    "state database failed integrity check: {integrity}"
                )));
            }
        }

        run_migrations(&mut write_conn)?;

        let read_pool = ReadPool::open(&path, READ_POOL_SIZE)?;
        Ok(Self {
            write_conn: Mutex::new(write_conn),
            read_pool,
            db_path: path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn with_write_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self
            .write_conn
            .lock()
            .map_err(|_| StubError::Storage("write connection lock poisoned".to_string()))?;
        f(&mut conn)
    }
}

impl StorageBackend for SqliteBackend {
    fn load(&self, client: &ClientKey, ns: Namespace) -> StoreResult<Vec<String>> {
        self.read_pool.with_conn(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT payload FROM records
                     WHERE client = ?1 AND namespace = ?2
                     ORDER BY position ASC",
                )
                .map_err(db_err)?;
            let rows = statement
                .query_map(params![client.as_str(), ns.as_str()], |row| {
                    row.get::<_, String>(0)
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })
    }

    fn persist(&self, client: &ClientKey, ns: Namespace, records: &[String]) -> StoreResult<()> {
        self.with_write_conn(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "DELETE FROM records WHERE client = ?1 AND namespace = ?2",
                params![client.as_str(), ns.as_str()],
            )
            .map_err(db_err)?;
            {
                let mut insert = tx
                    .prepare(
                        "INSERT INTO records (client, namespace, position, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(db_err)?;
                for (position, payload) in records.iter().enumerate() {
                    insert
                        .execute(params![
                            client.as_str(),
                            ns.as_str(),
                            position as i64,
                            payload
                        ])
                        .map_err(db_err)?;
                }
            }
            tx.commit().map_err(db_err)
        })
    }

    fn clear(&self, client: &ClientKey, ns: Namespace) -> StoreResult<()> {
        self.with_write_conn(|conn| {
            conn.execute(
                "DELETE FROM records WHERE client = ?1 AND namespace = ?2",
                params![client.as_str(), ns.as_str()],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }
}

#[derive(Clone)]
struct ReadPool {
    conns: Arc<Vec<Mutex<Connection>>>,
    next: Arc<AtomicUsize>,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> StoreResult<Self> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(db_err)?;
            conn.busy_timeout(std::time::Duration::from_secs(3))
                .map_err(db_err)?;
            conns.push(Mutex::new(conn));
        }

        Ok(Self {
            conns: Arc::new(conns),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let guard = self.conns[idx]
            .lock()
            .map_err(|_| StubError::Storage("read connection lock poisoned".to_string()))?;
        f(&guard)
    }
}

fn configure_write_connection(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(db_err)?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(db_err)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(db_err)?;
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    let migrations = [(1_i64, include_str!("../../migrations/0001_records.sql"))];

    conn.execute_batch("BEGIN IMMEDIATE; CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL); COMMIT;")
        .map_err(db_err)?;

    for (version, sql) in migrations {
        let exists = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1",
                [version],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?
            .is_some();

        if exists {
            continue;
        }

        append_run_log(
            "info",
            "store.sqlite.migration.applying",
            json!({ "version": version }),
        );
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch(sql).map_err(db_err)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![version, system_time_unix()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
    }

    Ok(())
}

fn db_err(error: rusqlite::Error) -> StubError {
    StubError::Storage(error.to_string())
}
