//! Spreadsheet store: named sheets made of a header row and data rows.
//!
//! The closure engine only needs four operations (resolve a sheet by name,
//! read the full grid, find the last occupied row, append a batch of rows),
//! captured by the [`SpreadsheetStore`] and [`Sheet`] traits.
//!
//! [`SheetDb`] backs those traits with SQLite, using rusqlite with WAL mode.
//! Each sheet row is stored as a JSON array of cells keyed by its 1-based
//! row number, so row 1 is always the header row. The same database also
//! carries the `activity_log` table (see `activity.rs`).

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::cell::CellValue;
use crate::error::StoreError;

/// A single tabular sheet. Row 0 of `read_all` is the header row.
pub trait Sheet {
    fn name(&self) -> &str;

    /// Full rectangular extent of the sheet, header included.
    fn read_all(&self) -> Result<Vec<Vec<CellValue>>, StoreError>;

    /// 1-based number of the last row holding data, 0 for an empty sheet.
    fn last_occupied_row(&self) -> Result<usize, StoreError>;

    /// Write `rows` starting at 1-based `start_row`. All or nothing.
    fn append_rows(&self, start_row: usize, rows: &[Vec<CellValue>]) -> Result<(), StoreError>;
}

pub trait SpreadsheetStore {
    fn get_sheet(&self, name: &str) -> Result<Option<Box<dyn Sheet + '_>>, StoreError>;
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// SQLite-backed spreadsheet store.
pub struct SheetDb {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl SheetDb {
    /// Open (or create) the store at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        info!("Opening sheet store at {}", path.display());

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        run_migrations(&conn)?;

        Ok(SheetDb {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(SheetDb {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Create a sheet with the given header row. Returns false when a sheet
    /// with that name already exists (its rows are left untouched).
    pub fn create_sheet(&self, name: &str, headers: &[&str]) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sheets (name) VALUES (?1)",
            params![name],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        let header: Vec<CellValue> = headers.iter().map(|h| CellValue::from(*h)).collect();
        conn.execute(
            "INSERT INTO sheet_rows (sheet_name, row_number, cells) VALUES (?1, 1, ?2)",
            params![name, serde_json::to_string(&header)?],
        )?;
        info!(sheet = %name, columns = headers.len(), "Sheet created");
        Ok(true)
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM sheets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl SpreadsheetStore for SheetDb {
    fn get_sheet(&self, name: &str) -> Result<Option<Box<dyn Sheet + '_>>, StoreError> {
        let conn = self.lock()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sheets WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.map(|name| Box::new(DbSheet { db: self, name }) as Box<dyn Sheet + '_>))
    }
}

struct DbSheet<'a> {
    db: &'a SheetDb,
    name: String,
}

impl Sheet for DbSheet<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&self) -> Result<Vec<Vec<CellValue>>, StoreError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT row_number, cells FROM sheet_rows WHERE sheet_name = ?1 ORDER BY row_number",
        )?;
        let stored = stmt
            .query_map(params![self.name], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let last = stored.last().map(|(n, _)| *n).unwrap_or(0).max(0) as usize;
        let mut grid: Vec<Vec<CellValue>> = vec![Vec::new(); last];
        for (row_number, raw) in stored {
            let cells: Vec<CellValue> = serde_json::from_str(&raw)?;
            if let Some(slot) = grid.get_mut(row_number as usize - 1) {
                *slot = cells;
            }
        }

        // Rectangular extent, like a spreadsheet data range
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        for row in grid.iter_mut() {
            row.resize(width, CellValue::empty());
        }
        Ok(grid)
    }

    fn last_occupied_row(&self) -> Result<usize, StoreError> {
        let conn = self.db.lock()?;
        let last: i64 = conn.query_row(
            "SELECT COALESCE(MAX(row_number), 0) FROM sheet_rows WHERE sheet_name = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(last.max(0) as usize)
    }

    fn append_rows(&self, start_row: usize, rows: &[Vec<CellValue>]) -> Result<(), StoreError> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        for (offset, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO sheet_rows (sheet_name, row_number, cells)
                 VALUES (?1, ?2, ?3)",
                params![
                    self.name,
                    (start_row + offset) as i64,
                    serde_json::to_string(row)?
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating sheet store from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// Migration v1: sheets and their rows.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sheets (
            name TEXT PRIMARY KEY,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- one JSON array of cells per 1-based row; row 1 is the header
        CREATE TABLE IF NOT EXISTS sheet_rows (
            sheet_name TEXT NOT NULL REFERENCES sheets(name) ON DELETE CASCADE,
            row_number INTEGER NOT NULL CHECK (row_number >= 1),
            cells TEXT NOT NULL DEFAULT '[]',
            written_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (sheet_name, row_number)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        e
    })?;
    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: activity log.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_activity_log_event ON activity_log(event);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        e
    })?;
    info!("Applied migration v2");
    Ok(())
}
