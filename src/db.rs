use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, Error as SqliteError, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

const SEED_ASSETS: &str = include_str!("../data/seed.json");

const ASSET_COLUMNS: &str =
    "id, name, description, latitude, longitude, url, category, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub url: String,
    pub category: Option<String>,
    pub created_at: String,
}

impl Asset {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            url: row.get(5)?,
            category: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    assets: Vec<SeedAsset>,
}

#[derive(Debug, Deserialize)]
struct SeedAsset {
    id: i64,
    name: String,
    description: Option<String>,
    latitude: f64,
    longitude: f64,
    url: String,
    category: Option<String>,
}

/// Local SQLite copy of the bundled assets, seeded on first open.
pub struct AssetsDatabase {
    connection: Mutex<Connection>,
    path: PathBuf,
    recovered: bool,
}

impl AssetsDatabase {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(database_file);

        let (connection, recovered) = match establish(&db_path) {
            Ok(connection) => (connection, false),
            Err(AppError::Database(err)) if should_attempt_recovery(&err, &db_path) => {
                warn!(
                    target: "database_bootstrap",
                    path = %db_path.display(),
                    error = %err,
                    "assets database failed to open, rebuilding from seed"
                );
                recover_store(&db_path)?;
                (establish(&db_path)?, true)
            }
            Err(err) => return Err(err),
        };
        info!(
            target: "database_bootstrap",
            path = %db_path.display(),
            recovered,
            "assets database ready"
        );

        Ok(Self {
            connection: Mutex::new(connection),
            path: db_path,
            recovered,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn was_recovered(&self) -> bool {
        self.recovered
    }

    pub fn get_all_assets(&self) -> AppResult<Vec<Asset>> {
        let connection = self.connection.lock();
        let mut stmt =
            connection.prepare(&format!("SELECT {ASSET_COLUMNS} FROM assets ORDER BY id"))?;
        let assets = stmt
            .query_map([], Asset::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    pub fn get_asset_by_id(&self, id: i64) -> AppResult<Option<Asset>> {
        let connection = self.connection.lock();
        let asset = connection
            .query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
                [id],
                Asset::from_row,
            )
            .optional()?;
        Ok(asset)
    }

    pub fn get_assets_by_category(&self, category: &str) -> AppResult<Vec<Asset>> {
        let connection = self.connection.lock();
        let mut stmt = connection.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE category = ?1 ORDER BY id"
        ))?;
        let assets = stmt
            .query_map([category], Asset::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    pub fn count(&self) -> AppResult<i64> {
        let connection = self.connection.lock();
        Ok(connection.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?)
    }
}

fn establish(db_path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    let mode: String =
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        warn!(target: "database_bootstrap", mode = %mode, "WAL journal mode unavailable");
    }
    run_migrations(&connection)?;
    seed_assets(&connection)?;
    Ok(connection)
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            url TEXT NOT NULL,
            category TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_assets_category ON assets(category);
        CREATE INDEX IF NOT EXISTS idx_assets_coordinates ON assets(latitude, longitude);
        "#,
    )?;
    Ok(())
}

/// Loads the bundled seed into an empty table. Partially seeded tables are
/// left alone.
fn seed_assets(connection: &Connection) -> AppResult<()> {
    let existing: i64 = connection.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    let seed: SeedFile = serde_json::from_str(SEED_ASSETS)?;
    let tx = connection.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO assets (id, name, description, latitude, longitude, url, category)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for asset in &seed.assets {
            stmt.execute(params![
                asset.id,
                asset.name,
                asset.description,
                asset.latitude,
                asset.longitude,
                asset.url,
                asset.category,
            ])?;
        }
    }
    tx.commit()?;
    info!(target: "database_bootstrap", assets = seed.assets.len(), "seeded assets table");
    Ok(())
}

fn should_attempt_recovery(err: &SqliteError, db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(
                code.code,
                ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt
            ) || message
                .as_deref()
                .map(|msg| msg.contains("database disk image is malformed"))
                .unwrap_or(false)
        }
        _ => false,
    }
}

fn recover_store(db_path: &Path) -> AppResult<()> {
    remove_if_exists(db_path)?;
    remove_if_exists(&sidecar_path(db_path, "-wal"))?;
    remove_if_exists(&sidecar_path(db_path, "-shm"))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
