use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

/// Cached entries older than this are treated as absent.
pub const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    EmployeeCache,
    Companies,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::EmployeeCache => "employee_cache",
            Collection::Companies => "companies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact match on (company id, query, regions). Regions compare as given,
    /// order and case included.
    EmployeeKey {
        company_id: String,
        query: String,
        regions: Vec<String>,
    },
    /// Case-insensitive substring match on the stored display name.
    NameLike(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub stored_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            payload,
            stored_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.stored_at) <= Duration::hours(STALE_AFTER_HOURS)
    }
}

/// Key of an employee cache entry: the whole tuple as JSON, so no two distinct
/// tuples share a key and region order stays significant.
pub fn employee_cache_key(company_id: &str, query: &str, regions: &[String]) -> String {
    serde_json::to_string(&(company_id, query, regions)).unwrap_or_default()
}

/// Collection-style record storage. Errors are returned raw; callers decide
/// whether a failure matters.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: Collection, filter: &Filter) -> Result<Option<StoredRecord>, StoreError>;
    async fn upsert(&self, collection: Collection, key: &str, record: StoredRecord) -> Result<(), StoreError>;
    async fn delete_all(&self, collection: Collection) -> Result<(), StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open() -> Result<Self, StoreError> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            // Connection::open reports the real failure if this didn't work
            let _ = std::fs::create_dir_all(parent);
        }
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "prospect") {
            proj_dirs.data_dir().join("prospect.db")
        } else {
            PathBuf::from("prospect.db")
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn init(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS employee_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cache_key TEXT NOT NULL UNIQUE,
                company_id TEXT NOT NULL,
                company_name TEXT NOT NULL,
                query TEXT NOT NULL,
                regions TEXT NOT NULL,
                employees TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                apollo_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_employee_cache_company ON employee_cache(company_id);
            CREATE INDEX IF NOT EXISTS idx_companies_updated ON companies(updated_at);
            "#,
        )?;
        Ok(())
    }

    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        let tables: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('employee_cache', 'companies')",
            [],
            |row| row.get(0),
        )?;
        Ok(tables == 2)
    }

    /// Create the schema on first use so a fresh install works without `init`.
    pub fn ensure_initialized(&self) -> Result<(), StoreError> {
        if !self.is_initialized()? {
            self.init()?;
        }
        Ok(())
    }

    fn get_employee_entry(
        conn: &Connection,
        company_id: &str,
        query: &str,
        regions: &[String],
    ) -> Result<Option<StoredRecord>, StoreError> {
        let key = employee_cache_key(company_id, query, regions);
        let row = conn
            .query_row(
                "SELECT cache_key, company_id, company_name, query, regions, employees, cached_at
                 FROM employee_cache WHERE cache_key = ?1",
                [&key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, company_id, name, query, regions, employees, cached_at)) = row else {
            return Ok(None);
        };
        let payload = serde_json::json!({
            "company_id": company_id,
            "query": query,
            "regions": serde_json::from_str::<serde_json::Value>(&regions)?,
            "employees": serde_json::from_str::<serde_json::Value>(&employees)?,
        });
        Ok(Some(StoredRecord {
            key,
            name,
            payload,
            stored_at: parse_timestamp(&cached_at)?,
        }))
    }

    fn find_company(conn: &Connection, name: &str) -> Result<Option<StoredRecord>, StoreError> {
        let row = conn
            .query_row(
                "SELECT apollo_id, name, data, updated_at FROM companies
                 WHERE instr(LOWER(name), LOWER(?1)) > 0
                 ORDER BY updated_at DESC
                 LIMIT 1",
                [name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, name, data, updated_at)| {
            Ok(StoredRecord {
                key,
                name,
                payload: serde_json::from_str(&data)?,
                stored_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }

    fn upsert_employee_entry(conn: &Connection, key: &str, record: &StoredRecord) -> Result<(), StoreError> {
        let company_id = record.payload["company_id"].as_str().unwrap_or_default();
        let query = record.payload["query"].as_str().unwrap_or_default();
        let regions = serde_json::to_string(&record.payload["regions"])?;
        let employees = serde_json::to_string(&record.payload["employees"])?;

        conn.execute(
            "INSERT INTO employee_cache (cache_key, company_id, company_name, query, regions, employees, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(cache_key) DO UPDATE SET
                employees = excluded.employees,
                cached_at = excluded.cached_at",
            params![
                key,
                company_id,
                record.name,
                query,
                regions,
                employees,
                format_timestamp(record.stored_at)
            ],
        )?;
        Ok(())
    }

    fn upsert_company(conn: &Connection, key: &str, record: &StoredRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string(&record.payload)?;
        let now = format_timestamp(record.stored_at);
        conn.execute(
            "INSERT INTO companies (apollo_id, name, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(apollo_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![key, record.name, data, now],
        )?;
        Ok(())
    }
}

// Fixed-width so ORDER BY on the text column sorts chronologically
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(stamp: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(stamp)?.with_timezone(&Utc))
}

#[async_trait]
impl RecordStore for Database {
    async fn get(&self, collection: Collection, filter: &Filter) -> Result<Option<StoredRecord>, StoreError> {
        let conn = self.lock()?;
        match (collection, filter) {
            (Collection::EmployeeCache, Filter::EmployeeKey { company_id, query, regions }) => {
                Self::get_employee_entry(&conn, company_id, query, regions)
            }
            (Collection::Companies, Filter::NameLike(name)) => Self::find_company(&conn, name),
            // No other combination is indexed
            _ => Ok(None),
        }
    }

    async fn upsert(&self, collection: Collection, key: &str, record: StoredRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        match collection {
            Collection::EmployeeCache => Self::upsert_employee_entry(&conn, key, &record),
            Collection::Companies => Self::upsert_company(&conn, key, &record),
        }
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", collection.table()), [])?;
        Ok(())
    }
}
