//! SQLite table loader.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::PathBuf;

use crate::components::{ComponentConfig, Loader, WriteMode};
use crate::dataset::{DataType, Dataset, Value};
use crate::errors::{EtlflowError, Result};

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// In-process database discarded on disconnect.
    Memory,
    /// Database file.
    File(PathBuf),
}

impl SqliteTarget {
    /// Parses `sqlite:///relative.db`, `sqlite:////abs/path.db`,
    /// `sqlite://` (memory), `:memory:` or a bare file path.
    ///
    /// # Errors
    ///
    /// Returns a message for other URL schemes.
    pub fn parse(connection_string: &str) -> std::result::Result<Self, String> {
        let s = connection_string.trim();
        if s == ":memory:" || s == "sqlite://" || s == "sqlite:///:memory:" {
            return Ok(Self::Memory);
        }
        if let Some(path) = s.strip_prefix("sqlite:///") {
            return Ok(Self::File(PathBuf::from(path)));
        }
        if s.contains("://") {
            return Err(format!("unsupported connection string '{s}'; only sqlite is available"));
        }
        if s.is_empty() {
            return Err("connection_string is empty".to_string());
        }
        Ok(Self::File(PathBuf::from(s)))
    }
}

/// Config for [`SqlDatabaseLoader`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlDatabaseConfig {
    /// Database location.
    pub connection_string: String,
    /// Destination table.
    pub table_name: String,
    /// What to do when the table already exists.
    #[serde(default)]
    pub if_exists: WriteMode,
    /// Conflict target for `upsert`.
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

/// Writes a dataset into a SQLite table.
///
/// Each load runs in one transaction. `upsert` keeps a unique index over
/// the primary keys and uses `INSERT ... ON CONFLICT DO UPDATE`.
#[derive(Debug)]
pub struct SqlDatabaseLoader {
    config: SqlDatabaseConfig,
    target: SqliteTarget,
    conn: Option<Mutex<Connection>>,
}

impl SqlDatabaseLoader {
    /// Registry key.
    pub const KEY: &'static str = "sql_database";

    /// Builds the loader from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] for a missing or
    /// unsupported connection string, an empty table name, or `upsert`
    /// without `primary_keys`.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: SqlDatabaseConfig = config.parse(Self::KEY)?;
        let target = SqliteTarget::parse(&parsed.connection_string)
            .map_err(|e| EtlflowError::config_validation(Self::KEY, e))?;
        if parsed.table_name.trim().is_empty() {
            return Err(EtlflowError::config_validation(Self::KEY, "table_name is empty"));
        }
        if parsed.if_exists == WriteMode::Upsert && parsed.primary_keys.is_empty() {
            return Err(EtlflowError::config_validation(
                Self::KEY,
                "primary_keys is required when if_exists is 'upsert'",
            ));
        }
        Ok(Self {
            config: parsed,
            target,
            conn: None,
        })
    }

    /// Runs `f` against the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Database`] if the loader is not connected,
    /// or whatever `f` returns.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.as_ref().ok_or_else(|| {
            EtlflowError::Database(rusqlite::Error::InvalidParameterName(
                "loader is not connected".to_string(),
            ))
        })?;
        f(&mut conn.lock())
    }

    fn write(&self, conn: &mut Connection, dataset: &Dataset) -> Result<usize> {
        let table = quote_ident(&self.config.table_name);
        let tx = conn.transaction()?;

        let exists = table_exists(&tx, &self.config.table_name)?;
        match self.config.if_exists {
            WriteMode::Fail if exists => {
                return Err(EtlflowError::Dataset(format!(
                    "table '{}' already exists",
                    self.config.table_name
                )));
            }
            WriteMode::Replace if exists => {
                tx.execute(&format!("DROP TABLE {table}"), [])?;
            }
            _ => {}
        }

        if dataset.column_count() == 0 {
            tracing::warn!(
                table = %self.config.table_name,
                "Dataset has no columns, nothing to write"
            );
            tx.commit()?;
            return Ok(0);
        }

        let column_defs: Vec<String> = dataset
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name()), sql_type(c.dtype())))
            .collect();
        tx.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table} ({})", column_defs.join(", ")),
            [],
        )?;

        let names: Vec<String> = dataset.column_names().into_iter().map(quote_ident).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let mut sql = format!("INSERT INTO {table} ({}) VALUES ({placeholders})", names.join(", "));

        if self.config.if_exists == WriteMode::Upsert {
            if dataset.is_empty() {
                tracing::info!(table = %self.config.table_name, "Empty dataset, skipping upsert");
                tx.commit()?;
                return Ok(0);
            }
            sql.push_str(&self.ensure_conflict_target(&tx, dataset)?);
        }

        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..dataset.row_count() {
                let params = dataset
                    .columns()
                    .iter()
                    .map(|c| c.get(row).map_or(SqlValue::Null, to_sql));
                written += stmt.execute(params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Creates the unique index and returns the `ON CONFLICT` clause.
    fn ensure_conflict_target(
        &self,
        tx: &rusqlite::Transaction<'_>,
        dataset: &Dataset,
    ) -> Result<String> {
        let pks = &self.config.primary_keys;
        if let Some(missing) = pks.iter().find(|k| !dataset.has_column(k)) {
            return Err(EtlflowError::Dataset(format!(
                "primary key column '{missing}' not found"
            )));
        }

        let quoted: Vec<String> = pks.iter().map(|k| quote_ident(k)).collect();
        let index = quote_ident(&format!("uq_{}_{}", self.config.table_name, pks.join("_")));
        tx.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {} ({})",
                quote_ident(&self.config.table_name),
                quoted.join(", ")
            ),
            [],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => EtlflowError::Load {
                component: Self::KEY.to_string(),
                attempts: 1,
                message: format!(
                    "table '{}' already holds duplicate values in key column(s) {}; \
                     cannot upsert on them",
                    self.config.table_name,
                    pks.join(", ")
                ),
            },
            _ => EtlflowError::Database(e),
        })?;

        let updates: Vec<String> = dataset
            .column_names()
            .into_iter()
            .filter(|c| !pks.iter().any(|k| k == c))
            .map(|c| {
                let q = quote_ident(c);
                format!("{q} = excluded.{q}")
            })
            .collect();
        Ok(if updates.is_empty() {
            format!(" ON CONFLICT ({}) DO NOTHING", quoted.join(", "))
        } else {
            format!(" ON CONFLICT ({}) DO UPDATE SET {}", quoted.join(", "), updates.join(", "))
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

const fn sql_type(dtype: DataType) -> &'static str {
    match dtype {
        DataType::Int64 | DataType::Bool => "INTEGER",
        DataType::Float64 => "REAL",
        DataType::Null | DataType::Utf8 | DataType::Date | DataType::Timestamp | DataType::Json => {
            "TEXT"
        }
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) if f.is_nan() => SqlValue::Null,
        Value::Float(f) => SqlValue::Real(*f),
        Value::Str(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[async_trait]
impl Loader for SqlDatabaseLoader {
    fn name(&self) -> &str {
        "SqlDatabaseLoader"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match &self.target {
            SqliteTarget::Memory => Connection::open_in_memory()?,
            SqliteTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Connection::open(path)?
            }
        };
        tracing::debug!(target_db = ?self.target, "Connected to database");
        self.conn = Some(Mutex::new(conn));
        Ok(())
    }

    async fn load(&mut self, dataset: &Dataset) -> Result<()> {
        let written = self.with_connection(|conn| self.write(conn, dataset))?;
        tracing::info!(
            table = %self.config.table_name,
            mode = %self.config.if_exists,
            rows = dataset.row_count(),
            written,
            "Loaded rows into table"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.into_inner().close().map_err(|(_, e)| EtlflowError::Database(e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::dataset;
    use serde_json::json;
    use tempfile::TempDir;

    fn loader(db: &std::path::Path, extra: serde_json::Value) -> SqlDatabaseLoader {
        let mut cfg = ComponentConfig::new()
            .with("connection_string", json!(format!("sqlite:///{}", db.display())))
            .with("table_name", json!("items"));
        cfg.merge(ComponentConfig::from_value("sql_database", extra).unwrap());
        SqlDatabaseLoader::from_config(&cfg).unwrap()
    }

    fn rows(db: &std::path::Path) -> Vec<(i64, String)> {
        let conn = Connection::open(db).unwrap();
        let mut stmt = conn.prepare("SELECT id, v FROM items ORDER BY id").unwrap();
        let out = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        out
    }

    async fn run(l: &mut SqlDatabaseLoader, data: serde_json::Value) -> Result<()> {
        l.connect().await?;
        let res = l.load(&dataset(data)).await;
        l.disconnect().await?;
        res
    }

    #[tokio::test]
    async fn test_upsert_over_duplicate_keys_names_key_column() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut append = loader(&db, json!({}));
        run(&mut append, json!([{"id": 1, "v": "a"}, {"id": 1, "v": "b"}]))
            .await
            .unwrap();

        let mut upsert = loader(&db, json!({"if_exists": "upsert", "primary_keys": ["id"]}));
        let err = run(&mut upsert, json!([{"id": 1, "v": "c"}])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.to_string().contains("key column(s) id"), "{err}");
        assert_eq!(rows(&db).len(), 2);
    }

    #[test]
    fn test_parse_connection_string() {
        assert_eq!(SqliteTarget::parse(":memory:"), Ok(SqliteTarget::Memory));
        assert_eq!(
            SqliteTarget::parse("sqlite:///data/out.db"),
            Ok(SqliteTarget::File(PathBuf::from("data/out.db")))
        );
        assert_eq!(
            SqliteTarget::parse("sqlite:////tmp/out.db"),
            Ok(SqliteTarget::File(PathBuf::from("/tmp/out.db")))
        );
        assert!(SqliteTarget::parse("postgresql://localhost/db").is_err());
    }

    #[tokio::test]
    async fn test_append_creates_table() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut l = loader(&db, json!({}));

        run(&mut l, json!([{"id": 1, "v": "a"}])).await.unwrap();
        run(&mut l, json!([{"id": 2, "v": "b"}])).await.unwrap();
        assert_eq!(rows(&db), vec![(1, "a".to_string()), (2, "b".to_string())]);
    }

    #[tokio::test]
    async fn test_replace_drops_existing() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut l = loader(&db, json!({"if_exists": "replace"}));

        run(&mut l, json!([{"id": 1, "v": "a"}])).await.unwrap();
        run(&mut l, json!([{"id": 2, "v": "b"}])).await.unwrap();
        assert_eq!(rows(&db), vec![(2, "b".to_string())]);
    }

    #[tokio::test]
    async fn test_fail_when_table_exists() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut l = loader(&db, json!({"if_exists": "fail"}));

        run(&mut l, json!([{"id": 1, "v": "a"}])).await.unwrap();
        let err = run(&mut l, json!([{"id": 2, "v": "b"}])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dataset);
        assert_eq!(rows(&db).len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_updates_on_conflict() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut l = loader(&db, json!({"if_exists": "upsert", "primary_keys": ["id"]}));

        run(&mut l, json!([{"id": 1, "v": "x"}])).await.unwrap();
        run(&mut l, json!([{"id": 1, "v": "y"}])).await.unwrap();
        assert_eq!(rows(&db), vec![(1, "y".to_string())]);
    }

    #[tokio::test]
    async fn test_upsert_empty_dataset_is_noop() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("out.db");
        let mut l = loader(&db, json!({"if_exists": "upsert", "primary_keys": ["id"]}));

        run(&mut l, json!([{"id": 1, "v": "x"}])).await.unwrap();
        let empty = dataset(json!([{"id": 1, "v": "x"}])).empty_like();
        l.connect().await.unwrap();
        l.load(&empty).await.unwrap();
        l.disconnect().await.unwrap();
        assert_eq!(rows(&db).len(), 1);
    }

    #[test]
    fn test_upsert_requires_primary_keys() {
        let cfg = ComponentConfig::new()
            .with("connection_string", json!(":memory:"))
            .with("table_name", json!("t"))
            .with("if_exists", json!("upsert"));
        let err = SqlDatabaseLoader::from_config(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigValidation);
    }

    #[tokio::test]
    async fn test_load_without_connect_fails() {
        let cfg = ComponentConfig::new()
            .with("connection_string", json!(":memory:"))
            .with("table_name", json!("t"));
        let mut l = SqlDatabaseLoader::from_config(&cfg).unwrap();
        let err = l.load(&dataset(json!([{"id": 1}]))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
