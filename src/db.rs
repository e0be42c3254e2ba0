use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::constants::EXPECTED_DB_VERSION;
use crate::queries::{ddl, metadata};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Open the file-based connection pool for production use
/// Creates the file if missing, enables WAL mode and foreign keys
pub async fn open_database_pool(db_path: &Path) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    log::info!("SQLite database: {}", db_path.display());
    Ok(pool)
}

/// Initialize database schema
/// Creates tables and indexes, then records or checks the schema version
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    sqlx::query(&ddl::create_metadata_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_files_table()).execute(pool).await?;
    sqlx::query(&ddl::create_chunks_table()).execute(pool).await?;
    sqlx::query(&ddl::create_recordings_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_recordings_created_at_index())
        .execute(pool)
        .await?;

    match query_metadata(pool, "version").await? {
        Some(version) if version != EXPECTED_DB_VERSION => {
            return Err(format!(
                "Unsupported database version: '{}'. This application only supports version '{}'",
                version, EXPECTED_DB_VERSION
            )
            .into());
        }
        Some(_) => {}
        None => {
            sqlx::query(&metadata::insert("version", EXPECTED_DB_VERSION))
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

/// Query a single metadata value by key
pub async fn query_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>, DynError> {
    let row = sqlx::query(&metadata::select_by_key(key))
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get::<String, _>(0)))
}

/// Update or insert a metadata key-value pair
pub async fn upsert_metadata(pool: &SqlitePool, key: &str, value: &str) -> Result<(), DynError> {
    sqlx::query(&metadata::upsert(key, value))
        .execute(pool)
        .await?;
    Ok(())
}

/// Create a pool backed by a file in a fresh temporary directory, for tests
/// The returned guard must be kept alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let dir = tempfile::tempdir()?;
    let pool = open_database_pool(&dir.path().join("test.sqlite")).await?;
    Ok((pool, dir))
}
