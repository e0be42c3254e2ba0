use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Chunks, Files, Metadata, Recordings};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS files (
///     id TEXT PRIMARY KEY,
///     length INTEGER NOT NULL,
///     chunk_size INTEGER NOT NULL,
///     filename TEXT NOT NULL,
///     content_type TEXT NOT NULL,
///     upload_date_ms INTEGER NOT NULL
/// )
pub fn create_files_table() -> String {
    Table::create()
        .table(Files::Table)
        .if_not_exists()
        .col(ColumnDef::new(Files::Id).string().primary_key())
        .col(ColumnDef::new(Files::Length).big_integer().not_null())
        .col(ColumnDef::new(Files::ChunkSize).big_integer().not_null())
        .col(ColumnDef::new(Files::Filename).string().not_null())
        .col(ColumnDef::new(Files::ContentType).string().not_null())
        .col(ColumnDef::new(Files::UploadDateMs).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS chunks (
///     file_id TEXT NOT NULL REFERENCES files(id) ON DELETE RESTRICT,
///     n INTEGER NOT NULL,
///     data BLOB NOT NULL,
///     PRIMARY KEY (file_id, n)
/// )
///
/// No cascade: chunk sets are removed explicitly by the chunk store.
pub fn create_chunks_table() -> String {
    Table::create()
        .table(Chunks::Table)
        .if_not_exists()
        .col(ColumnDef::new(Chunks::FileId).string().not_null())
        .col(ColumnDef::new(Chunks::N).big_integer().not_null())
        .col(ColumnDef::new(Chunks::Data).blob().not_null())
        .primary_key(Index::create().col(Chunks::FileId).col(Chunks::N))
        .foreign_key(
            ForeignKey::create()
                .from(Chunks::Table, Chunks::FileId)
                .to(Files::Table, Files::Id)
                .on_delete(ForeignKeyAction::Restrict),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS recordings (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     title TEXT NOT NULL,
///     filename TEXT NOT NULL UNIQUE,
///     file_id TEXT NOT NULL UNIQUE,
///     size INTEGER NOT NULL,
///     duration_secs INTEGER NOT NULL,
///     content_type TEXT NOT NULL,
///     created_at_ms INTEGER NOT NULL
/// )
pub fn create_recordings_table() -> String {
    Table::create()
        .table(Recordings::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Recordings::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Recordings::Title).string().not_null())
        .col(
            ColumnDef::new(Recordings::Filename)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(Recordings::FileId)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(Recordings::Size).big_integer().not_null())
        .col(ColumnDef::new(Recordings::DurationSecs).integer().not_null())
        .col(ColumnDef::new(Recordings::ContentType).string().not_null())
        .col(ColumnDef::new(Recordings::CreatedAtMs).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_recordings_created_at ON recordings(created_at_ms)
pub fn create_recordings_created_at_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_recordings_created_at")
        .table(Recordings::Table)
        .col(Recordings::CreatedAtMs)
        .to_string(SqliteQueryBuilder)
}
