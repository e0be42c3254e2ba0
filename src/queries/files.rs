use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::Files;

/// INSERT INTO files (id, length, chunk_size, filename, content_type, upload_date_ms)
/// VALUES (?, ?, ?, ?, ?, ?)
pub fn insert(
    id: &str,
    length: i64,
    chunk_size: i64,
    filename: &str,
    content_type: &str,
    upload_date_ms: i64,
) -> String {
    Query::insert()
        .into_table(Files::Table)
        .columns([
            Files::Id,
            Files::Length,
            Files::ChunkSize,
            Files::Filename,
            Files::ContentType,
            Files::UploadDateMs,
        ])
        .values_panic([
            id.into(),
            length.into(),
            chunk_size.into(),
            filename.into(),
            content_type.into(),
            upload_date_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, length, chunk_size, filename, content_type, upload_date_ms FROM files WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns([
            Files::Id,
            Files::Length,
            Files::ChunkSize,
            Files::Filename,
            Files::ContentType,
            Files::UploadDateMs,
        ])
        .from(Files::Table)
        .and_where(Expr::col(Files::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM files WHERE id = ?
pub fn delete_by_id(id: &str) -> String {
    Query::delete()
        .from_table(Files::Table)
        .and_where(Expr::col(Files::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
