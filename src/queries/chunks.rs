use sea_query::{Expr, Func, Query, SqliteQueryBuilder};

use crate::schema::Chunks;

/// INSERT INTO chunks (file_id, n, data) VALUES (?, ?, ?)
///
/// Chunk payloads are bound rather than inlined, so this stays a plain statement.
pub const INSERT_CHUNK: &str = "INSERT INTO chunks (file_id, n, data) VALUES (?1, ?2, ?3)";

/// SELECT data FROM chunks WHERE file_id = ? AND n = ?
pub fn select_data(file_id: &str, n: i64) -> String {
    Query::select()
        .column(Chunks::Data)
        .from(Chunks::Table)
        .and_where(Expr::col(Chunks::FileId).eq(file_id))
        .and_where(Expr::col(Chunks::N).eq(n))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(n), COALESCE(SUM(LENGTH(data)), 0) FROM chunks WHERE file_id = ?
pub fn stats_for_file(file_id: &str) -> String {
    Query::select()
        .expr(Func::count(Expr::col(Chunks::N)))
        .expr(Expr::cust("COALESCE(SUM(LENGTH(\"data\")), 0)"))
        .from(Chunks::Table)
        .and_where(Expr::col(Chunks::FileId).eq(file_id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM chunks WHERE file_id = ?
pub fn delete_for_file(file_id: &str) -> String {
    Query::delete()
        .from_table(Chunks::Table)
        .and_where(Expr::col(Chunks::FileId).eq(file_id))
        .to_string(SqliteQueryBuilder)
}
