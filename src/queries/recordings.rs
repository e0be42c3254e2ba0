use sea_query::{Expr, LikeExpr, Order, Query, SqliteQueryBuilder};

use crate::schema::Recordings;

const COLUMNS: [Recordings; 8] = [
    Recordings::Id,
    Recordings::Title,
    Recordings::Filename,
    Recordings::FileId,
    Recordings::Size,
    Recordings::DurationSecs,
    Recordings::ContentType,
    Recordings::CreatedAtMs,
];

/// INSERT INTO recordings (title, filename, file_id, size, duration_secs, content_type, created_at_ms)
/// VALUES (?, ?, ?, ?, ?, ?, ?)
pub fn insert(
    title: &str,
    filename: &str,
    file_id: &str,
    size: i64,
    duration_secs: i64,
    content_type: &str,
    created_at_ms: i64,
) -> String {
    Query::insert()
        .into_table(Recordings::Table)
        .columns([
            Recordings::Title,
            Recordings::Filename,
            Recordings::FileId,
            Recordings::Size,
            Recordings::DurationSecs,
            Recordings::ContentType,
            Recordings::CreatedAtMs,
        ])
        .values_panic([
            title.into(),
            filename.into(),
            file_id.into(),
            size.into(),
            duration_secs.into(),
            content_type.into(),
            created_at_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// Escape character for title search patterns
const LIKE_ESCAPE: char = '!';

/// Make `%` and `_` in a search term match literally
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// SELECT <all columns> FROM recordings [WHERE title LIKE ? ESCAPE '!'] ORDER BY <sort> <order>, id <order>
///
/// The id tie-breaker keeps the order stable for equal sort values.
pub fn select_all(sort: Recordings, order: Order, search: Option<&str>) -> String {
    let mut query = Query::select();
    query
        .columns(COLUMNS)
        .from(Recordings::Table)
        .order_by(sort, order.clone())
        .order_by(Recordings::Id, order);

    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = LikeExpr::new(format!("%{}%", escape_like(term))).escape(LIKE_ESCAPE);
        query.and_where(Expr::col(Recordings::Title).like(pattern));
    }

    query.to_string(SqliteQueryBuilder)
}

/// SELECT <all columns> FROM recordings WHERE id = ?
pub fn select_by_id(id: i64) -> String {
    Query::select()
        .columns(COLUMNS)
        .from(Recordings::Table)
        .and_where(Expr::col(Recordings::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM recordings WHERE id = ?
pub fn delete_by_id(id: i64) -> String {
    Query::delete()
        .from_table(Recordings::Table)
        .and_where(Expr::col(Recordings::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
