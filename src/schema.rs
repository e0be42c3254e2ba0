use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Files table - one row per stored chunk set
#[derive(Iden)]
pub enum Files {
    Table,
    Id,
    Length,
    ChunkSize,
    Filename,
    ContentType,
    UploadDateMs,
}

/// Chunks table - fixed-size slices of a stored file, keyed by (file_id, n)
#[derive(Iden)]
pub enum Chunks {
    Table,
    FileId,
    N,
    Data,
}

/// Recordings table - user-visible recording metadata
#[derive(Iden)]
pub enum Recordings {
    Table,
    Id,
    Title,
    Filename,
    FileId,
    Size,
    DurationSecs,
    ContentType,
    CreatedAtMs,
}
