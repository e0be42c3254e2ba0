//! GridFS-style chunked storage on SQLite.
//!
//! A stored binary is a row in `files` plus an ordered set of rows in `chunks`, where
//! chunk `n` holds bytes `[n * chunk_size, min((n + 1) * chunk_size, length))`. Reads of a
//! byte range only touch the chunks that intersect it.

use bytes::Bytes;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::fmt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::errors::StoreError;
use crate::queries::{chunks, files};
use crate::range::ByteRange;

/// Opaque reference to a stored chunk set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FileRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive metadata stored alongside a chunk set
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub filename: String,
    pub content_type: String,
}

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_ref: FileRef,
    pub length: u64,
}

/// A row of the `files` table
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub file_ref: FileRef,
    pub length: u64,
    pub chunk_size: u64,
    pub filename: String,
    pub content_type: String,
    pub upload_date_ms: i64,
}

impl FileInfo {
    /// Number of chunks a complete chunk set has
    pub fn chunk_count(&self) -> u64 {
        self.length.div_ceil(self.chunk_size)
    }

    /// Expected byte length of chunk `n`
    fn chunk_len(&self, n: u64) -> u64 {
        let start = n * self.chunk_size;
        (self.length - start).min(self.chunk_size)
    }
}

/// Streamed content of a stored file, restricted to `[start, start + content_length)`
pub struct ChunkStream {
    pub total_length: u64,
    pub start: u64,
    pub content_length: u64,
    stream: ReceiverStream<Result<Bytes, StoreError>>,
}

impl ChunkStream {
    /// Inclusive end offset, or `None` when nothing is streamed
    pub fn end(&self) -> Option<u64> {
        (self.content_length > 0).then(|| self.start + self.content_length - 1)
    }

    pub fn into_stream(self) -> ReceiverStream<Result<Bytes, StoreError>> {
        self.stream
    }

    /// Collect the whole stream into memory
    pub async fn collect_bytes(self) -> Result<Vec<u8>, StoreError> {
        let mut out = Vec::with_capacity(self.content_length as usize);
        let mut stream = self.stream;
        while let Some(piece) = stream.next().await {
            out.extend_from_slice(&piece?);
        }
        Ok(out)
    }
}

/// Chunked binary store backed by a shared SQLite pool
#[derive(Clone)]
pub struct ChunkStore {
    pool: SqlitePool,
    chunk_size: usize,
}

impl ChunkStore {
    pub fn new(pool: SqlitePool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `data` into chunks and persist them in one transaction
    pub async fn put(&self, data: &[u8], metadata: &FileMetadata) -> Result<StoredFile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = self.put_in(&mut tx, data, metadata).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Same as [`ChunkStore::put`] but inside a caller-owned transaction
    pub async fn put_in(
        &self,
        conn: &mut SqliteConnection,
        data: &[u8],
        metadata: &FileMetadata,
    ) -> Result<StoredFile, StoreError> {
        let file_ref = FileRef::generate();
        let length = data.len() as u64;

        let sql = files::insert(
            file_ref.as_str(),
            length as i64,
            self.chunk_size as i64,
            &metadata.filename,
            &metadata.content_type,
            chrono::Utc::now().timestamp_millis(),
        );
        sqlx::query(&sql).execute(&mut *conn).await?;

        for (n, chunk) in data.chunks(self.chunk_size).enumerate() {
            sqlx::query(chunks::INSERT_CHUNK)
                .bind(file_ref.as_str())
                .bind(n as i64)
                .bind(chunk)
                .execute(&mut *conn)
                .await?;
        }

        debug!(
            "Stored file {} ({} bytes in {} chunks)",
            file_ref,
            length,
            length.div_ceil(self.chunk_size as u64)
        );
        Ok(StoredFile { file_ref, length })
    }

    /// Look up the `files` row for a reference
    pub async fn info(&self, file_ref: &FileRef) -> Result<FileInfo, StoreError> {
        let row = sqlx::query(&files::select_by_id(file_ref.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(file_ref.to_string()))?;

        Ok(FileInfo {
            file_ref: FileRef(row.get::<String, _>(0)),
            length: row.get::<i64, _>(1) as u64,
            chunk_size: row.get::<i64, _>(2).max(1) as u64,
            filename: row.get(3),
            content_type: row.get(4),
            upload_date_ms: row.get(5),
        })
    }

    /// Stream the requested byte range (or everything when `range` is `None`)
    ///
    /// Unknown references, missing chunk sets, chunk sets whose count or total size is off
    /// and unsatisfiable ranges are reported before the stream is created. Chunks that go
    /// missing or have the wrong size while streaming surface as a `Corrupt` error item on
    /// the stream.
    pub async fn get(
        &self,
        file_ref: &FileRef,
        range: Option<ByteRange>,
    ) -> Result<ChunkStream, StoreError> {
        let info = self.info(file_ref).await?;

        let (start, end_exclusive) = match range {
            Some(range) => {
                let (start, end) = range.resolve(info.length)?;
                (start, end + 1)
            }
            None => (0, info.length),
        };

        let stats = sqlx::query(&chunks::stats_for_file(file_ref.as_str()))
            .fetch_one(&self.pool)
            .await?;
        let stored_chunks: i64 = stats.get(0);
        let stored_bytes: i64 = stats.get(1);
        let expected_chunks = info.chunk_count();
        if stored_chunks == 0 && expected_chunks > 0 {
            return Err(StoreError::NotFound(file_ref.to_string()));
        }
        if stored_chunks as u64 != expected_chunks {
            return Err(StoreError::Corrupt {
                file_id: file_ref.to_string(),
                reason: format!(
                    "expected {} chunks, found {}",
                    expected_chunks, stored_chunks
                ),
            });
        }
        // Catches truncated chunks before any response headers go out
        if stored_bytes as u64 != info.length {
            warn!(
                "Chunks of {} hold {} bytes, expected {}",
                file_ref, stored_bytes, info.length
            );
            return Err(StoreError::Corrupt {
                file_id: file_ref.to_string(),
                reason: format!(
                    "chunks hold {} bytes, expected {}",
                    stored_bytes, info.length
                ),
            });
        }

        let total_length = info.length;
        let (tx, rx) = mpsc::channel(4);
        if start < end_exclusive {
            let pool = self.pool.clone();
            tokio::spawn(stream_chunks(pool, info, start, end_exclusive, tx));
        }

        Ok(ChunkStream {
            total_length,
            start,
            content_length: end_exclusive - start,
            stream: ReceiverStream::new(rx),
        })
    }

    /// Read the requested range fully into memory
    pub async fn read(
        &self,
        file_ref: &FileRef,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>, StoreError> {
        self.get(file_ref, range).await?.collect_bytes().await
    }

    /// Remove every chunk and the file row, all or nothing
    pub async fn delete(&self, file_ref: &FileRef) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = self.delete_in(&mut tx, file_ref).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Same as [`ChunkStore::delete`] but inside a caller-owned transaction
    ///
    /// Returns the number of chunks removed. Any error leaves the transaction to be rolled
    /// back by the caller.
    pub async fn delete_in(
        &self,
        conn: &mut SqliteConnection,
        file_ref: &FileRef,
    ) -> Result<u64, StoreError> {
        let exists = sqlx::query(&files::select_by_id(file_ref.as_str()))
            .fetch_optional(&mut *conn)
            .await?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound(file_ref.to_string()));
        }

        let removed = sqlx::query(&chunks::delete_for_file(file_ref.as_str()))
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let files_removed = sqlx::query(&files::delete_by_id(file_ref.as_str()))
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if files_removed != 1 {
            error!("Deleting file row {} removed {} rows", file_ref, files_removed);
            return Err(StoreError::Corrupt {
                file_id: file_ref.to_string(),
                reason: format!("expected to delete 1 file row, deleted {}", files_removed),
            });
        }

        debug!("Deleted file {} ({} chunks)", file_ref, removed);
        Ok(removed)
    }
}

/// First and last chunk index covering `[start, end_exclusive)`
pub fn chunk_span(start: u64, end_exclusive: u64, chunk_size: u64) -> (u64, u64) {
    (start / chunk_size, (end_exclusive - 1) / chunk_size)
}

async fn stream_chunks(
    pool: SqlitePool,
    info: FileInfo,
    start: u64,
    end_exclusive: u64,
    tx: mpsc::Sender<Result<Bytes, StoreError>>,
) {
    let (first, last) = chunk_span(start, end_exclusive, info.chunk_size);

    for n in first..=last {
        let piece = read_chunk_slice(&pool, &info, n, start, end_exclusive).await;
        let failed = piece.is_err();
        if let Err(e) = &piece {
            error!("Failed to read chunk {} of {}: {}", n, info.file_ref, e);
        }
        if tx.send(piece).await.is_err() {
            debug!("Reader of {} went away at chunk {}", info.file_ref, n);
            return;
        }
        if failed {
            return;
        }
    }
}

async fn read_chunk_slice(
    pool: &SqlitePool,
    info: &FileInfo,
    n: u64,
    start: u64,
    end_exclusive: u64,
) -> Result<Bytes, StoreError> {
    let row = sqlx::query(&chunks::select_data(info.file_ref.as_str(), n as i64))
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::Corrupt {
            file_id: info.file_ref.to_string(),
            reason: format!("chunk {} is missing", n),
        })?;

    let data = Bytes::from(row.get::<Vec<u8>, _>(0));
    let expected = info.chunk_len(n);
    if data.len() as u64 != expected {
        warn!(
            "Chunk {} of {} has {} bytes, expected {}",
            n,
            info.file_ref,
            data.len(),
            expected
        );
        return Err(StoreError::Corrupt {
            file_id: info.file_ref.to_string(),
            reason: format!("chunk {} has {} bytes, expected {}", n, data.len(), expected),
        });
    }

    let chunk_start = n * info.chunk_size;
    let from = start.max(chunk_start) - chunk_start;
    let to = end_exclusive.min(chunk_start + expected) - chunk_start;
    Ok(data.slice(from as usize..to as usize))
}
