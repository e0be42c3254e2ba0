//! Recording catalog: the user-visible records and their 1:1 chunk sets.

use clap::ValueEnum;
use log::{info, warn};
use sea_query::Order;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::chunk_store::{ChunkStore, FileMetadata, FileRef};
use crate::constants::{generate_storage_filename, MAX_DURATION_SECS};
use crate::errors::{CatalogError, StoreError};
use crate::queries::recordings;
use crate::schema::Recordings;

/// A persisted recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRecord {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub file_ref: FileRef,
    pub size: u64,
    pub duration_secs: u32,
    pub content_type: String,
    pub created_at_ms: i64,
}

impl RecordingRecord {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get(0),
            title: row.get(1),
            filename: row.get(2),
            file_ref: FileRef::from(row.get::<String, _>(3)),
            size: row.get::<i64, _>(4) as u64,
            duration_secs: row.get::<i64, _>(5).clamp(0, u32::MAX as i64) as u32,
            content_type: row.get(6),
            created_at_ms: row.get(7),
        }
    }

    /// Path under which the recording is streamed
    pub fn url(&self) -> String {
        format!("/recordings/{}", self.id)
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.created_at_ms).unwrap_or_default()
    }

    /// JSON shape returned by the listing endpoint
    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            id: self.id,
            title: self.title.clone(),
            filename: self.filename.clone(),
            size: self.size,
            duration: self.duration_secs,
            content_type: self.content_type.clone(),
            created_at: self.created_at().to_rfc3339(),
            url: self.url(),
        }
    }
}

/// A recording as exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub size: u64,
    pub duration: u32,
    pub content_type: String,
    pub created_at: String,
    pub url: String,
}

/// Input for creating a recording
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub title: Option<String>,
    pub duration_secs: u32,
    pub content_type: String,
}

/// Limits applied when accepting a new recording
#[derive(Debug, Clone, Copy)]
pub struct RecordingLimits {
    pub max_size_bytes: u64,
    pub max_duration_secs: u32,
}

impl Default for RecordingLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: crate::constants::MAX_UPLOAD_BYTES,
            max_duration_secs: MAX_DURATION_SECS,
        }
    }
}

/// Column a listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum SortKey {
    #[default]
    #[serde(rename = "createdAt")]
    #[value(name = "createdAt")]
    CreatedAt,
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "size")]
    Size,
    #[serde(rename = "duration")]
    Duration,
}

impl SortKey {
    fn column(self) -> Recordings {
        match self {
            SortKey::CreatedAt => Recordings::CreatedAtMs,
            SortKey::Title => Recordings::Title,
            SortKey::Size => Recordings::Size,
            SortKey::Duration => Recordings::DurationSecs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing options; the default is newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Recording catalog over the chunk store's pool
#[derive(Clone)]
pub struct RecordingCatalog {
    store: ChunkStore,
    limits: RecordingLimits,
}

impl RecordingCatalog {
    pub fn new(store: ChunkStore, limits: RecordingLimits) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn limits(&self) -> RecordingLimits {
        self.limits
    }

    /// Check a new recording against content type, size and duration limits
    pub fn validate(&self, new: &NewRecording, size: u64) -> Result<(), CatalogError> {
        if !new.content_type.trim().to_ascii_lowercase().starts_with("video/") {
            return Err(CatalogError::InvalidInput(format!(
                "Only video files are allowed, got '{}'",
                new.content_type
            )));
        }
        if size > self.limits.max_size_bytes {
            return Err(CatalogError::InvalidInput(format!(
                "File too large: {} bytes (limit {} bytes)",
                size, self.limits.max_size_bytes
            )));
        }
        if new.duration_secs > self.limits.max_duration_secs {
            return Err(CatalogError::InvalidInput(format!(
                "Duration {}s exceeds the {}s limit",
                new.duration_secs, self.limits.max_duration_secs
            )));
        }
        Ok(())
    }

    /// Store the binary and its record in a single transaction
    pub async fn create(
        &self,
        new: NewRecording,
        data: &[u8],
    ) -> Result<RecordingRecord, CatalogError> {
        self.validate(&new, data.len() as u64)?;

        let created_at = chrono::Utc::now();
        let title = match new.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => format!("Recording {}", created_at.format("%Y-%m-%d %H:%M:%S")),
        };
        let filename = generate_storage_filename(&new.content_type);
        let metadata = FileMetadata {
            filename: filename.clone(),
            content_type: new.content_type.clone(),
        };

        let mut tx = self.store.pool().begin().await?;
        let stored = self.store.put_in(&mut tx, data, &metadata).await?;
        let sql = recordings::insert(
            &title,
            &filename,
            stored.file_ref.as_str(),
            stored.length as i64,
            new.duration_secs as i64,
            &new.content_type,
            created_at.timestamp_millis(),
        );
        let id = sqlx::query(&sql).execute(&mut *tx).await?.last_insert_rowid();
        tx.commit().await?;

        info!(
            "Stored recording {} '{}' ({} bytes, {}s)",
            id, title, stored.length, new.duration_secs
        );

        Ok(RecordingRecord {
            id,
            title,
            filename,
            file_ref: stored.file_ref,
            size: stored.length,
            duration_secs: new.duration_secs,
            content_type: new.content_type,
            created_at_ms: created_at.timestamp_millis(),
        })
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<RecordingRecord>, CatalogError> {
        let order = match query.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        let sql = recordings::select_all(query.sort.column(), order, query.search.as_deref());
        let rows = sqlx::query(&sql).fetch_all(self.store.pool()).await?;
        Ok(rows.iter().map(RecordingRecord::from_row).collect())
    }

    pub async fn get(&self, id: i64) -> Result<RecordingRecord, CatalogError> {
        sqlx::query(&recordings::select_by_id(id))
            .fetch_optional(self.store.pool())
            .await?
            .map(|row| RecordingRecord::from_row(&row))
            .ok_or(CatalogError::NotFound(id))
    }

    /// Delete the chunk set, then the record, in one transaction
    ///
    /// If the chunk set cannot be removed the transaction is rolled back and the record
    /// stays in place. A chunk set that is already gone does not block removing the record.
    pub async fn delete(&self, id: i64) -> Result<RecordingRecord, CatalogError> {
        let mut tx = self.store.pool().begin().await?;

        let record = sqlx::query(&recordings::select_by_id(id))
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| RecordingRecord::from_row(&row))
            .ok_or(CatalogError::NotFound(id))?;

        match self.store.delete_in(&mut tx, &record.file_ref).await {
            Ok(_) => {}
            Err(StoreError::NotFound(file_ref)) => {
                warn!(
                    "Recording {} referenced missing chunk set {}, removing record only",
                    id, file_ref
                );
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query(&recordings::delete_by_id(id))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Deleted recording {} ('{}')", id, record.title);
        Ok(record)
    }
}
