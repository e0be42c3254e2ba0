//! HTTP client for the recordings API.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Response, StatusCode};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use url::Url;

use crate::errors::UploadError;
use crate::range::ByteRange;
use crate::recordings::{ListQuery, RecordingSummary};
use crate::upload::{progress_percent, ProgressFn, UploadReceipt, UploadRequest, UploadTransport};

/// Size of the body pieces handed to the transport; progress is reported per piece
pub const UPLOAD_PIECE_SIZE: usize = 64 * 1024;

/// Outcome of deleting several recordings at once
#[derive(Debug, Default)]
pub struct BulkDeleteReport {
    pub succeeded: Vec<i64>,
    pub failed: Vec<(i64, UploadError)>,
}

#[derive(Clone)]
pub struct RecordingsClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RecordingsClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, UploadError> {
        self.base_url
            .join(path)
            .map_err(|e| UploadError::InvalidResponse(format!("Invalid URL '{}': {}", path, e)))
    }

    pub async fn health(&self) -> Result<(), UploadError> {
        let response = self
            .http
            .get(self.endpoint("health")?)
            .send()
            .await
            .map_err(network_error)?;
        check_status(response).await.map(|_| ())
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<RecordingSummary>, UploadError> {
        let response = self
            .http
            .get(self.endpoint("recordings")?)
            .query(query)
            .send()
            .await
            .map_err(network_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(format!("Invalid recordings list: {}", e)))
    }

    /// Download a recording, or only `range` of it
    pub async fn fetch(&self, id: i64, range: Option<ByteRange>) -> Result<Bytes, UploadError> {
        let mut request = self.http.get(self.endpoint(&format!("recordings/{}", id))?);
        if let Some(range) = range {
            let value = match range.end {
                Some(end) => format!("bytes={}-{}", range.start, end),
                None => format!("bytes={}-", range.start),
            };
            request = request.header(header::RANGE, value);
        }
        let response = request.send().await.map_err(network_error)?;
        check_status(response)
            .await?
            .bytes()
            .await
            .map_err(network_error)
    }

    /// Delete one recording, returning the server's message
    pub async fn delete(&self, id: i64) -> Result<String, UploadError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("recordings/{}", id))?)
            .send()
            .await
            .map_err(network_error)?;
        let body: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        Ok(body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Recording deleted")
            .to_string())
    }

    /// Delete every id concurrently; one failure does not stop the others
    pub async fn delete_many(&self, ids: &[i64]) -> BulkDeleteReport {
        let mut tasks = JoinSet::new();
        for &id in ids {
            let client = self.clone();
            tasks.spawn(async move { (id, client.delete(id).await) });
        }

        let mut report = BulkDeleteReport::default();
        let mut pending: Vec<i64> = ids.to_vec();
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Delete task failed: {}", e);
                    continue;
                }
            };
            if let Some(pos) = pending.iter().position(|&p| p == id) {
                pending.swap_remove(pos);
            }
            match result {
                Ok(_) => report.succeeded.push(id),
                Err(e) => {
                    warn!("Failed to delete recording {}: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }

        // Tasks that panicked or were cancelled never reported back
        for id in pending {
            report
                .failed
                .push((id, UploadError::Network("delete task did not complete".to_string())));
        }

        info!(
            "Bulk delete: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    fn upload_form(&self, request: &UploadRequest, progress: ProgressFn) -> Result<Form, UploadError> {
        let total = request.size();
        let data = request.data.clone();
        let pieces: Vec<Bytes> = (0..data.len())
            .step_by(UPLOAD_PIECE_SIZE)
            .map(|start| data.slice(start..(start + UPLOAD_PIECE_SIZE).min(data.len())))
            .collect();

        let mut sent = 0u64;
        let body = tokio_stream::iter(pieces).map(move |piece| {
            sent += piece.len() as u64;
            progress(progress_percent(sent, total));
            Ok::<Bytes, std::io::Error>(piece)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)
            .map_err(|e| UploadError::Validation {
                status: 0,
                message: format!("Invalid content type '{}': {}", request.content_type, e),
            })?;

        Ok(Form::new()
            .part("recording", part)
            .text("title", request.title.clone())
            .text("duration", request.duration_secs.to_string())
            .text("size", total.to_string()))
    }
}

#[async_trait]
impl UploadTransport for RecordingsClient {
    async fn send(
        &self,
        request: &UploadRequest,
        progress: ProgressFn,
    ) -> Result<UploadReceipt, UploadError> {
        let form = self.upload_form(request, progress.clone())?;
        progress(0.0);

        let response = self
            .http
            .post(self.endpoint("recordings")?)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let receipt: UploadReceipt = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(format!("Invalid upload receipt: {}", e)))?;
        debug!("Upload stored as recording {}", receipt.id);
        Ok(receipt)
    }
}

fn network_error(e: reqwest::Error) -> UploadError {
    UploadError::Network(e.to_string())
}

/// Pass 2xx responses through; turn everything else into a typed error carrying the
/// server's `{"error": ...}` message when there is one
async fn check_status(response: Response) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            UploadError::Validation {
                status: status.as_u16(),
                message,
            }
        }
        _ => UploadError::Server {
            status: status.as_u16(),
            message,
        },
    })
}
