//! Upload of finished recordings with progress reporting and bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assembler::AssembledRecording;
use crate::constants::MAX_UPLOAD_ATTEMPTS;
use crate::errors::UploadError;

/// Progress callback, called with a percentage in `0.0..=100.0`
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Progress callback that discards updates
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Percentage of `total` covered by `sent`; an empty body counts as complete
pub fn progress_percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (sent.min(total) as f64 / total as f64) * 100.0
}

/// Everything sent for one recording
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    pub title: String,
    pub duration_secs: u32,
    pub content_type: String,
    pub file_name: String,
}

impl UploadRequest {
    pub fn from_recording(recording: &AssembledRecording, title: impl Into<String>) -> Self {
        Self {
            data: recording.data.clone(),
            title: title.into(),
            duration_secs: recording.duration_secs,
            content_type: recording.content_type.clone(),
            file_name: recording.suggested_filename(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Server acknowledgement of a stored recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    pub id: i64,
    pub url: String,
}

/// Something that can carry one upload attempt to the server
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        request: &UploadRequest,
        progress: ProgressFn,
    ) -> Result<UploadReceipt, UploadError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    Pending,
    Succeeded(UploadReceipt),
    /// Last attempt failed; more attempts may be allowed
    Failed(UploadError),
}

/// One recording's upload, tracked across attempts
#[derive(Debug)]
pub struct UploadJob {
    request: UploadRequest,
    attempts: u32,
    max_attempts: u32,
    status: UploadStatus,
}

impl UploadJob {
    pub fn new(request: UploadRequest) -> Self {
        Self {
            request,
            attempts: 0,
            max_attempts: MAX_UPLOAD_ATTEMPTS,
            status: UploadStatus::Pending,
        }
    }

    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> &UploadStatus {
        &self.status
    }

    /// Another attempt is allowed: not yet succeeded and under the attempt limit
    pub fn can_retry(&self) -> bool {
        !matches!(self.status, UploadStatus::Succeeded(_)) && self.attempts < self.max_attempts
    }

    /// Failed with no attempts left
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.status, UploadStatus::Failed(_)) && !self.can_retry()
    }

    /// Run a single attempt through `transport`
    ///
    /// A succeeded job returns its receipt again without sending; an exhausted job
    /// returns its last error.
    pub async fn attempt(
        &mut self,
        transport: &dyn UploadTransport,
        progress: ProgressFn,
    ) -> Result<UploadReceipt, UploadError> {
        match &self.status {
            UploadStatus::Succeeded(receipt) => return Ok(receipt.clone()),
            UploadStatus::Failed(e) if !self.can_retry() => return Err(e.clone()),
            _ => {}
        }

        self.attempts += 1;
        info!(
            "Uploading '{}' ({} bytes), attempt {}/{}",
            self.request.file_name,
            self.request.size(),
            self.attempts,
            self.max_attempts
        );

        match transport.send(&self.request, progress.clone()).await {
            Ok(receipt) => {
                progress(100.0);
                self.status = UploadStatus::Succeeded(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                warn!("Upload attempt {} failed: {}", self.attempts, e);
                self.status = UploadStatus::Failed(e.clone());
                Err(e)
            }
        }
    }
}

/// Caller-side retry decisions
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    pub retry_validation_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_UPLOAD_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            retry_validation_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, for tests and interactive "retry now"
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &UploadError) -> bool {
        error.is_retryable() || self.retry_validation_errors
    }

    /// Backoff after `failed_attempts` failures: `base * 2^(n-1)` plus up to half that in jitter
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        let max_jitter_ms = (delay.as_millis() / 2) as u64;
        if max_jitter_ms == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
        delay + Duration::from_millis(jitter)
    }
}

/// Drive `job` until it succeeds, fails with an error the policy won't retry, or runs
/// out of attempts
pub async fn upload_with_retry(
    transport: &dyn UploadTransport,
    job: &mut UploadJob,
    policy: &RetryPolicy,
    progress: ProgressFn,
) -> Result<UploadReceipt, UploadError> {
    loop {
        let error = match job.attempt(transport, progress.clone()).await {
            Ok(receipt) => return Ok(receipt),
            Err(e) => e,
        };

        if !job.can_retry() || job.attempts() >= policy.max_attempts {
            warn!("Giving up on upload after {} attempts", job.attempts());
            return Err(error);
        }
        if !policy.should_retry(&error) {
            return Err(error);
        }

        let delay = policy.delay_for(job.attempts());
        info!("Retrying upload in {}ms...", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails {
        calls: AtomicU32,
        error: UploadError,
    }

    #[async_trait]
    impl UploadTransport for AlwaysFails {
        async fn send(
            &self,
            _request: &UploadRequest,
            _progress: ProgressFn,
        ) -> Result<UploadReceipt, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    fn request() -> UploadRequest {
        UploadRequest {
            data: Bytes::from_static(b"webm"),
            title: "Demo".to_string(),
            duration_secs: 4,
            content_type: "video/webm".to_string(),
            file_name: "demo.webm".to_string(),
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 200), 0.0);
        assert_eq!(progress_percent(50, 200), 25.0);
        assert_eq!(progress_percent(300, 200), 100.0);
        assert_eq!(progress_percent(0, 0), 100.0);
    }

    #[test]
    fn test_delay_doubles_with_bounded_jitter() {
        let policy = RetryPolicy::default();
        for (failures, base_ms) in [(1u32, 500u128), (2, 1000), (3, 2000)] {
            let delay = policy.delay_for(failures).as_millis();
            assert!(delay >= base_ms && delay <= base_ms + base_ms / 2, "{}", delay);
        }
        assert_eq!(RetryPolicy::immediate().delay_for(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_job_stops_after_three_attempts() {
        let transport = AlwaysFails {
            calls: AtomicU32::new(0),
            error: UploadError::Network("connection reset".to_string()),
        };
        let mut job = UploadJob::new(request());

        let result =
            upload_with_retry(&transport, &mut job, &RetryPolicy::immediate(), no_progress()).await;

        assert!(matches!(result, Err(UploadError::Network(_))));
        assert_eq!(job.attempts(), 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert!(!job.can_retry());
        assert!(job.is_terminal_failure());

        // Exhausted jobs do not send again
        assert!(job.attempt(&transport, no_progress()).await.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried_by_default() {
        let transport = AlwaysFails {
            calls: AtomicU32::new(0),
            error: UploadError::Validation {
                status: 400,
                message: "Only video files are allowed".to_string(),
            },
        };
        let mut job = UploadJob::new(request());

        let result =
            upload_with_retry(&transport, &mut job, &RetryPolicy::immediate(), no_progress()).await;

        assert!(matches!(result, Err(UploadError::Validation { status: 400, .. })));
        assert_eq!(job.attempts(), 1);
        // The job itself would still allow another attempt
        assert!(job.can_retry());
    }
}
