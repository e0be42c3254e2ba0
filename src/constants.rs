/// Expected database schema version
/// All databases must use this version for compatibility
pub const EXPECTED_DB_VERSION: &str = "1";

/// Default chunk size for stored media (255 KiB, same as GridFS)
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Largest chunk size a config may ask for
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Maximum accepted upload size in bytes (100 MB)
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Maximum recording duration in seconds
pub const MAX_DURATION_SECS: u32 = 180;

/// Elapsed seconds after which the caller is warned about the limit
pub const DURATION_WARNING_SECS: u32 = 150;

/// Gain applied to the display audio branch when mixed with a microphone
pub const DISPLAY_AUDIO_GAIN: f32 = 0.7;

/// Gain applied to the microphone branch
pub const MICROPHONE_GAIN: f32 = 1.0;

/// Maximum number of upload attempts (original attempt plus two retries)
pub const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// Generate a unique storage filename for an uploaded recording
///
/// The extension follows the declared content type, e.g. `video/webm` -> `webm`.
pub fn generate_storage_filename(content_type: &str) -> String {
    format!(
        "recording-{}-{}.{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        uuid::Uuid::new_v4().simple(),
        extension_for(content_type)
    )
}

/// File extension for a video content type (parameters such as `;codecs=` are ignored)
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "webm",
    }
}
