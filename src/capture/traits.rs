//! Capture backend traits
//!
//! Platform-agnostic seams for media sources, the audio mixing graph and the encoder.
//! A backend wraps whatever actually produces media (a browser's media devices, a native
//! capture API, or a test double).

use std::time::Duration;

use super::codec::CodecProfile;

/// Kind of media a track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A live media track owned by a capture session
pub trait MediaTrack: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Stop the track and release the underlying device
    fn stop(&mut self);
}

/// Tracks handed out for a display capture request
pub struct DisplayCapture {
    pub video: Box<dyn MediaTrack>,
    /// System/tab audio, when requested and available
    pub audio: Option<Box<dyn MediaTrack>>,
}

/// Why a source could not be acquired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    PermissionDenied(String),
    NoSource(String),
    Unsupported(String),
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::PermissionDenied(reason) => write!(f, "permission denied: {}", reason),
            AcquireError::NoSource(reason) => write!(f, "no source available: {}", reason),
            AcquireError::Unsupported(reason) => write!(f, "unsupported: {}", reason),
        }
    }
}

/// Audio graph that sums several inputs into one output track
pub trait AudioMixer: Send {
    /// Route `source` into the mix with the given gain (1.0 = unchanged)
    fn connect(&mut self, source: &dyn MediaTrack, gain: f32) -> Result<(), String>;

    /// The mixed output track
    fn output(&mut self) -> Result<Box<dyn MediaTrack>, String>;

    /// Tear down the graph
    fn close(&mut self);
}

/// Encoder producing fragments at a fixed timeslice
///
/// Fragments produced while running are delivered by the host to
/// [`CaptureSession::on_fragment`](super::CaptureSession::on_fragment) in callback order.
pub trait MediaEncoder: Send {
    fn start(&mut self, timeslice: Duration) -> Result<(), String>;

    /// Stop encoding and return any fragments still buffered
    fn finish(&mut self) -> Result<Vec<Vec<u8>>, String>;
}

/// Entry point to the platform's capture capabilities
pub trait CaptureBackend: Send {
    /// Report missing capabilities required for capture and encoding
    fn check_support(&self) -> Result<(), String>;

    /// Whether the encoder can produce the given MIME type
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn acquire_display(&mut self, with_audio: bool) -> Result<DisplayCapture, AcquireError>;

    fn acquire_microphone(&mut self) -> Result<Box<dyn MediaTrack>, AcquireError>;

    fn create_mixer(&mut self) -> Result<Box<dyn AudioMixer>, String>;

    fn create_encoder(
        &mut self,
        tracks: &[&dyn MediaTrack],
        codec: &CodecProfile,
    ) -> Result<Box<dyn MediaEncoder>, String>;
}
