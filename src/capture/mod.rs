//! Screen capture: sources, audio mixing, encoding and the session lifecycle.

pub mod codec;
pub mod session;
pub mod sources;
pub mod state;
pub mod traits;

pub use codec::{CodecProfile, CODEC_PREFERENCES};
pub use session::{AudioSources, CaptureNotice, CaptureOptions, CaptureSession, Tick};
pub use state::CaptureState;
pub use traits::{
    AcquireError, AudioMixer, CaptureBackend, DisplayCapture, MediaEncoder, MediaTrack, TrackKind,
};
