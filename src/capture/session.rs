//! A single screen capture, from source acquisition to the assembled recording.
//!
//! The session is driven cooperatively by its host: `tick()` once per second,
//! `on_fragment()` for every encoder callback, and `source_ended()` when the display
//! source is closed from outside. All mutation goes through `&mut self`, so fragments
//! have a single writer and the competing stop paths (user, duration cap, external end,
//! encoder error, drop) cannot interleave; the first one wins.

use std::time::Duration;

use bytes::Bytes;
use log::{error, info, warn};
use uuid::Uuid;

use super::codec::{negotiate, CodecProfile, CODEC_PREFERENCES};
use super::sources::SourceSet;
use super::state::CaptureState;
use super::traits::{AcquireError, CaptureBackend, MediaEncoder};
use crate::assembler::{AssembledRecording, EncodedFragment, MediaAssembler};
use crate::constants::{
    DISPLAY_AUDIO_GAIN, DURATION_WARNING_SECS, MAX_DURATION_SECS, MICROPHONE_GAIN,
};
use crate::errors::CaptureError;

/// What to capture and for how long
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Ask for the display source's own audio (system or tab sound)
    pub capture_display_audio: bool,
    pub capture_microphone: bool,
    pub max_duration_secs: u32,
    /// Elapsed time from which the host is told the limit is near
    pub warning_threshold_secs: u32,
    /// Interval at which the encoder emits fragments
    pub timeslice: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            capture_display_audio: true,
            capture_microphone: false,
            max_duration_secs: MAX_DURATION_SECS,
            warning_threshold_secs: DURATION_WARNING_SECS,
            timeslice: Duration::from_secs(1),
        }
    }
}

/// Audio sources that ended up in the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioSources {
    pub display_audio: bool,
    pub microphone: bool,
}

/// Non-fatal events the host should surface to the user
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureNotice {
    /// Microphone could not be used; recording continues without it
    MicrophoneUnavailable(String),
    ApproachingLimit { remaining_secs: u32 },
    /// Stopped because the maximum duration was reached
    AutoStopped,
    /// Stopped because the display source was closed externally
    SourceEnded,
}

/// Result of one timer tick
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Session is not recording; nothing changed
    Ignored,
    Advanced { elapsed_secs: u32, approaching_limit: bool },
    /// The duration cap was reached and the session stopped
    AutoStopped(AssembledRecording),
}

pub struct CaptureSession {
    id: Uuid,
    state: CaptureState,
    options: CaptureOptions,
    elapsed_secs: u32,
    backend: Box<dyn CaptureBackend>,
    sources: Option<SourceSet>,
    encoder: Option<Box<dyn MediaEncoder>>,
    assembler: MediaAssembler,
    codec: Option<CodecProfile>,
    audio: AudioSources,
    next_sequence: u64,
    warned: bool,
    notices: Vec<CaptureNotice>,
}

impl CaptureSession {
    pub fn new(backend: Box<dyn CaptureBackend>, mut options: CaptureOptions) -> Self {
        // The server rejects anything longer than the hard cap
        options.max_duration_secs = options.max_duration_secs.clamp(1, MAX_DURATION_SECS);
        Self {
            id: Uuid::new_v4(),
            state: CaptureState::Idle,
            options,
            elapsed_secs: 0,
            backend,
            sources: None,
            encoder: None,
            assembler: MediaAssembler::new(),
            codec: None,
            audio: AudioSources::default(),
            next_sequence: 0,
            warned: false,
            notices: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn codec(&self) -> Option<CodecProfile> {
        self.codec
    }

    pub fn audio_sources(&self) -> AudioSources {
        self.audio
    }

    /// Take the notices queued since the last call
    pub fn drain_notices(&mut self) -> Vec<CaptureNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Acquire sources, wire the audio graph and start the encoder
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::InvalidState(self.state.name()));
        }

        if let Err(reason) = self.backend.check_support() {
            return Err(self.fail(CaptureError::UnsupportedEnvironment(reason)));
        }
        let backend = &self.backend;
        let codec = match negotiate(&CODEC_PREFERENCES, |mime| backend.is_type_supported(mime)) {
            Some(codec) => codec,
            None => {
                return Err(self.fail(CaptureError::UnsupportedEnvironment(
                    "no supported video encoder configuration".to_string(),
                )))
            }
        };
        self.codec = Some(codec);
        info!("Capture {} using {}", self.id, codec.mime_type);

        self.transition(CaptureState::RequestingPermissions);

        let display = match self
            .backend
            .acquire_display(self.options.capture_display_audio)
        {
            Ok(display) => display,
            Err(e) => {
                let err = match e {
                    AcquireError::PermissionDenied(r) => CaptureError::PermissionDenied(r),
                    AcquireError::NoSource(r) => CaptureError::NoSource(r),
                    AcquireError::Unsupported(r) => CaptureError::UnsupportedEnvironment(r),
                };
                return Err(self.fail(err));
            }
        };

        let mut sources = SourceSet::new();
        sources.add(display.video, true);
        let display_audio = display.audio.map(|track| sources.add(track, false));

        let microphone = if self.options.capture_microphone {
            match self.backend.acquire_microphone() {
                Ok(track) => Some(sources.add(track, false)),
                Err(e) => {
                    warn!("Microphone unavailable, recording display audio only: {}", e);
                    self.notices
                        .push(CaptureNotice::MicrophoneUnavailable(e.to_string()));
                    None
                }
            }
        } else {
            None
        };

        self.audio = AudioSources {
            display_audio: display_audio.is_some(),
            microphone: microphone.is_some(),
        };
        // Hand the set to the session now so every failure below releases it.
        let sources = self.sources.insert(sources);

        match (display_audio, microphone) {
            (Some(display_index), Some(mic_index)) => {
                let wired = self.backend.create_mixer().and_then(|mixer| {
                    sources.mix(
                        mixer,
                        &[
                            (display_index, DISPLAY_AUDIO_GAIN),
                            (mic_index, MICROPHONE_GAIN),
                        ],
                    )
                });
                if let Err(reason) = wired {
                    return Err(self.fail(CaptureError::EncoderFailure(format!(
                        "could not mix audio: {}",
                        reason
                    ))));
                }
            }
            (Some(index), None) | (None, Some(index)) => sources.mark_recorded(index),
            (None, None) => {}
        }

        let tracks = sources.recorded_tracks();
        let encoder = self
            .backend
            .create_encoder(&tracks, &codec)
            .and_then(|mut encoder| {
                encoder.start(self.options.timeslice)?;
                Ok(encoder)
            });
        drop(tracks);

        match encoder {
            Ok(encoder) => self.encoder = Some(encoder),
            Err(reason) => return Err(self.fail(CaptureError::EncoderFailure(reason))),
        }

        self.transition(CaptureState::Recording);
        info!(
            "Capture {} recording (display audio: {}, microphone: {})",
            self.id, self.audio.display_audio, self.audio.microphone
        );
        Ok(())
    }

    /// Encoder callback: append one fragment in arrival order
    pub fn on_fragment(&mut self, data: impl Into<Bytes>) {
        match self.state {
            CaptureState::Recording | CaptureState::Stopping => self.push_fragment(data.into()),
            _ => warn!(
                "Ignoring fragment delivered while {}",
                self.state.name()
            ),
        }
    }

    /// Advance elapsed time by one second and enforce the duration cap
    pub fn tick(&mut self) -> Result<Tick, CaptureError> {
        if self.state != CaptureState::Recording {
            return Ok(Tick::Ignored);
        }

        self.elapsed_secs += 1;

        if self.elapsed_secs >= self.options.max_duration_secs {
            info!(
                "Capture {} reached the {}s limit",
                self.id, self.options.max_duration_secs
            );
            self.notices.push(CaptureNotice::AutoStopped);
            return Ok(match self.stop()? {
                Some(recording) => Tick::AutoStopped(recording),
                None => Tick::Ignored,
            });
        }

        let approaching_limit = self.elapsed_secs >= self.options.warning_threshold_secs;
        if approaching_limit && !self.warned {
            self.warned = true;
            self.notices.push(CaptureNotice::ApproachingLimit {
                remaining_secs: self.options.max_duration_secs - self.elapsed_secs,
            });
        }

        Ok(Tick::Advanced {
            elapsed_secs: self.elapsed_secs,
            approaching_limit,
        })
    }

    /// The display source was closed from outside; stop as if the user had
    pub fn source_ended(&mut self) -> Result<Option<AssembledRecording>, CaptureError> {
        if self.state == CaptureState::Recording {
            info!("Capture {} display source ended externally", self.id);
            self.notices.push(CaptureNotice::SourceEnded);
        }
        self.stop()
    }

    /// Finish the recording
    ///
    /// Returns `Ok(None)` when the session is not recording.
    pub fn stop(&mut self) -> Result<Option<AssembledRecording>, CaptureError> {
        if self.state != CaptureState::Recording {
            return Ok(None);
        }
        self.transition(CaptureState::Stopping);

        let flushed = match self.encoder.take() {
            Some(mut encoder) => encoder.finish(),
            None => Ok(Vec::new()),
        };
        match flushed {
            Ok(fragments) => {
                for fragment in fragments {
                    self.push_fragment(Bytes::from(fragment));
                }
            }
            Err(reason) => return Err(self.fail(CaptureError::EncoderFailure(reason))),
        }

        self.release_sources();

        let content_type = self
            .codec
            .map(|codec| codec.container)
            .unwrap_or("video/webm");
        let assembler = std::mem::take(&mut self.assembler);
        match assembler.finalize(content_type, self.elapsed_secs) {
            Ok(recording) => {
                self.transition(CaptureState::Stopped);
                info!(
                    "Capture {} stopped after {}s ({} bytes)",
                    self.id, self.elapsed_secs, recording.size
                );
                Ok(Some(recording))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Encoder reported an error mid-recording
    ///
    /// Returns `None` if the session had already ended.
    pub fn encoder_failed(&mut self, reason: &str) -> Option<CaptureError> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.fail(CaptureError::EncoderFailure(reason.to_string())))
    }

    fn push_fragment(&mut self, data: Bytes) {
        let fragment = EncodedFragment::new(self.next_sequence, data);
        self.next_sequence += 1;
        self.assembler.append(fragment);
    }

    fn release_sources(&mut self) {
        if let Some(mut sources) = self.sources.take() {
            sources.release();
        }
    }

    /// Move to `Failed`, dropping the encoder and releasing every source
    fn fail(&mut self, error: CaptureError) -> CaptureError {
        error!("Capture {} failed: {}", self.id, error);
        self.encoder = None;
        self.release_sources();
        self.transition(CaptureState::Failed {
            reason: error.to_string(),
            retryable: error.is_retryable(),
        });
        error
    }

    fn transition(&mut self, next: CaptureState) {
        if !self.state.can_transition_to(&next) {
            warn!(
                "Capture {} unexpected transition {} -> {}",
                self.id,
                self.state.name(),
                next.name()
            );
        }
        self.state = next;
    }
}
