//! Capture session state machine.
//!
//! `Idle -> RequestingPermissions -> Recording -> Stopping -> Stopped`, with `Failed`
//! reachable from every non-terminal state.

/// Lifecycle state of a capture session
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CaptureState {
    /// Created, nothing acquired yet.
    #[default]
    Idle,

    /// Waiting for display/microphone sources.
    RequestingPermissions,

    /// Encoder running, ticks advance elapsed time.
    Recording,

    /// Flushing the encoder and releasing sources.
    Stopping,

    /// Finished with a recording.
    Stopped,

    /// Ended without a recording.
    Failed { reason: String, retryable: bool },
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::RequestingPermissions => "requesting permissions",
            CaptureState::Recording => "recording",
            CaptureState::Stopping => "stopping",
            CaptureState::Stopped => "stopped",
            CaptureState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Stopped | CaptureState::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &CaptureState) -> bool {
        match (self, next) {
            (CaptureState::Idle, CaptureState::RequestingPermissions)
            | (CaptureState::RequestingPermissions, CaptureState::Recording)
            | (CaptureState::Recording, CaptureState::Stopping)
            | (CaptureState::Stopping, CaptureState::Stopped) => true,
            (current, CaptureState::Failed { .. }) => !current.is_terminal(),
            _ => false,
        }
    }
}
