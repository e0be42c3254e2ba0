//! Encoder configuration negotiation.

/// An encoder configuration the session may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    /// Full MIME type including codecs, passed to the encoder
    pub mime_type: &'static str,
    /// Container type declared on the finished recording
    pub container: &'static str,
}

/// Encoder configurations in order of preference
pub const CODEC_PREFERENCES: [CodecProfile; 3] = [
    CodecProfile {
        mime_type: "video/webm;codecs=vp9,opus",
        container: "video/webm",
    },
    CodecProfile {
        mime_type: "video/webm;codecs=vp8,opus",
        container: "video/webm",
    },
    CodecProfile {
        mime_type: "video/webm",
        container: "video/webm",
    },
];

/// Pick the first supported profile from `preferences`
pub fn negotiate<F>(preferences: &[CodecProfile], is_supported: F) -> Option<CodecProfile>
where
    F: Fn(&str) -> bool,
{
    preferences
        .iter()
        .find(|profile| is_supported(profile.mime_type))
        .copied()
}
