//! Collects encoder output in arrival order and joins it into one playable object.

use bytes::{Bytes, BytesMut};
use log::warn;

use crate::errors::CaptureError;

/// One unit of encoder output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFragment {
    pub sequence: u64,
    pub data: Bytes,
}

impl EncodedFragment {
    pub fn new(sequence: u64, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            data: data.into(),
        }
    }
}

/// A finished recording ready for preview or upload
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRecording {
    pub data: Bytes,
    pub size: u64,
    pub content_type: String,
    pub duration_secs: u32,
}

impl AssembledRecording {
    /// Filename offered when the recording is downloaded or uploaded
    pub fn suggested_filename(&self) -> String {
        format!(
            "screen-recording-{}.{}",
            chrono::Utc::now().format("%Y%m%d-%H%M%S"),
            crate::constants::extension_for(&self.content_type)
        )
    }
}

/// Append-only fragment buffer with a single writer
#[derive(Debug, Default)]
pub struct MediaAssembler {
    fragments: Vec<Bytes>,
    last_sequence: Option<u64>,
    total_bytes: u64,
}

impl MediaAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a fragment, returning whether it was kept
    ///
    /// Empty fragments and fragments that arrive with a sequence number at or below the
    /// last accepted one are dropped.
    pub fn append(&mut self, fragment: EncodedFragment) -> bool {
        if fragment.data.is_empty() {
            warn!("Dropping empty fragment #{}", fragment.sequence);
            return false;
        }
        if let Some(last) = self.last_sequence {
            if fragment.sequence <= last {
                warn!(
                    "Dropping out-of-order fragment #{} (last accepted #{})",
                    fragment.sequence, last
                );
                return false;
            }
        }

        self.last_sequence = Some(fragment.sequence);
        self.total_bytes += fragment.data.len() as u64;
        self.fragments.push(fragment.data);
        true
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Join all accepted fragments in append order
    pub fn finalize(
        self,
        content_type: &str,
        duration_secs: u32,
    ) -> Result<AssembledRecording, CaptureError> {
        if self.fragments.is_empty() {
            return Err(CaptureError::EmptyCapture);
        }

        let mut data = BytesMut::with_capacity(self.total_bytes as usize);
        for fragment in &self.fragments {
            data.extend_from_slice(fragment);
        }

        Ok(AssembledRecording {
            size: self.total_bytes,
            data: data.freeze(),
            content_type: content_type.to_string(),
            duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_concatenates_in_append_order() {
        let mut assembler = MediaAssembler::new();
        assert!(assembler.append(EncodedFragment::new(0, &b"abc"[..])));
        assert!(assembler.append(EncodedFragment::new(1, &b"de"[..])));
        assert!(assembler.append(EncodedFragment::new(2, &b"f"[..])));

        let recording = assembler.finalize("video/webm", 3).unwrap();
        assert_eq!(&recording.data[..], b"abcdef");
        assert_eq!(recording.size, 6);
        assert_eq!(recording.duration_secs, 3);
        assert_eq!(recording.content_type, "video/webm");
    }

    #[test]
    fn test_empty_fragments_never_appear() {
        let mut assembler = MediaAssembler::new();
        assert!(assembler.append(EncodedFragment::new(0, &b"ab"[..])));
        assert!(!assembler.append(EncodedFragment::new(1, Bytes::new())));
        assert!(assembler.append(EncodedFragment::new(2, &b"cd"[..])));
        assert!(!assembler.append(EncodedFragment::new(3, Vec::new())));

        assert_eq!(assembler.fragment_count(), 2);
        let recording = assembler.finalize("video/webm", 2).unwrap();
        assert_eq!(&recording.data[..], b"abcd");
    }

    #[test]
    fn test_out_of_order_fragment_is_rejected() {
        let mut assembler = MediaAssembler::new();
        assert!(assembler.append(EncodedFragment::new(5, &b"x"[..])));
        assert!(!assembler.append(EncodedFragment::new(5, &b"y"[..])));
        assert!(!assembler.append(EncodedFragment::new(3, &b"z"[..])));
        assert!(assembler.append(EncodedFragment::new(6, &b"w"[..])));

        let recording = assembler.finalize("video/webm", 1).unwrap();
        assert_eq!(&recording.data[..], b"xw");
    }

    #[test]
    fn test_no_fragments_is_empty_capture() {
        let mut assembler = MediaAssembler::new();
        assembler.append(EncodedFragment::new(0, Bytes::new()));
        assert_eq!(
            assembler.finalize("video/webm", 10).unwrap_err(),
            CaptureError::EmptyCapture
        );
    }
}
