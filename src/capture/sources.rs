//! Ownership of everything a capture session acquires.

use log::debug;

use super::traits::{AudioMixer, MediaTrack};

/// Tracks and mixer owned by one session, released exactly once
///
/// Release happens on the first of [`SourceSet::release`] or drop.
#[derive(Default)]
pub struct SourceSet {
    tracks: Vec<Box<dyn MediaTrack>>,
    recorded: Vec<usize>,
    mixer: Option<Box<dyn AudioMixer>>,
    released: bool,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a track; `recorded` tracks are fed to the encoder
    pub fn add(&mut self, track: Box<dyn MediaTrack>, recorded: bool) -> usize {
        let index = self.tracks.len();
        self.tracks.push(track);
        if recorded {
            self.recorded.push(index);
        }
        index
    }

    pub fn mark_recorded(&mut self, index: usize) {
        if index < self.tracks.len() && !self.recorded.contains(&index) {
            self.recorded.push(index);
        }
    }

    /// Sum the given tracks through `mixer` and record its output instead of them
    ///
    /// The mixer is owned by the set even when wiring fails, so it is closed on release.
    pub fn mix(
        &mut self,
        mut mixer: Box<dyn AudioMixer>,
        inputs: &[(usize, f32)],
    ) -> Result<(), String> {
        let output = connect_all(mixer.as_mut(), &self.tracks, inputs).and_then(|_| mixer.output());
        self.mixer = Some(mixer);
        let output = output?;
        self.add(output, true);
        Ok(())
    }

    pub fn recorded_tracks(&self) -> Vec<&dyn MediaTrack> {
        self.recorded
            .iter()
            .map(|&index| self.tracks[index].as_ref())
            .collect()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close the mixer and stop every track; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(mut mixer) = self.mixer.take() {
            mixer.close();
        }
        for track in &mut self.tracks {
            debug!("Stopping track {}", track.id());
            track.stop();
        }
    }
}

impl Drop for SourceSet {
    fn drop(&mut self) {
        self.release();
    }
}

fn connect_all(
    mixer: &mut dyn AudioMixer,
    tracks: &[Box<dyn MediaTrack>],
    inputs: &[(usize, f32)],
) -> Result<(), String> {
    for &(index, gain) in inputs {
        let track = tracks
            .get(index)
            .ok_or_else(|| format!("no track at index {}", index))?;
        mixer.connect(track.as_ref(), gain)?;
    }
    Ok(())
}
