// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Bookkeeping for sounding voices. Voices are never stolen: every trigger gets its
//! own voice, which lives until its sample runs out or it is cancelled.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::SampleKey;
use crate::playsync::CancelHandle;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one triggered voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub(crate) fn next() -> VoiceId {
        VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// Represents an active voice playing a sample.
pub struct Voice {
    id: VoiceId,
    key: SampleKey,
    cancel_handle: CancelHandle,
}

impl Voice {
    pub fn new(id: VoiceId, key: SampleKey, cancel_handle: CancelHandle) -> Voice {
        Voice {
            id,
            key,
            cancel_handle,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn key(&self) -> &SampleKey {
        &self.key
    }
}

/// Tracks the voices currently sounding.
#[derive(Default)]
pub struct VoiceTracker {
    voices: Vec<Voice>,
}

impl VoiceTracker {
    pub fn new() -> VoiceTracker {
        VoiceTracker::default()
    }

    /// Adds a voice. Existing voices, including ones for the same key, keep playing.
    pub fn add(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Removes a voice that has ended. Returns it if it was still tracked.
    pub fn remove(&mut self, id: VoiceId) -> Option<Voice> {
        let index = self.voices.iter().position(|v| v.id == id)?;
        Some(self.voices.remove(index))
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    #[cfg(test)]
    fn count_for(&self, key: &SampleKey) -> usize {
        self.voices.iter().filter(|v| &v.key == key).count()
    }

    /// Clears all voices.
    /// Returns the cancel handles for all voices that should be stopped.
    pub fn clear(&mut self) -> Vec<CancelHandle> {
        self.voices
            .drain(..)
            .map(|v| v.cancel_handle)
            .collect()
    }
}

impl fmt::Debug for VoiceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceTracker")
            .field("active_voices", &self.voices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_voice(key: &str) -> (Voice, CancelHandle) {
        let cancel_handle = CancelHandle::new();
        (
            Voice::new(VoiceId::next(), SampleKey::new(key), cancel_handle.clone()),
            cancel_handle,
        )
    }

    #[test]
    fn test_same_key_voices_overlap() {
        let mut tracker = VoiceTracker::new();
        let (first, _) = make_voice("A");
        let (second, _) = make_voice("A");
        let first_id = first.id();
        let second_id = second.id();
        assert_ne!(first_id, second_id);

        tracker.add(first);
        tracker.add(second);
        assert_eq!(tracker.count_for(&SampleKey::new("a")), 2);

        // Each ends independently.
        assert!(tracker.remove(first_id).is_some());
        assert!(tracker.remove(first_id).is_none());
        assert_eq!(tracker.active_count(), 1);
        assert_eq!(tracker.remove(second_id).unwrap().key(), &SampleKey::new("A"));
    }

    #[test]
    fn test_clear_returns_cancel_handles() {
        let mut tracker = VoiceTracker::new();
        let (voice, cancel_handle) = make_voice("K");
        tracker.add(voice);

        let handles = tracker.clear();
        assert_eq!(handles.len(), 1);
        handles.iter().for_each(CancelHandle::cancel);
        assert!(cancel_handle.is_cancelled());
        assert_eq!(tracker.active_count(), 0);
    }
}
