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

//! Note records and the pre-sized pool the mixer keeps them in.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::playback::PlaybackState;
use crate::resampler::SincResampler;

/// Global note ID counter.
static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

/// One sounding note, as seen by the sampler.
#[derive(Debug)]
pub struct NotePlayHandle {
    /// Unique, increasing ID. Lower IDs are older notes.
    id: u64,
    /// Key that triggered the note, for note-off matching.
    key: u8,
    frequency: f32,
    /// Where in the current period buffer this note starts.
    offset: usize,
    /// Frames to render this period.
    frames: usize,
    /// Frames left before the note ends by itself, if it has a length.
    remaining: Option<u64>,
    frames_played: u64,
    has_detuning_info: bool,
    released: bool,
    exhausted: bool,
    playback: Option<PlaybackState>,
    /// Built on the control side for the playback state to pick up.
    resampler: Option<SincResampler>,
}

impl NotePlayHandle {
    /// Creates a note at the given frequency. `offset` is the frame within the first
    /// period at which it begins.
    pub fn new(key: u8, frequency: f32, offset: usize) -> Self {
        Self {
            id: NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed),
            key,
            frequency,
            offset,
            frames: 0,
            remaining: None,
            frames_played: 0,
            has_detuning_info: false,
            released: false,
            exhausted: false,
            playback: None,
            resampler: None,
        }
    }

    /// Attaches a sinc resampler for the note's playback state to use.
    pub fn with_resampler(mut self, resampler: SincResampler) -> Self {
        self.resampler = Some(resampler);
        self
    }

    /// Limits the note to a number of output frames.
    pub fn with_length(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    /// Marks the note as one whose pitch may move while it sounds.
    pub fn with_detuning(mut self) -> Self {
        self.has_detuning_info = true;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Retunes the note. Marks it as varying pitch so later periods resample.
    pub fn set_frequency(&mut self, frequency: f32) {
        if frequency != self.frequency {
            self.has_detuning_info = true;
        }
        self.frequency = frequency;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn has_detuning_info(&self) -> bool {
        self.has_detuning_info
    }

    /// Prepares the note for a period of `period_frames` frames. The first period
    /// renders after the note's offset; later ones start at zero.
    pub fn begin_period(&mut self, period_frames: usize) {
        self.offset = self.offset.min(period_frames);
        let mut frames = period_frames - self.offset;
        if let Some(remaining) = self.remaining {
            frames = frames.min(remaining as usize);
        }
        self.frames = frames;
    }

    /// Books the frames rendered this period.
    pub fn end_period(&mut self) {
        self.frames_played += self.frames as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(self.frames as u64);
        }
        self.offset = 0;
    }

    /// Releases the note. It renders nothing from now on.
    pub fn release(&mut self) {
        self.released = true;
    }

    /// True once the note was released or its length has elapsed.
    pub fn is_finished(&self) -> bool {
        self.released || self.remaining == Some(0)
    }

    /// True once a non-looping sample has played out under this note.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn playback(&self) -> Option<&PlaybackState> {
        self.playback.as_ref()
    }

    pub(crate) fn playback_mut(&mut self) -> Option<&mut PlaybackState> {
        self.playback.as_mut()
    }

    pub(crate) fn set_playback(&mut self, state: PlaybackState) {
        self.playback = Some(state);
    }

    pub(crate) fn take_playback(&mut self) -> Option<PlaybackState> {
        self.playback.take()
    }

    /// The attached resampler, if playback has not claimed it.
    pub(crate) fn take_prepared_resampler(&mut self) -> Option<SincResampler> {
        self.resampler.take()
    }

    /// Takes whichever resampler the note holds, attached or in use.
    pub fn take_resampler(&mut self) -> Option<SincResampler> {
        self.resampler
            .take()
            .or_else(|| self.playback.as_mut().and_then(|p| p.take_resampler()))
    }
}

/// Active notes, kept in a vector sized once up front.
#[derive(Debug)]
pub struct NotePool {
    notes: Vec<NotePlayHandle>,
    max_notes: usize,
}

impl NotePool {
    pub fn new(max_notes: usize) -> Self {
        let max_notes = max_notes.max(1);
        Self {
            notes: Vec::with_capacity(max_notes),
            max_notes,
        }
    }

    /// Adds a note. When the pool is full the oldest note is stolen and returned so
    /// the caller can release its data.
    pub fn add(&mut self, note: NotePlayHandle) -> Option<NotePlayHandle> {
        let stolen = if self.notes.len() >= self.max_notes {
            let oldest = self
                .notes
                .iter()
                .enumerate()
                .min_by_key(|(_, n)| n.id())
                .map(|(index, _)| index);
            oldest.map(|index| {
                debug!(max_notes = self.max_notes, "Note limit reached, stealing oldest");
                self.notes.swap_remove(index)
            })
        } else {
            None
        };
        self.notes.push(note);
        stolen
    }

    /// Releases every note triggered by `key`.
    pub fn release_key(&mut self, key: u8) -> usize {
        let mut count = 0;
        for note in self.notes.iter_mut().filter(|n| n.key() == key) {
            note.release();
            count += 1;
        }
        count
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NotePlayHandle> {
        self.notes.iter_mut()
    }

    /// Removes finished and exhausted notes, handing each to `on_remove`.
    pub fn retire<F: FnMut(NotePlayHandle)>(&mut self, mut on_remove: F) {
        let mut index = 0;
        while index < self.notes.len() {
            if self.notes[index].is_finished() || self.notes[index].is_exhausted() {
                on_remove(self.notes.swap_remove(index));
            } else {
                index += 1;
            }
        }
    }

    /// Releases all notes.
    pub fn release_all(&mut self) {
        self.notes.iter_mut().for_each(NotePlayHandle::release);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let first = NotePlayHandle::new(60, 440.0, 0);
        let second = NotePlayHandle::new(60, 440.0, 0);
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_first_period_honours_offset() {
        let mut note = NotePlayHandle::new(60, 440.0, 100);
        note.begin_period(256);
        assert_eq!(note.offset(), 100);
        assert_eq!(note.frames(), 156);
        note.end_period();

        note.begin_period(256);
        assert_eq!(note.offset(), 0);
        assert_eq!(note.frames(), 256);
        assert_eq!(note.frames_played(), 156);
    }

    #[test]
    fn test_offset_is_clamped_to_period() {
        let mut note = NotePlayHandle::new(60, 440.0, 300);
        note.begin_period(256);
        assert_eq!(note.offset(), 256);
        assert_eq!(note.frames(), 0);
    }

    #[test]
    fn test_length_limits_frames() {
        let mut note = NotePlayHandle::new(60, 440.0, 0).with_length(300);
        note.begin_period(256);
        assert_eq!(note.frames(), 256);
        note.end_period();
        assert!(!note.is_finished());

        note.begin_period(256);
        assert_eq!(note.frames(), 44);
        note.end_period();
        assert!(note.is_finished());
    }

    #[test]
    fn test_retune_marks_detuning() {
        let mut note = NotePlayHandle::new(60, 440.0, 0);
        assert!(!note.has_detuning_info());
        note.set_frequency(440.0);
        assert!(!note.has_detuning_info());
        note.set_frequency(466.16);
        assert!(note.has_detuning_info());
    }

    #[test]
    fn test_pool_steals_oldest() {
        let mut pool = NotePool::new(2);
        let first = NotePlayHandle::new(1, 440.0, 0);
        let first_id = first.id();
        assert!(pool.add(first).is_none());
        assert!(pool.add(NotePlayHandle::new(2, 440.0, 0)).is_none());

        let stolen = pool.add(NotePlayHandle::new(3, 440.0, 0)).unwrap();
        assert_eq!(stolen.id(), first_id);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_release_and_retire() {
        let mut pool = NotePool::new(4);
        pool.add(NotePlayHandle::new(60, 440.0, 0));
        pool.add(NotePlayHandle::new(62, 493.88, 0));
        pool.add(NotePlayHandle::new(60, 440.0, 0));

        assert_eq!(pool.release_key(60), 2);
        let mut removed = Vec::new();
        pool.retire(|note| removed.push(note.key()));
        assert_eq!(removed, vec![60, 60]);
        assert_eq!(pool.len(), 1);

        pool.release_all();
        pool.retire(|_| {});
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 4);
    }
}
