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
use crate::resampler::{Interpolation, ResampleError, SincResampler};

/// A read position in source frames plus the direction it is travelling.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub position: f64,
    pub backwards: bool,
}

impl Cursor {
    pub fn new(position: f64, backwards: bool) -> Self {
        Self {
            position,
            backwards,
        }
    }
}

/// Per-voice playback state. Owned by exactly one note and only touched from the
/// thread rendering that note.
///
/// The cursor is the source position of the next frame the note will output. With
/// sinc interpolation the resampler reads ahead of that position; where it reads from
/// is tracked separately as the feed.
#[derive(Debug)]
pub struct PlaybackState {
    cursor: Cursor,
    interpolation: Interpolation,
    varying_pitch: bool,
    sinc: Option<SincResampler>,
    feed: Option<Cursor>,
}

impl PlaybackState {
    /// Creates a state positioned at frame 0, travelling forwards.
    pub fn new(varying_pitch: bool, interpolation: Interpolation) -> Self {
        Self {
            cursor: Cursor::default(),
            interpolation,
            varying_pitch,
            sinc: None,
            feed: None,
        }
    }

    /// Hands the state a resampler built ahead of time, so the first sinc period does
    /// not have to build one.
    pub fn with_resampler(mut self, resampler: SincResampler) -> Self {
        self.sinc = Some(resampler);
        self
    }

    pub fn frame_index(&self) -> f64 {
        self.cursor.position
    }

    pub fn set_frame_index(&mut self, position: f64) {
        self.cursor.position = position;
    }

    pub fn is_backwards(&self) -> bool {
        self.cursor.backwards
    }

    pub fn set_backwards(&mut self, backwards: bool) {
        self.cursor.backwards = backwards;
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Whether the note's pitch may change while it sounds (detuning, pitch bends).
    pub fn varying_pitch(&self) -> bool {
        self.varying_pitch
    }

    /// True when rendering with this step has to go through the sinc resampler.
    pub fn needs_sinc(&self, step: f64) -> bool {
        self.interpolation == Interpolation::Sinc && (step != 1.0 || self.varying_pitch)
    }

    /// The voice's sinc resampler, built on first use and retuned to `step`.
    pub(crate) fn sinc_resampler(&mut self, step: f64) -> Result<&mut SincResampler, ResampleError> {
        match self.sinc {
            Some(ref mut resampler) => {
                resampler.set_step(step)?;
            }
            None => {
                self.sinc = Some(SincResampler::new(step)?);
            }
        }
        self.sinc
            .as_mut()
            .ok_or(ResampleError::InvalidStep(step))
    }

    /// Where the resampler reads its next input frame, if it has started reading.
    pub(crate) fn sinc_feed(&self) -> Option<Cursor> {
        self.feed
    }

    pub(crate) fn set_sinc_feed(&mut self, feed: Cursor) {
        self.feed = Some(feed);
    }

    /// Drops any buffered resampler output. The next sinc period starts reading at
    /// the cursor again.
    pub(crate) fn reset_resampler(&mut self) {
        if let Some(resampler) = self.sinc.as_mut() {
            resampler.reset();
        }
        self.feed = None;
    }

    /// Called when a period renders without the resampler. Output buffered from an
    /// earlier sinc period no longer lines up with the cursor.
    pub(crate) fn leave_sinc(&mut self) {
        if self.feed.is_some() {
            self.reset_resampler();
        }
    }

    /// Removes the resampler so it can be freed somewhere else.
    pub(crate) fn take_resampler(&mut self) -> Option<SincResampler> {
        self.feed = None;
        self.sinc.take()
    }
}
