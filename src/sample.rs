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
use std::sync::Arc;

use serde::Deserialize;

use crate::audio::Frame;
use crate::playback::{Cursor, PlaybackState};
use crate::resampler::{lerp_frame, validate_step, Interpolation, ResampleError};

mod buffer;
mod decode;
mod error;
mod points;

pub use buffer::SampleBuffer;
pub use error::SampleError;
pub use points::{PointFrames, PointModel, POINT_EPSILON};

/// What happens when the cursor reaches the end marker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Stop at the end marker.
    #[default]
    Off,
    /// Jump back to the loop start.
    Loop,
    /// Bounce between the loop start and the end marker.
    PingPong,
}

impl LoopMode {
    /// Maps the persisted loop index (0 = off, 1 = loop, 2 = ping-pong).
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(LoopMode::Off),
            1 => Some(LoopMode::Loop),
            2 => Some(LoopMode::PingPong),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            LoopMode::Off => 0,
            LoopMode::Loop => 1,
            LoopMode::PingPong => 2,
        }
    }
}

/// One published version of a sample: decoded audio plus the markers and playback
/// parameters that apply to it. Snapshots are immutable. Edits build a new snapshot
/// and swap it in, so a renderer never sees half an update.
#[derive(Debug, Clone)]
pub struct Sample {
    buffer: Arc<SampleBuffer>,
    points: PointFrames,
    amplification: f32,
    reversed: bool,
}

impl Default for Sample {
    fn default() -> Self {
        Self::new(Arc::new(SampleBuffer::default()))
    }
}

impl Sample {
    /// Wraps a buffer with full-range markers, unity amplification, not reversed.
    pub fn new(buffer: Arc<SampleBuffer>) -> Self {
        let points = PointFrames::full(buffer.len());
        Self {
            buffer,
            points,
            amplification: 1.0,
            reversed: false,
        }
    }

    /// The same sample with different markers.
    pub fn with_points(&self, points: PointFrames) -> Self {
        Self {
            points,
            ..self.clone()
        }
    }

    pub fn with_amplification(&self, amplification: f32) -> Self {
        Self {
            amplification,
            ..self.clone()
        }
    }

    pub fn with_reversed(&self, reversed: bool) -> Self {
        Self {
            reversed,
            ..self.clone()
        }
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn points(&self) -> PointFrames {
        self.points
    }

    pub fn start_frame(&self) -> usize {
        self.points.start
    }

    pub fn end_frame(&self) -> usize {
        self.points.end
    }

    pub fn loop_start_frame(&self) -> usize {
        self.points.loop_start
    }

    pub fn loop_end_frame(&self) -> usize {
        self.points.loop_end
    }

    pub fn amplification(&self) -> f32 {
        self.amplification
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    /// Source frames advanced per output frame for a pitch ratio at the given
    /// processing rate.
    pub fn playback_step(&self, pitch_ratio: f64, processing_rate: u32) -> f64 {
        if processing_rate == 0 {
            return 0.0;
        }
        self.buffer.sample_rate() as f64 / processing_rate as f64 * pitch_ratio
    }

    /// Renders `dst.len()` frames starting at the state's cursor, advancing it by `step`
    /// source frames per output frame.
    ///
    /// Returns `Ok(false)` when there was nothing to play: a degenerate sample, or a
    /// cursor already past the end with looping off. In that case `dst` is silenced.
    /// With looping off, a sample that runs out partway through the period zero-pads
    /// the rest and still returns `Ok(true)`.
    ///
    /// A resampler failure silences `dst` and leaves the cursor where it was.
    pub fn play(
        &self,
        dst: &mut [Frame],
        state: &mut PlaybackState,
        step: f64,
        loop_mode: LoopMode,
    ) -> Result<bool, ResampleError> {
        let Some(region) = self.region() else {
            dst.fill([0.0; 2]);
            return Ok(false);
        };
        let step = match validate_step(step) {
            Ok(step) => step,
            Err(e) => {
                dst.fill([0.0; 2]);
                return Err(e);
            }
        };

        let mut cursor = state.cursor();
        if !region.admit(&mut cursor, loop_mode) {
            dst.fill([0.0; 2]);
            return Ok(false);
        }

        if state.needs_sinc(step) {
            if let Err(e) = self.render_sinc(dst, state, &region, &mut cursor, step, loop_mode) {
                state.reset_resampler();
                dst.fill([0.0; 2]);
                return Err(e);
            }
        } else {
            state.leave_sinc();
            self.render_direct(dst, state.interpolation(), &region, &mut cursor, step, loop_mode);
        }

        if self.amplification != 1.0 {
            for frame in dst.iter_mut() {
                frame[0] *= self.amplification;
                frame[1] *= self.amplification;
            }
        }

        state.set_cursor(cursor);
        Ok(true)
    }

    /// The playable region, or None for a degenerate sample.
    fn region(&self) -> Option<Region> {
        let total = self.buffer.len();
        if total < 2 {
            return None;
        }
        let end = self.points.end.min(total);
        let start = self.points.start.min(end);
        if end <= start {
            return None;
        }
        Some(Region {
            start,
            end,
            loop_start: self.points.loop_start.clamp(start, end - 1),
            loop_end: self.points.loop_end.clamp(start + 1, end),
        })
    }

    #[inline]
    fn frame_at(&self, index: usize) -> Frame {
        let frames = self.buffer.frames();
        if self.reversed {
            frames[frames.len() - 1 - index]
        } else {
            frames[index]
        }
    }

    #[inline]
    fn interpolate(
        &self,
        region: &Region,
        position: f64,
        interpolation: Interpolation,
        loop_mode: LoopMode,
    ) -> Frame {
        let index = (position as usize).min(region.end - 1);
        match interpolation {
            Interpolation::None => self.frame_at(index),
            Interpolation::Linear | Interpolation::Sinc => {
                let frac = (position - index as f64) as f32;
                if frac <= 0.0 {
                    return self.frame_at(index);
                }
                let next = match loop_mode {
                    LoopMode::Loop if index + 1 >= region.loop_end => region.loop_start,
                    _ => (index + 1).min(region.end - 1),
                };
                lerp_frame(self.frame_at(index), self.frame_at(next), frac)
            }
        }
    }

    fn render_direct(
        &self,
        dst: &mut [Frame],
        interpolation: Interpolation,
        region: &Region,
        cursor: &mut Cursor,
        step: f64,
        loop_mode: LoopMode,
    ) {
        let end = region.end as f64;
        for i in 0..dst.len() {
            if loop_mode == LoopMode::Off && cursor.position >= end {
                dst[i..].fill([0.0; 2]);
                return;
            }
            dst[i] = self.interpolate(region, cursor.position, interpolation, loop_mode);
            region.advance(cursor, step, loop_mode);
        }
    }

    fn render_sinc(
        &self,
        dst: &mut [Frame],
        state: &mut PlaybackState,
        region: &Region,
        cursor: &mut Cursor,
        step: f64,
        loop_mode: LoopMode,
    ) -> Result<(), ResampleError> {
        let end = region.end as f64;
        let mut feed = state.sinc_feed().unwrap_or(*cursor);
        // A non-looping feed past the end keeps feeding silence.
        region.admit(&mut feed, loop_mode);
        let resampler = state.sinc_resampler(step)?;

        // The resampler walks the source one whole frame at a time.
        resampler.fill(dst.len(), || {
            if loop_mode == LoopMode::Off && feed.position >= end {
                return [0.0; 2];
            }
            let frame = self.frame_at((feed.position as usize).min(region.end - 1));
            region.advance(&mut feed, 1.0, loop_mode);
            frame
        })?;
        resampler.drain_into(dst);
        state.set_sinc_feed(feed);

        // The resampler holds input it has read but not yet played. The cursor moves
        // by what was output, not by what was read.
        region.advance(cursor, step * dst.len() as f64, loop_mode);
        Ok(())
    }
}

/// Markers validated against the buffer for one render call.
#[derive(Debug, Clone, Copy)]
struct Region {
    start: usize,
    end: usize,
    loop_start: usize,
    loop_end: usize,
}

impl Region {
    /// Brings a cursor from an older snapshot into range. Returns false if a
    /// non-looping sample has already played out.
    fn admit(&self, cursor: &mut Cursor, loop_mode: LoopMode) -> bool {
        let start = self.start as f64;
        let end = self.end as f64;
        if !cursor.position.is_finite() {
            *cursor = Cursor::new(start, false);
        }

        match loop_mode {
            LoopMode::Off => {
                if cursor.position >= end {
                    return false;
                }
                cursor.position = cursor.position.max(start);
                cursor.backwards = false;
            }
            LoopMode::Loop => {
                cursor.position = cursor.position.max(start);
                if cursor.position >= end {
                    cursor.position = end - 1.0;
                }
                cursor.backwards = false;
            }
            LoopMode::PingPong => {
                cursor.position = cursor.position.max(start);
                if cursor.position >= end {
                    cursor.position = end - 1.0;
                }
            }
        }
        true
    }

    /// Moves the cursor `step` frames along, applying the loop mode.
    #[inline]
    fn advance(&self, cursor: &mut Cursor, step: f64, loop_mode: LoopMode) {
        match loop_mode {
            LoopMode::Off => cursor.position += step,
            LoopMode::Loop => {
                cursor.position += step;
                let loop_end = self.loop_end as f64;
                if cursor.position >= loop_end {
                    let loop_start = self.loop_start as f64;
                    cursor.position =
                        loop_start + (cursor.position - loop_start).rem_euclid(loop_end - loop_start);
                }
            }
            LoopMode::PingPong => {
                // Turning points are the loop start and the last frame. The bounce is
                // unfolded into a sawtooth of period 2 * span and folded back.
                let low = self.loop_start as f64;
                let span = (self.end - 1) as f64 - low;
                if span <= 0.0 {
                    *cursor = Cursor::new(low, false);
                    return;
                }

                if cursor.backwards && cursor.position < low {
                    // The loop start moved past a cursor heading down. Turn around
                    // where it is.
                    cursor.backwards = false;
                }

                let unfolded = if cursor.backwards {
                    2.0 * span - (cursor.position - low) + step
                } else {
                    let next = cursor.position + step;
                    if next < low {
                        // Still on the way in from the start marker.
                        cursor.position = next;
                        return;
                    }
                    next - low
                };

                let phase = unfolded.rem_euclid(2.0 * span);
                if phase <= span {
                    *cursor = Cursor::new(low + phase, false);
                } else {
                    *cursor = Cursor::new(low + 2.0 * span - phase, true);
                }
            }
        }
    }
}
