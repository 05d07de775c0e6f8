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

//! Pitch-driven resampling.
//!
//! Zero-order hold and linear interpolation are evaluated directly at the fractional
//! cursor. Band-limited interpolation goes through rubato's sinc resampler, which is
//! owned by [`SincResampler`] and released with it.

use std::fmt;
use std::str::FromStr;

use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::Deserialize;

use crate::audio::Frame;

/// Output frames produced per call into the sinc resampler.
const SINC_CHUNK_FRAMES: usize = 64;

/// How far the ratio may drift from the one the resampler was built with. Covers
/// four octaves in either direction.
const MAX_RELATIVE_RATIO: f64 = 16.0;

/// Output FIFO capacity reserved up front so steady-state periods never allocate.
const FIFO_RESERVE_FRAMES: usize = 4096;

/// Errors from the resampling stage. All of them are recoverable per period.
#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error("Invalid resampling step {0}")]
    InvalidStep(f64),

    #[error("Resampler construction failed: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Processing(#[from] rubato::ResampleError),
}

/// Interpolation quality used to resolve fractional cursor positions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Zero-order hold: the frame under the cursor, truncated.
    None,
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Band-limited sinc interpolation.
    Sinc,
}

impl Interpolation {
    /// Maps the persisted mode index (0 = none, 1 = linear, 2 = sinc).
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Interpolation::None),
            1 => Some(Interpolation::Linear),
            2 => Some(Interpolation::Sinc),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Interpolation::None => 0,
            Interpolation::Linear => 1,
            Interpolation::Sinc => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::None => "none",
            Interpolation::Linear => "linear",
            Interpolation::Sinc => "sinc",
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Interpolation::None),
            "linear" => Ok(Interpolation::Linear),
            "sinc" => Ok(Interpolation::Sinc),
            _ => Err(format!("Unsupported interpolation mode: {}", s)),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Blends two neighbouring frames at `frac` (0.0 = `a`, 1.0 = `b`).
#[inline]
pub fn lerp_frame(a: Frame, b: Frame, frac: f32) -> Frame {
    [a[0] + (b[0] - a[0]) * frac, a[1] + (b[1] - a[1]) * frac]
}

/// Checks a cursor step before it is used for anything.
#[inline]
pub fn validate_step(step: f64) -> Result<f64, ResampleError> {
    if step.is_finite() && step > 0.0 {
        Ok(step)
    } else {
        Err(ResampleError::InvalidStep(step))
    }
}

/// Planar FIFO of resampled frames waiting to be handed out.
struct OutputFifo {
    channels: [Vec<f32>; 2],
    read_pos: usize,
}

impl OutputFifo {
    fn new() -> Self {
        Self {
            channels: [
                Vec::with_capacity(FIFO_RESERVE_FRAMES),
                Vec::with_capacity(FIFO_RESERVE_FRAMES),
            ],
            read_pos: 0,
        }
    }

    fn available(&self) -> usize {
        self.channels[0].len() - self.read_pos
    }

    fn push(&mut self, planar: &[Vec<f32>], frames: usize) {
        // Shift unread frames to the front instead of letting the vectors grow.
        if self.read_pos > 0 {
            for ch in self.channels.iter_mut() {
                ch.copy_within(self.read_pos.., 0);
                let unread = ch.len() - self.read_pos;
                ch.truncate(unread);
            }
            self.read_pos = 0;
        }
        for (ch, input) in self.channels.iter_mut().zip(planar.iter()) {
            ch.extend_from_slice(&input[..frames]);
        }
    }

    fn drain_into(&mut self, dst: &mut [Frame]) -> usize {
        let count = self.available().min(dst.len());
        let (left, right) = (&self.channels[0], &self.channels[1]);
        for (i, out) in dst[..count].iter_mut().enumerate() {
            *out = [left[self.read_pos + i], right[self.read_pos + i]];
        }
        self.read_pos += count;
        count
    }

    fn clear(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.clear();
        }
        self.read_pos = 0;
    }
}

/// Band-limited resampler for one voice.
///
/// The ratio is output frames per input frame (the inverse of the cursor step). Input
/// is pulled one frame at a time from a caller-supplied closure so the caller keeps
/// full control of loop handling and cursor movement.
pub struct SincResampler {
    inner: SincFixedOut<f32>,
    ratio: f64,
    /// Ratio the resampler was built with. Reset returns to it.
    original_ratio: f64,
    input: Vec<Vec<f32>>,
    output_scratch: Vec<Vec<f32>>,
    fifo: OutputFifo,
}

impl SincResampler {
    /// Builds a resampler for the given cursor step.
    pub fn new(step: f64) -> Result<Self, ResampleError> {
        let ratio = 1.0 / validate_step(step)?;
        let params = SincInterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedOut::<f32>::new(ratio, MAX_RELATIVE_RATIO, params, SINC_CHUNK_FRAMES, 2)?;

        let input = vec![vec![0.0; inner.input_frames_max()]; 2];
        let output_scratch = inner.output_buffer_allocate(true);

        Ok(Self {
            inner,
            ratio,
            original_ratio: ratio,
            input,
            output_scratch,
            fifo: OutputFifo::new(),
        })
    }

    /// Retunes the resampler for a new cursor step. Fails if the step is invalid or
    /// further from the original than the resampler supports.
    pub fn set_step(&mut self, step: f64) -> Result<(), ResampleError> {
        let ratio = 1.0 / validate_step(step)?;
        if ratio != self.ratio {
            self.inner.set_resample_ratio(ratio, false)?;
            self.ratio = ratio;
        }
        Ok(())
    }

    /// Frames ready to be drained.
    pub fn available(&self) -> usize {
        self.fifo.available()
    }

    /// Runs the resampler until at least `frames` output frames are buffered, pulling
    /// input frames from `next_input`.
    pub fn fill<F>(&mut self, frames: usize, mut next_input: F) -> Result<(), ResampleError>
    where
        F: FnMut() -> Frame,
    {
        while self.fifo.available() < frames {
            let needed = self.inner.input_frames_next();
            for i in 0..needed {
                let frame = next_input();
                self.input[0][i] = frame[0];
                self.input[1][i] = frame[1];
            }

            let wave_in = [&self.input[0][..needed], &self.input[1][..needed]];
            let (_, produced) =
                self.inner
                    .process_into_buffer(&wave_in, &mut self.output_scratch, None)?;
            self.fifo.push(&self.output_scratch, produced);
        }
        Ok(())
    }

    /// Moves buffered frames into `dst`, returning how many were written.
    pub fn drain_into(&mut self, dst: &mut [Frame]) -> usize {
        self.fifo.drain_into(dst)
    }

    /// Drops buffered output and filter history.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.ratio = self.original_ratio;
        self.fifo.clear();
    }
}

impl fmt::Debug for SincResampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SincResampler")
            .field("ratio", &self.ratio)
            .field("buffered", &self.fifo.available())
            .finish()
    }
}
