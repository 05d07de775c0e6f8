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

use std::{fmt, str::FromStr};

use super::error::AudioError;
use super::Frame;

/// Full-scale multiplier for signed 16-bit output.
const S16_MULTIPLIER: f32 = 32767.0;

/// Sample format enumeration for audio processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (16 or 32 bit)
    Int,
    /// Floating point samples
    Float,
}

impl FromStr for SampleFormat {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(AudioError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl SampleFormat {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format the device converts to at its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Swap the byte order of 16-bit integer output.
    pub swap_endian: bool,
}

impl TargetFormat {
    /// Creates a new TargetFormat, rejecting combinations no backend can be fed.
    pub fn new(
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate);
        }
        let supported = match sample_format {
            SampleFormat::Float => bits_per_sample == 32,
            SampleFormat::Int => bits_per_sample == 16 || bits_per_sample == 32,
        };
        if !supported {
            return Err(AudioError::UnsupportedBitDepth {
                format: sample_format,
                bits: bits_per_sample,
            });
        }

        Ok(TargetFormat {
            sample_rate,
            sample_format,
            bits_per_sample,
            swap_endian: false,
        })
    }

    /// The same format with byte swapping of 16-bit output turned on or off.
    pub fn with_swap_endian(mut self, swap_endian: bool) -> Self {
        self.swap_endian = swap_endian;
        self
    }

    /// True for signed 16-bit integer output.
    pub fn is_s16(&self) -> bool {
        self.sample_format == SampleFormat::Int && self.bits_per_sample == 16
    }
}

impl Default for TargetFormat {
    /// Creates a default target format (44.1kHz, 16-bit integer)
    fn default() -> Self {
        TargetFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::Int,
            bits_per_sample: 16,
            swap_endian: false,
        }
    }
}

/// Converts one float sample to signed 16-bit, clipping to full scale.
#[inline]
pub fn sample_to_s16(sample: f32, swap_endian: bool) -> i16 {
    let value = (sample.clamp(-1.0, 1.0) * S16_MULTIPLIER) as i16;
    if swap_endian {
        value.swap_bytes()
    } else {
        value
    }
}

/// Converts float frames to interleaved signed 16-bit samples. Returns the number of
/// frames written, bounded by the smaller of the two buffers.
pub fn convert_to_s16(frames: &[Frame], out: &mut [i16], swap_endian: bool) -> usize {
    let count = frames.len().min(out.len() / 2);
    for (frame, dst) in frames[..count].iter().zip(out.chunks_exact_mut(2)) {
        dst[0] = sample_to_s16(frame[0], swap_endian);
        dst[1] = sample_to_s16(frame[1], swap_endian);
    }
    count
}
