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
use std::str::FromStr;

use serde::Deserialize;

use crate::audio::context::{DEFAULT_BASE_RATE, DEFAULT_FRAMES_PER_PERIOD};
use crate::audio::thread_priority::DEFAULT_CALLBACK_THREAD_PRIORITY;
use crate::audio::{AudioError, SampleFormat};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. Names starting with "mock" select the mock backend.
    device: String,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output sample format (default: "int")
    sample_format: Option<String>,

    /// Output bits per sample (default: 16)
    bits_per_sample: Option<u16>,

    /// Swap the byte order of 16-bit output (default: false)
    swap_endian: Option<bool>,

    /// Frames the engine renders per period (default: 256)
    frames_per_period: Option<usize>,

    /// Rate pitch and timing constants are defined against (default: 44100)
    base_sample_rate: Option<u32>,

    /// Linear master gain applied at the device (default: 1.0)
    master_gain: Option<f32>,

    /// Fixed backend buffer size in frames. When unset the backend picks.
    stream_buffer_size: Option<u32>,

    /// Priority (0-99) of the audio callback thread (default: 70)
    thread_priority: Option<u8>,

    /// Try SCHED_FIFO for the callback thread on unix (default: true)
    realtime: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            sample_format: None,
            bits_per_sample: None,
            swap_endian: None,
            frames_per_period: None,
            base_sample_rate: None,
            master_gain: None,
            stream_buffer_size: None,
            thread_priority: None,
            realtime: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output sample format.
    pub fn sample_format(&self) -> Result<SampleFormat, AudioError> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format),
            None => Ok(SampleFormat::Int),
        }
    }

    /// Returns the output bits per sample.
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    pub fn swap_endian(&self) -> bool {
        self.swap_endian.unwrap_or(false)
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period
            .unwrap_or(DEFAULT_FRAMES_PER_PERIOD)
            .max(1)
    }

    pub fn base_sample_rate(&self) -> u32 {
        self.base_sample_rate.unwrap_or(DEFAULT_BASE_RATE)
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.unwrap_or(1.0)
    }

    /// Returns the fixed backend buffer size, if one was set.
    pub fn stream_buffer_frames(&self) -> Option<u32> {
        self.stream_buffer_size
    }

    pub fn thread_priority(&self) -> u8 {
        self.thread_priority
            .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }
}
