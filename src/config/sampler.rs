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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::resampler::Interpolation;
use crate::sample::LoopMode;

/// Frequency a note must have to play the sample at its recorded pitch.
pub const DEFAULT_BASE_FREQUENCY: f32 = 440.0;

/// Rate assumed for embedded sample data when none is given.
pub const DEFAULT_EMBEDDED_SAMPLE_RATE: u32 = 44100;

/// Amplification percentage bounds.
const MAX_AMPLIFICATION_PERCENT: f32 = 500.0;

/// The persisted sampler settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SamplerSettings {
    /// Path to the sample file.
    pub(crate) src: Option<String>,
    /// Embedded sample data: base64 of little-endian f32 stereo frames. Only used
    /// when `src` is absent.
    pub(crate) sampledata: Option<String>,
    /// Sample rate of the embedded data.
    pub(crate) samplerate: Option<u32>,
    /// Normalized start point.
    pub(crate) sframe: Option<f32>,
    /// Normalized end point.
    pub(crate) eframe: Option<f32>,
    /// Normalized loop start. Falls back to the start point.
    pub(crate) lframe: Option<f32>,
    /// Amplification in percent.
    pub(crate) amp: Option<f32>,
    pub(crate) reversed: Option<bool>,
    /// Loop mode index: 0 off, 1 loop, 2 ping-pong.
    pub(crate) looped: Option<u8>,
    pub(crate) stutter: Option<bool>,
    /// Interpolation index: 0 none, 1 linear, 2 sinc.
    pub(crate) interp: Option<u8>,
    /// Note frequency that plays the sample unshifted.
    pub(crate) base_frequency: Option<f32>,
}

impl SamplerSettings {
    /// Settings pointing at a sample file, everything else default.
    pub fn from_file(path: &Path) -> Self {
        Self {
            src: Some(path.to_string_lossy().to_string()),
            ..Default::default()
        }
    }

    /// Parse sampler settings from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SamplerSettings, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SamplerSettings>()?)
    }

    /// The sample file, if one is configured.
    pub fn src(&self) -> Option<PathBuf> {
        self.src
            .as_deref()
            .filter(|src| !src.is_empty())
            .map(PathBuf::from)
    }

    /// Embedded sample data, if configured.
    pub fn sample_data(&self) -> Option<&str> {
        self.sampledata.as_deref().filter(|data| !data.is_empty())
    }

    pub fn embedded_sample_rate(&self) -> u32 {
        self.samplerate.unwrap_or(DEFAULT_EMBEDDED_SAMPLE_RATE)
    }

    pub fn start(&self) -> f32 {
        self.sframe.unwrap_or(0.0)
    }

    pub fn end(&self) -> f32 {
        self.eframe.unwrap_or(1.0)
    }

    pub fn loop_start(&self) -> f32 {
        self.lframe.unwrap_or_else(|| self.start())
    }

    /// Amplification percentage, clamped to 0-500.
    pub fn amplification_percent(&self) -> f32 {
        self.amp.unwrap_or(100.0).clamp(0.0, MAX_AMPLIFICATION_PERCENT)
    }

    pub fn reversed(&self) -> bool {
        self.reversed.unwrap_or(false)
    }

    pub fn loop_mode(&self) -> Result<LoopMode, ConfigError> {
        let index = self.looped.unwrap_or(0);
        LoopMode::from_index(index)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown loop mode index {}", index)))
    }

    pub fn stutter(&self) -> bool {
        self.stutter.unwrap_or(false)
    }

    /// Interpolation mode. Linear when unset.
    pub fn interpolation(&self) -> Result<Interpolation, ConfigError> {
        match self.interp {
            None => Ok(Interpolation::default()),
            Some(index) => Interpolation::from_index(index).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown interpolation index {}", index))
            }),
        }
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency.unwrap_or(DEFAULT_BASE_FREQUENCY)
    }
}
