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
// Shared engine parameters. Passed explicitly to the device, the mixer and the
// voice driver instead of living in a global.
//

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::audio::error::AudioError;
use crate::audio::format::TargetFormat;
use crate::config;

/// Rate the engine's timing constants are expressed against.
pub const DEFAULT_BASE_RATE: u32 = 44100;

/// Default period length in frames.
pub const DEFAULT_FRAMES_PER_PERIOD: usize = 256;

/// Engine-wide state read by the audio thread. Everything that can change at runtime
/// is atomic so control threads never need a lock the callback could contend on.
#[derive(Debug)]
pub struct EngineContext {
    /// Output format the device converts to.
    target_format: TargetFormat,
    /// Rate note pitches and timing constants are defined against.
    base_rate: u32,
    /// Rate the engine currently renders at.
    processing_rate: AtomicU32,
    /// Frames produced per pull.
    frames_per_period: usize,
    /// Linear master gain, stored as f32 bits.
    master_gain: AtomicU32,
    /// Periods the mixer has produced.
    periods: AtomicU64,
}

impl EngineContext {
    /// Builds a context rendering at the target format's sample rate.
    pub fn new(target_format: TargetFormat, base_rate: u32, frames_per_period: usize) -> Self {
        let processing_rate = AtomicU32::new(target_format.sample_rate);
        Self {
            target_format,
            base_rate: base_rate.max(1),
            processing_rate,
            frames_per_period: frames_per_period.max(1),
            master_gain: AtomicU32::new(1.0f32.to_bits()),
            periods: AtomicU64::new(0),
        }
    }

    /// Builds a context from the audio configuration.
    pub fn from_config(config: &config::Audio) -> Result<Self, AudioError> {
        let target_format = TargetFormat::new(
            config.sample_rate(),
            config.sample_format()?,
            config.bits_per_sample(),
        )?
        .with_swap_endian(config.swap_endian());
        let context = Self::new(
            target_format,
            config.base_sample_rate(),
            config.frames_per_period(),
        );
        context.set_master_gain(config.master_gain());
        Ok(context)
    }

    pub fn target_format(&self) -> &TargetFormat {
        &self.target_format
    }

    pub fn base_rate(&self) -> u32 {
        self.base_rate
    }

    pub fn processing_rate(&self) -> u32 {
        self.processing_rate.load(Ordering::Relaxed)
    }

    pub fn set_processing_rate(&self, rate: u32) {
        self.processing_rate.store(rate.max(1), Ordering::Relaxed);
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period
    }

    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    /// Sets the master gain. Negative and non-finite values are treated as silence.
    pub fn set_master_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.master_gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn count_period(&self) {
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of periods rendered so far.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(
            TargetFormat::default(),
            DEFAULT_BASE_RATE,
            DEFAULT_FRAMES_PER_PERIOD,
        )
    }
}
