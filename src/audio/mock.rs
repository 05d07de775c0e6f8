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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::callback::DeviceCore;
use super::context::EngineContext;
use super::error::AudioError;
use super::format::sample_to_s16;
use super::{PeriodSource, DEFAULT_CHANNELS};

/// A mock device. Nothing reaches hardware: tests drive the callback directly with
/// [`Device::pull`] and inspect what a backend would have received.
#[derive(Clone)]
pub struct Device {
    name: String,
    core: Arc<DeviceCore>,
    /// Stream state as the backend would see it. Guarded separately from the core
    /// so tests can observe pauses.
    stream_paused: Arc<Mutex<bool>>,
    quality_changes: Arc<AtomicU64>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, context: Arc<EngineContext>, source: Box<dyn PeriodSource>) -> Device {
        info!(device = name, "Opened mock audio device");
        Device {
            name: name.to_string(),
            core: Arc::new(DeviceCore::new(context, source)),
            stream_paused: Arc::new(Mutex::new(true)),
            quality_changes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs one backend callback asking for `frames` stereo float frames and returns
    /// the interleaved output.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * DEFAULT_CHANNELS as usize];
        self.core.fill(&mut out, DEFAULT_CHANNELS as usize, |s| s);
        out
    }

    /// Like [`Device::pull`], converting to signed 16-bit the way an integer backend
    /// would.
    pub fn pull_s16(&self, frames: usize) -> Vec<i16> {
        let swap = self.core.context().target_format().swap_endian;
        let mut out = vec![0i16; frames * DEFAULT_CHANNELS as usize];
        self.core
            .fill(&mut out, DEFAULT_CHANNELS as usize, |s| sample_to_s16(s, swap));
        out
    }

    /// Whether the simulated backend stream is paused.
    pub fn is_stream_paused(&self) -> bool {
        *self.stream_paused.lock()
    }

    /// How many times quality settings were re-applied.
    pub fn quality_changes(&self) -> u64 {
        self.quality_changes.load(Ordering::Relaxed)
    }
}

impl super::Device for Device {
    fn start_processing(&self) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "start processing (mock)");
        let _enter = span.enter();

        self.core.set_running(true, || {
            *self.stream_paused.lock() = false;
        });
        info!(device = self.name, "Processing started");
        Ok(())
    }

    fn stop_processing(&self) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "stop processing (mock)");
        let _enter = span.enter();

        self.core.set_running(false, || {
            *self.stream_paused.lock() = true;
        });
        info!(device = self.name, "Processing stopped");
        Ok(())
    }

    fn apply_quality_settings(&self) -> Result<(), AudioError> {
        // Nothing to renegotiate. The engine keeps rendering at the configured rate.
        let context = self.core.context();
        context.set_processing_rate(context.target_format().sample_rate);
        self.quality_changes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn sample_rate(&self) -> u32 {
        self.core.context().target_format().sample_rate
    }

    fn channels(&self) -> u16 {
        DEFAULT_CHANNELS
    }

    fn contended_callbacks(&self) -> u64 {
        self.core.contended()
    }

    fn is_pseudo_stopped(&self) -> bool {
        self.core.is_pseudo_stopped()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
