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

//! Insert effects on the master output.
//!
//! Every effect mixes its processed signal with the dry input, and stops processing by
//! itself once its output has stayed under the gate for the auto-quit time. A stopped
//! effect wakes up again when non-silent input reaches the chain.

use tracing::debug;

use crate::audio::{EngineContext, Frame};
use crate::config::GainEffect as GainEffectConfig;

/// Input level above which a stopped effect is woken up.
const NOISE_FLOOR: f32 = 1.0e-10;

/// User-facing settings shared by all effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectControls {
    pub enabled: bool,
    /// Wet amount, 0 to 1. The dry signal gets the rest.
    pub wet: f32,
    /// Output level under which the effect counts as silent.
    pub gate: f32,
    /// Milliseconds of silence before the effect stops. Zero disables auto-quit.
    pub autoquit_ms: f32,
}

impl Default for EffectControls {
    fn default() -> Self {
        Self {
            enabled: true,
            wet: 1.0,
            gate: 0.0,
            autoquit_ms: 1000.0,
        }
    }
}

/// Bookkeeping every effect carries: controls, running flag and the silence counter.
#[derive(Debug, Clone)]
pub struct EffectState {
    controls: EffectControls,
    /// Parallel processors the gate is scaled by.
    processors: u32,
    running: bool,
    silent_buffers: u32,
}

impl EffectState {
    pub fn new(controls: EffectControls) -> Self {
        Self {
            controls,
            processors: 1,
            running: true,
            silent_buffers: 0,
        }
    }

    pub fn controls(&self) -> &EffectControls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut EffectControls {
        &mut self.controls
    }

    pub fn is_enabled(&self) -> bool {
        self.controls.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resumes processing and clears the silence counter.
    pub fn start_running(&mut self) {
        self.silent_buffers = 0;
        self.running = true;
    }

    pub fn stop_running(&mut self) {
        self.running = false;
    }

    pub fn wet_level(&self) -> f32 {
        self.controls.wet.clamp(0.0, 1.0)
    }

    pub fn dry_level(&self) -> f32 {
        1.0 - self.wet_level()
    }

    /// Squared gate level, comparable with a mean of squared outputs.
    pub fn gate(&self) -> f32 {
        let level = self.controls.gate;
        level * level * self.processors as f32
    }

    /// Silent periods tolerated before the effect stops.
    pub fn timeout(&self, context: &EngineContext) -> u32 {
        let samples = context.processing_rate() as f32 * self.controls.autoquit_ms / 1000.0;
        1 + samples as u32 / context.frames_per_period() as u32
    }

    pub fn silent_buffers(&self) -> u32 {
        self.silent_buffers
    }

    /// Counts one period whose mean squared output was `out_sum`, stopping the effect
    /// once it has been silent for longer than the timeout.
    pub fn check_gate(&mut self, out_sum: f32, context: &EngineContext) {
        if self.controls.autoquit_ms <= 0.0 {
            return;
        }
        if out_sum - self.gate() <= f32::EPSILON {
            self.silent_buffers += 1;
            if self.silent_buffers > self.timeout(context) {
                debug!(silent_buffers = self.silent_buffers, "Effect went quiet, stopping");
                self.stop_running();
                self.silent_buffers = 0;
            }
        } else {
            self.silent_buffers = 0;
        }
    }
}

/// An insert effect.
pub trait Effect: Send {
    fn name(&self) -> &str;

    fn state(&self) -> &EffectState;

    fn state_mut(&mut self) -> &mut EffectState;

    /// Processes one period in place. Returns whether the effect is still running.
    fn process_audio_buffer(&mut self, buffer: &mut [Frame], context: &EngineContext) -> bool;
}

/// Effects applied one after another.
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the chain described by the configuration.
    pub fn from_config(effects: &[GainEffectConfig]) -> Self {
        let mut chain = Self::new();
        for config in effects {
            chain.append(Box::new(GainEffect::from_config(config)));
        }
        chain
    }

    pub fn append(&mut self, effect: Box<dyn Effect>) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[Box<dyn Effect>] {
        &self.effects
    }

    /// Runs every enabled effect over the buffer. Stopped effects are skipped unless
    /// the buffer carries signal, which restarts them. Returns whether any effect is
    /// still running.
    pub fn process(&mut self, buffer: &mut [Frame], context: &EngineContext) -> bool {
        let has_input = buffer
            .iter()
            .any(|f| f[0].abs() > NOISE_FLOOR || f[1].abs() > NOISE_FLOOR);

        let mut more_effects = false;
        for effect in self.effects.iter_mut() {
            if !effect.state().is_enabled() {
                continue;
            }
            if !effect.state().is_running() {
                if !has_input {
                    continue;
                }
                effect.state_mut().start_running();
            }
            more_effects |= effect.process_audio_buffer(buffer, context);
        }
        more_effects
    }
}

/// Scales the wet signal by a fixed gain.
#[derive(Debug, Clone)]
pub struct GainEffect {
    state: EffectState,
    gain: f32,
}

impl GainEffect {
    pub fn new(gain: f32, controls: EffectControls) -> Self {
        Self {
            state: EffectState::new(controls),
            gain,
        }
    }

    pub fn from_config(config: &GainEffectConfig) -> Self {
        Self::new(
            config.gain(),
            EffectControls {
                enabled: config.enabled(),
                wet: config.wet(),
                gate: config.gate(),
                autoquit_ms: config.autoquit_ms(),
            },
        )
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Effect for GainEffect {
    fn name(&self) -> &str {
        "gain"
    }

    fn state(&self) -> &EffectState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EffectState {
        &mut self.state
    }

    fn process_audio_buffer(&mut self, buffer: &mut [Frame], context: &EngineContext) -> bool {
        if !self.state.is_enabled() || !self.state.is_running() {
            return false;
        }

        let wet = self.state.wet_level();
        let dry = self.state.dry_level();
        let mut out_sum = 0.0;
        for frame in buffer.iter_mut() {
            for sample in frame.iter_mut() {
                *sample = dry * *sample + wet * *sample * self.gain;
                out_sum += *sample * *sample;
            }
        }

        if !buffer.is_empty() {
            self.state.check_gate(out_sum / buffer.len() as f32, context);
        }
        self.state.is_running()
    }
}
