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
use serde::Deserialize;

/// A gain insert on the master chain.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct GainEffect {
    /// Linear gain applied to the wet signal.
    gain: Option<f32>,
    enabled: Option<bool>,
    /// Wet amount, 0 to 1.
    wet: Option<f32>,
    /// Output level under which the effect counts as silent.
    gate: Option<f32>,
    /// Milliseconds of silence before the effect stops processing.
    autoquit_ms: Option<f32>,
}

impl GainEffect {
    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(1.0)
    }

    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn wet(&self) -> f32 {
        self.wet.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn gate(&self) -> f32 {
        self.gate.unwrap_or(0.0).max(0.0)
    }

    pub fn autoquit_ms(&self) -> f32 {
        self.autoquit_ms.unwrap_or(1000.0).max(0.0)
    }
}
