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

//! Start, end and loop-start markers expressed as fractions of the sample length.
//!
//! Every edit re-establishes `start < end` and `start <= loop < end` by nudging the
//! other markers, never by rejecting the edit.

/// Smallest gap kept between markers in normalized space.
pub const POINT_EPSILON: f32 = 0.001;

/// Normalized markers, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointModel {
    start: f32,
    end: f32,
    loop_start: f32,
}

impl Default for PointModel {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 1.0,
            loop_start: 0.0,
        }
    }
}

/// Markers resolved against a concrete frame count.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PointFrames {
    pub start: usize,
    pub end: usize,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl PointFrames {
    /// The full range of a buffer with `total` frames.
    pub fn full(total: usize) -> Self {
        Self {
            start: 0,
            end: total,
            loop_start: 0,
            loop_end: total,
        }
    }
}

impl PointModel {
    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn loop_start(&self) -> f32 {
        self.loop_start
    }

    /// Moves the start marker.
    pub fn set_start(&mut self, value: f32) {
        self.start = clamp_unit(value);
        self.resolve_start_end();
    }

    /// Moves the end marker.
    pub fn set_end(&mut self, value: f32) {
        self.end = clamp_unit(value);
        self.resolve_start_end();
    }

    /// Moves the loop-start marker, dragging end or start along when it crosses them.
    pub fn set_loop_start(&mut self, value: f32) {
        self.loop_start = clamp_unit(value);

        if self.loop_start >= self.end {
            self.end = clamp_unit(self.loop_start + POINT_EPSILON);
            if self.end >= 1.0 {
                self.loop_start = 1.0 - POINT_EPSILON;
            }
        }
        if self.loop_start < self.start {
            self.start = self.loop_start;
        }
        self.repair();
    }

    /// Converts to frame positions by truncating `fraction * total`.
    ///
    /// Very short buffers can map distinct fractions onto the same frame. The result is
    /// widened so the region always holds at least one frame and the loop start stays
    /// inside it.
    pub fn to_frames(&self, total: usize) -> PointFrames {
        if total == 0 {
            return PointFrames::default();
        }

        let to_frame = |fraction: f32| ((fraction as f64 * total as f64) as usize).min(total);
        let mut start = to_frame(self.start).min(total - 1);
        let mut end = to_frame(self.end);
        if end <= start {
            end = (start + 1).min(total);
            start = end - 1;
        }
        let loop_start = to_frame(self.loop_start).clamp(start, end - 1);

        PointFrames {
            start,
            end,
            loop_start,
            loop_end: end,
        }
    }

    fn resolve_start_end(&mut self) {
        if self.start > self.end {
            std::mem::swap(&mut self.start, &mut self.end);
        }
        if self.loop_start >= self.end {
            self.loop_start = (self.end - POINT_EPSILON).max(0.0);
        }
        if self.loop_start < self.start {
            self.loop_start = self.start;
        }
        if self.start == self.end {
            self.end = clamp_unit(self.end + POINT_EPSILON);
        }
        self.repair();
    }

    /// Covers the corner where both markers sit at 1.0 and end cannot move up.
    fn repair(&mut self) {
        if self.start >= self.end {
            self.start = (self.end - POINT_EPSILON).max(0.0);
        }
        if self.loop_start < self.start {
            self.loop_start = self.start;
        }
        if self.loop_start >= self.end {
            self.loop_start = self.start;
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
