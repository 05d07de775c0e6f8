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

//! The part of an output device that runs inside the backend's real-time callback.
//!
//! The callback pulls whole periods from a [`PeriodSource`], applies master gain and
//! hands the frames to the backend in whatever slice sizes it asks for. Control
//! threads flip the running flag under the same lock, so a callback in flight always
//! sees a consistent state. The callback only ever `try_lock`s: if a control thread
//! holds the lock it emits silence instead of waiting.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::EngineContext;
use super::{Frame, PeriodSource};

struct Inner {
    source: Box<dyn PeriodSource>,
    running: bool,
    /// The current period, already gain-adjusted from `position` onwards as it is read.
    period: Vec<Frame>,
    /// Frames of `period` handed to the backend.
    position: usize,
    /// Frames the source produced into `period`.
    available: usize,
}

/// Callback-side device state shared with the control side.
pub struct DeviceCore {
    inner: Mutex<Inner>,
    context: Arc<EngineContext>,
    /// Callbacks that found the lock held and emitted silence.
    contended: AtomicU64,
    /// Set when the source reported it had nothing to give.
    pseudo_stopped: AtomicBool,
}

impl DeviceCore {
    /// Creates a stopped core pulling periods of the context's size from `source`.
    pub fn new(context: Arc<EngineContext>, source: Box<dyn PeriodSource>) -> Self {
        let period = vec![[0.0; 2]; context.frames_per_period()];
        Self {
            inner: Mutex::new(Inner {
                source,
                running: false,
                period,
                position: 0,
                available: 0,
            }),
            context,
            contended: AtomicU64::new(0),
            pseudo_stopped: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Runs `f` with the running flag set to `running`, holding the callback lock for
    /// the whole call. Backends pause or resume their stream inside `f`.
    pub fn set_running<F, T>(&self, running: bool, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut inner = self.inner.lock();
        inner.running = running;
        if running {
            self.pseudo_stopped.store(false, Ordering::Relaxed);
        } else {
            // Drop the partial period so a restart begins on a fresh pull.
            inner.position = 0;
            inner.available = 0;
        }
        f()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// True once the source has run dry and the callback stopped pulling.
    pub fn is_pseudo_stopped(&self) -> bool {
        self.pseudo_stopped.load(Ordering::Relaxed)
    }

    /// Callbacks that emitted silence because the lock was held.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Fills an interleaved output buffer of `channels` channels, converting each
    /// sample with `convert`. Stereo frames go to the first two channels. A mono
    /// output gets the average of both sides. Extra channels are silent.
    pub fn fill<T, F>(&self, data: &mut [T], channels: usize, convert: F)
    where
        T: Copy,
        F: Fn(f32) -> T,
    {
        let silence = convert(0.0);
        let Some(mut guard) = self.inner.try_lock() else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            data.fill(silence);
            return;
        };
        if !guard.running || channels == 0 {
            data.fill(silence);
            return;
        }

        let inner = &mut *guard;
        let gain = self.context.master_gain();
        let mut remaining = data;
        while remaining.len() >= channels {
            if inner.position >= inner.available {
                let produced = inner.source.next_buffer(&mut inner.period);
                if produced == 0 {
                    // The engine has nothing: silence the rest and stop pulling.
                    remaining.fill(silence);
                    inner.running = false;
                    inner.position = 0;
                    inner.available = 0;
                    self.pseudo_stopped.store(true, Ordering::Relaxed);
                    return;
                }
                inner.available = produced.min(inner.period.len());
                inner.position = 0;
            }

            let frames = (inner.available - inner.position).min(remaining.len() / channels);
            let (head, tail) = std::mem::take(&mut remaining).split_at_mut(frames * channels);
            let period = &inner.period[inner.position..inner.position + frames];
            for (out, frame) in head.chunks_exact_mut(channels).zip(period.iter()) {
                let left = frame[0] * gain;
                let right = frame[1] * gain;
                if channels == 1 {
                    out[0] = convert((left + right) * 0.5);
                } else {
                    out[0] = convert(left);
                    out[1] = convert(right);
                    for sample in out[2..].iter_mut() {
                        *sample = silence;
                    }
                }
            }
            inner.position += frames;
            remaining = tail;
        }
        remaining.fill(silence);
    }
}
