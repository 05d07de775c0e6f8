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

//! The sampler instrument: turns notes into rendered periods of the current sample.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use super::error::LoadError;
use super::loader::SampleLoader;
use super::voice::NotePlayHandle;
use crate::audio::{EngineContext, Frame};
use crate::config::{SamplerSettings, DEFAULT_BASE_FREQUENCY};
use crate::playback::{Cursor, PlaybackState};
use crate::resampler::{Interpolation, SincResampler};
use crate::sample::{LoopMode, PointModel, Sample, SampleBuffer};

/// Notes below this frequency rewind the stutter position instead of playing.
pub const STUTTER_RESET_FREQUENCY: f32 = 20.0;

const BACKWARDS_BIT: u64 = 1 << 63;

/// Control-thread state. Never touched by the audio thread.
#[derive(Debug)]
struct Control {
    points: PointModel,
    loader: SampleLoader,
}

/// Plays one sample, shared by every note of the instrument.
///
/// Parameter edits come from control threads and publish a fresh [`Sample`] snapshot.
/// [`Sampler::play_note`] runs on the audio thread and only loads the current snapshot
/// and a few atomics.
#[derive(Debug)]
pub struct Sampler {
    context: Arc<EngineContext>,
    sample: ArcSwap<Sample>,
    control: Mutex<Control>,
    /// Where the next stuttering note picks up, packed by [`pack_cursor`].
    continuation: AtomicU64,
    loop_mode: AtomicU8,
    interpolation: AtomicU8,
    stutter: AtomicBool,
    base_frequency: AtomicU32,
    resample_failures: AtomicU64,
}

impl Sampler {
    /// Creates a sampler holding an empty sample.
    pub fn new(context: Arc<EngineContext>) -> Self {
        let empty = Sample::new(Arc::new(SampleBuffer::empty(context.base_rate())));
        Self {
            context,
            sample: ArcSwap::from_pointee(empty),
            control: Mutex::new(Control {
                points: PointModel::default(),
                loader: SampleLoader::new(),
            }),
            continuation: AtomicU64::new(pack_cursor(Cursor::default())),
            loop_mode: AtomicU8::new(LoopMode::Off.index()),
            interpolation: AtomicU8::new(Interpolation::default().index()),
            stutter: AtomicBool::new(false),
            base_frequency: AtomicU32::new(DEFAULT_BASE_FREQUENCY.to_bits()),
            resample_failures: AtomicU64::new(0),
        }
    }

    /// Creates a sampler and applies the given settings. Load problems are returned
    /// alongside the sampler, which falls back to an empty sample.
    pub fn from_settings(
        context: Arc<EngineContext>,
        settings: &SamplerSettings,
    ) -> (Self, Vec<LoadError>) {
        let sampler = Self::new(context);
        let errors = sampler.load_settings(settings);
        (sampler, errors)
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// The current snapshot.
    pub fn sample(&self) -> Arc<Sample> {
        self.sample.load_full()
    }

    /// Renders one period of `note` into `buffer`.
    ///
    /// Frames `[offset, offset + frames)` of `buffer` are written. When the sample has
    /// nothing left to play, or resampling fails, `[0, offset + frames)` is silenced
    /// instead.
    pub fn play_note(&self, note: &mut NotePlayHandle, buffer: &mut [Frame]) {
        let sample = self.sample.load();
        let stutter = self.stutter.load(Ordering::Acquire);
        let start = sample.start_frame() as f64;

        if stutter && note.frequency() < STUTTER_RESET_FREQUENCY {
            self.store_continuation(Cursor::new(start, false));
            return;
        }

        if note.playback().is_none() {
            let cursor = if stutter {
                let cursor = self.continuation();
                if cursor.position >= sample.end_frame() as f64 {
                    let rewound = Cursor::new(start, false);
                    self.store_continuation(rewound);
                    rewound
                } else {
                    cursor
                }
            } else {
                Cursor::new(start, false)
            };
            let mut state = PlaybackState::new(note.has_detuning_info(), self.interpolation());
            if let Some(resampler) = note.take_prepared_resampler() {
                state = state.with_resampler(resampler);
            }
            state.set_cursor(cursor);
            note.set_playback(state);
        }

        if !note.is_finished() {
            let end = (note.offset() + note.frames()).min(buffer.len());
            let begin = note.offset().min(end);
            let pitch_ratio = note.frequency() as f64 / self.base_frequency() as f64;
            let step = sample.playback_step(pitch_ratio, self.context.processing_rate());
            let loop_mode = self.loop_mode();

            let rendered = match note.playback_mut() {
                Some(state) => sample.play(&mut buffer[begin..end], state, step, loop_mode),
                None => Ok(false),
            };
            match rendered {
                Ok(true) => {}
                Ok(false) => {
                    buffer[..end].fill([0.0; 2]);
                    note.mark_exhausted();
                }
                Err(_) => {
                    buffer[..end].fill([0.0; 2]);
                    self.resample_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if stutter {
            if let Some(state) = note.playback() {
                self.store_continuation(state.cursor());
            }
        }
    }

    /// Builds the sinc resampler a note at `frequency` will need, so the audio thread
    /// does not have to. None unless sinc interpolation is selected.
    pub fn prepare_resampler(&self, frequency: f32) -> Option<SincResampler> {
        if self.interpolation() != Interpolation::Sinc {
            return None;
        }
        let sample = self.sample.load();
        let pitch_ratio = frequency as f64 / self.base_frequency() as f64;
        let step = sample.playback_step(pitch_ratio, self.context.processing_rate());
        match SincResampler::new(step) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                debug!(frequency, err = %e, "No resampler prepared");
                None
            }
        }
    }

    /// Drops the per-note playback state.
    pub fn delete_note_data(&self, note: &mut NotePlayHandle) {
        note.take_playback();
    }

    /// Output frames a note at `frequency` lasts when the sample plays through once.
    /// Zero when looping, since a looping note has no natural length.
    pub fn beat_len(&self, frequency: f32) -> u64 {
        if self.loop_mode() != LoopMode::Off || frequency.is_nan() || frequency <= 0.0 {
            return 0;
        }
        let base_rate = self.context.base_rate();
        if base_rate == 0 {
            return 0;
        }

        let sample = self.sample.load();
        let factor = self.base_frequency() as f64 / frequency as f64
            * self.context.processing_rate() as f64
            / base_rate as f64;
        let end = sample.end_frame() as f64;
        let cursor = self.continuation();
        let start = if cursor.position >= end {
            sample.start_frame() as f64
        } else {
            cursor.position
        };
        ((end - start) * factor).floor().max(0.0) as u64
    }

    /// Moves the start marker. Takes a fraction of the sample length.
    pub fn set_start(&self, value: f32) {
        self.edit_points(|points| points.set_start(value));
    }

    /// Moves the end marker. Takes a fraction of the sample length.
    pub fn set_end(&self, value: f32) {
        self.edit_points(|points| points.set_end(value));
    }

    /// Moves the loop start marker. Takes a fraction of the sample length.
    pub fn set_loop_start(&self, value: f32) {
        self.edit_points(|points| points.set_loop_start(value));
    }

    /// The normalized markers.
    pub fn points(&self) -> PointModel {
        self.control.lock().points
    }

    pub fn set_reversed(&self, reversed: bool) {
        let _control = self.control.lock();
        let current = self.sample.load_full();
        self.sample.store(Arc::new(current.with_reversed(reversed)));
        self.store_continuation(Cursor::new(current.start_frame() as f64, false));
    }

    /// Sets the amplification as a percentage (0 to 500).
    pub fn set_amplification(&self, percent: f32) {
        let amplification = if percent.is_nan() {
            1.0
        } else {
            percent.clamp(0.0, 500.0) / 100.0
        };
        let _control = self.control.lock();
        let current = self.sample.load_full();
        self.sample
            .store(Arc::new(current.with_amplification(amplification)));
    }

    pub fn stutter(&self) -> bool {
        self.stutter.load(Ordering::Acquire)
    }

    /// Turns stutter mode on or off. Either way the next note starts from the start
    /// marker.
    pub fn set_stutter(&self, stutter: bool) {
        let _control = self.control.lock();
        self.stutter.store(stutter, Ordering::Release);
        self.store_continuation(Cursor::new(self.sample.load().start_frame() as f64, false));
    }

    pub fn loop_mode(&self) -> LoopMode {
        LoopMode::from_index(self.loop_mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        self.loop_mode.store(loop_mode.index(), Ordering::Release);
    }

    /// Interpolation used by notes started from now on.
    pub fn interpolation(&self) -> Interpolation {
        Interpolation::from_index(self.interpolation.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_interpolation(&self, interpolation: Interpolation) {
        self.interpolation
            .store(interpolation.index(), Ordering::Release);
    }

    pub fn base_frequency(&self) -> f32 {
        f32::from_bits(self.base_frequency.load(Ordering::Acquire))
    }

    /// Sets the note frequency that plays the sample unshifted. Ignores non-positive
    /// values.
    pub fn set_base_frequency(&self, frequency: f32) {
        if frequency > 0.0 && frequency.is_finite() {
            self.base_frequency
                .store(frequency.to_bits(), Ordering::Release);
        }
    }

    /// Periods that were silenced because resampling failed.
    pub fn resample_failures(&self) -> u64 {
        self.resample_failures.load(Ordering::Relaxed)
    }

    /// Where the next stuttering note will start.
    pub fn continuation(&self) -> Cursor {
        unpack_cursor(self.continuation.load(Ordering::Acquire))
    }

    /// Replaces the sample with a decoded file. The normalized markers carry over and
    /// are resolved against the new length.
    pub fn set_audio_file(&self, path: &Path) -> Result<(), LoadError> {
        let span = span!(Level::INFO, "set audio file");
        let _enter = span.enter();

        let mut control = self.control.lock();
        let buffer = control.loader.load(path)?;
        let current = self.sample.load_full();
        let next = Sample::new(buffer)
            .with_amplification(current.amplification())
            .with_reversed(current.reversed());
        self.publish(&control.points, next);
        info!(path = ?path, frames = self.sample.load().frames(), "Sample replaced");
        Ok(())
    }

    /// Decodes a file on a background thread and swaps it in when done.
    pub fn load_audio_file_async(
        self: &Arc<Self>,
        path: PathBuf,
    ) -> JoinHandle<Result<(), LoadError>> {
        let sampler = self.clone();
        thread::spawn(move || {
            let result = sampler.set_audio_file(&path);
            if let Err(e) = &result {
                warn!(path = ?path, err = %e, "Background sample load failed");
            }
            result
        })
    }

    /// Applies persisted settings. Every problem is collected and returned; whatever
    /// could not be applied keeps its default.
    pub fn load_settings(&self, settings: &SamplerSettings) -> Vec<LoadError> {
        let span = span!(Level::INFO, "load sampler settings");
        let _enter = span.enter();

        let mut errors = Vec::new();
        let mut control = self.control.lock();

        let buffer = if let Some(path) = settings.src() {
            if path.exists() {
                control.loader.load(&path).map_err(LoadError::from)
            } else {
                Err(LoadError::NotFound(path))
            }
        } else if let Some(data) = settings.sample_data() {
            control
                .loader
                .load_embedded(data, settings.embedded_sample_rate())
                .map_err(LoadError::from)
        } else {
            Ok(Arc::new(SampleBuffer::empty(self.context.base_rate())))
        };
        let buffer = buffer.unwrap_or_else(|e| {
            errors.push(e);
            Arc::new(SampleBuffer::empty(self.context.base_rate()))
        });

        match settings.loop_mode() {
            Ok(loop_mode) => self.set_loop_mode(loop_mode),
            Err(e) => errors.push(e.into()),
        }

        let mut points = PointModel::default();
        points.set_end(settings.end());
        points.set_start(settings.start());
        points.set_loop_start(settings.loop_start());
        control.points = points;

        self.stutter.store(settings.stutter(), Ordering::Release);
        match settings.interpolation() {
            Ok(interpolation) => self.set_interpolation(interpolation),
            Err(e) => errors.push(e.into()),
        }
        self.set_base_frequency(settings.base_frequency());

        let next = Sample::new(buffer)
            .with_amplification(settings.amplification_percent() / 100.0)
            .with_reversed(settings.reversed());
        self.publish(&control.points, next);

        let sample = self.sample.load();
        info!(
            frames = sample.frames(),
            start = sample.start_frame(),
            end = sample.end_frame(),
            loop_start = sample.loop_start_frame(),
            loop_mode = ?self.loop_mode(),
            interpolation = %self.interpolation(),
            stutter = self.stutter(),
            "Sampler settings loaded"
        );
        for e in &errors {
            warn!(err = %e, "Problem loading sampler settings");
        }
        errors
    }

    /// The current state as persisted settings. A sample without a source file is
    /// embedded.
    pub fn to_settings(&self) -> SamplerSettings {
        let control = self.control.lock();
        let sample = self.sample.load();
        let buffer = sample.buffer();
        let src = buffer
            .source()
            .map(|path| path.to_string_lossy().to_string());
        let sampledata = if src.is_none() && !buffer.is_empty() {
            Some(buffer.to_base64())
        } else {
            None
        };

        SamplerSettings {
            src,
            sampledata,
            samplerate: Some(buffer.sample_rate()),
            sframe: Some(control.points.start()),
            eframe: Some(control.points.end()),
            lframe: Some(control.points.loop_start()),
            amp: Some(sample.amplification() * 100.0),
            reversed: Some(sample.reversed()),
            looped: Some(self.loop_mode().index()),
            stutter: Some(self.stutter()),
            interp: Some(self.interpolation().index()),
            base_frequency: Some(self.base_frequency()),
        }
    }

    fn edit_points<F: FnOnce(&mut PointModel)>(&self, edit: F) {
        let mut control = self.control.lock();
        edit(&mut control.points);
        let current = self.sample.load_full();
        self.publish(&control.points, (*current).clone());
    }

    /// Resolves the markers against `sample`, swaps it in and rewinds the stutter
    /// position. Callers hold the control lock.
    fn publish(&self, points: &PointModel, sample: Sample) {
        let frames = points.to_frames(sample.frames());
        let start = frames.start as f64;
        self.sample.store(Arc::new(sample.with_points(frames)));
        self.store_continuation(Cursor::new(start, false));
    }

    fn store_continuation(&self, cursor: Cursor) {
        self.continuation
            .store(pack_cursor(cursor), Ordering::Release);
    }
}

/// Packs a cursor into one word: the position's bits with the sign bit as the
/// direction. Positions are never negative.
fn pack_cursor(cursor: Cursor) -> u64 {
    let bits = cursor.position.abs().to_bits();
    if cursor.backwards {
        bits | BACKWARDS_BIT
    } else {
        bits
    }
}

fn unpack_cursor(bits: u64) -> Cursor {
    Cursor::new(
        f64::from_bits(bits & !BACKWARDS_BIT),
        bits & BACKWARDS_BIT != 0,
    )
}
