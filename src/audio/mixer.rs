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

//! The engine side of the device contract: mixes every sounding note into one period.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use super::{AudioError, EngineContext, Frame, PeriodSource};
use crate::effect::EffectChain;
use crate::resampler::SincResampler;
use crate::sampler::{NotePlayHandle, NotePool, Sampler};

/// Commands queued for the audio thread.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Requests from control threads, applied at the start of the next period.
#[derive(Debug)]
pub enum MixerCommand {
    /// Starts a note `offset` frames into the next period, optionally limited to a
    /// number of frames. A sinc note brings its resampler along.
    NoteOn {
        key: u8,
        frequency: f32,
        offset: usize,
        length: Option<u64>,
        resampler: Option<SincResampler>,
    },
    NoteOff { key: u8 },
    /// Retunes every note playing `key`.
    SetFrequency { key: u8, frequency: f32 },
    StopAll,
    /// Ends the stream. The mixer produces nothing afterwards.
    Shutdown,
}

/// Mixes the sampler's notes and runs the master effects.
pub struct NoteMixer {
    context: Arc<EngineContext>,
    sampler: Arc<Sampler>,
    commands: Receiver<MixerCommand>,
    notes: NotePool,
    /// Per-note render target, one period long.
    scratch: Vec<Frame>,
    effects: EffectChain,
    /// Resamplers of finished notes, freed by the control side.
    retired: Sender<SincResampler>,
    active_notes: Arc<AtomicUsize>,
    shutdown: bool,
}

/// Control-side handle to a [`NoteMixer`].
#[derive(Clone, Debug)]
pub struct MixerHandle {
    sampler: Arc<Sampler>,
    commands: Sender<MixerCommand>,
    retired: Receiver<SincResampler>,
    active_notes: Arc<AtomicUsize>,
}

impl NoteMixer {
    /// Creates the mixer and the handle used to drive it.
    pub fn new(
        context: Arc<EngineContext>,
        sampler: Arc<Sampler>,
        effects: EffectChain,
        max_notes: usize,
    ) -> (Self, MixerHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(COMMAND_QUEUE_DEPTH);
        let (retired_sender, retired_receiver) = crossbeam_channel::bounded(max_notes.max(1) * 2);
        let active_notes = Arc::new(AtomicUsize::new(0));
        let scratch = vec![[0.0; 2]; context.frames_per_period()];
        let mixer = Self {
            context,
            sampler: sampler.clone(),
            commands: receiver,
            notes: NotePool::new(max_notes),
            scratch,
            effects,
            retired: retired_sender,
            active_notes: active_notes.clone(),
            shutdown: false,
        };
        let handle = MixerHandle {
            sampler,
            commands: sender,
            retired: retired_receiver,
            active_notes,
        };
        (mixer, handle)
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::NoteOn {
                    key,
                    frequency,
                    offset,
                    length,
                    resampler,
                } => {
                    let mut note = NotePlayHandle::new(key, frequency, offset);
                    if let Some(length) = length {
                        note = note.with_length(length);
                    }
                    if let Some(resampler) = resampler {
                        note = note.with_resampler(resampler);
                    }
                    if let Some(stolen) = self.notes.add(note) {
                        retire_note(&self.sampler, &self.retired, stolen);
                    }
                }
                MixerCommand::NoteOff { key } => {
                    self.notes.release_key(key);
                }
                MixerCommand::SetFrequency { key, frequency } => {
                    for note in self.notes.iter_mut().filter(|n| n.key() == key) {
                        note.set_frequency(frequency);
                    }
                }
                MixerCommand::StopAll => self.notes.release_all(),
                MixerCommand::Shutdown => {
                    self.notes.release_all();
                    self.shutdown = true;
                }
            }
        }
    }
}

impl PeriodSource for NoteMixer {
    fn next_buffer(&mut self, dst: &mut [Frame]) -> usize {
        self.apply_commands();
        if self.shutdown {
            return 0;
        }

        let frames = dst.len().min(self.scratch.len());
        let out = &mut dst[..frames];
        out.fill([0.0; 2]);

        for note in self.notes.iter_mut() {
            note.begin_period(frames);
            let scratch = &mut self.scratch[..frames];
            scratch.fill([0.0; 2]);
            self.sampler.play_note(note, scratch);
            note.end_period();

            for (mixed, frame) in out.iter_mut().zip(scratch.iter()) {
                mixed[0] += frame[0];
                mixed[1] += frame[1];
            }
        }

        let (sampler, retired) = (&self.sampler, &self.retired);
        self.notes.retire(|note| retire_note(sampler, retired, note));
        self.active_notes.store(self.notes.len(), Ordering::Relaxed);

        self.effects.process(out, &self.context);
        self.context.count_period();
        frames
    }
}

/// Lets go of a note on the audio thread. Its resampler is handed to the control side;
/// if that queue is full it is dropped here.
fn retire_note(sampler: &Sampler, retired: &Sender<SincResampler>, mut note: NotePlayHandle) {
    if let Some(resampler) = note.take_resampler() {
        let _ = retired.try_send(resampler);
    }
    sampler.delete_note_data(&mut note);
}

impl fmt::Debug for NoteMixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteMixer")
            .field("notes", &self.notes.len())
            .field("max_notes", &self.notes.capacity())
            .field("effects", &self.effects.len())
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

impl MixerHandle {
    fn send(&self, command: MixerCommand) -> Result<(), AudioError> {
        self.collect_retired();
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                debug!(?command, "Mixer queue full, waiting");
                self.commands
                    .send(command)
                    .map_err(|_| AudioError::MixerGone)
            }
            Err(TrySendError::Disconnected(_)) => Err(AudioError::MixerGone),
        }
    }

    /// Starts a note at the start of the next period.
    pub fn note_on(&self, key: u8, frequency: f32) -> Result<(), AudioError> {
        self.send(MixerCommand::NoteOn {
            key,
            frequency,
            offset: 0,
            length: None,
            resampler: self.sampler.prepare_resampler(frequency),
        })
    }

    /// Starts a note that ends by itself after `length` frames.
    pub fn note_on_for(&self, key: u8, frequency: f32, length: u64) -> Result<(), AudioError> {
        self.send(MixerCommand::NoteOn {
            key,
            frequency,
            offset: 0,
            length: Some(length),
            resampler: self.sampler.prepare_resampler(frequency),
        })
    }

    pub fn note_off(&self, key: u8) -> Result<(), AudioError> {
        self.send(MixerCommand::NoteOff { key })
    }

    pub fn set_frequency(&self, key: u8, frequency: f32) -> Result<(), AudioError> {
        self.send(MixerCommand::SetFrequency { key, frequency })
    }

    pub fn stop_all(&self) -> Result<(), AudioError> {
        self.send(MixerCommand::StopAll)
    }

    pub fn shutdown(&self) -> Result<(), AudioError> {
        self.send(MixerCommand::Shutdown)
    }

    /// Frees the resamplers of notes the mixer has let go of. Returns how many.
    pub fn collect_retired(&self) -> usize {
        self.retired.try_iter().count()
    }

    /// Notes sounding as of the last rendered period.
    pub fn active_notes(&self) -> usize {
        self.active_notes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplerSettings;
    use crate::effect::{EffectControls, GainEffect};
    use crate::resampler::Interpolation;
    use crate::sample::LoopMode;
    use crate::testutil::{constant_buffer, ramp_buffer};

    fn sampler(settings: SamplerSettings) -> (Arc<EngineContext>, Arc<Sampler>) {
        let context = Arc::new(EngineContext::new(Default::default(), 44100, 16));
        let (sampler, errors) = Sampler::from_settings(context.clone(), &settings);
        assert!(errors.is_empty());
        (context, Arc::new(sampler))
    }

    fn embedded(buffer: crate::sample::SampleBuffer) -> SamplerSettings {
        SamplerSettings {
            sampledata: Some(buffer.to_base64()),
            samplerate: Some(buffer.sample_rate()),
            ..Default::default()
        }
    }

    fn pull(mixer: &mut NoteMixer, frames: usize) -> (usize, Vec<Frame>) {
        let mut dst = vec![[7.0, 7.0]; frames];
        let produced = mixer.next_buffer(&mut dst);
        (produced, dst)
    }

    #[test]
    fn test_idle_mixer_produces_silence() {
        let (context, sampler) = sampler(embedded(ramp_buffer(64, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context.clone(), sampler, EffectChain::new(), 4);

        let (produced, out) = pull(&mut mixer, 16);
        assert_eq!(produced, 16);
        assert!(out.iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(context.periods(), 1);
        assert_eq!(handle.active_notes(), 0);
    }

    #[test]
    fn test_note_plays_until_exhausted() {
        let (context, sampler) = sampler(embedded(ramp_buffer(24, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on(69, 440.0).unwrap();

        let (_, first) = pull(&mut mixer, 16);
        assert_eq!(first[5], [5.0, -5.0]);
        assert_eq!(handle.active_notes(), 1);

        let (_, second) = pull(&mut mixer, 16);
        assert_eq!(second[7], [23.0, -23.0]);
        assert_eq!(second[8], [0.0, 0.0]);

        // The third period finds the sample played out and retires the note.
        pull(&mut mixer, 16);
        assert_eq!(handle.active_notes(), 0);
    }

    #[test]
    fn test_notes_are_summed() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.25, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on(60, 440.0).unwrap();
        handle.note_on(64, 440.0).unwrap();

        let (_, out) = pull(&mut mixer, 16);
        assert!(out.iter().all(|f| *f == [0.5, 0.5]));
        assert_eq!(handle.active_notes(), 2);
    }

    #[test]
    fn test_note_off_releases() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.25, 44100)));
        sampler.set_loop_mode(LoopMode::Loop);
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on(60, 440.0).unwrap();
        pull(&mut mixer, 16);
        assert_eq!(handle.active_notes(), 1);

        handle.note_off(60).unwrap();
        let (_, out) = pull(&mut mixer, 16);
        assert!(out.iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(handle.active_notes(), 0);
    }

    #[test]
    fn test_note_length() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.25, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on_for(60, 440.0, 10).unwrap();

        let (_, out) = pull(&mut mixer, 16);
        assert!(out[..10].iter().all(|f| *f == [0.25, 0.25]));
        assert!(out[10..].iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(handle.active_notes(), 0);
    }

    #[test]
    fn test_voice_stealing() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.25, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 2);
        for key in 60..64 {
            handle.note_on(key, 440.0).unwrap();
        }
        let (_, out) = pull(&mut mixer, 16);
        assert_eq!(out[0], [0.5, 0.5]);
        assert_eq!(handle.active_notes(), 2);
    }

    #[test]
    fn test_sinc_resamplers_come_back_to_the_control_side() {
        let settings = SamplerSettings {
            interp: Some(Interpolation::Sinc.index()),
            ..embedded(ramp_buffer(4096, 44100))
        };
        let (context, sampler) = sampler(settings);
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 1);
        handle.note_on(81, 880.0).unwrap();
        pull(&mut mixer, 16);
        assert_eq!(handle.active_notes(), 1);
        assert_eq!(handle.collect_retired(), 0);

        // The second note steals the only slot.
        handle.note_on(83, 987.77).unwrap();
        pull(&mut mixer, 16);
        assert_eq!(handle.collect_retired(), 1);

        handle.note_off(83).unwrap();
        pull(&mut mixer, 16);
        assert_eq!(handle.active_notes(), 0);
        assert_eq!(handle.collect_retired(), 1);
    }

    #[test]
    fn test_linear_notes_carry_no_resampler() {
        let (context, sampler) = sampler(embedded(ramp_buffer(64, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 1);
        handle.note_on_for(81, 880.0, 8).unwrap();
        pull(&mut mixer, 16);
        pull(&mut mixer, 16);
        assert_eq!(handle.active_notes(), 0);
        assert_eq!(handle.collect_retired(), 0);
    }

    #[test]
    fn test_set_frequency_retunes() {
        let (context, sampler) = sampler(embedded(ramp_buffer(256, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on(69, 440.0).unwrap();
        pull(&mut mixer, 16);

        handle.set_frequency(69, 880.0).unwrap();
        let (_, out) = pull(&mut mixer, 16);
        assert_eq!(out[0][0], 16.0);
        assert_eq!(out[1][0], 18.0);
    }

    #[test]
    fn test_master_effects_run_after_mixing() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.5, 44100)));
        let mut effects = EffectChain::new();
        effects.append(Box::new(GainEffect::new(0.5, EffectControls::default())));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, effects, 4);
        handle.note_on(60, 440.0).unwrap();

        let (_, out) = pull(&mut mixer, 16);
        assert_eq!(out[0], [0.25, 0.25]);
    }

    #[test]
    fn test_shutdown_stops_production() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.5, 44100)));
        let (mut mixer, handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        handle.note_on(60, 440.0).unwrap();
        handle.shutdown().unwrap();

        let (produced, _) = pull(&mut mixer, 16);
        assert_eq!(produced, 0);
        drop(mixer);
        assert!(matches!(handle.note_on(60, 440.0), Err(AudioError::MixerGone)));
    }

    #[test]
    fn test_output_is_limited_to_one_period() {
        let (context, sampler) = sampler(embedded(constant_buffer(64, 0.5, 44100)));
        let (mut mixer, _handle) = NoteMixer::new(context, sampler, EffectChain::new(), 4);
        let (produced, _) = pull(&mut mixer, 64);
        assert_eq!(produced, 16);
    }
}
