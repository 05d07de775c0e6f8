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
use std::path::Path;
use std::sync::Arc;

use super::*;
use crate::audio::{EngineContext, Frame};
use crate::config::SamplerSettings;
use crate::playback::Cursor;
use crate::resampler::Interpolation;
use crate::sample::LoopMode;
use crate::testutil::{eventually, ramp_buffer, rms_left, write_wav};

fn ramp_settings(frames: usize) -> SamplerSettings {
    SamplerSettings {
        sampledata: Some(ramp_buffer(frames, 44100).to_base64()),
        samplerate: Some(44100),
        ..Default::default()
    }
}

fn sampler(settings: &SamplerSettings) -> Sampler {
    let (sampler, errors) = Sampler::from_settings(Arc::new(EngineContext::default()), settings);
    assert!(errors.is_empty(), "{:?}", errors);
    sampler
}

/// Renders one period of `frames` frames for the note.
fn period(sampler: &Sampler, note: &mut NotePlayHandle, frames: usize) -> Vec<Frame> {
    let mut buffer = vec![[0.0; 2]; frames];
    note.begin_period(frames);
    sampler.play_note(note, &mut buffer);
    note.end_period();
    buffer
}

fn left(frames: &[Frame]) -> Vec<f32> {
    frames.iter().map(|f| f[0]).collect()
}

fn indices(range: std::ops::Range<usize>) -> Vec<f32> {
    range.map(|i| i as f32).collect()
}

#[test]
fn test_unity_pitch_plays_source_frames() {
    let sampler = sampler(&ramp_settings(100));
    let mut note = NotePlayHandle::new(69, 440.0, 0);

    assert_eq!(left(&period(&sampler, &mut note, 10)), indices(0..10));
    assert_eq!(left(&period(&sampler, &mut note, 10)), indices(10..20));
    assert_eq!(note.frames_played(), 20);
}

#[test]
fn test_note_offset() {
    let sampler = sampler(&ramp_settings(100));
    let mut note = NotePlayHandle::new(69, 440.0, 4);

    let out = left(&period(&sampler, &mut note, 10));
    assert_eq!(&out[..4], &[0.0; 4]);
    assert_eq!(&out[4..], indices(0..6).as_slice());
}

#[test]
fn test_octave_up_doubles_the_step() {
    let sampler = sampler(&ramp_settings(100));
    let mut note = NotePlayHandle::new(81, 880.0, 0);

    let expected: Vec<f32> = (0..8).map(|i| (i * 2) as f32).collect();
    assert_eq!(left(&period(&sampler, &mut note, 8)), expected);
}

#[test]
fn test_processing_rate_scales_the_step() {
    let sampler = sampler(&ramp_settings(100));
    sampler.context().set_processing_rate(22050);
    let mut note = NotePlayHandle::new(69, 440.0, 0);

    assert_eq!(left(&period(&sampler, &mut note, 4)), vec![0.0, 2.0, 4.0, 6.0]);
}

#[test]
fn test_stutter_continues_across_notes() {
    let settings = SamplerSettings {
        stutter: Some(true),
        ..ramp_settings(100)
    };
    let sampler = sampler(&settings);

    let mut first = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut first, 10);
    sampler.delete_note_data(&mut first);
    assert!(first.playback().is_none());
    assert_eq!(sampler.continuation(), Cursor::new(10.0, false));

    let mut second = NotePlayHandle::new(69, 440.0, 0);
    assert_eq!(left(&period(&sampler, &mut second, 10)), indices(10..20));
}

#[test]
fn test_stutter_with_sinc_continues_where_the_last_note_was_heard() {
    let settings = SamplerSettings {
        stutter: Some(true),
        interp: Some(Interpolation::Sinc.index()),
        ..ramp_settings(8192)
    };
    let sampler = sampler(&settings);

    let mut first = NotePlayHandle::new(81, 880.0, 0);
    let heard = left(&period(&sampler, &mut first, 1024));
    sampler.delete_note_data(&mut first);
    assert!((heard[1023] - 2046.0).abs() < 2.0, "last {}", heard[1023]);
    assert_eq!(sampler.continuation(), Cursor::new(2048.0, false));

    let mut second = NotePlayHandle::new(81, 880.0, 0);
    let out = period(&sampler, &mut second, 1024);
    assert!(rms_left(&out) > 1000.0);
    let next = left(&out);
    // Past the filter's warm-up the second note picks up two frames per output frame
    // from where the first one stopped.
    for k in [40usize, 100, 500] {
        let expected = 2048.0 + 2.0 * k as f32;
        assert!(
            (next[k] - expected).abs() < 2.0,
            "frame {}: {} vs {}",
            k,
            next[k],
            expected
        );
    }
    assert_eq!(sampler.continuation(), Cursor::new(4096.0, false));
    assert_eq!(sampler.beat_len(880.0), (8192 - 4096) / 2);
}

#[test]
fn test_without_stutter_every_note_starts_at_start() {
    let sampler = sampler(&ramp_settings(100));

    let mut first = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut first, 10);
    let mut second = NotePlayHandle::new(69, 440.0, 0);
    assert_eq!(left(&period(&sampler, &mut second, 10)), indices(0..10));
}

#[test]
fn test_low_frequency_rewinds_stutter() {
    let settings = SamplerSettings {
        stutter: Some(true),
        sframe: Some(0.2),
        ..ramp_settings(100)
    };
    let sampler = sampler(&settings);

    let mut first = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut first, 10);
    assert_eq!(sampler.continuation(), Cursor::new(30.0, false));

    let mut rewind = NotePlayHandle::new(0, 10.0, 0);
    let out = period(&sampler, &mut rewind, 10);
    assert!(out.iter().all(|f| *f == [0.0, 0.0]));
    assert!(rewind.playback().is_none());
    assert_eq!(sampler.continuation(), Cursor::new(20.0, false));

    let mut next = NotePlayHandle::new(69, 440.0, 0);
    assert_eq!(left(&period(&sampler, &mut next, 5)), indices(20..25));
}

#[test]
fn test_stutter_restarts_after_the_end() {
    let settings = SamplerSettings {
        stutter: Some(true),
        ..ramp_settings(20)
    };
    let sampler = sampler(&settings);

    let mut first = NotePlayHandle::new(69, 440.0, 0);
    let out = left(&period(&sampler, &mut first, 30));
    assert_eq!(&out[..20], indices(0..20).as_slice());
    assert_eq!(&out[20..], &[0.0; 10]);
    assert_eq!(sampler.continuation().position, 20.0);

    let mut second = NotePlayHandle::new(69, 440.0, 0);
    assert_eq!(left(&period(&sampler, &mut second, 5)), indices(0..5));
}

#[test]
fn test_exhaustion_silences_the_rendered_span() {
    let sampler = sampler(&ramp_settings(20));
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut note, 20);
    assert!(!note.is_exhausted());

    let mut buffer = vec![[9.0, 9.0]; 20];
    note.begin_period(16);
    sampler.play_note(&mut note, &mut buffer);
    assert!(note.is_exhausted());
    assert!(buffer[..16].iter().all(|f| *f == [0.0, 0.0]));
    assert!(buffer[16..].iter().all(|f| *f == [9.0, 9.0]));
}

#[test]
fn test_finished_note_renders_nothing() {
    let sampler = sampler(&ramp_settings(20));
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    note.release();

    let mut buffer = vec![[9.0, 9.0]; 8];
    note.begin_period(8);
    sampler.play_note(&mut note, &mut buffer);
    assert!(buffer.iter().all(|f| *f == [9.0, 9.0]));
}

#[test]
fn test_point_edits_publish_together_and_rewind() {
    let settings = SamplerSettings {
        stutter: Some(true),
        ..ramp_settings(100)
    };
    let sampler = sampler(&settings);
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut note, 10);

    sampler.set_end(0.4);
    sampler.set_loop_start(0.2);
    let sample = sampler.sample();
    assert_eq!(sample.start_frame(), 0);
    assert_eq!(sample.end_frame(), 40);
    assert_eq!(sample.loop_start_frame(), 20);
    assert_eq!(sample.loop_end_frame(), 40);

    sampler.set_start(0.1);
    assert_eq!(sampler.sample().start_frame(), 10);
    assert_eq!(sampler.continuation(), Cursor::new(10.0, false));
    assert_eq!(sampler.points().start(), 0.1);
}

#[test]
fn test_set_start_with_current_value_changes_nothing() {
    let sampler = sampler(&ramp_settings(100));
    sampler.set_start(0.25);
    sampler.set_end(0.75);
    sampler.set_loop_start(0.5);
    let before = sampler.sample().points();

    sampler.set_start(sampler.points().start());
    assert_eq!(sampler.sample().points(), before);
}

#[test]
fn test_reversed_plays_backwards_from_the_end() {
    let settings = SamplerSettings {
        stutter: Some(true),
        ..ramp_settings(100)
    };
    let sampler = sampler(&settings);
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut note, 10);

    sampler.set_reversed(true);
    assert_eq!(sampler.continuation(), Cursor::new(0.0, false));
    let mut reversed = NotePlayHandle::new(69, 440.0, 0);
    let expected: Vec<f32> = (0..5).map(|i| (99 - i) as f32).collect();
    assert_eq!(left(&period(&sampler, &mut reversed, 5)), expected);
}

#[test]
fn test_amplification_percent() {
    let sampler = sampler(&ramp_settings(100));
    sampler.set_amplification(50.0);
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    assert_eq!(left(&period(&sampler, &mut note, 4)), vec![0.0, 0.5, 1.0, 1.5]);

    sampler.set_amplification(900.0);
    assert_eq!(sampler.sample().amplification(), 5.0);
}

#[test]
fn test_loop_mode_through_the_sampler() {
    let settings = SamplerSettings {
        looped: Some(1),
        lframe: Some(0.5),
        ..ramp_settings(10)
    };
    let sampler = sampler(&settings);
    let mut note = NotePlayHandle::new(69, 440.0, 0);

    let mut expected = indices(0..10);
    expected.extend(indices(5..10));
    assert_eq!(left(&period(&sampler, &mut note, 15)), expected);
    assert!(!note.is_exhausted());
}

#[test]
fn test_beat_len() {
    let sampler = sampler(&ramp_settings(100));
    assert_eq!(sampler.beat_len(440.0), 100);
    assert_eq!(sampler.beat_len(880.0), 50);
    assert_eq!(sampler.beat_len(0.0), 0);
    assert_eq!(sampler.beat_len(f32::NAN), 0);

    sampler.context().set_processing_rate(88200);
    assert_eq!(sampler.beat_len(440.0), 200);
    sampler.context().set_processing_rate(44100);

    sampler.set_loop_mode(LoopMode::Loop);
    assert_eq!(sampler.beat_len(440.0), 0);
}

#[test]
fn test_beat_len_counts_from_the_stutter_position() {
    let settings = SamplerSettings {
        stutter: Some(true),
        ..ramp_settings(100)
    };
    let sampler = sampler(&settings);
    let mut note = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut note, 40);
    assert_eq!(sampler.beat_len(440.0), 60);
}

#[test]
fn test_missing_file_falls_back_to_empty_sample() {
    let settings = SamplerSettings {
        src: Some("/nonexistent/sample.wav".to_string()),
        ..Default::default()
    };
    let (sampler, errors) = Sampler::from_settings(Arc::new(EngineContext::default()), &settings);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], LoadError::NotFound(_)));
    assert_eq!(sampler.sample().frames(), 0);

    let mut note = NotePlayHandle::new(69, 440.0, 0);
    let out = period(&sampler, &mut note, 8);
    assert!(out.iter().all(|f| *f == [0.0, 0.0]));
    assert!(note.is_exhausted());
}

#[test]
fn test_load_settings_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    let left_channel: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
    write_wav(&path, &[left_channel.clone(), left_channel], 44100).unwrap();

    let settings = SamplerSettings {
        src: Some(path.to_string_lossy().to_string()),
        sframe: Some(0.25),
        eframe: Some(0.75),
        ..Default::default()
    };
    let sampler = sampler(&settings);
    let sample = sampler.sample();
    assert_eq!(sample.frames(), 100);
    assert_eq!(sample.start_frame(), 25);
    assert_eq!(sample.end_frame(), 75);
    assert_eq!(sample.loop_start_frame(), 25);
    assert_eq!(sample.buffer().source(), Some(path.as_path()));
}

#[test]
fn test_invalid_indices_are_reported() {
    let settings = SamplerSettings {
        looped: Some(9),
        interp: Some(7),
        ..ramp_settings(10)
    };
    let (sampler, errors) = Sampler::from_settings(Arc::new(EngineContext::default()), &settings);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(e, LoadError::Config(_))));
    assert_eq!(sampler.loop_mode(), LoopMode::Off);
    assert_eq!(sampler.interpolation(), Interpolation::Linear);
    assert_eq!(sampler.sample().frames(), 10);
}

#[test]
fn test_settings_round_trip() {
    let settings = SamplerSettings {
        sframe: Some(0.1),
        eframe: Some(0.9),
        lframe: Some(0.5),
        amp: Some(150.0),
        reversed: Some(true),
        looped: Some(2),
        stutter: Some(true),
        interp: Some(0),
        base_frequency: Some(220.0),
        ..ramp_settings(50)
    };
    let original = sampler(&settings);
    let saved = original.to_settings();
    let restored = sampler(&saved);

    assert_eq!(restored.sample().points(), original.sample().points());
    assert_eq!(restored.sample().buffer().frames(), original.sample().buffer().frames());
    assert_eq!(restored.sample().amplification(), 1.5);
    assert!(restored.sample().reversed());
    assert_eq!(restored.loop_mode(), LoopMode::PingPong);
    assert!(restored.stutter());
    assert_eq!(restored.interpolation(), Interpolation::None);
    assert_eq!(restored.base_frequency(), 220.0);
    assert_eq!(restored.points(), original.points());
}

#[test]
fn test_set_audio_file_keeps_fractions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_wav(&path, &[vec![0.1; 200], vec![0.1; 200]], 44100).unwrap();

    let sampler = sampler(&ramp_settings(100));
    sampler.set_start(0.5);
    sampler.set_amplification(200.0);
    assert_eq!(sampler.sample().start_frame(), 50);

    sampler.set_audio_file(&path).unwrap();
    let sample = sampler.sample();
    assert_eq!(sample.frames(), 200);
    assert_eq!(sample.start_frame(), 100);
    assert_eq!(sample.end_frame(), 200);
    assert_eq!(sample.amplification(), 2.0);
    assert_eq!(sampler.continuation(), Cursor::new(100.0, false));

    assert!(sampler.set_audio_file(Path::new("/nonexistent.wav")).is_err());
    assert_eq!(sampler.sample().frames(), 200);
}

#[test]
fn test_set_audio_file_reloads_an_edited_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edited.wav");
    write_wav(&path, &[vec![0.1; 200], vec![0.1; 200]], 44100).unwrap();

    let sampler = Sampler::new(Arc::new(EngineContext::default()));
    sampler.set_audio_file(&path).unwrap();
    assert_eq!(sampler.sample().frames(), 200);

    write_wav(&path, &[vec![0.3; 500], vec![0.3; 500]], 44100).unwrap();
    sampler.set_audio_file(&path).unwrap();
    let sample = sampler.sample();
    assert_eq!(sample.frames(), 500);
    assert_eq!(sample.end_frame(), 500);
    assert_eq!(sample.buffer().frames()[0], [0.3, 0.3]);
}

#[test]
fn test_load_audio_file_async() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("async.wav");
    write_wav(&path, &[vec![0.2; 64], vec![0.2; 64]], 22050).unwrap();

    let sampler = Arc::new(Sampler::new(Arc::new(EngineContext::default())));
    let loading = sampler.load_audio_file_async(path);
    eventually(
        || sampler.sample().frames() == 64,
        "Sample was never swapped in",
    );
    loading.join().unwrap().unwrap();
    assert_eq!(sampler.sample().sample_rate(), 22050);
}

#[test]
fn test_resample_failure_is_counted() {
    let sampler = sampler(&ramp_settings(100));
    let mut note = NotePlayHandle::new(0, 0.0, 0);
    let mut buffer = vec![[9.0, 9.0]; 8];
    note.begin_period(8);
    sampler.play_note(&mut note, &mut buffer);

    assert!(buffer.iter().all(|f| *f == [0.0, 0.0]));
    assert_eq!(sampler.resample_failures(), 1);
    assert!(!note.is_exhausted());
}

#[test]
fn test_interpolation_applies_to_new_notes() {
    let sampler = sampler(&ramp_settings(100));
    let mut before = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut before, 4);

    sampler.set_interpolation(Interpolation::None);
    let mut after = NotePlayHandle::new(69, 440.0, 0);
    period(&sampler, &mut after, 4);

    assert_eq!(before.playback().map(|s| s.interpolation()), Some(Interpolation::Linear));
    assert_eq!(after.playback().map(|s| s.interpolation()), Some(Interpolation::None));
}

#[test]
fn test_detuned_note_marks_state_as_varying() {
    let sampler = sampler(&ramp_settings(100));
    let mut note = NotePlayHandle::new(69, 440.0, 0).with_detuning();
    period(&sampler, &mut note, 4);
    assert_eq!(note.playback().map(|s| s.varying_pitch()), Some(true));
}

#[test]
fn test_prepared_resampler_is_picked_up_by_playback() {
    let sampler = sampler(&ramp_settings(4096));
    assert!(sampler.prepare_resampler(880.0).is_none());

    sampler.set_interpolation(Interpolation::Sinc);
    let resampler = sampler.prepare_resampler(880.0).unwrap();
    let mut note = NotePlayHandle::new(81, 880.0, 0).with_resampler(resampler);
    let out = left(&period(&sampler, &mut note, 256));
    assert!((out[100] - 200.0).abs() < 2.0, "{}", out[100]);

    assert!(note.take_resampler().is_some());
    assert!(note.take_resampler().is_none());
}
