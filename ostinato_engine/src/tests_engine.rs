#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use ostinato_shared::{FadeMask, Pattern, SequencerConfig};

    use crate::clip::Clip;
    use crate::engine::{SequenceEngine, Sequencer};

    // Deliberately small numbers so one render buffer is one step:
    // 8000 Hz * 60 / 600 bpm * 4 beats / 4 steps = 800 frames per step.
    const SAMPLE_RATE: u32 = 8000;
    const BPM: u32 = 600;
    const STEPS: usize = 4;
    const STEP_FRAMES: usize = 800;
    const CHANNELS: usize = 2;

    fn config(pattern: Pattern) -> SequencerConfig {
        SequencerConfig {
            pattern,
            bpm: BPM,
            volume: 1.0,
            max_back_buffers: 0,
            grow_back_buffers_by: 0,
            fade_in: 0.0,
            fade_out: 0.0,
            fade_mask: FadeMask::ALL,
        }
    }

    fn pair_with_clip(cfg: SequencerConfig, clip_frames: usize) -> (Sequencer, SequenceEngine) {
        let (mut control, engine) = Sequencer::new(SAMPLE_RATE, cfg);
        let clip = Clip::from_samples(vec![1.0; clip_frames], 1, SAMPLE_RATE);
        control.set_clip(Arc::new(clip));
        (control, engine)
    }

    fn render_step(engine: &mut SequenceEngine) -> Vec<f32> {
        let mut buf = vec![0.0f32; STEP_FRAMES * CHANNELS];
        engine.render(&mut buf, CHANNELS);
        buf
    }

    #[test]
    fn test_first_step_triggers_clip_one_frame_in() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        let buf = render_step(&mut engine);

        // The boundary fires at frame 0 but mixing for that frame already
        // happened, so the clip is audible from frame 1.
        assert_eq!(buf[0], 0.0);
        assert_eq!(buf[1], 0.0);
        assert_eq!(buf[2], 1.0);
        assert_eq!(buf[3], 1.0);
        // Mono clip of 100 frames: last audible frame is 100, silent after.
        assert_eq!(buf[100 * CHANNELS], 1.0);
        assert_eq!(buf[101 * CHANNELS], 0.0);
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn test_step_wraps_back_to_one() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        let mut seen = Vec::new();
        for _ in 0..(STEPS + 1) {
            render_step(&mut engine);
            seen.push(engine.current_step());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 1]);
        assert_eq!(control.current_step(), 1);
    }

    #[test]
    fn test_seek_half_on_sixteen_steps_lands_on_step_nine() {
        // 16 steps, 120 bpm, 48 kHz: 6000 samples per step. Seeking 0.5
        // lands on boundary 8.0 exactly, which is 1-based step 9.
        let cfg = SequencerConfig {
            pattern: Pattern::solid(16),
            bpm: 120,
            ..Default::default()
        };
        let (mut control, mut engine) = Sequencer::new(48000, cfg);
        control.set_clip(Arc::new(Clip::from_samples(vec![1.0; 64], 1, 48000)));
        control.play();
        let mut buf = vec![0.0f32; 512 * CHANNELS];
        engine.render(&mut buf, CHANNELS);

        control.set_percentage(0.5);
        let mut buf = vec![0.0f32; 512 * CHANNELS];
        engine.render(&mut buf, CHANNELS);

        assert_eq!(engine.current_step(), 9);
        assert_eq!(control.current_step(), 9);
        // The seek consumed the whole callback: no audio was mixed.
        assert!(buf.iter().all(|&s| s == 0.0));
        // progress = 9 * 6000 of 96000 total samples.
        assert!((control.get_percentage() - 0.5625).abs() < 1e-9);
    }

    #[test]
    fn test_seek_percentage_is_clamped() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        render_step(&mut engine);
        control.set_percentage(7.5);
        render_step(&mut engine);
        // Clamped to 1.0: a full cycle wraps to step 1.
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn test_back_buffer_count_stays_bounded() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.max_back_buffers = 2;
        cfg.grow_back_buffers_by = 1;
        // Clip much longer than a step: every boundary leaves a tail.
        let (mut control, mut engine) = pair_with_clip(cfg, STEP_FRAMES * 20);
        control.play();
        for _ in 0..12 {
            render_step(&mut engine);
            assert!(engine.active_back_buffers() <= 2);
        }
        assert_eq!(engine.active_back_buffers(), 2);
    }

    #[test]
    fn test_tails_keep_sounding_after_retrigger() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.max_back_buffers = 4;
        cfg.grow_back_buffers_by = 2;
        // Clip spans 1.5 steps.
        let (mut control, mut engine) = pair_with_clip(cfg, STEP_FRAMES + STEP_FRAMES / 2);
        control.play();
        render_step(&mut engine);
        let buf = render_step(&mut engine);

        // Second step: new trigger (1.0) plus the previous trigger's tail
        // (1.0) for the first half, then the tail runs out.
        assert_eq!(buf[10 * CHANNELS], 2.0);
        assert_eq!(buf[(STEP_FRAMES / 2 + 10) * CHANNELS], 1.0);
        assert_eq!(engine.active_back_buffers(), 0);
    }

    #[test]
    fn test_mixing_is_additive_outside_contribution() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::new(vec![false; STEPS])), 100);
        control.play();
        // Silent pattern: a pre-filled buffer must come back bit-exact.
        let mut buf = vec![0.7f32; STEP_FRAMES * CHANNELS];
        engine.render(&mut buf, CHANNELS);
        assert!(buf.iter().all(|&s| s == 0.7));

        // Active pattern: contribution is added on top of what's there.
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        let mut buf = vec![0.5f32; STEP_FRAMES * CHANNELS];
        engine.render(&mut buf, CHANNELS);
        assert_eq!(buf[0], 0.5);
        assert_eq!(buf[2], 1.5);
        assert_eq!(buf[101 * CHANNELS], 0.5);
    }

    #[test]
    fn test_stop_resets_state() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.max_back_buffers = 4;
        cfg.grow_back_buffers_by = 2;
        let (mut control, mut engine) = pair_with_clip(cfg, STEP_FRAMES * 4);
        control.play();
        render_step(&mut engine);
        render_step(&mut engine);
        assert!(engine.active_back_buffers() > 0);

        control.stop();
        assert!(!control.is_playing());
        assert!(!control.is_ready());
        assert_eq!(control.current_step(), 0);

        // Next callback consumes the reset.
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 0);
        assert_eq!(engine.active_back_buffers(), 0);

        // Play after stop re-arms from the retained source clip.
        control.play();
        assert!(control.is_ready());
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn test_play_is_idempotent() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.max_back_buffers = 4;
        cfg.grow_back_buffers_by = 2;
        let (mut control, mut engine) = pair_with_clip(cfg, STEP_FRAMES * 4);
        control.play();
        render_step(&mut engine);
        render_step(&mut engine);
        let step_before = engine.current_step();
        let tails_before = engine.active_back_buffers();
        assert_eq!(step_before, 2);

        control.play();
        // A short buffer that crosses no boundary: nothing may have been
        // re-armed or cleared by the redundant play.
        let mut buf = vec![0.0f32; 64 * CHANNELS];
        engine.render(&mut buf, CHANNELS);
        assert_eq!(engine.current_step(), step_before);
        assert_eq!(engine.active_back_buffers(), tails_before);
    }

    #[test]
    fn test_muted_engine_counts_steps_silently() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        let any_steps = Arc::new(AtomicU32::new(0));
        let counter = any_steps.clone();
        control.on_any_step(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        control.play();
        control.mute(true);
        // One buffer spanning three steps: the counting loop must cross all
        // three boundaries, not just one.
        let mut buf = vec![0.0f32; STEP_FRAMES * 3 * CHANNELS];
        engine.render(&mut buf, CHANNELS);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(engine.current_step(), 3);

        control.update(0.016);
        assert_eq!(any_steps.load(Ordering::Relaxed), 3);

        // Unmuting resumes mixing in sync.
        control.mute(false);
        let buf = render_step(&mut engine);
        assert_eq!(engine.current_step(), 4);
        assert_eq!(buf[2], 1.0);
    }

    #[test]
    fn test_events_fire_in_step_order_and_only_beats_on_active() {
        let (mut control, mut engine) =
            pair_with_clip(config(Pattern::new(vec![true, false, true, false])), 100);
        let beats = Arc::new(Mutex::new(Vec::new()));
        let any = Arc::new(Mutex::new(Vec::new()));
        let b = beats.clone();
        control.on_beat(move |step, of| {
            assert_eq!(of, STEPS as u32);
            b.lock().unwrap().push(step);
        });
        let a = any.clone();
        control.on_any_step(move |step, _| {
            a.lock().unwrap().push(step);
        });

        control.play();
        for _ in 0..STEPS {
            render_step(&mut engine);
        }
        control.update(0.016);

        assert_eq!(*beats.lock().unwrap(), vec![1, 3]);
        assert_eq!(*any.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_fade_out_stop_ramps_then_resets() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.fade_out = 0.1;
        let (mut control, mut engine) = pair_with_clip(cfg, 100);
        control.play();
        render_step(&mut engine);
        assert_eq!(control.gain(), 1.0);

        control.stop();
        // Still playing while the fade is in flight.
        assert!(control.is_playing());

        let mut last_gain = control.gain();
        for _ in 0..3 {
            control.update(0.025);
            assert!(control.gain() <= last_gain);
            last_gain = control.gain();
            assert!(control.is_playing());
        }
        // Fourth tick crosses the duration: deferred stop applies.
        control.update(0.05);
        assert_eq!(control.gain(), 0.0);
        assert!(!control.is_playing());
        assert_eq!(control.current_step(), 0);

        render_step(&mut engine);
        assert_eq!(engine.current_step(), 0);
    }

    #[test]
    fn test_mute_fade_keeps_audio_until_ramp_lands() {
        let mut cfg = config(Pattern::solid(STEPS));
        cfg.fade_out = 0.1;
        let (mut control, mut engine) = pair_with_clip(cfg, 100);
        control.play();
        render_step(&mut engine);

        control.mute(true);
        // Flag flips only when the ramp lands.
        assert!(!control.is_muted());
        control.update(0.05);
        assert!(!control.is_muted());
        control.update(0.06);
        assert!(control.is_muted());
        assert_eq!(control.gain(), 0.0);

        // Muted render advances steps but mixes nothing.
        let buf = render_step(&mut engine);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_pause_preserves_cursor_and_clock() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 1);

        control.pause(true);
        // Paused renders are inert: no steps, no audio, frozen clock.
        for _ in 0..5 {
            let buf = render_step(&mut engine);
            assert!(buf.iter().all(|&s| s == 0.0));
        }
        assert_eq!(engine.current_step(), 1);

        control.pause(false);
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 2);
    }

    #[test]
    fn test_play_before_clip_is_deferred_until_ready() {
        let (mut control, mut engine) = Sequencer::new(SAMPLE_RATE, config(Pattern::solid(STEPS)));
        control.play();
        assert!(!control.is_playing());
        assert!(!control.is_ready());
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 0);

        control.set_clip(Arc::new(Clip::from_samples(vec![1.0; 100], 1, SAMPLE_RATE)));
        assert!(control.is_ready());
        assert!(control.is_playing());
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 1);
    }

    #[test]
    fn test_wav_load_is_polled_to_ready() {
        let path = std::env::temp_dir().join("ostinato_load_test.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..16 {
            writer.write_sample(i16::MAX / 2).unwrap();
        }
        writer.finalize().unwrap();

        let (mut control, _engine) = Sequencer::new(SAMPLE_RATE, config(Pattern::solid(STEPS)));
        control.load_wav(path.to_str().unwrap());
        assert!(!control.is_ready());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !control.is_ready() && Instant::now() < deadline {
            control.update(0.005);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(control.is_ready(), "decode thread did not finish in time");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bpm_is_clamped_and_does_not_reset_step() {
        let (mut control, mut engine) = pair_with_clip(config(Pattern::solid(STEPS)), 100);
        control.play();
        render_step(&mut engine);
        render_step(&mut engine);
        assert_eq!(engine.current_step(), 2);

        control.set_bpm(3);
        assert_eq!(control.bpm(), 10);
        assert_eq!(engine.current_step(), 2);
    }
}
