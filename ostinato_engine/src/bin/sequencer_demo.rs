use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ostinato_engine::{Clip, Pattern, Sequencer, SequencerConfig};
use ostinato_shared::FadeMask;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    // Optional pattern file: a JSON array of booleans, one per step.
    let pattern = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            Pattern::new(serde_json::from_str::<Vec<bool>>(&text)?)
        }
        None => Pattern::new(vec![
            true, false, false, false, true, false, false, true, false, false, true, false, true,
            false, false, false,
        ]),
    };

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(anyhow::anyhow!("No output device available"))?;
    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();
    println!("[Demo] Using Config: {:?}", stream_config);

    let cfg = SequencerConfig {
        pattern,
        bpm: 120,
        volume: 0.8,
        max_back_buffers: 8,
        grow_back_buffers_by: 4,
        fade_in: 0.25,
        fade_out: 0.5,
        fade_mask: FadeMask::ALL,
    };
    let (mut sequencer, mut engine) = Sequencer::new(sample_rate, cfg);
    sequencer.set_clip(Arc::new(click(sample_rate)));
    sequencer.on_beat(|step, of| println!("[Demo] beat {step}/{of}"));

    let err_fn = |err: cpal::StreamError| {
        let s = err.to_string();
        // Suppress common buffer under/overrun messages to avoid console spam
        if !s.contains("underrun") && !s.contains("overrun") {
            eprintln!("an error occurred on stream: {}", s);
        }
    };
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // The engine only adds; start from silence.
                data.fill(0.0);
                engine.render(data, channels);
            },
            err_fn,
            None,
        )?,
        _ => return Err(anyhow::anyhow!("Unsupported sample format")),
    };
    stream.play()?;

    sequencer.play();
    run_for(&mut sequencer, Duration::from_secs(4));
    println!("[Demo] seeking to 50%");
    sequencer.set_percentage(0.5);
    run_for(&mut sequencer, Duration::from_secs(2));
    println!("[Demo] muting");
    sequencer.mute(true);
    run_for(&mut sequencer, Duration::from_secs(2));
    println!("[Demo] unmuting");
    sequencer.mute(false);
    run_for(&mut sequencer, Duration::from_secs(2));
    println!("[Demo] stopping");
    sequencer.stop();
    run_for(&mut sequencer, Duration::from_secs(1));
    println!("[Demo] Done.");
    Ok(())
}

/// Tick the control half at roughly 60 Hz for the given wall time.
fn run_for(sequencer: &mut Sequencer, duration: Duration) {
    let end = Instant::now() + duration;
    let mut last = Instant::now();
    while Instant::now() < end {
        let now = Instant::now();
        sequencer.update((now - last).as_secs_f32());
        last = now;
        thread::sleep(Duration::from_millis(16));
    }
}

/// Short decaying sine blip, long enough to overlap the next step at 120 bpm
/// so the back-buffer pool gets exercised.
fn click(sample_rate: u32) -> Clip {
    let frames = (sample_rate / 4) as usize;
    let mut data = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let env = (1.0 - i as f32 / frames as f32).powi(2);
        data.push((std::f32::consts::TAU * 440.0 * t).sin() * env);
    }
    Clip::from_samples(data, 1, sample_rate)
}
