use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam_channel::{Receiver, unbounded};
use log::debug;
use ostinato_shared::{FadeMask, FadeTarget, MIN_BPM, Pattern, SequencerConfig, StepNotice};

use crate::back_buffer::BackBufferPool;
use crate::clip::{Clip, ClipStore};
use crate::events::{StepCallback, StepEventDrain, StepEventStage, step_event_queue};
use crate::fade::FadeEnvelope;
use crate::scheduler::StepScheduler;

/// Sentinel bit pattern for "no seek staged" (an f64 NaN, so it can never
/// collide with a real percentage).
const SEEK_NONE: u64 = u64::MAX;

/// Scalar state shared between the control and render halves. Every field is
/// either idempotently overwritten by a single writer or a one-shot flag
/// consumed with `swap`, so no locks are needed; `Relaxed` is enough since we
/// only need visibility, not cross-field ordering.
struct EngineShared {
    playing: AtomicBool,
    muted: AtomicBool,
    ready: AtomicBool,
    bpm: AtomicU32,
    /// f32 bits of the current output gain, written by the fade envelope.
    gain_bits: AtomicU32,
    current_step: AtomicU32,
    /// f64 bits of the scheduler's progress counter.
    progress_bits: AtomicU64,
    /// f64 bits of a staged seek percentage; `SEEK_NONE` when empty.
    /// Single-writer (control), consumed-and-cleared by render,
    /// last-write-wins.
    pending_seek: AtomicU64,
    /// Re-anchor the boundary clock on the next callback (set on play).
    pending_arm: AtomicBool,
    /// Reset the render-side state on the next callback (set on stop).
    pending_reset: AtomicBool,
}

/// Render half of a sequencer. Lives on the audio thread (or inside the
/// audio callback) and owns everything the hot path touches: the step
/// scheduler, the play cursor and the tail pool.
pub struct SequenceEngine {
    shared: Arc<EngineShared>,
    clip_slot: Arc<ArcSwapOption<Clip>>,
    pattern: Arc<ArcSwap<Pattern>>,
    scheduler: StepScheduler,
    /// Read cursor into the clip, in frames. None = inactive.
    cursor: Option<usize>,
    pool: BackBufferPool,
    events: StepEventStage,
    /// Absolute sample clock, in frames. Frozen while not playing.
    clock: f64,
    sample_rate: u32,
}

impl SequenceEngine {
    /// Add this sequencer's contribution into an interleaved output buffer.
    /// `data` may already hold other sources; samples are only ever added.
    /// No blocking, no I/O, no steady-state allocation.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 || data.is_empty() {
            return;
        }
        if self.shared.pending_reset.swap(false, Ordering::Relaxed) {
            self.scheduler.reset();
            self.cursor = None;
            self.pool.clear();
        }

        let guard = self.clip_slot.load();
        let Some(clip) = guard.as_ref() else {
            // Not ready; stay silent until a clip arrives.
            return;
        };
        if !self.shared.playing.load(Ordering::Relaxed) {
            return;
        }
        if self.shared.pending_arm.swap(false, Ordering::Relaxed) {
            self.scheduler.arm(self.clock);
        }

        let pattern = self.pattern.load();
        let steps = pattern.len() as u32;
        if steps == 0 {
            return;
        }
        let frames = data.len() / channels;
        let bpm = self.shared.bpm.load(Ordering::Relaxed).max(MIN_BPM);
        let samples_per_step = StepScheduler::samples_per_step(self.sample_rate, bpm, steps);

        let seek = self.shared.pending_seek.swap(SEEK_NONE, Ordering::Relaxed);
        if seek != SEEK_NONE {
            // Cursor surgery has to happen on this thread; the seek consumes
            // this callback without mixing. Leftover sub-step phase is
            // discarded.
            self.pool.clear();
            self.cursor = None;
            self.scheduler
                .seek_to_fraction(f64::from_bits(seek), samples_per_step, steps);
            self.clock += frames as f64;
            self.publish_position();
            return;
        }

        let gain = f32::from_bits(self.shared.gain_bits.load(Ordering::Relaxed));
        if self.shared.muted.load(Ordering::Relaxed) {
            // Muted: keep counting boundaries so unmuting resumes in sync.
            // Nothing is mixed and tails stay frozen.
            let last = self.clock + (frames - 1) as f64;
            while self.scheduler.due(last) {
                self.cross_boundary(&pattern, samples_per_step, steps, None);
            }
        } else {
            for i in 0..frames {
                let frame_out = &mut data[i * channels..(i + 1) * channels];
                self.pool.mix_frame(frame_out, gain);
                if let Some(idx) = self.cursor {
                    clip.add_frame_into(idx, frame_out, gain);
                    let next = idx + 1;
                    self.cursor = (next < clip.frames()).then_some(next);
                }
                self.scheduler.frame_progress(samples_per_step, i);
                if self.scheduler.due(self.clock + i as f64) {
                    self.cross_boundary(&pattern, samples_per_step, steps, Some(clip));
                }
            }
        }

        self.clock += frames as f64;
        self.publish_position();
    }

    /// Cross one step boundary: salvage the unfinished trigger as a tail,
    /// advance the scheduler, restart or silence the cursor per the pattern,
    /// and stage the notice for the control thread.
    fn cross_boundary(
        &mut self,
        pattern: &Pattern,
        samples_per_step: f64,
        steps: u32,
        capture_from: Option<&Arc<Clip>>,
    ) {
        if let (Some(clip), Some(idx)) = (capture_from, self.cursor) {
            self.pool.capture(Arc::clone(clip), idx);
        }
        let step = self.scheduler.advance(samples_per_step, steps);
        let active = pattern.step_active(step);
        self.cursor = if active { Some(0) } else { None };
        self.events.stage(StepNotice {
            step,
            of: steps,
            active,
        });
    }

    fn publish_position(&self) {
        self.shared
            .current_step
            .store(self.scheduler.current_step(), Ordering::Relaxed);
        self.shared
            .progress_bits
            .store(self.scheduler.progress().to_bits(), Ordering::Relaxed);
    }

    pub fn current_step(&self) -> u32 {
        self.scheduler.current_step()
    }

    pub fn active_back_buffers(&self) -> usize {
        self.pool.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Control half of a sequencer: the full Play/Stop/Pause/Mute/seek surface.
/// Cheap scalar changes land in atomics; anything that has to touch render
/// state is staged as a one-shot request the render callback consumes.
/// `update` is the periodic control tick (fade integration, event dispatch,
/// load polling) and is never called from the render thread.
pub struct Sequencer {
    shared: Arc<EngineShared>,
    clip_slot: Arc<ArcSwapOption<Clip>>,
    pattern: Arc<ArcSwap<Pattern>>,
    store: ClipStore,
    fade: FadeEnvelope,
    /// Nominal gain when fully faded in.
    volume: f32,
    fade_in: f32,
    fade_out: f32,
    fade_mask: FadeMask,
    events: StepEventDrain,
    on_ready: Option<Box<dyn FnMut() + Send>>,
    play_when_ready: bool,
    retired_rx: Receiver<Arc<Clip>>,
    sample_rate: u32,
}

impl Sequencer {
    /// Build a control/render pair. The `SequenceEngine` half moves to the
    /// audio thread; this half stays with the caller's tick loop.
    pub fn new(sample_rate: u32, config: SequencerConfig) -> (Sequencer, SequenceEngine) {
        let SequencerConfig {
            pattern,
            bpm,
            volume,
            max_back_buffers,
            grow_back_buffers_by,
            fade_in,
            fade_out,
            fade_mask,
        } = config;

        let shared = Arc::new(EngineShared {
            playing: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            bpm: AtomicU32::new(bpm.max(MIN_BPM)),
            gain_bits: AtomicU32::new(0.0f32.to_bits()),
            current_step: AtomicU32::new(0),
            progress_bits: AtomicU64::new(0.0f64.to_bits()),
            pending_seek: AtomicU64::new(SEEK_NONE),
            pending_arm: AtomicBool::new(false),
            pending_reset: AtomicBool::new(false),
        });
        let clip_slot = Arc::new(ArcSwapOption::empty());
        let pattern = Arc::new(ArcSwap::from_pointee(pattern));
        let (retired_tx, retired_rx) = unbounded();
        let (stage, drain) = step_event_queue();

        let engine = SequenceEngine {
            shared: shared.clone(),
            clip_slot: clip_slot.clone(),
            pattern: pattern.clone(),
            scheduler: StepScheduler::new(),
            cursor: None,
            pool: BackBufferPool::new(max_back_buffers, grow_back_buffers_by, retired_tx),
            events: stage,
            clock: 0.0,
            sample_rate,
        };
        let control = Sequencer {
            shared,
            clip_slot,
            pattern,
            store: ClipStore::new(),
            fade: FadeEnvelope::new(),
            volume,
            fade_in,
            fade_out,
            fade_mask,
            events: drain,
            on_ready: None,
            play_when_ready: false,
            retired_rx,
            sample_rate,
        };
        (control, engine)
    }

    // --- Clip lifecycle ---

    /// Inject an already-decoded clip; the engine becomes ready immediately.
    pub fn set_clip(&mut self, clip: Arc<Clip>) {
        self.store.set(clip.clone());
        self.clip_slot.store(Some(clip));
        self.shared.ready.store(true, Ordering::Relaxed);
        if self.play_when_ready {
            self.play_when_ready = false;
            self.play();
        }
    }

    /// Start a background WAV load; readiness arrives on a later `update`.
    pub fn load_wav(&mut self, path: &str) {
        self.store.load_wav(path);
    }

    /// Replace the pattern wholesale. Takes effect at the next callback.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern.store(Arc::new(pattern));
    }

    /// Fired once when the clip finishes loading.
    pub fn on_ready(&mut self, cb: impl FnMut() + Send + 'static) {
        self.on_ready = Some(Box::new(cb));
    }

    /// Fired on the control thread for every active step.
    pub fn on_beat(&mut self, cb: impl FnMut(u32, u32) + Send + 'static) {
        self.events.set_on_beat(Box::new(cb) as StepCallback);
    }

    /// Fired on the control thread for every step, silent ones included.
    pub fn on_any_step(&mut self, cb: impl FnMut(u32, u32) + Send + 'static) {
        self.events.set_on_any_step(Box::new(cb) as StepCallback);
    }

    // --- Transport ---

    /// Start playback with the default fade-in. No-op while already playing.
    pub fn play(&mut self) {
        self.play_with_fade(self.fade_in);
    }

    /// Stage a seek, then start playback.
    pub fn play_from(&mut self, percentage: f64) {
        self.set_percentage(percentage);
        self.play();
    }

    pub fn play_with_fade(&mut self, fade_duration: f32) {
        if self.is_playing() {
            return;
        }
        if !self.rearm_clip() {
            if !self.store.is_loading() {
                self.store.warn_missing();
            }
            // Accepted but deferred; honored once the clip is ready.
            self.play_when_ready = true;
            return;
        }
        if fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::Play) {
            self.set_muted_flag(false);
            self.fade.begin(FadeTarget::Play, fade_duration, self.volume);
        } else {
            self.snap_gain();
        }
        self.shared.pending_arm.store(true, Ordering::Relaxed);
        self.shared.playing.store(true, Ordering::Relaxed);
        self.publish_gain();
        debug!("[Sequencer] play");
    }

    /// Stop with the default fade-out, then reset to step 0.
    pub fn stop(&mut self) {
        self.stop_with_fade(self.fade_out);
    }

    pub fn stop_with_fade(&mut self, fade_duration: f32) {
        if self.is_playing() && fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::Stop) {
            self.fade.begin(FadeTarget::Stop, fade_duration, 0.0);
        } else {
            self.snap_gain();
            self.stop_internal();
        }
        self.publish_gain();
    }

    /// Pause or resume. Pausing preserves the play cursor and any sounding
    /// tails; the sample clock freezes, so resuming never replays missed
    /// boundaries.
    pub fn pause(&mut self, paused: bool) {
        let dur = if paused { self.fade_out } else { self.fade_in };
        self.pause_with_fade(paused, dur);
    }

    pub fn pause_with_fade(&mut self, paused: bool, fade_duration: f32) {
        if paused && fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::Pause) {
            self.fade.begin(FadeTarget::Pause, fade_duration, 0.0);
        } else if !paused && fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::UnPause) {
            self.pause_internal(false);
            self.set_muted_flag(false);
            self.fade.begin(FadeTarget::UnPause, fade_duration, self.volume);
        } else {
            self.snap_gain();
            self.pause_internal(paused);
        }
        self.publish_gain();
    }

    /// Mute or unmute. The sequencer keeps counting steps while muted so
    /// unmuting resumes in sync.
    pub fn mute(&mut self, muted: bool) {
        let dur = if muted { self.fade_out } else { self.fade_in };
        self.mute_with_fade(muted, dur);
    }

    pub fn mute_with_fade(&mut self, muted: bool, fade_duration: f32) {
        if muted && fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::Mute) {
            // Flag flips when the fade lands, so the ramp stays audible.
            self.fade.begin(FadeTarget::Mute, fade_duration, 0.0);
        } else if !muted && fade_duration > 0.0 && self.fade_mask.contains(FadeTarget::UnMute) {
            self.set_muted_flag(false);
            self.fade.begin(FadeTarget::UnMute, fade_duration, self.volume);
        } else {
            self.set_muted_flag(muted);
            self.snap_gain();
        }
        self.publish_gain();
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.is_muted();
        self.mute(muted);
    }

    /// Clamped to `MIN_BPM`. Does not reset the current step: tempo changes
    /// are heard as an instantaneous speed change, not a restart.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.shared.bpm.store(bpm.max(MIN_BPM), Ordering::Relaxed);
    }

    pub fn bpm(&self) -> u32 {
        self.shared.bpm.load(Ordering::Relaxed)
    }

    /// Stage an approximate seek, clamped to [0, 1]. Consumed by the render
    /// thread at its next callback; staging twice before that keeps only the
    /// last value.
    pub fn set_percentage(&mut self, percentage: f64) {
        let p = percentage.clamp(0.0, 1.0);
        self.shared.pending_seek.store(p.to_bits(), Ordering::Relaxed);
    }

    /// Approximate position as a fraction of the full pattern.
    pub fn get_percentage(&self) -> f64 {
        let bpm = self.shared.bpm.load(Ordering::Relaxed).max(MIN_BPM);
        let samples_total = self.sample_rate as f64 * 60.0 / bpm as f64 * 4.0;
        f64::from_bits(self.shared.progress_bits.load(Ordering::Relaxed)) / samples_total
    }

    /// Update the default durations only; a fade in flight is unaffected.
    pub fn set_fade_durations(&mut self, fade_in: f32, fade_out: f32) {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
    }

    // --- Control tick ---

    /// Periodic control tick: advances the clip load, dispatches queued step
    /// events, integrates the fade with this thread's delta time and applies
    /// its deferred transition, and disposes clip references retired by the
    /// render thread.
    pub fn update(&mut self, dt: f32) {
        if let Some(clip) = self.store.poll() {
            self.clip_slot.store(Some(clip));
            self.shared.ready.store(true, Ordering::Relaxed);
            if let Some(cb) = self.on_ready.as_mut() {
                cb();
            }
            if self.play_when_ready {
                self.play_when_ready = false;
                self.play();
            }
        }

        self.events.drain();

        if let Some(target) = self.fade.tick(dt) {
            match target {
                // Applied at fade start; nothing left to do.
                FadeTarget::Play | FadeTarget::UnMute | FadeTarget::UnPause => {}
                FadeTarget::Stop => self.stop_internal(),
                FadeTarget::Mute => self.set_muted_flag(true),
                FadeTarget::Pause => self.pause_internal(true),
            }
        }
        self.publish_gain();

        for _ in self.retired_rx.try_iter() {}
    }

    // --- Readbacks ---

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Relaxed)
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    /// 1-based step currently sounding; 0 before the first boundary.
    pub fn current_step(&self) -> u32 {
        self.shared.current_step.load(Ordering::Relaxed)
    }

    pub fn gain(&self) -> f32 {
        self.fade.gain()
    }

    // --- Internals ---

    fn stop_internal(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        // Drop the render slot's clip reference; the store keeps the source
        // so a later play can re-arm without reloading.
        self.clip_slot.store(None);
        self.shared.ready.store(false, Ordering::Relaxed);
        self.shared.pending_reset.store(true, Ordering::Relaxed);
        self.shared.current_step.store(0, Ordering::Relaxed);
        self.shared
            .progress_bits
            .store(0.0f64.to_bits(), Ordering::Relaxed);
        debug!("[Sequencer] stopped");
    }

    fn pause_internal(&mut self, paused: bool) {
        self.shared.playing.store(!paused, Ordering::Relaxed);
    }

    fn set_muted_flag(&mut self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
    }

    /// Re-publish the source clip to the render slot if it was dropped by a
    /// stop. Returns false when no source exists yet.
    fn rearm_clip(&mut self) -> bool {
        if self.shared.ready.load(Ordering::Relaxed) {
            return true;
        }
        match self.store.source() {
            Some(src) => {
                self.clip_slot.store(Some(src.clone()));
                self.shared.ready.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn snap_gain(&mut self) {
        let v = if self.is_muted() { 0.0 } else { self.volume };
        self.fade.snap(v);
    }

    fn publish_gain(&self) {
        self.shared
            .gain_bits
            .store(self.fade.gain().to_bits(), Ordering::Relaxed);
    }
}
