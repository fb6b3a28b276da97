use ostinato_shared::MIN_BPM;

use crate::engine::Sequencer;

/// The control capability every sequencer-like unit exposes: the leaf
/// `Sequencer` and the composite `SequencerDriver` implement it
/// independently, so drivers can nest.
pub trait Sequencable {
    fn play(&mut self);
    fn play_from(&mut self, percentage: f64);
    fn play_with_fade(&mut self, fade_duration: f32);
    fn stop(&mut self);
    fn stop_with_fade(&mut self, fade_duration: f32);
    fn pause(&mut self, paused: bool);
    fn pause_with_fade(&mut self, paused: bool, fade_duration: f32);
    fn mute(&mut self, muted: bool);
    fn mute_with_fade(&mut self, muted: bool, fade_duration: f32);
    fn toggle_mute(&mut self);
    fn set_bpm(&mut self, bpm: u32);
    fn set_percentage(&mut self, percentage: f64);
    fn set_fade_durations(&mut self, fade_in: f32, fade_out: f32);
    /// Periodic control tick.
    fn update(&mut self, dt: f32);
    fn is_playing(&self) -> bool;
    fn is_ready(&self) -> bool;
}

impl Sequencable for Sequencer {
    fn play(&mut self) {
        Sequencer::play(self);
    }
    fn play_from(&mut self, percentage: f64) {
        Sequencer::play_from(self, percentage);
    }
    fn play_with_fade(&mut self, fade_duration: f32) {
        Sequencer::play_with_fade(self, fade_duration);
    }
    fn stop(&mut self) {
        Sequencer::stop(self);
    }
    fn stop_with_fade(&mut self, fade_duration: f32) {
        Sequencer::stop_with_fade(self, fade_duration);
    }
    fn pause(&mut self, paused: bool) {
        Sequencer::pause(self, paused);
    }
    fn pause_with_fade(&mut self, paused: bool, fade_duration: f32) {
        Sequencer::pause_with_fade(self, paused, fade_duration);
    }
    fn mute(&mut self, muted: bool) {
        Sequencer::mute(self, muted);
    }
    fn mute_with_fade(&mut self, muted: bool, fade_duration: f32) {
        Sequencer::mute_with_fade(self, muted, fade_duration);
    }
    fn toggle_mute(&mut self) {
        Sequencer::toggle_mute(self);
    }
    fn set_bpm(&mut self, bpm: u32) {
        Sequencer::set_bpm(self, bpm);
    }
    fn set_percentage(&mut self, percentage: f64) {
        Sequencer::set_percentage(self, percentage);
    }
    fn set_fade_durations(&mut self, fade_in: f32, fade_out: f32) {
        Sequencer::set_fade_durations(self, fade_in, fade_out);
    }
    fn update(&mut self, dt: f32) {
        Sequencer::update(self, dt);
    }
    fn is_playing(&self) -> bool {
        Sequencer::is_playing(self)
    }
    fn is_ready(&self) -> bool {
        Sequencer::is_ready(self)
    }
}

/// Broadcasts the control API over an ordered collection of sequencers and
/// keeps them on one tempo. Readiness and playing state fold with AND across
/// the children; the guards rely on the children's own idempotence.
pub struct SequencerDriver {
    sequencers: Vec<Box<dyn Sequencable>>,
    bpm: u32,
    muted: bool,
    play_when_ready: bool,
}

impl SequencerDriver {
    pub fn new(bpm: u32) -> Self {
        Self {
            sequencers: Vec::new(),
            bpm: bpm.max(MIN_BPM),
            muted: false,
            play_when_ready: false,
        }
    }

    pub fn add(&mut self, sequencer: Box<dyn Sequencable>) {
        self.sequencers.push(sequencer);
    }

    pub fn len(&self) -> usize {
        self.sequencers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequencers.is_empty()
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Start all children as soon as every one of them reports ready.
    pub fn play_when_ready(&mut self) {
        self.play_when_ready = true;
    }
}

impl Sequencable for SequencerDriver {
    fn play(&mut self) {
        if !self.is_playing() {
            let bpm = self.bpm;
            for s in &mut self.sequencers {
                s.set_bpm(bpm);
                s.play();
            }
        }
    }

    fn play_from(&mut self, percentage: f64) {
        self.set_percentage(percentage);
        self.play();
    }

    fn play_with_fade(&mut self, fade_duration: f32) {
        if !self.is_playing() {
            let bpm = self.bpm;
            for s in &mut self.sequencers {
                s.set_bpm(bpm);
                s.play_with_fade(fade_duration);
            }
        }
    }

    fn stop(&mut self) {
        if self.is_playing() {
            for s in &mut self.sequencers {
                s.stop();
            }
        }
    }

    fn stop_with_fade(&mut self, fade_duration: f32) {
        if self.is_playing() {
            for s in &mut self.sequencers {
                s.stop_with_fade(fade_duration);
            }
        }
    }

    fn pause(&mut self, paused: bool) {
        if self.is_playing() == paused {
            for s in &mut self.sequencers {
                s.pause(paused);
            }
        }
    }

    fn pause_with_fade(&mut self, paused: bool, fade_duration: f32) {
        if self.is_playing() == paused {
            for s in &mut self.sequencers {
                s.pause_with_fade(paused, fade_duration);
            }
        }
    }

    fn mute(&mut self, muted: bool) {
        for s in &mut self.sequencers {
            s.mute(muted);
        }
        self.muted = muted;
    }

    fn mute_with_fade(&mut self, muted: bool, fade_duration: f32) {
        for s in &mut self.sequencers {
            s.mute_with_fade(muted, fade_duration);
        }
        self.muted = muted;
    }

    fn toggle_mute(&mut self) {
        let muted = !self.muted;
        self.mute(muted);
    }

    fn set_bpm(&mut self, bpm: u32) {
        let bpm = bpm.max(MIN_BPM);
        self.bpm = bpm;
        for s in &mut self.sequencers {
            s.set_bpm(bpm);
        }
    }

    fn set_percentage(&mut self, percentage: f64) {
        for s in &mut self.sequencers {
            s.set_percentage(percentage);
        }
    }

    fn set_fade_durations(&mut self, fade_in: f32, fade_out: f32) {
        for s in &mut self.sequencers {
            s.set_fade_durations(fade_in, fade_out);
        }
    }

    fn update(&mut self, dt: f32) {
        for s in &mut self.sequencers {
            s.update(dt);
        }
        if self.play_when_ready && self.is_ready() {
            self.play_when_ready = false;
            self.play();
        }
    }

    fn is_playing(&self) -> bool {
        !self.sequencers.is_empty() && self.sequencers.iter().all(|s| s.is_playing())
    }

    fn is_ready(&self) -> bool {
        !self.sequencers.is_empty() && self.sequencers.iter().all(|s| s.is_ready())
    }
}
