use ostinato_shared::FadeTarget;

/// Linear volume ramp bridging a control transition. Progressed on the
/// control thread with that thread's delta time; the resulting gain is read
/// by the render thread each callback.
///
/// `progress == 1.0` is the idle state. Starting a new fade overwrites any
/// fade in flight; there is no cancellation.
pub struct FadeEnvelope {
    progress: f32,
    speed: f32,
    volume_before: f32,
    volume_after: f32,
    target: FadeTarget,
}

impl FadeEnvelope {
    pub fn new() -> Self {
        Self {
            progress: 1.0,
            speed: 0.0,
            volume_before: 0.0,
            volume_after: 0.0,
            target: FadeTarget::Stop,
        }
    }

    /// Begin ramping from the current gain towards `to`. The deferred side
    /// effect for `target` is applied by the caller when `tick` reports
    /// completion.
    pub fn begin(&mut self, target: FadeTarget, duration: f32, to: f32) {
        self.target = target;
        self.speed = 1.0 / duration;
        self.volume_before = self.gain();
        self.volume_after = to;
        self.progress = 0.0;
    }

    /// Apply a volume instantly, ending any fade in flight without its side
    /// effect.
    pub fn snap(&mut self, volume: f32) {
        self.progress = 1.0;
        self.volume_before = volume;
        self.volume_after = volume;
    }

    /// Advance by the control tick's delta time. Returns the fade target
    /// exactly once, on the tick the ramp lands on 1.
    pub fn tick(&mut self, dt: f32) -> Option<FadeTarget> {
        if self.progress >= 1.0 {
            return None;
        }
        self.progress += dt * self.speed;
        if self.progress >= 1.0 {
            self.progress = 1.0;
            Some(self.target)
        } else {
            None
        }
    }

    /// Current gain. At `progress == 1` this is exactly `volume_after`.
    pub fn gain(&self) -> f32 {
        if self.progress >= 1.0 {
            self.volume_after
        } else {
            self.volume_before + (self.volume_after - self.volume_before) * self.progress
        }
    }

    pub fn is_fading(&self) -> bool {
        self.progress < 1.0
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }
}

impl Default for FadeEnvelope {
    fn default() -> Self {
        Self::new()
    }
}
