use serde::{Deserialize, Serialize};

use crate::{FadeMask, MIN_BPM};

/// Ordered sequence of steps. True = trigger the clip, false = silent.
///
/// Patterns are replaced wholesale by configuration; the engine only reads
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern(Vec<bool>);

impl Pattern {
    pub fn new(steps: Vec<bool>) -> Self {
        Pattern(steps)
    }

    /// Pattern of `n` steps, all active.
    pub fn solid(n: usize) -> Self {
        Pattern(vec![true; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given 1-based step triggers playback. Step 0 ("not yet
    /// started") and out-of-range steps are silent.
    pub fn step_active(&self, step: u32) -> bool {
        if step == 0 {
            return false;
        }
        self.0.get(step as usize - 1).copied().unwrap_or(false)
    }

    pub fn steps(&self) -> &[bool] {
        &self.0
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::solid(16)
    }
}

/// Everything a sequencer instance needs to be configured before (or
/// between) runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    pub pattern: Pattern,
    /// Beats per minute, clamped to `MIN_BPM` when applied.
    pub bpm: u32,
    /// Nominal output gain when fully faded in.
    pub volume: f32,
    /// Upper bound on concurrently sounding tails. 0 disables tails.
    pub max_back_buffers: usize,
    /// How many slots the tail pool grows by when exhausted.
    pub grow_back_buffers_by: usize,
    /// Default fade-in duration in seconds.
    pub fade_in: f32,
    /// Default fade-out duration in seconds.
    pub fade_out: f32,
    /// Which transitions actually fade.
    pub fade_mask: FadeMask,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            pattern: Pattern::default(),
            bpm: 120,
            volume: 1.0,
            max_back_buffers: 0,
            grow_back_buffers_by: 0,
            fade_in: 0.0,
            fade_out: 0.0,
            fade_mask: FadeMask::ALL,
        }
    }
}

impl SequencerConfig {
    pub fn clamped_bpm(&self) -> u32 {
        self.bpm.max(MIN_BPM)
    }
}
