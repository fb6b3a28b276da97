use serde::{Deserialize, Serialize};

pub mod pattern;

pub use pattern::{Pattern, SequencerConfig};

/// Lowest tempo the engine will accept. Writes below this are clamped, not
/// rejected, so the step clock always keeps moving at an audible rate.
pub const MIN_BPM: u32 = 10;

/// Control transitions that can be bridged by a volume fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FadeTarget {
    Play,
    Stop,
    Mute,
    UnMute,
    Pause,
    UnPause,
}

impl FadeTarget {
    pub const fn bit(self) -> u8 {
        match self {
            FadeTarget::Play => 1 << 0,
            FadeTarget::Stop => 1 << 1,
            FadeTarget::Mute => 1 << 2,
            FadeTarget::UnMute => 1 << 3,
            FadeTarget::Pause => 1 << 4,
            FadeTarget::UnPause => 1 << 5,
        }
    }
}

/// Bitmask selecting which transitions trigger a fade. Transitions outside
/// the mask apply instantly at full/zero gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadeMask(pub u8);

impl FadeMask {
    pub const NONE: FadeMask = FadeMask(0);
    pub const ALL: FadeMask = FadeMask(0x3f);

    pub const fn contains(self, target: FadeTarget) -> bool {
        self.0 & target.bit() != 0
    }

    pub const fn with(self, target: FadeTarget) -> FadeMask {
        FadeMask(self.0 | target.bit())
    }

    pub const fn without(self, target: FadeTarget) -> FadeMask {
        FadeMask(self.0 & !target.bit())
    }
}

impl Default for FadeMask {
    fn default() -> Self {
        FadeMask::ALL
    }
}

/// Deferred step-boundary token, produced on the render thread and drained
/// on the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepNotice {
    /// 1-based step that just started.
    pub step: u32,
    /// Total steps in the pattern.
    pub of: u32,
    /// Whether the step triggers playback or is silent.
    pub active: bool,
}
