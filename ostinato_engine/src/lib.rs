pub mod back_buffer;
pub mod clip;
pub mod driver;
pub mod engine;
pub mod events;
pub mod fade;
pub mod scheduler;

// Re-exports
pub use clip::{Clip, ClipStore};
pub use driver::{Sequencable, SequencerDriver};
pub use engine::{SequenceEngine, Sequencer};
pub use ostinato_shared::{FadeMask, FadeTarget, MIN_BPM, Pattern, SequencerConfig, StepNotice};

#[cfg(test)]
mod tests_engine;
