use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use log::{info, warn};

/// Decoded sample data for the source clip. Interleaved by channel,
/// immutable once constructed; shared read-only between the render thread
/// and every back buffer via `Arc`.
#[derive(Clone)]
pub struct Clip {
    data: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl Clip {
    pub fn from_samples(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            data,
            channels,
            sample_rate,
        }
    }

    /// Decode a WAV file into an interleaved f32 clip.
    pub fn decode_wav(path: &str) -> Result<Self, anyhow::Error> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels;
        let sample_rate = spec.sample_rate;

        let data: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                let max_val = 2.0_f32.powi(bit_depth as i32 - 1);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            data,
            channels,
            sample_rate,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    /// Add one frame into an interleaved output frame, remapping channels by
    /// modulo and scaling by `gain`. Never overwrites: callers may be mixing
    /// several engines into the same destination.
    pub fn add_frame_into(&self, frame: usize, out_frame: &mut [f32], gain: f32) {
        let ch = self.channels as usize;
        let base = frame * ch;
        for (c, slot) in out_frame.iter_mut().enumerate() {
            *slot += self.data[base + c % ch] * gain;
        }
    }
}

/// Owns the source clip and its load lifecycle: NotLoaded -> Loading ->
/// Ready, advanced by polling from the control tick. Decoding runs on a
/// worker thread; the result comes back over a channel.
pub struct ClipStore {
    source: Option<Arc<Clip>>,
    pending: Option<Receiver<Result<Clip, anyhow::Error>>>,
    warned_missing: bool,
}

impl ClipStore {
    pub fn new() -> Self {
        Self {
            source: None,
            pending: None,
            warned_missing: false,
        }
    }

    /// Kick off a background WAV decode. Replaces any load already in
    /// flight.
    pub fn load_wav(&mut self, path: &str) {
        let (tx, rx) = bounded(1);
        let path = path.to_string();
        thread::spawn(move || {
            let _ = tx.send(Clip::decode_wav(&path));
        });
        self.pending = Some(rx);
    }

    /// Inject an already-decoded clip.
    pub fn set(&mut self, clip: Arc<Clip>) {
        self.source = Some(clip);
        self.pending = None;
    }

    /// Non-blocking load advance. Returns the clip once, on the tick the
    /// decode completed.
    pub fn poll(&mut self) -> Option<Arc<Clip>> {
        let rx = self.pending.as_ref()?;
        match rx.try_recv() {
            Ok(Ok(clip)) => {
                info!(
                    "[ClipStore] clip loaded: {} frames, {} ch",
                    clip.frames(),
                    clip.channels()
                );
                let clip = Arc::new(clip);
                self.source = Some(clip.clone());
                self.pending = None;
                Some(clip)
            }
            Ok(Err(err)) => {
                warn!("[ClipStore] clip load failed: {err:#}");
                self.pending = None;
                None
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                None
            }
        }
    }

    pub fn source(&self) -> Option<&Arc<Clip>> {
        self.source.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Log the missing-clip warning once. Without a source the engine stays
    /// not-ready indefinitely.
    pub fn warn_missing(&mut self) {
        if !self.warned_missing {
            warn!("[ClipStore] no clip set; sequencer will not become ready");
            self.warned_missing = true;
        }
    }
}

impl Default for ClipStore {
    fn default() -> Self {
        Self::new()
    }
}
