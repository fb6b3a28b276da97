use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::clip::Clip;

/// The unplayed tail of an earlier trigger, still sounding after a newer
/// trigger restarted the main cursor. A view into the clip (start frame +
/// cursor), not a copy; the channel count is pinned to the clip it was
/// captured from.
pub struct BackBuffer {
    clip: Option<Arc<Clip>>,
    start: usize,
    cursor: usize,
}

impl BackBuffer {
    fn idle() -> Self {
        Self {
            clip: None,
            start: 0,
            cursor: 0,
        }
    }

    fn arm(&mut self, clip: Arc<Clip>, start: usize) -> Option<Arc<Clip>> {
        let old = self.clip.replace(clip);
        self.start = start;
        self.cursor = 0;
        old
    }

    fn release(&mut self) -> Option<Arc<Clip>> {
        self.start = 0;
        self.cursor = 0;
        self.clip.take()
    }

    /// Mix this tail's current frame into `out_frame` and advance. Returns
    /// true once the tail is exhausted.
    fn mix_frame(&mut self, out_frame: &mut [f32], gain: f32) -> bool {
        let Some(clip) = self.clip.as_ref() else {
            return true;
        };
        let frame = self.start + self.cursor;
        if frame >= clip.frames() {
            return true;
        }
        clip.add_frame_into(frame, out_frame, gain);
        self.cursor += 1;
        self.start + self.cursor >= clip.frames()
    }
}

/// Pool of reusable tail buffers. Active tails are bounded by `max`; slots
/// are recycled through a free list so the steady state never allocates on
/// the render thread. Retired clip references are shipped to the control
/// thread over `retired_tx` so deallocation happens off the render path.
pub struct BackBufferPool {
    active: Vec<BackBuffer>,
    free: Vec<BackBuffer>,
    /// Current slot allowance; grows by `grow_by` up to `max`.
    capacity: usize,
    max: usize,
    grow_by: usize,
    retired_tx: Sender<Arc<Clip>>,
}

impl BackBufferPool {
    pub fn new(max: usize, grow_by: usize, retired_tx: Sender<Arc<Clip>>) -> Self {
        let capacity = grow_by.min(max);
        Self {
            active: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            capacity,
            max,
            grow_by,
            retired_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Capture the remainder of a trigger as a new tail. Silently drops the
    /// tail when the pool is at its cap or tails are disabled.
    pub fn capture(&mut self, clip: Arc<Clip>, start: usize) {
        if self.max == 0 || start >= clip.frames() {
            return;
        }
        if self.active.len() == self.capacity {
            if self.capacity >= self.max || self.grow_by == 0 {
                return;
            }
            self.capacity = (self.capacity + self.grow_by).min(self.max);
            self.active.reserve(self.capacity - self.active.len());
        }
        let mut bb = self.free.pop().unwrap_or_else(BackBuffer::idle);
        if let Some(old) = bb.arm(clip, start) {
            let _ = self.retired_tx.send(old);
        }
        self.active.push(bb);
    }

    /// Mix every active tail into one interleaved output frame. Exhausted
    /// tails go back to the free list in O(1) via swap-remove.
    pub fn mix_frame(&mut self, out_frame: &mut [f32], gain: f32) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].mix_frame(out_frame, gain) {
                let mut bb = self.active.swap_remove(i);
                if let Some(clip) = bb.release() {
                    let _ = self.retired_tx.send(clip);
                }
                self.free.push(bb);
            } else {
                i += 1;
            }
        }
    }

    /// Drop all active tails (seek, stop).
    pub fn clear(&mut self) {
        while let Some(mut bb) = self.active.pop() {
            if let Some(clip) = bb.release() {
                let _ = self.retired_tx.send(clip);
            }
            self.free.push(bb);
        }
    }
}
