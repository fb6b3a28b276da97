use ostinato_shared::StepNotice;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Queue depth for deferred step notices. Bounded: the render thread may not
/// allocate, so a stalled control thread loses notices instead of growing a
/// queue.
pub const STEP_QUEUE_CAPACITY: usize = 256;

pub type StepCallback = Box<dyn FnMut(u32, u32) + Send>;

/// Render-thread side: stages one notice per crossed boundary.
pub struct StepEventStage {
    prod: HeapProd<StepNotice>,
}

impl StepEventStage {
    pub fn stage(&mut self, notice: StepNotice) {
        let _ = self.prod.try_push(notice);
    }
}

/// Control-thread side: drains staged notices and invokes user callbacks,
/// in step order, never inside the render deadline.
pub struct StepEventDrain {
    cons: HeapCons<StepNotice>,
    on_beat: Option<StepCallback>,
    on_any_step: Option<StepCallback>,
}

impl StepEventDrain {
    /// Fired only for active steps.
    pub fn set_on_beat(&mut self, cb: StepCallback) {
        self.on_beat = Some(cb);
    }

    /// Fired for every step, silent ones included.
    pub fn set_on_any_step(&mut self, cb: StepCallback) {
        self.on_any_step = Some(cb);
    }

    pub fn drain(&mut self) {
        while let Some(notice) = self.cons.try_pop() {
            if notice.active {
                if let Some(cb) = self.on_beat.as_mut() {
                    cb(notice.step, notice.of);
                }
            }
            if let Some(cb) = self.on_any_step.as_mut() {
                cb(notice.step, notice.of);
            }
        }
    }
}

pub fn step_event_queue() -> (StepEventStage, StepEventDrain) {
    let rb = HeapRb::<StepNotice>::new(STEP_QUEUE_CAPACITY);
    let (prod, cons) = rb.split();
    (
        StepEventStage { prod },
        StepEventDrain {
            cons,
            on_beat: None,
            on_any_step: None,
        },
    )
}
