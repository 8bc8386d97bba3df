//! Host capabilities
//!
//! The scheduler needs two things from its environment: a way to run a
//! callback before the next paint ([`FrameClock`]) and a monotonic time
//! source in milliseconds ([`TimeSource`]). Windowing backends implement
//! these on top of their event loop. [`VirtualFrameHost`] implements both
//! with manual control for tests, headless runs and benchmarks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

/// Callback run once on the next animation frame
pub type FrameCallback = Box<dyn FnOnce()>;

/// Token identifying a requested frame callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Schedules callbacks on display refresh
pub trait FrameClock {
    /// Run `callback` once, asynchronously, before the next frame is painted
    fn request_frame(&self, callback: FrameCallback) -> FrameHandle;

    /// Cancel a requested callback that has not fired yet
    fn cancel_frame(&self, handle: FrameHandle);
}

/// Monotonic time in milliseconds
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Wall-clock time source backed by [`Instant`]
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A frame clock and time source driven by hand.
///
/// Time only moves through [`advance_time`](Self::advance_time) or
/// [`set_time`](Self::set_time), and frame callbacks only run inside
/// [`run_frame`](Self::run_frame).
#[derive(Default)]
pub struct VirtualFrameHost {
    now: Cell<f64>,
    next_handle: Cell<u64>,
    pending: RefCell<Vec<(FrameHandle, FrameCallback)>>,
    frames_run: Cell<u64>,
}

impl VirtualFrameHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of callbacks waiting for the next frame
    pub fn pending_frames(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Number of frames that ran at least one callback
    pub fn frames_run(&self) -> u64 {
        self.frames_run.get()
    }

    pub fn advance_time(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }

    pub fn set_time(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    /// Run every callback requested before this call.
    ///
    /// Callbacks requested while the frame runs wait for the next one.
    /// Returns how many callbacks ran.
    pub fn run_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.pending.borrow_mut());
        let count = callbacks.len();
        for (_, callback) in callbacks {
            callback();
        }
        if count > 0 {
            self.frames_run.set(self.frames_run.get() + 1);
        }
        count
    }

    /// Advance time by `delta_ms`, then run a frame
    pub fn step(&self, delta_ms: f64) -> usize {
        self.advance_time(delta_ms);
        self.run_frame()
    }

    /// Step `frame_ms` at a time until no frame is pending or `max_frames`
    /// frames have run. Returns the number of frames stepped.
    pub fn run_until_idle(&self, frame_ms: f64, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames && self.pending_frames() > 0 {
            self.step(frame_ms);
            frames += 1;
        }
        frames
    }
}

impl FrameClock for VirtualFrameHost {
    fn request_frame(&self, callback: FrameCallback) -> FrameHandle {
        let handle = FrameHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.pending.borrow_mut().push((handle, callback));
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.pending.borrow_mut().retain(|(pending, _)| *pending != handle);
    }
}

impl TimeSource for VirtualFrameHost {
    fn now(&self) -> f64 {
        self.now.get()
    }
}
