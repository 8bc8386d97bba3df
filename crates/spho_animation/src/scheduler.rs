//! Animation scheduler
//!
//! Batches every moving spring into a single frame callback. While at least
//! one spring is registered exactly one frame request is outstanding; when the
//! last spring settles or ends the request is cancelled.

use crate::host::{FrameClock, FrameHandle, TimeSource};
use crate::spring::{Spring, SpringInner};
use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

new_key_type! {
    /// Identity of a spring within its scheduler
    pub struct SpringId;
}

/// Scheduler tuning
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Frames arriving sooner than this after the last processed frame are
    /// skipped and re-requested
    pub min_frame_interval_ms: f64,
}

impl SchedulerConfig {
    /// Process at most ~60 frames per second regardless of display rate
    pub fn throttled() -> Self {
        Self {
            min_frame_interval_ms: 16.0,
        }
    }

    pub fn with_min_frame_interval(mut self, interval_ms: f64) -> Self {
        self.min_frame_interval_ms = interval_ms;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 0.0,
        }
    }
}

struct SchedulerState {
    /// Every live spring created on this scheduler
    springs: SlotMap<SpringId, Weak<SpringInner>>,
    /// Springs to advance on the next frame, in registration order
    active: IndexMap<SpringId, Spring>,
    frame: Option<FrameHandle>,
    last_schedule_time: f64,
    frames_processed: u64,
}

pub(crate) struct SchedulerInner {
    frames: Rc<dyn FrameClock>,
    clock: Rc<dyn TimeSource>,
    config: SchedulerConfig,
    state: RefCell<SchedulerState>,
}

/// The animation scheduler that ticks all moving springs.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

enum FrameOutcome {
    Idle,
    TooSoon,
    Process(Vec<Spring>, f64),
}

impl Scheduler {
    pub fn new(frames: Rc<dyn FrameClock>, clock: Rc<dyn TimeSource>) -> Self {
        Self::with_config(frames, clock, SchedulerConfig::default())
    }

    pub fn with_config(
        frames: Rc<dyn FrameClock>,
        clock: Rc<dyn TimeSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                frames,
                clock,
                config,
                state: RefCell::new(SchedulerState {
                    springs: SlotMap::with_key(),
                    active: IndexMap::new(),
                    frame: None,
                    last_schedule_time: 0.0,
                    frames_processed: 0,
                }),
            }),
        }
    }

    /// Build a scheduler from a host providing both capabilities
    pub fn with_host<H>(host: Rc<H>) -> Self
    where
        H: FrameClock + TimeSource + 'static,
    {
        Self::new(host.clone(), host)
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    /// Current host time in milliseconds
    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    /// Queue `spring` for the next frame. Registering twice is a no-op, as is
    /// registering an ended spring.
    pub fn register(&self, spring: &Spring) {
        if spring.is_ended() {
            return;
        }

        let needs_frame = {
            let mut state = self.inner.state.borrow_mut();
            if state.active.contains_key(&spring.id()) {
                return;
            }
            state.active.insert(spring.id(), spring.clone());
            if state.active.len() == 1 && state.frame.is_none() {
                state.last_schedule_time = self.inner.clock.now();
                true
            } else {
                false
            }
        };

        trace!(spring = ?spring.id(), "spring registered");

        if needs_frame {
            self.request_frame();
        }
    }

    /// Remove `spring` from the next frame, cancelling the frame request if no
    /// spring is left
    pub fn deregister(&self, spring: &Spring) {
        let (removed, cancelled) = {
            let mut state = self.inner.state.borrow_mut();
            let removed = state.active.shift_remove(&spring.id());
            let cancelled = if removed.is_some() && state.active.is_empty() {
                state.frame.take()
            } else {
                None
            };
            (removed, cancelled)
        };

        if let Some(handle) = cancelled {
            debug!("no springs left, cancelling frame request");
            self.inner.frames.cancel_frame(handle);
        }

        // Released after the borrow so a final drop can reach the scheduler.
        drop(removed);
    }

    /// Whether `spring` will be advanced on the next frame
    pub fn is_registered(&self, spring: &Spring) -> bool {
        self.inner.state.borrow().active.contains_key(&spring.id())
    }

    /// Number of springs waiting for the next frame
    pub fn active_count(&self) -> usize {
        self.inner.state.borrow().active.len()
    }

    /// Check if any springs are still moving
    pub fn has_active_animations(&self) -> bool {
        self.active_count() > 0
    }

    /// Whether a frame request is outstanding
    pub fn has_pending_frame(&self) -> bool {
        self.inner.state.borrow().frame.is_some()
    }

    /// Number of frames that advanced springs
    pub fn frames_processed(&self) -> u64 {
        self.inner.state.borrow().frames_processed
    }

    /// Get the number of live springs created on this scheduler
    pub fn spring_count(&self) -> usize {
        self.inner
            .state
            .borrow()
            .springs
            .values()
            .filter(|spring| spring.strong_count() > 0)
            .count()
    }

    /// Handles to every live spring, in no particular order
    pub fn springs(&self) -> Vec<Spring> {
        self.inner
            .state
            .borrow()
            .springs
            .values()
            .filter_map(Spring::upgrade)
            .collect()
    }

    /// End every live spring
    pub fn end_all(&self) {
        for spring in self.springs() {
            spring.end();
        }
    }

    pub(crate) fn allocate_id(&self, spring: Weak<SpringInner>) -> SpringId {
        self.inner.state.borrow_mut().springs.insert(spring)
    }

    pub(crate) fn forget(&self, id: SpringId) {
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.springs.remove(id);
        }
    }

    fn request_frame(&self) {
        let weak = Rc::downgrade(&self.inner);
        let handle = self.inner.frames.request_frame(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.on_frame();
            }
        }));
        self.inner.state.borrow_mut().frame = Some(handle);
    }

    fn on_frame(&self) {
        let now = self.inner.clock.now();

        let outcome = {
            let mut state = self.inner.state.borrow_mut();
            state.frame = None;
            let delta = (now - state.last_schedule_time).max(0.0);

            if state.active.is_empty() {
                FrameOutcome::Idle
            } else if delta < self.inner.config.min_frame_interval_ms {
                FrameOutcome::TooSoon
            } else {
                state.frames_processed += 1;
                state.last_schedule_time = now;
                state.springs.retain(|_, spring| spring.strong_count() > 0);
                // Springs registering while the batch runs land in the next frame.
                let batch = std::mem::take(&mut state.active);
                FrameOutcome::Process(batch.into_values().collect(), delta)
            }
        };

        match outcome {
            FrameOutcome::Idle => {}
            FrameOutcome::TooSoon => {
                trace!("frame arrived early, waiting for the next one");
                self.request_frame();
            }
            FrameOutcome::Process(batch, delta) => {
                trace!(springs = batch.len(), delta_ms = delta, "processing frame");
                for spring in batch {
                    // A spring caught up mid-interval only advances the remainder.
                    let step = delta.min(now - spring.last_update_time()).max(0.0);
                    if !spring.advance(step, now) {
                        self.register(&spring);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InitialPosition, SpringConfig};
    use crate::host::VirtualFrameHost;

    fn setup() -> (Rc<VirtualFrameHost>, Scheduler) {
        let host = VirtualFrameHost::new();
        let scheduler = Scheduler::with_host(host.clone());
        (host, scheduler)
    }

    #[test]
    fn test_first_spring_requests_one_frame() {
        let (host, scheduler) = setup();
        assert!(!scheduler.has_pending_frame());

        let a = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();
        let b = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        assert_eq!(scheduler.active_count(), 2);
        assert!(scheduler.is_registered(&a));
        assert!(scheduler.is_registered(&b));
        assert_eq!(host.pending_frames(), 1);
        assert!(scheduler.has_pending_frame());
    }

    #[test]
    fn test_register_is_idempotent() {
        let (host, scheduler) = setup();
        let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        scheduler.register(&spring);
        scheduler.register(&spring);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(host.pending_frames(), 1);
    }

    #[test]
    fn test_frame_advances_and_rearms() {
        let (host, scheduler) = setup();
        let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        host.step(16.0);
        assert!(spring.current_value() > 0.0);
        assert!(scheduler.is_registered(&spring));
        assert_eq!(host.pending_frames(), 1);
        assert_eq!(scheduler.frames_processed(), 1);
    }

    #[test]
    fn test_last_deregistration_cancels_frame() {
        let (host, scheduler) = setup();
        let a = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();
        let b = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        scheduler.deregister(&a);
        assert_eq!(host.pending_frames(), 1);

        scheduler.deregister(&b);
        assert_eq!(host.pending_frames(), 0);
        assert!(!scheduler.has_pending_frame());

        // Nothing registered: deregistering again changes nothing.
        scheduler.deregister(&b);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_throttled_frames_are_skipped() {
        let host = VirtualFrameHost::new();
        let scheduler = Scheduler::with_config(
            host.clone(),
            host.clone(),
            SchedulerConfig::throttled(),
        );
        let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        host.step(8.0);
        assert_eq!(spring.current_value(), 0.0);
        assert_eq!(scheduler.frames_processed(), 0);
        assert_eq!(host.pending_frames(), 1);

        host.step(8.0);
        assert!(spring.current_value() > 0.0);
        assert_eq!(scheduler.frames_processed(), 1);
    }

    #[test]
    fn test_settled_springs_leave_the_registry() {
        let (host, scheduler) = setup();
        let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::at(5.0))
            .unwrap();

        host.step(16.0);
        assert!(!scheduler.is_registered(&spring));
        assert!(spring.is_at_rest());
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_spring_count_and_end_all() {
        let (host, scheduler) = setup();
        let a = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();
        let b = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::default())
            .unwrap();
        assert_eq!(scheduler.spring_count(), 2);

        scheduler.end_all();
        assert!(a.is_ended());
        assert!(b.is_ended());
        assert_eq!(scheduler.spring_count(), 0);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_independent_schedulers() {
        let (host_a, scheduler_a) = setup();
        let (host_b, scheduler_b) = setup();
        let a = Spring::new(&scheduler_a, SpringConfig::default(), InitialPosition::default())
            .unwrap();
        let b = Spring::new(&scheduler_b, SpringConfig::default(), InitialPosition::default())
            .unwrap();

        host_a.step(16.0);
        assert!(a.current_value() > 0.0);
        assert_eq!(b.current_value(), 0.0);
        assert_eq!(host_b.pending_frames(), 1);
    }
}
