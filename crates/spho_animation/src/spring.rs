//! Spring physics animation
//!
//! A [`Spring`] animates one value from `from_value` toward `to_value`. It is
//! a cheap, clonable handle; every clone controls the same oscillator. Springs
//! register with their [`Scheduler`] while moving and drop out once they
//! settle.
//!
//! Listeners are never called while the spring is borrowed, so a listener may
//! call back into this or any other spring.

use crate::config::{InitialPosition, SpringConfig};
use crate::error::Result;
use crate::integrator::{self, Coefficients, OscillatorState};
use crate::listener::{ListenerId, ListenerKind, SpringListeners};
use crate::scheduler::{Scheduler, SpringId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Lifecycle of a spring
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpringPhase {
    /// Registered with the scheduler and advanced every frame
    Moving,
    /// Settled on its target; listeners are kept
    Resting,
    /// Ended for good
    Ended,
}

/// Who owns a spring's target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpringRole {
    Standalone,
    /// Target follows a parent spring; `set_to_value` is ignored
    LinkedChild,
}

/// Transform applied to values delivered to listeners
pub type ValueMapper = Rc<dyn Fn(f64) -> f64>;

struct SpringState {
    config: SpringConfig,
    coefficients: Coefficients,
    oscillator: OscillatorState,
    phase: SpringPhase,
    last_update_time: f64,
    /// Set once a frame in the current segment was not at rest
    has_moved: bool,
    rest_blockers: usize,
    /// Bumped whenever the origin is moved from outside `advance`
    segment: u64,
    value_mapper: Option<ValueMapper>,
}

pub(crate) struct SpringInner {
    id: SpringId,
    role: SpringRole,
    scheduler: Scheduler,
    state: RefCell<SpringState>,
    listeners: RefCell<SpringListeners>,
}

impl Drop for SpringInner {
    fn drop(&mut self) {
        self.scheduler.forget(self.id);
    }
}

/// A spring-based animator
#[derive(Clone)]
pub struct Spring {
    inner: Rc<SpringInner>,
}

impl Spring {
    /// Create a spring and register it with `scheduler`.
    ///
    /// Fails without creating anything if `config` does not validate.
    pub fn new(
        scheduler: &Scheduler,
        config: SpringConfig,
        position: InitialPosition,
    ) -> Result<Self> {
        config.validate()?;
        let oscillator = OscillatorState::new(position.from_value, position.to_value);
        Ok(Self::from_parts(
            scheduler,
            config,
            oscillator,
            SpringRole::Standalone,
        ))
    }

    /// Build from an already validated configuration
    pub(crate) fn from_parts(
        scheduler: &Scheduler,
        config: SpringConfig,
        oscillator: OscillatorState,
        role: SpringRole,
    ) -> Self {
        let now = scheduler.now();
        let inner = Rc::new_cyclic(|weak| SpringInner {
            id: scheduler.allocate_id(weak.clone()),
            role,
            scheduler: scheduler.clone(),
            state: RefCell::new(SpringState {
                coefficients: Coefficients::from_config(&config),
                config,
                oscillator,
                phase: SpringPhase::Moving,
                last_update_time: now,
                has_moved: false,
                rest_blockers: 0,
                segment: 0,
                value_mapper: None,
            }),
            listeners: RefCell::new(SpringListeners::default()),
        });

        let spring = Self { inner };
        debug!(
            spring = ?spring.id(),
            from = oscillator.from_value,
            to = oscillator.to_value,
            ?role,
            "spring created"
        );
        scheduler.register(&spring);
        spring
    }

    pub(crate) fn upgrade(weak: &Weak<SpringInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn id(&self) -> SpringId {
        self.inner.id
    }

    pub fn role(&self) -> SpringRole {
        self.inner.role
    }

    pub fn is_linked(&self) -> bool {
        self.inner.role == SpringRole::LinkedChild
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> SpringConfig {
        self.inner.state.borrow().config
    }

    pub fn phase(&self) -> SpringPhase {
        self.inner.state.borrow().phase
    }

    pub fn current_value(&self) -> f64 {
        self.inner.state.borrow().oscillator.current_value
    }

    pub fn from_value(&self) -> f64 {
        self.inner.state.borrow().oscillator.from_value
    }

    pub fn to_value(&self) -> f64 {
        self.inner.state.borrow().oscillator.to_value
    }

    /// Velocity in value units per millisecond
    pub fn velocity(&self) -> f64 {
        self.inner.state.borrow().oscillator.velocity
    }

    /// Snapshot of the kinematic state
    pub fn oscillator(&self) -> OscillatorState {
        self.inner.state.borrow().oscillator
    }

    pub fn is_at_rest(&self) -> bool {
        self.phase() == SpringPhase::Resting
    }

    pub fn is_ended(&self) -> bool {
        self.phase() == SpringPhase::Ended
    }

    pub fn is_blocked_from_resting(&self) -> bool {
        self.inner.state.borrow().rest_blockers > 0
    }

    pub(crate) fn last_update_time(&self) -> f64 {
        self.inner.state.borrow().last_update_time
    }

    /// Teleport to `value`, keeping the current velocity
    pub fn set_current_value(&self, value: f64) {
        self.reorigin(false, |state| state.oscillator.current_value = value);
    }

    /// Restart the motion from `value`, keeping the current velocity
    pub fn set_from_value(&self, value: f64) {
        self.reorigin(true, |state| state.oscillator.current_value = value);
    }

    /// Retarget the spring. Ignored (with a warning) on a linked spring,
    /// whose target belongs to its parent.
    pub fn set_to_value(&self, value: f64) {
        if self.inner.role == SpringRole::LinkedChild {
            warn!(
                spring = ?self.id(),
                value,
                "set_to_value on a linked spring has no effect, its target follows the parent"
            );
            return;
        }
        self.follow(value);
    }

    /// Retarget without the role check; used by the spring link
    pub(crate) fn follow(&self, value: f64) {
        self.reorigin(true, |state| state.oscillator.to_value = value);
    }

    /// Set the velocity in value units per millisecond
    pub fn set_velocity(&self, velocity: f64) {
        self.reorigin(true, |state| state.oscillator.velocity = velocity);
    }

    /// Swap in a new configuration, continuing from the current position and
    /// velocity
    pub fn set_config(&self, config: SpringConfig) -> Result<()> {
        config.validate()?;
        self.reorigin(true, |state| {
            state.config = config;
            state.coefficients = Coefficients::from_config(&config);
        });
        Ok(())
    }

    pub fn set_bounciness(&self, bounciness: f64) -> Result<()> {
        self.set_config(self.config().with_bounciness(bounciness))
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.set_config(self.config().with_speed(speed))
    }

    /// Transform values delivered to listeners; internal state is untouched
    pub fn set_value_mapper<F>(&self, mapper: F)
    where
        F: Fn(f64) -> f64 + 'static,
    {
        self.inner.state.borrow_mut().value_mapper = Some(Rc::new(mapper));
    }

    pub fn unset_value_mapper(&self) {
        self.inner.state.borrow_mut().value_mapper = None;
    }

    /// Called with the (mapped) value on every frame
    pub fn on_update<F>(&self, listener: F) -> Subscription
    where
        F: Fn(f64) + 'static,
    {
        if self.is_ended() {
            return self.inert_subscription();
        }
        let id = self
            .inner
            .listeners
            .borrow_mut()
            .update
            .add(Rc::new(listener));
        self.subscription(ListenerKind::Update, id)
    }

    /// Called with the (mapped) value each time the spring settles
    pub fn on_at_rest<F>(&self, listener: F) -> Subscription
    where
        F: Fn(f64) + 'static,
    {
        if self.is_ended() {
            return self.inert_subscription();
        }
        let id = self
            .inner
            .listeners
            .borrow_mut()
            .at_rest
            .add(Rc::new(listener));
        self.subscription(ListenerKind::AtRest, id)
    }

    /// Called once when the spring ends
    pub fn on_end<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        if self.is_ended() {
            return self.inert_subscription();
        }
        let id = self.inner.listeners.borrow_mut().end.add(Rc::new(listener));
        self.subscription(ListenerKind::End, id)
    }

    /// Keep the spring moving until the returned subscription is released
    pub fn block_from_resting(&self) -> Subscription {
        if self.is_ended() {
            return self.inert_subscription();
        }
        {
            let now = self.inner.scheduler.now();
            let mut state = self.inner.state.borrow_mut();
            state.rest_blockers += 1;
            if state.phase == SpringPhase::Resting {
                state.phase = SpringPhase::Moving;
                state.last_update_time = now;
            }
        }
        self.inner.scheduler.register(self);
        Subscription {
            spring: Rc::downgrade(&self.inner),
            target: SubscriptionTarget::RestBlock,
        }
    }

    fn release_rest_block(&self) {
        let moving = {
            let mut state = self.inner.state.borrow_mut();
            state.rest_blockers = state.rest_blockers.saturating_sub(1);
            state.rest_blockers == 0 && state.phase == SpringPhase::Moving
        };
        if moving {
            self.inner.scheduler.register(self);
        }
    }

    /// Copy configuration and kinematic state into a new, independently
    /// scheduled spring. Listeners and the value mapper are not copied.
    pub fn duplicate(&self) -> Spring {
        let (config, oscillator) = {
            let state = self.inner.state.borrow();
            (state.config, state.oscillator)
        };
        Spring::from_parts(
            &self.inner.scheduler,
            config,
            oscillator,
            SpringRole::Standalone,
        )
    }

    /// Advance the simulation by `delta_ms`.
    ///
    /// Applies pending listener changes, integrates, notifies update
    /// listeners, and on settling notifies at-rest listeners. Returns whether
    /// the spring is settled; an ended spring always reports settled.
    pub fn advance(&self, delta_ms: f64, now_ms: f64) -> bool {
        if self.is_ended() {
            return true;
        }
        self.inner.listeners.borrow_mut().flush();
        if delta_ms == 0.0 {
            return false;
        }

        let (raw, mapper, settled, notify_rest, segment) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            state.last_update_time = now_ms;
            integrator::step(
                &mut state.oscillator,
                &state.coefficients,
                &state.config,
                delta_ms,
            );

            let at_rest = state.oscillator.is_at_rest(&state.config);
            if !at_rest {
                state.has_moved = true;
            }
            let settled = at_rest && state.rest_blockers == 0;
            (
                state.oscillator.current_value,
                state.value_mapper.clone(),
                settled,
                settled && state.has_moved,
                state.segment,
            )
        };
        let value = mapper.map_or(raw, |map| map(raw));

        let update_listeners = self.inner.listeners.borrow().update.snapshot();
        for listener in update_listeners {
            // Ending clears the sets; the rest of the snapshot is stale.
            if self.is_ended() {
                break;
            }
            listener(value);
        }

        if !settled {
            return false;
        }

        // An update listener may have retargeted or ended the spring.
        let still_current = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase == SpringPhase::Ended || state.segment != segment {
                false
            } else {
                state.oscillator.reset(0.0);
                state.has_moved = false;
                state.phase = SpringPhase::Resting;
                true
            }
        };
        if !still_current {
            return self.is_ended();
        }

        if notify_rest {
            debug!(spring = ?self.id(), value, "spring at rest");
            let at_rest_listeners = self.inner.listeners.borrow().at_rest.snapshot();
            for listener in at_rest_listeners {
                if self.is_ended() {
                    break;
                }
                listener(value);
            }
        }

        true
    }

    /// Stop the spring for good: clears listeners, fires end listeners once,
    /// and leaves the scheduler. Ending twice is a no-op.
    pub fn end(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.phase == SpringPhase::Ended {
                return;
            }
            state.phase = SpringPhase::Ended;
            state.rest_blockers = 0;
        }

        let mut retired = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        retired.flush();
        let end_listeners = retired.end.snapshot();
        drop(retired);
        self.inner.state.borrow_mut().value_mapper = None;

        debug!(spring = ?self.id(), "spring ended");
        for listener in end_listeners {
            listener();
        }

        self.inner.scheduler.deregister(self);
        self.inner.scheduler.forget(self.id());
    }

    /// Catch up if moving, apply `update`, and start a new segment from the
    /// resulting position and velocity
    fn reorigin<F>(&self, catch_up: bool, update: F)
    where
        F: FnOnce(&mut SpringState),
    {
        if self.is_ended() {
            return;
        }

        let now = self.inner.scheduler.now();
        let (moving, last_update) = {
            let state = self.inner.state.borrow();
            (state.phase == SpringPhase::Moving, state.last_update_time)
        };
        if catch_up && moving {
            self.advance(now - last_update, now);
        }

        {
            let mut state = self.inner.state.borrow_mut();
            // Catching up runs listeners, which may end the spring.
            if state.phase == SpringPhase::Ended {
                return;
            }
            if state.phase == SpringPhase::Resting {
                state.last_update_time = now;
            }
            update(&mut state);
            let velocity = state.oscillator.velocity;
            state.oscillator.reset(velocity);
            state.has_moved = false;
            state.segment += 1;
            state.phase = SpringPhase::Moving;
        }

        trace!(spring = ?self.id(), to = self.to_value(), "spring retargeted");
        self.inner.scheduler.register(self);
    }

    fn subscription(&self, kind: ListenerKind, id: ListenerId) -> Subscription {
        Subscription {
            spring: Rc::downgrade(&self.inner),
            target: SubscriptionTarget::Listener(kind, id),
        }
    }

    fn inert_subscription(&self) -> Subscription {
        Subscription {
            spring: Rc::downgrade(&self.inner),
            target: SubscriptionTarget::Inert,
        }
    }
}

impl fmt::Debug for Spring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Spring")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("phase", &state.phase)
            .field("current_value", &state.oscillator.current_value)
            .field("to_value", &state.oscillator.to_value)
            .field("velocity", &state.oscillator.velocity)
            .finish()
    }
}

enum SubscriptionTarget {
    Listener(ListenerKind, ListenerId),
    RestBlock,
    Inert,
}

/// Handle returned by listener registration and
/// [`Spring::block_from_resting`].
///
/// Dropping it keeps the registration; call
/// [`unsubscribe`](Self::unsubscribe) to undo it.
#[must_use = "dropping a Subscription keeps the listener or rest block in place forever"]
pub struct Subscription {
    spring: Weak<SpringInner>,
    target: SubscriptionTarget,
}

impl Subscription {
    /// Remove the listener (from the next advance on) or release the rest
    /// block
    pub fn unsubscribe(self) {
        let Some(spring) = Spring::upgrade(&self.spring) else {
            return;
        };
        match self.target {
            SubscriptionTarget::Listener(kind, id) => {
                spring.inner.listeners.borrow_mut().remove(kind, id);
            }
            SubscriptionTarget::RestBlock => {
                if !spring.is_ended() {
                    spring.release_rest_block();
                }
            }
            SubscriptionTarget::Inert => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Integrator;
    use crate::error::ConfigError;
    use crate::host::VirtualFrameHost;
    use std::cell::Cell;

    fn setup() -> (Rc<VirtualFrameHost>, Scheduler) {
        let host = VirtualFrameHost::new();
        let scheduler = Scheduler::with_host(host.clone());
        (host, scheduler)
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    fn spring(scheduler: &Scheduler) -> Spring {
        Spring::new(scheduler, SpringConfig::default(), InitialPosition::new(0.0, 1.0)).unwrap()
    }

    fn run_until_rest(host: &VirtualFrameHost, spring: &Spring) {
        for _ in 0..1000 {
            if spring.is_at_rest() {
                return;
            }
            host.step(16.0);
        }
        panic!("spring never settled: {:?}", spring);
    }

    #[test]
    fn test_negative_damping_fails_construction() {
        let (host, scheduler) = setup();
        let result = Spring::new(
            &scheduler,
            SpringConfig::new(100.0, -10.0, 1.0),
            InitialPosition::default(),
        );
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Negative {
                field: "damping",
                value: -10.0
            }
        );
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.spring_count(), 0);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_equal_from_and_to_rests_on_first_advance() {
        let (_host, scheduler) = setup();
        let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::at(3.0))
            .unwrap();
        let rests = counter();
        let rests_clone = rests.clone();
        let _ = spring.on_at_rest(move |_| rests_clone.set(rests_clone.get() + 1));

        assert!(spring.advance(16.0, 16.0));
        assert_eq!(spring.current_value(), 3.0);
        assert_eq!(spring.velocity(), 0.0);
        assert!(spring.is_at_rest());
        // It never moved, so there is no settle to report.
        assert_eq!(rests.get(), 0);
    }

    #[test]
    fn test_single_frame_scenario() {
        let (_host, scheduler) = setup();
        let spring = spring(&scheduler);

        let settled = spring.advance(16.0, 16.0);
        assert!(!settled);
        assert!(spring.current_value() > 0.0 && spring.current_value() < 1.0);
        assert!(!spring.is_at_rest());
    }

    #[test]
    fn test_zero_delta_is_a_noop() {
        let (_host, scheduler) = setup();
        let spring = spring(&scheduler);
        let updates = counter();
        let updates_clone = updates.clone();
        let _ = spring.on_update(move |_| updates_clone.set(updates_clone.get() + 1));

        assert!(!spring.advance(0.0, 0.0));
        assert_eq!(spring.current_value(), 0.0);
        assert_eq!(updates.get(), 0);
    }

    #[test]
    fn test_settles_once_and_leaves_scheduler() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let rests = Rc::new(RefCell::new(Vec::new()));
        let rests_clone = rests.clone();
        let _ = spring.on_at_rest(move |value| rests_clone.borrow_mut().push(value));

        run_until_rest(&host, &spring);

        assert_eq!(rests.borrow().len(), 1);
        assert!((rests.borrow()[0] - 1.0).abs() <= 0.001);
        assert!((spring.current_value() - 1.0).abs() <= 0.001);
        assert!(spring.velocity().abs() <= 0.001);
        assert!(!scheduler.is_registered(&spring));
        assert_eq!(host.pending_frames(), 0);

        // No frames are processed until the spring is retargeted.
        let frames = scheduler.frames_processed();
        assert_eq!(host.step(16.0), 0);
        assert_eq!(scheduler.frames_processed(), frames);
        assert_eq!(rests.borrow().len(), 1);
    }

    #[test]
    fn test_clamped_trajectory_approaches_monotonically() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let mut distance = (spring.current_value() - 1.0).abs();

        while !spring.is_at_rest() {
            host.step(16.0);
            let next = (spring.current_value() - 1.0).abs();
            assert!(spring.current_value() <= 1.0);
            assert!(next <= distance);
            distance = next;
        }
    }

    #[test]
    fn test_end_fires_once() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let ends = counter();
        let ends_clone = ends.clone();
        let _ = spring.on_end(move || ends_clone.set(ends_clone.get() + 1));

        spring.end();
        spring.end();

        assert_eq!(ends.get(), 1);
        assert!(spring.is_ended());
        assert!(!scheduler.is_registered(&spring));
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_ended_spring_ignores_everything() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let updates = counter();
        let updates_clone = updates.clone();
        let _ = spring.on_update(move |_| updates_clone.set(updates_clone.get() + 1));
        spring.end();

        spring.set_to_value(5.0);
        spring.set_current_value(2.0);
        assert!(spring.advance(16.0, 16.0));
        assert_eq!(spring.current_value(), 0.0);
        assert_eq!(spring.to_value(), 1.0);
        assert_eq!(updates.get(), 0);
        assert!(!scheduler.is_registered(&spring));
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_repeated_retarget_settles_once() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let rests = counter();
        let rests_clone = rests.clone();
        let _ = spring.on_at_rest(move |_| rests_clone.set(rests_clone.get() + 1));

        for _ in 0..5 {
            host.step(16.0);
        }
        spring.set_to_value(2.0);
        spring.set_to_value(2.0);
        assert_eq!(scheduler.active_count(), 1);

        run_until_rest(&host, &spring);
        assert_eq!(rests.get(), 1);
        assert!((spring.current_value() - 2.0).abs() <= 0.001);
    }

    #[test]
    fn test_listener_added_during_update_waits_for_next_pass() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let inner_calls = counter();
        let added = Rc::new(Cell::new(false));

        let handle = spring.clone();
        let inner_clone = inner_calls.clone();
        let _ = spring.on_update(move |_| {
            if !added.get() {
                added.set(true);
                let calls = inner_clone.clone();
                let _ = handle.on_update(move |_| calls.set(calls.get() + 1));
            }
        });

        host.step(16.0);
        assert_eq!(inner_calls.get(), 0);

        host.step(16.0);
        assert_eq!(inner_calls.get(), 1);
    }

    #[test]
    fn test_unsubscribe_takes_effect_next_advance() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let updates = counter();
        let updates_clone = updates.clone();
        let subscription = spring.on_update(move |_| updates_clone.set(updates_clone.get() + 1));

        host.step(16.0);
        assert_eq!(updates.get(), 1);

        subscription.unsubscribe();
        host.step(16.0);
        assert_eq!(updates.get(), 1);
    }

    #[test]
    fn test_retarget_inherits_velocity() {
        let (host, scheduler) = setup();
        let spring = Spring::new(
            &scheduler,
            SpringConfig::wobbly(),
            InitialPosition::new(0.0, 100.0),
        )
        .unwrap();

        for _ in 0..10 {
            host.step(16.0);
        }
        let velocity = spring.velocity();
        assert!(velocity > 0.0);

        spring.set_to_value(50.0);
        assert_eq!(spring.velocity(), velocity);
        assert_eq!(spring.oscillator().initial_velocity, velocity);
        assert_eq!(spring.oscillator().simulation_time, 0.0);
        assert_eq!(spring.from_value(), spring.current_value());
    }

    #[test]
    fn test_retarget_catches_up_to_now() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        host.step(16.0);
        let value = spring.current_value();

        // Half a frame passes before the retarget.
        host.advance_time(8.0);
        spring.set_to_value(2.0);
        assert!(spring.current_value() > value);

        // The next frame only covers the remaining 8ms.
        let before = spring.oscillator();
        host.step(8.0);
        assert!((spring.oscillator().simulation_time - 8.0).abs() < 1e-9);
        assert!(spring.current_value() > before.current_value);
    }

    #[test]
    fn test_set_current_value_wakes_resting_spring() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        run_until_rest(&host, &spring);

        spring.set_current_value(-1.0);
        assert_eq!(spring.current_value(), -1.0);
        assert!(scheduler.is_registered(&spring));
        assert_eq!(spring.phase(), SpringPhase::Moving);

        host.step(16.0);
        assert!(spring.current_value() > -1.0);
        run_until_rest(&host, &spring);
        assert!((spring.current_value() - 1.0).abs() <= 0.001);
    }

    #[test]
    fn test_set_from_value_restarts_motion() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        run_until_rest(&host, &spring);

        spring.set_from_value(10.0);
        assert_eq!(spring.from_value(), 10.0);
        host.step(16.0);
        assert!(spring.current_value() < 10.0);
        assert!(spring.current_value() >= 1.0);
    }

    #[test]
    fn test_set_velocity_kicks_spring() {
        let (host, scheduler) = setup();
        let spring = Spring::new(
            &scheduler,
            SpringConfig::default().with_overshooting(true),
            InitialPosition::at(0.0),
        )
        .unwrap();
        run_until_rest(&host, &spring);

        spring.set_velocity(0.5);
        assert_eq!(spring.velocity(), 0.5);
        host.step(16.0);
        assert!(spring.current_value() > 0.0);
    }

    #[test]
    fn test_value_mapper_only_affects_listeners() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let seen = Rc::new(Cell::new(0.0));
        let seen_clone = seen.clone();
        let _ = spring.on_update(move |value| seen_clone.set(value));
        spring.set_value_mapper(|value| value * 100.0);

        host.step(16.0);
        let raw = spring.current_value();
        assert!((seen.get() - raw * 100.0).abs() < 1e-9);

        spring.unset_value_mapper();
        host.step(16.0);
        assert_eq!(seen.get(), spring.current_value());
    }

    #[test]
    fn test_block_from_resting() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let rests = counter();
        let rests_clone = rests.clone();
        let _ = spring.on_at_rest(move |_| rests_clone.set(rests_clone.get() + 1));

        let block = spring.block_from_resting();
        for _ in 0..300 {
            host.step(16.0);
        }
        assert!(!spring.is_at_rest());
        assert!(scheduler.is_registered(&spring));
        assert_eq!(rests.get(), 0);

        block.unsubscribe();
        host.step(16.0);
        assert!(spring.is_at_rest());
        assert_eq!(rests.get(), 1);
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_block_wakes_resting_spring() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        run_until_rest(&host, &spring);

        let block = spring.block_from_resting();
        assert!(scheduler.is_registered(&spring));
        host.step(16.0);
        assert!(scheduler.is_registered(&spring));

        block.unsubscribe();
        host.step(16.0);
        assert!(!scheduler.is_registered(&spring));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let (host, scheduler) = setup();
        let source = spring(&scheduler);
        for _ in 0..3 {
            host.step(16.0);
        }

        let copy = source.duplicate();
        assert_ne!(copy.id(), source.id());
        assert_eq!(copy.current_value(), source.current_value());
        assert_eq!(copy.oscillator(), source.oscillator());
        assert_eq!(copy.config(), source.config());

        source.end();
        host.step(16.0);
        assert!(scheduler.is_registered(&copy));
        assert!(copy.current_value() > source.current_value());
    }

    #[test]
    fn test_set_config_validates_and_recomputes() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        host.step(16.0);

        assert!(spring.set_config(SpringConfig::new(-1.0, 1.0, 1.0)).is_err());
        assert_eq!(spring.config(), SpringConfig::default());

        spring.set_bounciness(0.2).unwrap();
        spring.set_speed(2.0).unwrap();
        assert_eq!(
            spring.config().parameters,
            crate::config::SpringParameters::Bouncy {
                bounciness: 0.2,
                speed: 2.0
            }
        );
        assert!(spring.set_bounciness(2.0).is_err());

        run_until_rest(&host, &spring);
        assert!((spring.current_value() - 1.0).abs() <= 0.001);
    }

    #[test]
    fn test_rk4_spring_through_scheduler() {
        let (host, scheduler) = setup();
        let spring = Spring::new(
            &scheduler,
            SpringConfig::bouncy(0.3, 1.5).with_integrator(Integrator::Rk4),
            InitialPosition::new(0.0, 50.0),
        )
        .unwrap();
        let rests = counter();
        let rests_clone = rests.clone();
        let _ = spring.on_at_rest(move |_| rests_clone.set(rests_clone.get() + 1));

        run_until_rest(&host, &spring);
        assert_eq!(rests.get(), 1);
        assert!((spring.current_value() - 50.0).abs() <= 0.001);
    }

    #[test]
    fn test_at_rest_listener_can_chain_a_new_target() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let handle = spring.clone();
        let chained = Rc::new(Cell::new(false));
        let chained_clone = chained.clone();
        let _ = spring.on_at_rest(move |_| {
            if !chained_clone.get() {
                chained_clone.set(true);
                handle.set_to_value(0.0);
            }
        });

        for _ in 0..1000 {
            if chained.get() {
                break;
            }
            host.step(16.0);
        }
        assert!(chained.get());
        assert_eq!(spring.phase(), SpringPhase::Moving);
        assert!(scheduler.is_registered(&spring));
        assert_eq!(spring.to_value(), 0.0);

        run_until_rest(&host, &spring);
        assert!(spring.current_value().abs() <= 0.001);
    }

    #[test]
    fn test_update_listener_ending_spring() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let handle = spring.clone();
        let _ = spring.on_update(move |_| handle.end());

        host.step(16.0);
        assert!(spring.is_ended());
        assert!(!scheduler.is_registered(&spring));
        assert_eq!(host.pending_frames(), 0);
    }

    #[test]
    fn test_end_inside_update_stops_remaining_listeners() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let log = Rc::new(RefCell::new(Vec::new()));

        let handle = spring.clone();
        let _ = spring.on_update(move |_| handle.end());
        let log_clone = log.clone();
        let _ = spring.on_update(move |_| log_clone.borrow_mut().push("update"));
        let log_clone = log.clone();
        let _ = spring.on_end(move || log_clone.borrow_mut().push("end"));

        host.step(16.0);
        assert_eq!(*log.borrow(), vec!["end"]);
    }

    #[test]
    fn test_end_inside_at_rest_stops_remaining_listeners() {
        let (host, scheduler) = setup();
        let spring = spring(&scheduler);
        let later = counter();

        let handle = spring.clone();
        let _ = spring.on_at_rest(move |_| handle.end());
        let later_clone = later.clone();
        let _ = spring.on_at_rest(move |_| later_clone.set(later_clone.get() + 1));

        run_until_ended(&host, &spring);
        assert_eq!(later.get(), 0);
        assert_eq!(host.pending_frames(), 0);
    }

    fn run_until_ended(host: &VirtualFrameHost, spring: &Spring) {
        for _ in 0..1000 {
            if spring.is_ended() {
                return;
            }
            host.step(16.0);
        }
        panic!("spring never ended: {:?}", spring);
    }

    #[test]
    fn test_rk4_without_stiffness_never_reports_nan() {
        for damping in [0.0, 5.0] {
            let (host, scheduler) = setup();
            let spring = Spring::new(
                &scheduler,
                SpringConfig::new(0.0, damping, 1.0).with_integrator(Integrator::Rk4),
                InitialPosition::new(0.0, 1.0),
            )
            .unwrap();
            let seen = Rc::new(Cell::new(f64::NAN));
            let seen_clone = seen.clone();
            let _ = spring.on_update(move |value| seen_clone.set(value));

            host.step(16.0);
            host.step(16.0);
            assert!(seen.get().is_finite());
            assert!(spring.current_value().is_finite());
            assert!(spring.velocity().is_finite());
        }
    }
}
