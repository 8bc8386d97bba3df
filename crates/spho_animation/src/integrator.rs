//! Damped harmonic oscillator integration
//!
//! Two interchangeable strategies advance an [`OscillatorState`]:
//!
//! - **Analytic**: the closed-form solution for under- and critically damped
//!   motion, evaluated at `simulation_time` from the segment origin. Velocity
//!   is the finite difference of consecutive positions.
//! - **RK4**: a fourth-order Runge-Kutta step of the normalized equation
//!   `y'' = -y - tightness * y'` in units of `slowness`, taken from the
//!   current displacement and velocity every tick.
//!
//! All times are milliseconds; velocities are value units per millisecond.

use crate::config::{Integrator, SpringConfig};

/// Coefficients derived from a [`SpringConfig`], cached per parameter set
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    /// Damping ratio clamped to 1.0 (the closed form has no overdamped branch)
    pub zeta: f64,
    /// Undamped angular frequency (rad/ms)
    pub omega0: f64,
    /// Damped angular frequency (rad/ms), zero unless `zeta < 1`
    pub omega1: f64,
    /// RK4 damping term, `2 * zeta` without the clamp
    pub tightness: f64,
    /// RK4 time unit in milliseconds, `1 / omega0`; infinite without stiffness
    pub slowness: f64,
    /// Velocity decay rate per millisecond, `c / m`
    pub drag: f64,
}

impl Coefficients {
    pub fn from_config(config: &SpringConfig) -> Self {
        let raw_zeta = config.damping_ratio();
        let omega0 = config.natural_frequency();

        let zeta = raw_zeta.min(1.0);
        let omega1 = if zeta < 1.0 {
            omega0 * (1.0 - zeta * zeta).sqrt()
        } else {
            0.0
        };
        let slowness = if omega0 > 0.0 {
            1.0 / omega0
        } else {
            f64::INFINITY
        };

        Self {
            zeta,
            omega0,
            omega1,
            tightness: 2.0 * raw_zeta,
            slowness,
            drag: config.damping_rate(),
        }
    }
}

/// Kinematic state of one oscillator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OscillatorState {
    pub from_value: f64,
    pub to_value: f64,
    pub current_value: f64,
    pub velocity: f64,
    pub initial_velocity: f64,
    pub initial_displacement: f64,
    pub simulation_time: f64,
}

impl OscillatorState {
    pub fn new(from_value: f64, to_value: f64) -> Self {
        Self {
            from_value,
            to_value,
            current_value: from_value,
            velocity: 0.0,
            initial_velocity: 0.0,
            initial_displacement: to_value - from_value,
            simulation_time: 0.0,
        }
    }

    /// Move the segment origin to the current position.
    ///
    /// `velocity` becomes both the current and the initial velocity of the
    /// new segment.
    pub fn reset(&mut self, velocity: f64) {
        self.simulation_time = 0.0;
        self.from_value = self.current_value;
        self.initial_displacement = self.to_value - self.from_value;
        self.velocity = velocity;
        self.initial_velocity = velocity;
    }

    pub fn displacement(&self) -> f64 {
        self.current_value - self.to_value
    }

    /// Both rest thresholds are satisfied
    pub fn is_at_rest(&self, config: &SpringConfig) -> bool {
        self.displacement().abs() <= config.rest_displacement_threshold
            && self.velocity.abs() <= config.rest_velocity_threshold
    }

    /// The value crossed `to_value` relative to the side it started from
    fn has_crossed_target(&self) -> bool {
        (self.from_value > self.to_value && self.current_value < self.to_value)
            || (self.from_value < self.to_value && self.current_value > self.to_value)
    }
}

/// Advance `state` by `delta_ms` with the integrator selected in `config`.
pub fn step(
    state: &mut OscillatorState,
    coefficients: &Coefficients,
    config: &SpringConfig,
    delta_ms: f64,
) {
    match config.integrator {
        Integrator::Analytic => step_analytic(state, coefficients, config, delta_ms),
        Integrator::Rk4 => step_rk4(state, coefficients, config, delta_ms),
    }
}

fn step_analytic(
    state: &mut OscillatorState,
    coefficients: &Coefficients,
    config: &SpringConfig,
    delta_ms: f64,
) {
    let previous = state.current_value;
    state.simulation_time += delta_ms;
    state.current_value = analytic_position(state, coefficients, state.simulation_time);

    if !config.allow_overshooting && state.has_crossed_target() {
        state.current_value = state.to_value;
    }

    state.velocity = (state.current_value - previous) / delta_ms;
}

fn step_rk4(
    state: &mut OscillatorState,
    coefficients: &Coefficients,
    config: &SpringConfig,
    delta_ms: f64,
) {
    let dt = delta_ms.min(config.max_step_ms);
    state.simulation_time += dt;

    if coefficients.slowness.is_finite() {
        // Normalized state: y = to - x, w = dy/dτ with τ = t / slowness.
        let slowness = coefficients.slowness;
        let displacement = state.to_value - state.current_value;
        let normalized_velocity = -state.velocity * slowness;
        let h = dt / slowness;

        let (displacement, normalized_velocity) =
            rk4((displacement, normalized_velocity), h, |(y, w)| {
                (w, -y - coefficients.tightness * w)
            });

        state.current_value = state.to_value - displacement;
        state.velocity = -normalized_velocity / slowness;
    } else {
        coast(state, coefficients.drag, dt);
    }

    if !config.allow_overshooting && state.has_crossed_target() {
        state.current_value = state.to_value;
        state.velocity = 0.0;
    }
}

/// Without stiffness only damping acts: `v' = -drag * v`, solved exactly.
fn coast(state: &mut OscillatorState, drag: f64, dt: f64) {
    if drag > 0.0 {
        let decay = (-drag * dt).exp();
        state.current_value += state.velocity * (1.0 - decay) / drag;
        state.velocity *= decay;
    } else {
        state.current_value += state.velocity * dt;
    }
}

/// Closed-form position at time `t` since the segment origin.
///
/// `coefficients.zeta` must already be clamped to at most 1.0.
pub fn analytic_position(state: &OscillatorState, coefficients: &Coefficients, t: f64) -> f64 {
    let Coefficients {
        zeta,
        omega0,
        omega1,
        ..
    } = *coefficients;
    let x0 = state.initial_displacement;
    let negative_v0 = -state.initial_velocity;

    if zeta < 1.0 {
        let envelope = (-zeta * omega0 * t).exp();
        let sine = (negative_v0 + zeta * omega0 * x0) / omega1 * (omega1 * t).sin();
        state.to_value - envelope * (sine + x0 * (omega1 * t).cos())
    } else {
        let envelope = (-omega0 * t).exp();
        state.to_value - envelope * (x0 + (negative_v0 + omega0 * x0) * t)
    }
}

/// One classic fourth-order Runge-Kutta step of size `h`.
pub fn rk4<F>(state: (f64, f64), h: f64, derivative: F) -> (f64, f64)
where
    F: Fn((f64, f64)) -> (f64, f64),
{
    let (x, v) = state;

    let (k1_x, k1_v) = derivative((x, v));
    let (k2_x, k2_v) = derivative((x + k1_x * h * 0.5, v + k1_v * h * 0.5));
    let (k3_x, k3_v) = derivative((x + k2_x * h * 0.5, v + k2_v * h * 0.5));
    let (k4_x, k4_v) = derivative((x + k3_x * h, v + k3_v * h));

    (
        x + (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x) * h / 6.0,
        v + (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v) * h / 6.0,
    )
}
