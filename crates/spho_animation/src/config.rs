//! Spring configuration
//!
//! A spring is described either by physical coefficients (stiffness, damping,
//! mass) or by the friendlier bounciness/speed pair. Both forms reduce to the
//! same damping ratio and natural frequency, see
//! [`Coefficients`](crate::integrator::Coefficients).

use crate::error::{ConfigError, Result};

/// Default rest threshold for both displacement and velocity
pub const DEFAULT_REST_THRESHOLD: f64 = 0.001;

/// Default RK4 step cap: one frame at 30fps
pub const DEFAULT_MAX_STEP_MS: f64 = 1000.0 / 30.0;

/// Period, in milliseconds, of a bouncy spring running at speed 1.0
pub const BOUNCY_BASE_SLOWNESS_MS: f64 = 100.0;

/// Physical description of the oscillator
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpringParameters {
    /// Mass-spring-damper coefficients
    Physical {
        stiffness: f64,
        damping: f64,
        mass: f64,
    },
    /// `bounciness` in `0.0..=1.0` (0 never overshoots), `speed` > 0
    Bouncy { bounciness: f64, speed: f64 },
}

impl Default for SpringParameters {
    fn default() -> Self {
        SpringParameters::Physical {
            stiffness: 100.0,
            damping: 10.0,
            mass: 1.0,
        }
    }
}

/// Integration strategy used by a spring
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Integrator {
    /// Closed-form solution evaluated from the segment origin
    #[default]
    Analytic,
    /// Fourth-order Runge-Kutta stepping from the current state
    Rk4,
}

/// Configuration for a spring animation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringConfig {
    pub parameters: SpringParameters,
    /// When false the value snaps to the target instead of crossing it
    pub allow_overshooting: bool,
    pub rest_velocity_threshold: f64,
    pub rest_displacement_threshold: f64,
    pub integrator: Integrator,
    /// Largest time step the RK4 integrator will take in one advance
    pub max_step_ms: f64,
}

impl SpringConfig {
    /// Create a physical spring configuration
    pub fn new(stiffness: f64, damping: f64, mass: f64) -> Self {
        Self {
            parameters: SpringParameters::Physical {
                stiffness,
                damping,
                mass,
            },
            ..Self::default()
        }
    }

    /// Create a configuration from bounciness and speed
    pub fn bouncy(bounciness: f64, speed: f64) -> Self {
        Self {
            parameters: SpringParameters::Bouncy { bounciness, speed },
            ..Self::default()
        }
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0).with_overshooting(true)
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self::new(400.0, 30.0, 1.0)
    }

    /// A very stiff spring with minimal oscillation (good for quick responses)
    pub fn snappy() -> Self {
        Self::new(600.0, 40.0, 1.0)
    }

    /// A slow spring with no overshoot (critically damped)
    pub fn molasses() -> Self {
        Self::new(100.0, 20.0, 1.0)
    }

    pub fn with_overshooting(mut self, allow: bool) -> Self {
        self.allow_overshooting = allow;
        self
    }

    pub fn with_rest_thresholds(mut self, velocity: f64, displacement: f64) -> Self {
        self.rest_velocity_threshold = velocity;
        self.rest_displacement_threshold = displacement;
        self
    }

    pub fn with_integrator(mut self, integrator: Integrator) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn with_max_step(mut self, max_step_ms: f64) -> Self {
        self.max_step_ms = max_step_ms;
        self
    }

    /// Replace the bounciness, switching to the bouncy parameterization
    pub fn with_bounciness(mut self, bounciness: f64) -> Self {
        let speed = match self.parameters {
            SpringParameters::Bouncy { speed, .. } => speed,
            SpringParameters::Physical { .. } => 1.0,
        };
        self.parameters = SpringParameters::Bouncy { bounciness, speed };
        self
    }

    /// Replace the speed, switching to the bouncy parameterization
    pub fn with_speed(mut self, speed: f64) -> Self {
        let bounciness = match self.parameters {
            SpringParameters::Bouncy { bounciness, .. } => bounciness,
            SpringParameters::Physical { .. } => 0.5,
        };
        self.parameters = SpringParameters::Bouncy { bounciness, speed };
        self
    }

    /// Check every field, reporting the first invalid one
    pub fn validate(&self) -> Result<()> {
        match self.parameters {
            SpringParameters::Physical {
                stiffness,
                damping,
                mass,
            } => {
                non_negative("damping", damping)?;
                non_negative("mass", mass)?;
                non_negative("stiffness", stiffness)?;
                if mass == 0.0 {
                    return Err(ConfigError::ZeroMass);
                }
            }
            SpringParameters::Bouncy { bounciness, speed } => {
                finite("bounciness", bounciness)?;
                finite("speed", speed)?;
                if !(0.0..=1.0).contains(&bounciness) {
                    return Err(ConfigError::BouncinessOutOfRange(bounciness));
                }
                if speed <= 0.0 {
                    return Err(ConfigError::NonPositiveSpeed(speed));
                }
            }
        }

        positive_threshold("rest_velocity_threshold", self.rest_velocity_threshold)?;
        positive_threshold(
            "rest_displacement_threshold",
            self.rest_displacement_threshold,
        )?;

        // Infinity is allowed and disables the cap.
        if self.max_step_ms.is_nan() || self.max_step_ms <= 0.0 {
            return Err(ConfigError::NonPositiveStep(self.max_step_ms));
        }

        Ok(())
    }

    /// Damping ratio before clamping; above 1.0 the spring is overdamped
    pub fn damping_ratio(&self) -> f64 {
        match self.parameters {
            SpringParameters::Physical {
                stiffness,
                damping,
                mass,
            } => {
                let critical = 2.0 * (stiffness * mass).sqrt();
                if critical > 0.0 {
                    damping / critical
                } else {
                    1.0
                }
            }
            SpringParameters::Bouncy { bounciness, .. } => 1.0 - bounciness,
        }
    }

    /// Undamped angular frequency in radians per millisecond
    pub fn natural_frequency(&self) -> f64 {
        match self.parameters {
            SpringParameters::Physical {
                stiffness, mass, ..
            } => (stiffness / mass).sqrt() / 1000.0,
            SpringParameters::Bouncy { speed, .. } => speed / BOUNCY_BASE_SLOWNESS_MS,
        }
    }

    /// Damping force per unit mass and velocity (`c / m`), per millisecond
    pub fn damping_rate(&self) -> f64 {
        match self.parameters {
            SpringParameters::Physical { damping, mass, .. } => damping / mass / 1000.0,
            SpringParameters::Bouncy { .. } => 2.0 * self.damping_ratio() * self.natural_frequency(),
        }
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.damping_ratio() < 1.0
    }

    /// Check if the spring is critically damped (no oscillation, fastest settling)
    pub fn is_critically_damped(&self) -> bool {
        (self.damping_ratio() - 1.0).abs() < 1e-3
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.damping_ratio() > 1.0
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            parameters: SpringParameters::default(),
            allow_overshooting: false,
            rest_velocity_threshold: DEFAULT_REST_THRESHOLD,
            rest_displacement_threshold: DEFAULT_REST_THRESHOLD,
            integrator: Integrator::Analytic,
            max_step_ms: DEFAULT_MAX_STEP_MS,
        }
    }
}

fn finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

fn positive_threshold(field: &'static str, value: f64) -> Result<()> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(ConfigError::NonPositiveThreshold { field, value });
    }
    Ok(())
}

/// Starting position of a spring
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InitialPosition {
    pub from_value: f64,
    pub to_value: f64,
}

impl InitialPosition {
    pub fn new(from_value: f64, to_value: f64) -> Self {
        Self {
            from_value,
            to_value,
        }
    }

    /// A spring resting at `value`
    pub fn at(value: f64) -> Self {
        Self::new(value, value)
    }
}

impl Default for InitialPosition {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}
