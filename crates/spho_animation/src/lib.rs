//! Spho Spring Animation
//!
//! Single-value spring simulation for UI motion, driven by the host's
//! animation frames.
//!
//! # Features
//!
//! - **Spring Physics**: closed-form or RK4 damped oscillators configured by
//!   stiffness/damping/mass or bounciness/speed
//! - **Frame Batching**: one [`Scheduler`] ticks every moving spring in a single
//!   frame callback and goes idle when all springs rest
//! - **Interruptible**: retargeting a moving spring keeps its velocity
//! - **Linked Springs**: children trail a parent's value at a fixed offset
//! - **Headless Hosts**: [`VirtualFrameHost`] drives frames and time by hand
//!
//! ```
//! use spho_animation::{InitialPosition, Scheduler, Spring, SpringConfig, VirtualFrameHost};
//!
//! let host = VirtualFrameHost::new();
//! let scheduler = Scheduler::with_host(host.clone());
//! let spring = Spring::new(&scheduler, SpringConfig::default(), InitialPosition::new(0.0, 1.0))?;
//!
//! host.run_until_idle(16.0, 1000);
//! assert!(spring.is_at_rest());
//! # Ok::<(), spho_animation::ConfigError>(())
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod integrator;
pub mod link;
pub mod listener;
pub mod scheduler;
pub mod spring;

pub use config::{InitialPosition, Integrator, SpringConfig, SpringParameters};
pub use error::{ConfigError, Result};
pub use host::{FrameCallback, FrameClock, FrameHandle, MonotonicClock, TimeSource, VirtualFrameHost};
pub use listener::{ListenerId, ListenerKind};
pub use scheduler::{Scheduler, SchedulerConfig, SpringId};
pub use spring::{Spring, SpringPhase, SpringRole, Subscription, ValueMapper};
