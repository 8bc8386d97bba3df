//! Linked springs
//!
//! A linked spring trails its parent: every parent update retargets the child
//! to the parent's value plus a fixed offset, and ending the parent ends the
//! child. The child owns no target of its own.

use crate::config::SpringConfig;
use crate::error::Result;
use crate::integrator::OscillatorState;
use crate::spring::{Spring, SpringRole};
use tracing::debug;

impl Spring {
    /// Create a child spring with this spring's configuration that follows
    /// this spring's value plus `offset`
    pub fn linked_spring(&self, offset: f64) -> Spring {
        self.link(offset, self.config())
    }

    /// Like [`linked_spring`](Self::linked_spring) with its own
    /// configuration, so the child can trail with a different feel
    pub fn linked_spring_with(&self, offset: f64, config: SpringConfig) -> Result<Spring> {
        config.validate()?;
        Ok(self.link(offset, config))
    }

    fn link(&self, offset: f64, config: SpringConfig) -> Spring {
        let start = self.current_value() + offset;
        let child = Spring::from_parts(
            self.scheduler(),
            config,
            OscillatorState::new(start, start),
            SpringRole::LinkedChild,
        );

        debug!(parent = ?self.id(), child = ?child.id(), offset, "linked spring created");

        if self.is_ended() {
            child.end();
            return child;
        }

        let follower = child.clone();
        let _ = self.on_update(move |value| follower.follow(value + offset));
        let follower = child.clone();
        let _ = self.on_end(move || follower.end());

        child
    }
}
