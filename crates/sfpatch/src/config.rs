//! Build-time parameters for the lifecycle.
//!
//! There is no config file; integrators set these in code.

use std::time::Duration;

use crate::abi;

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Delay between the postload message and the delay-load handler.
    ///
    /// A heuristic for "the host finished its asynchronous startup", not a
    /// readiness check. Slow machines may need more.
    pub const DELAY_LOAD: Duration = Duration::from_secs(8);
}

/// Configuration for [`Lifecycle`](crate::lifecycle::Lifecycle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// How long after PostLoad the DelayLoad handler runs
    pub delay_load_after: Duration,
    /// Sender whose messages the listener subscribes to
    pub listen_to: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            delay_load_after: timing::DELAY_LOAD,
            listen_to: abi::LOADER_NAME.to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Create a new configuration builder
    pub fn builder() -> LifecycleConfigBuilder {
        LifecycleConfigBuilder::default()
    }
}

/// Builder for LifecycleConfig
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfigBuilder {
    delay_load_after: Option<Duration>,
    listen_to: Option<String>,
}

impl LifecycleConfigBuilder {
    /// Set the PostLoad → DelayLoad delay
    pub fn delay_load_after(mut self, delay: Duration) -> Self {
        self.delay_load_after = Some(delay);
        self
    }

    /// Listen to a sender other than the loader itself
    pub fn listen_to<S: Into<String>>(mut self, sender: S) -> Self {
        self.listen_to = Some(sender.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> LifecycleConfig {
        let default = LifecycleConfig::default();
        LifecycleConfig {
            delay_load_after: self.delay_load_after.unwrap_or(default.delay_load_after),
            listen_to: self.listen_to.unwrap_or(default.listen_to),
        }
    }
}
