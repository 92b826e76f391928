/// Maximum path/URL length in bytes accepted by `send`. Paths are stored
/// inline in the request pool, so this also bounds per-item memory.
pub const MAX_PATH: usize = 1024;

/// Maximum size in bytes of the per-request user-data block.
pub const MAX_USER_DATA: usize = 128;

/// Upper bound on `num_channels`; larger values are clamped at setup.
pub const MAX_CHANNELS: u32 = 16;

/// Engine configuration.
///
/// A zero value in any field means "use the default". All sizing is final
/// after [`Engine::new`](crate::Engine::new): the engine allocates its pool
/// and queues once and never again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of live requests across all channels. Default: 128.
    /// Bounded by the 16-bit slot index (must stay below 65535).
    pub max_requests: u32,
    /// Number of independent fetch channels, each with its own worker
    /// thread and queues. Default: 1, clamped to [`MAX_CHANNELS`].
    pub num_channels: u32,
    /// Maximum number of requests simultaneously in flight per channel.
    /// Requests beyond this wait in the channel's backlog. Default: 1.
    pub num_lanes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_requests: 128,
            num_channels: 1,
            num_lanes: 1,
        }
    }
}

impl Config {
    /// Replace zero fields with their defaults and clamp the channel count.
    pub(crate) fn resolved(&self) -> Config {
        fn or_default(v: u32, def: u32) -> u32 {
            if v == 0 {
                def
            } else {
                v
            }
        }
        Config {
            max_requests: or_default(self.max_requests, 128),
            num_channels: or_default(self.num_channels, 1).min(MAX_CHANNELS),
            num_lanes: or_default(self.num_lanes, 1),
        }
    }

    /// Validate configuration values. Returns an error if any value is out
    /// of range. Expects a resolved config (no zero fields).
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.max_requests == 0 || self.max_requests >= (1 << 16) - 1 {
            return Err(crate::error::Error::Setup(
                "max_requests must be > 0 and < 65535".into(),
            ));
        }
        if self.num_channels == 0 || self.num_channels > MAX_CHANNELS {
            return Err(crate::error::Error::Setup(
                "num_channels must be > 0 and <= MAX_CHANNELS".into(),
            ));
        }
        if self.num_lanes == 0 {
            return Err(crate::error::Error::Setup("num_lanes must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`Config`] with discoverable methods and `build()` validation.
///
/// # Example
///
/// ```rust
/// use fetchline::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .max_requests(64)
///     .channels(2)
///     .lanes(8)
///     .build()
///     .expect("invalid config");
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live requests across all channels.
    pub fn max_requests(mut self, n: u32) -> Self {
        self.config.max_requests = n;
        self
    }

    /// Set the number of fetch channels.
    pub fn channels(mut self, n: u32) -> Self {
        self.config.num_channels = n;
        self
    }

    /// Set the number of lanes per channel.
    pub fn lanes(mut self, n: u32) -> Self {
        self.config.num_lanes = n;
        self
    }

    /// Resolve defaults, validate, and build the final [`Config`].
    pub fn build(self) -> Result<Config, crate::error::Error> {
        let config = self.config.resolved();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_default() {
        let c = Config {
            max_requests: 0,
            num_channels: 0,
            num_lanes: 0,
        }
        .resolved();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn channel_count_is_clamped() {
        let c = Config {
            max_requests: 1,
            num_channels: MAX_CHANNELS + 5,
            num_lanes: 1,
        }
        .resolved();
        assert_eq!(c.num_channels, MAX_CHANNELS);
    }

    #[test]
    fn builder_validates() {
        assert!(ConfigBuilder::new().max_requests(70_000).build().is_err());
        let c = ConfigBuilder::new().lanes(4).build().unwrap();
        assert_eq!(c.num_lanes, 4);
        assert_eq!(c.max_requests, 128);
    }
}
