use core::time::Duration;

use crate::admission::ThrottleAction;
use crate::limiter::RegisteredRateMode;

/// Delay between admission re-checks of a throttled request (1 ms)
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Capacity of the validated root-update channel
pub const DEFAULT_OUTPUT_CAPACITY: usize = 64;

/// Exchange core configuration.
///
/// The three rates are required, everything else has a default.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Tokens per second a top-tier peer share is computed from
    pub base_token_rate: f64,

    /// Tokens per second across all peers
    pub global_total_rate: f64,

    /// Global bucket capacity
    pub global_burst: u32,

    pub registered_rate_mode: RegisteredRateMode,

    /// Delay between admission re-checks of a throttled request
    pub retry_interval: Duration,

    pub throttle_action: ThrottleAction,

    /// Capacity of the validated root-update channel
    pub output_capacity: usize,

    /// Topic to subscribe to on start, if any
    pub topic: Option<String>,
}

impl CoreConfig {
    #[must_use]
    pub const fn new(base_token_rate: f64, global_total_rate: f64, global_burst: u32) -> Self {
        Self {
            base_token_rate,
            global_total_rate,
            global_burst,
            registered_rate_mode: RegisteredRateMode::Proportional,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            throttle_action: ThrottleAction::Pause,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            topic: None,
        }
    }
}
