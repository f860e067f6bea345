//! Delivery delay for published commands.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// How long the broker must withhold a command before delivering it.
///
/// Always non-negative; [`Delay::ZERO`] means "eligible immediately".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Delay(Duration);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("delay must be non-negative (got {0})")]
pub struct NegativeDelay(pub TimeDelta);

impl Delay {
    pub const ZERO: Delay = Delay(Duration::ZERO);

    pub const fn from_std(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Delay until an absolute instant. Instants in the past mean no delay.
    pub fn until(at: DateTime<Utc>) -> Self {
        Self((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_immediate(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_std(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u128 {
        self.0.as_millis()
    }
}

impl From<Duration> for Delay {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl TryFrom<TimeDelta> for Delay {
    type Error = NegativeDelay;

    fn try_from(value: TimeDelta) -> Result<Self, Self::Error> {
        value.to_std().map(Self).map_err(|_| NegativeDelay(value))
    }
}
