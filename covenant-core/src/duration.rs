//! Millisecond durations for engine options.
//!
//! Timeouts and retry intervals are forwarded to the engine untouched, so
//! they travel as plain integers rather than serde's `{"secs", "nanos"}`
//! representation of [`std::time::Duration`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration in milliseconds, serialized as a bare `u64`.
///
/// # Examples
///
/// ```
/// use covenant_core::DurationMs;
///
/// let d = DurationMs::from_secs(30);
/// assert_eq!(d.as_millis(), 30_000);
/// assert_eq!(serde_json::to_string(&d).unwrap(), "30000");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DurationMs(u64);

impl DurationMs {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Create from seconds, saturating on overflow.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Create from minutes, saturating on overflow.
    pub fn from_mins(mins: u64) -> Self {
        Self::from_secs(mins.saturating_mul(60))
    }

    /// The value in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Convert to `std::time::Duration`.
    pub fn to_std(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for DurationMs {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<DurationMs> for Duration {
    fn from(d: DurationMs) -> Self {
        d.to_std()
    }
}

impl std::fmt::Display for DurationMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
