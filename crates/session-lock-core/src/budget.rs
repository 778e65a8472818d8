//! Wait budget for lock acquisition.

use std::fmt;
use std::time::Duration;

/// How long an acquire call may wait for the lock to become available.
///
/// This bounds the *wait*, not how long the lock is held once acquired:
///
/// - negative: wait indefinitely (still subject to the caller's [`Context`])
/// - zero: try once, never wait
/// - positive: wait up to that long
///
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitBudget {
    millis: i64, // < 0 for indefinite
}

impl WaitBudget {
    pub const INDEFINITE: Self = Self { millis: -1 };
    pub const ZERO: Self = Self { millis: 0 };

    /// Budget in milliseconds; any negative value means indefinite.
    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Budget in seconds; any negative value means indefinite.
    pub const fn from_secs(secs: i64) -> Self {
        Self {
            millis: secs.saturating_mul(1000),
        }
    }

    pub fn is_indefinite(&self) -> bool {
        self.millis < 0
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// The bounded wait, or `None` when indefinite.
    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_indefinite() {
            None
        } else {
            Some(Duration::from_millis(self.millis as u64))
        }
    }

    /// Whole seconds truncated toward zero, `-1` when indefinite.
    pub fn as_whole_secs(&self) -> i64 {
        if self.is_indefinite() {
            -1
        } else {
            self.millis / 1000
        }
    }
}

impl From<Duration> for WaitBudget {
    fn from(wait: Duration) -> Self {
        Self {
            millis: i64::try_from(wait.as_millis()).unwrap_or(i64::MAX),
        }
    }
}

/// `None` waits indefinitely.
impl From<Option<Duration>> for WaitBudget {
    fn from(wait: Option<Duration>) -> Self {
        match wait {
            None => Self::INDEFINITE,
            Some(d) => d.into(),
        }
    }
}

impl fmt::Display for WaitBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_duration() {
            None => f.write_str("indefinite"),
            Some(d) => write!(f, "{:?}", d),
        }
    }
}
