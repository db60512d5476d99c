//! Platform-neutral timeout policy.
//!
//! Every blocking operation takes a [`TimeoutSpec`] and converts it into a
//! [`Deadline`] once, at the top of the call. The backends then derive
//! whatever their native wait primitive needs (poll milliseconds on Unix,
//! event-wait milliseconds on Windows) from the single deadline, so an
//! operation that spans several OS calls still honors the caller's budget.

use std::time::{Duration, Instant};

/// A requested operation timeout.
///
/// `Bounded(Duration::ZERO)` means "poll without blocking".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSpec {
    /// Wait without bound.
    Infinite,
    /// Wait at most this long.
    Bounded(Duration),
}

impl TimeoutSpec {
    /// Immediate poll: succeed only if the operation is already ready.
    pub const POLL: TimeoutSpec = TimeoutSpec::Bounded(Duration::ZERO);

    pub fn is_infinite(&self) -> bool {
        matches!(self, TimeoutSpec::Infinite)
    }
}

impl From<Duration> for TimeoutSpec {
    fn from(d: Duration) -> Self {
        TimeoutSpec::Bounded(d)
    }
}

impl From<Option<Duration>> for TimeoutSpec {
    fn from(d: Option<Duration>) -> Self {
        match d {
            Some(d) => TimeoutSpec::Bounded(d),
            None => TimeoutSpec::Infinite,
        }
    }
}

/// The moment a bounded operation must give up.
///
/// Stateless with respect to the waitable: a deadline may be consulted any
/// number of times without degrading.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    requested: TimeoutSpec,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Start the clock for one operation.
    pub fn start(spec: TimeoutSpec) -> Self {
        let expires_at = match spec {
            TimeoutSpec::Infinite => None,
            TimeoutSpec::Bounded(d) => Some(Instant::now() + d),
        };
        Self {
            requested: spec,
            expires_at,
        }
    }

    /// The timeout this deadline was started from.
    pub fn requested(&self) -> TimeoutSpec {
        self.requested
    }

    /// The originally requested duration, for timeout error payloads.
    /// Only meaningful on timeout paths, which bounded deadlines alone reach.
    pub fn requested_duration(&self) -> Duration {
        match self.requested {
            TimeoutSpec::Bounded(d) => d,
            TimeoutSpec::Infinite => Duration::ZERO,
        }
    }

    /// Time left on the budget.
    pub fn remaining(&self) -> TimeoutSpec {
        match self.expires_at {
            None => TimeoutSpec::Infinite,
            Some(at) => TimeoutSpec::Bounded(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Time left, capped at `cap`. Infinite deadlines yield `cap`, so
    /// periodic waits can re-check external state (e.g. a close flag).
    pub fn remaining_or(&self, cap: Duration) -> Duration {
        match self.remaining() {
            TimeoutSpec::Infinite => cap,
            TimeoutSpec::Bounded(d) => d.min(cap),
        }
    }

    pub fn expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(at) => Instant::now() >= at,
        }
    }
}

/// Uniform outcome of a bounded wait on a native waitable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}
