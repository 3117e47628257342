//! Wall-clock access for credential expiry checks.

/// Source of the current time in whole seconds since the Unix epoch.
///
/// Credential grants carry an absolute expiry timestamp, so the upload
/// scheduler compares against epoch seconds rather than an [`Instant`].
///
/// [`Instant`]: std::time::Instant
pub trait Clock: Send + Sync {
    /// Returns the current time in epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
