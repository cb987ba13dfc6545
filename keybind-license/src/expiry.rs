//! Expiry arithmetic.
//!
//! All instants are UTC. A key's clock starts at activation, not issuance,
//! so a key that was never activated has no expiry at all.

use chrono::{DateTime, TimeDelta, Utc};

/// Returns the instant a key activated at `activation` stops being valid.
///
/// `None` when the key was never activated. Durations past the end of the
/// representable calendar saturate to the maximum instant.
#[must_use]
pub fn expiry(activation: Option<DateTime<Utc>>, duration_days: u32) -> Option<DateTime<Utc>> {
    activation.map(|at| {
        at.checked_add_signed(TimeDelta::days(i64::from(duration_days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

/// Returns true iff `expiry` is present and `now` has reached it.
///
/// The expiry instant itself already counts as expired.
#[must_use]
pub fn is_expired(now: DateTime<Utc>, expiry: Option<DateTime<Utc>>) -> bool {
    expiry.is_some_and(|exp| now >= exp)
}

/// Whole days left before expiry, rounded up.
///
/// Zero once expired. A key that was never activated reports its nominal
/// duration, since its clock has not started.
#[must_use]
pub fn days_left(now: DateTime<Utc>, expiry: Option<DateTime<Utc>>, duration_days: u32) -> i64 {
    let Some(exp) = expiry else {
        return i64::from(duration_days);
    };
    if now >= exp {
        return 0;
    }
    let remaining = exp - now;
    let whole = remaining.num_days();
    if remaining > TimeDelta::days(whole) {
        whole + 1
    } else {
        whole
    }
}
