//! Simulated time.
//!
//! A `Time` is an offset from the simulation epoch, bracketed by two sentinels:
//! `NegInfinity` (a component that has never been updated) and `PosInfinity`
//! (a component that never needs a clock-driven update).

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use std::ops::Add;

/// A simulated instant.
///
/// The derived ordering is the intended one: variants compare first, so
/// `NegInfinity < At(_) < PosInfinity`, and finite times compare by offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Time {
    NegInfinity,
    At(Duration),
    PosInfinity,
}

impl Time {
    /// The simulation epoch.
    pub fn zero() -> Self {
        Time::At(Duration::zero())
    }

    pub fn from_secs(secs: i64) -> Self {
        Time::At(Duration::seconds(secs))
    }

    pub fn from_millis(millis: i64) -> Self {
        Time::At(Duration::milliseconds(millis))
    }

    /// Offset of a calendar time from `epoch`.
    pub fn from_datetime(datetime: NaiveDateTime, epoch: NaiveDateTime) -> Self {
        Time::At(datetime.signed_duration_since(epoch))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        matches!(self, Time::At(_))
    }

    /// Offset from the epoch, or `None` for the sentinels.
    #[inline]
    pub fn offset(self) -> Option<Duration> {
        match self {
            Time::At(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_secs_f64(self) -> Option<f64> {
        self.offset().map(|d| d.num_milliseconds() as f64 / 1000.0)
    }

    /// Calendar time relative to `epoch`, or `None` for the sentinels and on overflow.
    pub fn to_datetime(self, epoch: NaiveDateTime) -> Option<NaiveDateTime> {
        self.offset().and_then(|d| epoch.checked_add_signed(d))
    }

    /// Add a duration, saturating to the matching infinity on overflow.
    pub fn saturating_add(self, delta: Duration) -> Self {
        match self {
            Time::At(d) => match d.checked_add(&delta) {
                Some(sum) => Time::At(sum),
                None if delta > Duration::zero() => Time::PosInfinity,
                None => Time::NegInfinity,
            },
            infinite => infinite,
        }
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, delta: Duration) -> Time {
        self.saturating_add(delta)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Time::NegInfinity => write!(f, "-inf"),
            Time::PosInfinity => write!(f, "+inf"),
            Time::At(d) => {
                let millis = d.num_milliseconds();
                if millis % 1000 == 0 {
                    write!(f, "{}s", millis / 1000)
                } else {
                    write!(f, "{:.3}s", millis as f64 / 1000.0)
                }
            }
        }
    }
}
