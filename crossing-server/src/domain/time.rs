//! Clock-time resolution for the train feed.
//!
//! The feed reports arrivals as bare wall-clock strings ("06:20", "6.20")
//! with no date attached. This module validates those strings and anchors
//! them to an absolute instant in one fixed timezone, rolling forward a day
//! when the time has already passed relative to a reference instant.

use std::fmt;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Error returned when a clock string cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    /// The string is not `H:MM` / `HH:MM` within 00:00-23:59.
    #[error("malformed timestamp: {raw:?}")]
    MalformedTimestamp { raw: String },

    /// The wall-clock time does not exist on that date in the timezone.
    #[error("local time {time} does not exist in {tz}")]
    NonexistentLocalTime { time: ClockTime, tz: Tz },
}

/// A validated time of day, as reported by the feed.
///
/// # Examples
///
/// ```
/// use crossing_server::domain::ClockTime;
///
/// assert_eq!(ClockTime::parse("06:20").unwrap().to_string(), "06:20");
/// assert_eq!(ClockTime::parse(" 6.20 ").unwrap().to_string(), "06:20");
///
/// assert!(ClockTime::parse("24:00").is_err());
/// assert!(ClockTime::parse("07.25.1").is_err());
/// assert!(ClockTime::parse("1111111").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    /// Create a clock time, returning `None` outside 00:00-23:59.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(Self { hour, minute })
    }

    /// Parse a feed time string.
    ///
    /// Whitespace is stripped and `.` is accepted as a separator, then the
    /// result must be one or two hour digits, a colon, and two minute digits.
    pub fn parse(raw: &str) -> Result<Self, TimeError> {
        let malformed = || TimeError::MalformedTimestamp {
            raw: raw.to_string(),
        };

        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '.' { ':' } else { c })
            .collect();

        let (hours, minutes) = normalized.split_once(':').ok_or_else(malformed)?;

        if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if minutes.len() != 2 || !minutes.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let hour: u32 = hours.parse().map_err(|_| malformed())?;
        let minute: u32 = minutes.parse().map_err(|_| malformed())?;

        Self::new(hour, minute).ok_or_else(malformed)
    }

    /// Returns the hour (0-23).
    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Returns the minute (0-59).
    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn to_naive(self) -> NaiveTime {
        // Fields are range-checked at construction.
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Anchor this time to an absolute instant.
    ///
    /// The reference instant's calendar date (in its own timezone) is used;
    /// if the result is strictly earlier than `reference`, exactly 24 hours
    /// are added.
    pub fn resolve(self, reference: DateTime<Tz>) -> Result<DateTime<Tz>, TimeError> {
        let tz = reference.timezone();
        let naive = reference.date_naive().and_time(self.to_naive());

        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or(TimeError::NonexistentLocalTime { time: self, tz })?;

        if candidate < reference {
            Ok(candidate + Duration::hours(24))
        } else {
            Ok(candidate)
        }
    }
}

impl fmt::Debug for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClockTime({:02}:{:02})", self.hour, self.minute)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Parse a feed time string and resolve it against `reference`.
///
/// # Examples
///
/// ```
/// use chrono::TimeZone;
/// use chrono_tz::Asia::Kolkata;
/// use crossing_server::domain::resolve_clock_time;
///
/// let reference = Kolkata.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
///
/// let later = resolve_clock_time("06:20", reference).unwrap();
/// assert_eq!(later, Kolkata.with_ymd_and_hms(2024, 1, 1, 6, 20, 0).unwrap());
///
/// // Already passed today, so it must mean tomorrow.
/// let tomorrow = resolve_clock_time("04:59", reference).unwrap();
/// assert_eq!(tomorrow, Kolkata.with_ymd_and_hms(2024, 1, 2, 4, 59, 0).unwrap());
/// ```
pub fn resolve_clock_time(raw: &str, reference: DateTime<Tz>) -> Result<DateTime<Tz>, TimeError> {
    ClockTime::parse(raw)?.resolve(reference)
}

/// Source of "now" in the configured timezone.
///
/// Everything that compares against the current time takes a clock so
/// tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock, reported in a fixed timezone rather than the process's local one.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Tz>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Tz>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
