use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A source of wall-clock time for stamping documents and generating ids.
///
/// Submissions take their timestamps from here so tests can pin the clock
/// and assert on exact document contents.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;

    /// RFC 3339 timestamp with whole-second precision, e.g. `2026-01-24T08:30:00Z`.
    fn timestamp(&self) -> String {
        format_timestamp(self.now())
    }

    /// Nanoseconds since the UNIX epoch; used for `msg_<nanos>` ids and staging names.
    fn unix_nanos(&self) -> i128 {
        self.now().unix_timestamp_nanos()
    }
}

/// A clock that reads `OffsetDateTime::now_utc()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.replace_nanosecond(0).unwrap_or(at);
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_formats_utc_seconds() {
        let at = OffsetDateTime::from_unix_timestamp(1_769_243_400).unwrap();
        let clock = FixedClock(at);
        assert_eq!(clock.timestamp(), "2026-01-24T08:30:00Z");
        assert_eq!(clock.unix_nanos(), 1_769_243_400_000_000_000);
    }

    #[test]
    fn subsecond_precision_is_dropped() {
        let at = OffsetDateTime::from_unix_timestamp_nanos(1_769_243_400_123_456_789).unwrap();
        assert_eq!(format_timestamp(at), "2026-01-24T08:30:00Z");
    }
}
