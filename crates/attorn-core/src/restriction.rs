//! Restrictions attached to delegated authority.
//!
//! A [`Restrictions`] block bounds what an agent may do with a grant:
//! transaction value, geography, time of day and arbitrary named limits.
//! The enforcement layer evaluates them; this module owns the types and the
//! pure matching logic.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset as _, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Transaction value limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueLimits {
    /// Largest value allowed in a single transaction.
    pub max_transaction_value: f64,
    /// Largest total value allowed per calendar day (UTC).
    pub daily_limit: f64,
    /// ISO currency code the limits are expressed in.
    pub currency: String,
}

/// A wall-clock time of day with minute precision, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Build from hour and minute.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeOfDay`] when out of range.
    pub fn from_hm(hour: u32, minute: u32) -> CoreResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimeOfDay {
                value: format!("{hour:02}:{minute:02}"),
            })
    }

    /// Parse `HH:MM`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeOfDay`] for anything else.
    pub fn parse(value: &str) -> CoreResult<Self> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .map(Self)
            .map_err(|_| CoreError::InvalidTimeOfDay {
                value: value.to_string(),
            })
    }

    /// Truncate a time to minute precision.
    #[must_use]
    pub fn from_time(time: NaiveTime) -> Self {
        Self(NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time))
    }

    /// The underlying time.
    #[must_use]
    pub fn as_time(&self) -> NaiveTime {
        self.0
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// A fixed offset from UTC, written `UTC`, `Z`, `+HH:MM` or `-HH:MM`.
///
/// Named zones with daylight saving rules are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcOffset(FixedOffset);

impl UtcOffset {
    /// The zero offset.
    #[must_use]
    pub fn utc() -> Self {
        Self(FixedOffset::east_opt(0).unwrap_or_else(|| Utc.fix()))
    }

    /// Build from a signed number of minutes east of UTC.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimezone`] beyond ±23:59.
    pub fn from_minutes(minutes: i32) -> CoreResult<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimezone {
                value: format!("{minutes} minutes"),
            })
    }

    /// Parse an offset string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimezone`] if the string is not a
    /// recognised form.
    pub fn parse(value: &str) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidTimezone {
            value: value.to_string(),
        };
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self::utc());
        }

        let (sign, rest) = match trimmed.split_at_checked(1) {
            Some(("+", rest)) => (1_i32, rest),
            Some(("-", rest)) => (-1_i32, rest),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
            return Err(invalid());
        }

        // Safety: both components are range-checked above, so the product fits.
        #[allow(clippy::arithmetic_side_effects)]
        let total = sign * (hours * 60 + minutes);
        Self::from_minutes(total).map_err(|_| invalid())
    }

    /// Convert a UTC instant into this offset.
    #[must_use]
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.0)
    }
}

impl Default for UtcOffset {
    fn default() -> Self {
        Self::utc()
    }
}

impl TryFrom<String> for UtcOffset {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcOffset> for String {
    fn from(value: UtcOffset) -> Self {
        value.to_string()
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.local_minus_utc() == 0 {
            f.write_str("UTC")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A recurring window of allowed activity.
///
/// Days are numbered from 0 (Sunday) to 6 (Saturday). The window is
/// half-open, `[start, end)`. When `end` is earlier than `start` the window
/// spans midnight and matches times at or after `start` or before `end`. A
/// window whose start equals its end matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Opening time.
    pub start: TimeOfDay,
    /// Closing time (exclusive).
    pub end: TimeOfDay,
    /// Weekdays on which the window applies.
    pub days_of_week: Vec<u8>,
}

impl TimeWindow {
    /// Build a window, validating the weekday indices.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidWeekday`] for indices above 6.
    pub fn new(start: TimeOfDay, end: TimeOfDay, days_of_week: Vec<u8>) -> CoreResult<Self> {
        if let Some(&day) = days_of_week.iter().find(|d| **d > 6) {
            return Err(CoreError::InvalidWeekday { day });
        }
        Ok(Self {
            start,
            end,
            days_of_week,
        })
    }

    /// Whether the given local weekday and time fall inside the window.
    #[must_use]
    pub fn contains(&self, weekday: Weekday, time: NaiveTime) -> bool {
        let day = u8::try_from(weekday.num_days_from_sunday()).unwrap_or(u8::MAX);
        if !self.days_of_week.contains(&day) {
            return false;
        }

        let t = TimeOfDay::from_time(time);
        if self.end < self.start {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }
}

/// A set of allowed windows evaluated in one timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConstraints {
    /// Windows during which activity is allowed.
    pub allowed_windows: Vec<TimeWindow>,
    /// Offset used to compute the local weekday and time.
    #[serde(default)]
    pub timezone: UtcOffset,
}

impl TimeConstraints {
    /// Whether `instant` falls inside any window. No windows means no
    /// time restriction.
    #[must_use]
    pub fn permits(&self, instant: DateTime<Utc>) -> bool {
        if self.allowed_windows.is_empty() {
            return true;
        }
        let local = self.timezone.localize(instant);
        let weekday = local.weekday();
        let time = local.time();
        self.allowed_windows
            .iter()
            .any(|window| window.contains(weekday, time))
    }
}

/// Bounds on delegated authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restrictions {
    /// Transaction value limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_limits: Option<ValueLimits>,
    /// Region codes where the authority may be exercised. Empty means anywhere.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geographic_constraints: Vec<String>,
    /// Time-of-day restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_constraints: Option<TimeConstraints>,
    /// Named numeric ceilings checked against request metrics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_limits: BTreeMap<String, f64>,
}

impl Restrictions {
    /// Whether no restriction of any kind is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value_limits.is_none()
            && self.geographic_constraints.is_empty()
            && self.time_constraints.is_none()
            && self.custom_limits.is_empty()
    }

    /// Whether `region` is allowed. Comparison ignores ASCII case.
    #[must_use]
    pub fn allows_region(&self, region: &str) -> bool {
        self.geographic_constraints.is_empty()
            || self
                .geographic_constraints
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn window(start: &str, end: &str, days: Vec<u8>) -> TimeWindow {
        TimeWindow::new(
            TimeOfDay::parse(start).unwrap(),
            TimeOfDay::parse(end).unwrap(),
            days,
        )
        .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_overnight_window_on_monday() {
        let w = window("22:00", "06:00", vec![1]);
        assert!(w.contains(Weekday::Mon, hm(23, 0)));
        assert!(w.contains(Weekday::Mon, hm(5, 59)));
        assert!(!w.contains(Weekday::Mon, hm(12, 0)));
        assert!(!w.contains(Weekday::Mon, hm(6, 0)));
        assert!(!w.contains(Weekday::Tue, hm(23, 0)));
    }

    #[test]
    fn test_daytime_window_is_half_open() {
        let w = window("09:00", "17:00", vec![1, 2, 3, 4, 5]);
        assert!(w.contains(Weekday::Wed, hm(9, 0)));
        assert!(w.contains(Weekday::Wed, hm(16, 59)));
        assert!(!w.contains(Weekday::Wed, hm(17, 0)));
        assert!(!w.contains(Weekday::Sat, hm(12, 0)));
    }

    #[test]
    fn test_equal_bounds_match_nothing() {
        let w = window("10:00", "10:00", vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(!w.contains(Weekday::Mon, hm(10, 0)));
    }

    #[test]
    fn test_invalid_weekday_rejected() {
        let result = TimeWindow::new(
            TimeOfDay::parse("09:00").unwrap(),
            TimeOfDay::parse("10:00").unwrap(),
            vec![7],
        );
        assert!(matches!(result, Err(CoreError::InvalidWeekday { day: 7 })));
    }

    #[test]
    fn test_constraints_apply_offset() {
        // 2024-01-01 was a Monday. 21:30 UTC is 23:30 at +02:00.
        let constraints = TimeConstraints {
            allowed_windows: vec![window("22:00", "06:00", vec![1])],
            timezone: UtcOffset::parse("+02:00").unwrap(),
        };
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 21, 30, 0).unwrap();
        assert!(constraints.permits(instant));

        let utc = TimeConstraints {
            timezone: UtcOffset::utc(),
            ..constraints
        };
        assert!(!utc.permits(instant));
    }

    #[test]
    fn test_empty_windows_permit_everything() {
        let constraints = TimeConstraints {
            allowed_windows: Vec::new(),
            timezone: UtcOffset::utc(),
        };
        assert!(constraints.permits(Utc::now()));
    }

    #[test]
    fn test_offset_parsing() {
        assert_eq!(UtcOffset::parse("UTC").unwrap(), UtcOffset::utc());
        assert_eq!(UtcOffset::parse("-05:30").unwrap().to_string(), "-05:30");
        assert!(UtcOffset::parse("Europe/Berlin").is_err());
        assert!(UtcOffset::parse("+25:00").is_err());
    }

    #[test]
    fn test_restrictions_serde_shape() {
        let json = r#"{
            "value_limits": {"max_transaction_value": 500.0, "daily_limit": 1000.0, "currency": "EUR"},
            "geographic_constraints": ["DE", "FR"],
            "time_constraints": {
                "allowed_windows": [{"start": "09:00", "end": "17:00", "days_of_week": [1,2,3,4,5]}],
                "timezone": "+01:00"
            }
        }"#;
        let restrictions: Restrictions = serde_json::from_str(json).unwrap();
        assert!(restrictions.allows_region("de"));
        assert!(!restrictions.allows_region("US"));
        assert!(!restrictions.is_empty());
        assert!(Restrictions::default().is_empty());
    }

    proptest! {
        #[test]
        fn prop_same_day_window_matches_exactly_its_interval(
            start in 0u32..1440, len in 1u32..1440, minute in 0u32..1440
        ) {
            prop_assume!(start + len < 1440);
            let end = start + len;
            let w = TimeWindow::new(
                TimeOfDay::from_hm(start / 60, start % 60).unwrap(),
                TimeOfDay::from_hm(end / 60, end % 60).unwrap(),
                vec![3],
            ).unwrap();
            let inside = minute >= start && minute < end;
            prop_assert_eq!(w.contains(Weekday::Wed, hm(minute / 60, minute % 60)), inside);
        }

        #[test]
        fn prop_overnight_window_is_complement_of_day_window(
            a in 0u32..1440, b in 0u32..1440, minute in 0u32..1440
        ) {
            prop_assume!(a < b);
            let day = TimeWindow::new(
                TimeOfDay::from_hm(a / 60, a % 60).unwrap(),
                TimeOfDay::from_hm(b / 60, b % 60).unwrap(),
                vec![5],
            ).unwrap();
            let night = TimeWindow::new(day.end, day.start, vec![5]).unwrap();
            let t = hm(minute / 60, minute % 60);
            prop_assert_ne!(day.contains(Weekday::Fri, t), night.contains(Weekday::Fri, t));
        }
    }
}
