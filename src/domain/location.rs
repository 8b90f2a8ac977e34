use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum age for a fix to count as fresh.
pub const FRESHNESS_WINDOW_SECS: i64 = 10;

/// A GPS fix as delivered by the location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above the WGS84 ellipsoid
    pub altitude: f64,
    /// Horizontal accuracy radius in metres
    pub accuracy: f32,
    pub timestamp: DateTime<Utc>,
}

impl GpsLocation {
    pub fn new(
        latitude: f64,
        longitude: f64,
        altitude: f64,
        accuracy: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            accuracy,
            timestamp,
        }
    }

    /// Age of the fix relative to `now`. Negative for future timestamps.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Fresh iff `0 <= now - timestamp < 10s`. Future fixes are never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = self.age(now);
        age >= Duration::zero() && age < Duration::seconds(FRESHNESS_WINDOW_SECS)
    }

    /// Same coordinates, new timestamp. Used by keep-alive re-sends.
    pub fn with_fresh_timestamp(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fix_at(timestamp: DateTime<Utc>) -> GpsLocation {
        GpsLocation::new(35.6586, 139.7454, 333.0, 4.5, timestamp)
    }

    #[test]
    fn test_freshness_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert!(fix_at(now).is_fresh(now));
        assert!(fix_at(now - Duration::seconds(9)).is_fresh(now));
        assert!(!fix_at(now - Duration::seconds(10)).is_fresh(now));
        assert!(!fix_at(now - Duration::minutes(5)).is_fresh(now));
        assert!(!fix_at(now + Duration::seconds(1)).is_fresh(now));
    }

    #[test]
    fn test_age_is_signed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(fix_at(now - Duration::seconds(3)).age(now), Duration::seconds(3));
        assert_eq!(fix_at(now + Duration::seconds(2)).age(now), Duration::seconds(-2));
    }

    #[test]
    fn test_restamp_preserves_coordinates() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let stale = fix_at(now - Duration::minutes(3));
        assert!(!stale.is_fresh(now));

        let restamped = stale.with_fresh_timestamp(now);
        assert_eq!(restamped.latitude, stale.latitude);
        assert_eq!(restamped.longitude, stale.longitude);
        assert_eq!(restamped.altitude, stale.altitude);
        assert_eq!(restamped.accuracy, stale.accuracy);
        assert_eq!(restamped.timestamp, now);
        assert!(restamped.is_fresh(now));
    }
}
