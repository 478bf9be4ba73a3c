use chrono::{DateTime, Utc};

/// Linear decay: 1.0 at age zero, 0.0 once the age reaches `window_ms`.
/// Timestamps in the future count as age zero.
pub fn recency_boost(created_at: DateTime<Utc>, now: DateTime<Utc>, window_ms: i64) -> f64 {
    if window_ms <= 0 {
        return 0.0;
    }
    let age_ms = (now - created_at).num_milliseconds();
    if age_ms <= 0 {
        return 1.0;
    }
    if age_ms >= window_ms {
        return 0.0;
    }
    (1.0 - age_ms as f64 / window_ms as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_age_zero_is_one() {
        let now = Utc::now();
        assert_eq!(recency_boost(now, now, 30 * DAY_MS), 1.0);
    }

    #[test]
    fn test_age_equal_window_is_zero() {
        let now = Utc::now();
        let window = 30 * DAY_MS;
        let created = now - Duration::milliseconds(window);
        assert_eq!(recency_boost(created, now, window), 0.0);
    }

    #[test]
    fn test_older_than_window_is_zero() {
        let now = Utc::now();
        assert_eq!(recency_boost(now - Duration::days(400), now, 30 * DAY_MS), 0.0);
    }

    #[test]
    fn test_future_timestamp_clipped_to_one() {
        let now = Utc::now();
        assert_eq!(recency_boost(now + Duration::days(2), now, 30 * DAY_MS), 1.0);
    }

    #[test]
    fn test_one_day_in_thirty() {
        let now = Utc::now();
        let score = recency_boost(now - Duration::days(1), now, 30 * DAY_MS);
        assert!((score - 0.9667).abs() < 0.001, "Score was {score}");
    }

    #[test]
    fn test_monotonically_non_increasing() {
        let now = Utc::now();
        let window = 10 * DAY_MS;
        let mut previous = f64::INFINITY;
        for hours in (0..=300).step_by(7) {
            let score = recency_boost(now - Duration::hours(hours), now, window);
            assert!(score <= previous, "score rose at {hours}h");
            previous = score;
        }
    }
}
