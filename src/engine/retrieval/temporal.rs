// ── Engram: Temporal Scoring ───────────────────────────────────────────────
// Recency as exponential decay with a configurable half-life.

use chrono::{DateTime, Utc};

/// 1.0 for a record created now, 0.5 one half-life ago. Future timestamps
/// (clock skew) score 1.0.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let age_hours = (now - created_at).num_milliseconds() as f64 / 3_600_000.0;
    if age_hours <= 0.0 || half_life_hours <= 0.0 {
        return 1.0;
    }
    (-std::f64::consts::LN_2 * age_hours / half_life_hours).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn halves_every_half_life() {
        let now = Utc::now();
        assert_eq!(recency_score(now, now, 72.0), 1.0);
        let s = recency_score(now - Duration::hours(72), now, 72.0);
        assert!((s - 0.5).abs() < 1e-9);
        let s = recency_score(now - Duration::hours(144), now, 72.0);
        assert!((s - 0.25).abs() < 1e-9);
    }

    #[test]
    fn newer_is_never_lower() {
        let now = Utc::now();
        let a = recency_score(now - Duration::hours(1), now, 72.0);
        let b = recency_score(now - Duration::hours(30), now, 72.0);
        assert!(a > b);
        assert_eq!(recency_score(now + Duration::minutes(5), now, 72.0), 1.0);
    }
}
