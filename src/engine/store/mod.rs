// ── Engram: Graph Store Backends ───────────────────────────────────────────
//
// Module layout:
//   schema  : idempotent SQLite migrations (records, FTS, concepts, audit)
//   sqlite  : SqliteGraphStore, the reference GraphStore
//   sim     : SimGraphStore, a fault-injecting wrapper for tests and drills
//   vector  : blob encoding, cosine similarity, centroids

mod schema;
pub mod sim;
pub mod sqlite;
pub mod vector;

pub use sim::SimGraphStore;
pub use sqlite::SqliteGraphStore;

use chrono::{DateTime, SecondsFormat, Utc};
use std::future::Future;
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};

/// Run a store call under a deadline. Elapsing yields `EngineError::Timeout`.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::timeout(operation, limit)),
    }
}

/// Fixed-width RFC 3339 (UTC, microseconds) so stored timestamps sort
/// lexicographically in SQL.
pub(crate) fn ts_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_from_sql(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(5);
        assert!(ts_to_sql(&a) < ts_to_sql(&b));
        assert_eq!(ts_from_sql(&ts_to_sql(&a)).map(|d| d.timestamp_micros()), Some(a.timestamp_micros()));
    }

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, EngineError>(())
        };
        let err = bounded("graph_store.ping", Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }
}
