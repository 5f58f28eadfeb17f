//! Slow query diagnostic
//!
//! Periodically reports the five statements with the highest average
//! latency from `pg_stat_statements`. A missing database or a failing
//! query skips the check; it is never fatal.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time;

use super::{Event, MeterKind, Telemetry};

const SLOW_QUERIES_SQL: &str = r#"
    SELECT
        total_exec_time / calls AS avg_time,
        calls,
        total_exec_time AS total_time,
        rows,
        (100.0 * shared_blks_hit / nullif(shared_blks_hit + shared_blks_read, 0))::float8 AS hit_percent,
        regexp_replace(query, '[\s\t\n]+', ' ', 'g') AS sanitized_sql
    FROM pg_stat_statements
    WHERE query NOT LIKE '%EXPLAIN%'
    AND query NOT LIKE '%INDEX%'
    AND query NOT LIKE '%pg_stat_statements%'
    AND calls > 1
    ORDER BY avg_time DESC
    LIMIT 5
"#;

/// One row of the slow query report
///
/// Times are durations; rendering decides the unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SlowQuery {
    pub avg_time: Duration,
    pub calls: i64,
    pub total_time: Duration,
    pub rows: i64,
    pub hit_percent: f64,
    pub sql_statement: String,
}

#[derive(Debug, Error)]
pub enum SlowQueryError {
    #[error("No database available")]
    NoDatabase,

    #[error("slow query collection failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// `pg_stat_statements` reports times as float milliseconds
fn millis(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value / 1000.0)
    } else {
        Duration::ZERO
    }
}

fn scan_row(row: &PgRow) -> Result<SlowQuery, sqlx::Error> {
    Ok(SlowQuery {
        avg_time: millis(row.try_get::<f64, _>("avg_time")?),
        calls: row.try_get("calls")?,
        total_time: millis(row.try_get::<f64, _>("total_time")?),
        rows: row.try_get("rows")?,
        hit_percent: row.try_get::<Option<f64>, _>("hit_percent")?.unwrap_or(0.0),
        sql_statement: row.try_get("sanitized_sql")?,
    })
}

/// Collect the current top slow queries from the first known database
pub async fn collect_slow_queries(databases: &[PgPool]) -> Result<Vec<SlowQuery>, SlowQueryError> {
    let pool = databases.first().ok_or(SlowQueryError::NoDatabase)?;

    let rows = sqlx::query(SLOW_QUERIES_SQL).fetch_all(pool).await?;

    let mut slow_queries = Vec::with_capacity(rows.len());
    for row in &rows {
        match scan_row(row) {
            Ok(query) => slow_queries.push(query),
            Err(e) => tracing::error!("slow-query-scanrow-failed: {}", e),
        }
    }

    Ok(slow_queries)
}

/// Periodic task emitting a `slow queries` event per reported statement
pub struct SlowQueryMonitor {
    databases: Vec<PgPool>,
    telemetry: Telemetry,
    interval: Duration,
}

impl SlowQueryMonitor {
    pub fn new(databases: Vec<PgPool>, telemetry: Telemetry, interval: Duration) -> Self {
        Self {
            databases,
            telemetry,
            interval,
        }
    }

    /// Run one check, returning how many statements were reported
    pub async fn check_once(&self) -> usize {
        match collect_slow_queries(&self.databases).await {
            Ok(queries) => {
                self.telemetry.meters.inc(MeterKind::DatabaseQueries);
                let count = queries.len();
                for query in queries {
                    self.telemetry.emit(Event::SlowQuery(query));
                }
                count
            }
            Err(SlowQueryError::NoDatabase) => {
                tracing::error!("slow-query-no-database-found: skipping check");
                0
            }
            Err(e) => {
                tracing::error!("slow-query-collection-failed: {}", e);
                0
            }
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Starting slow query monitor (interval: {:?})", self.interval);

        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Slow query monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Emitter, MemorySink};
    use std::sync::Arc;

    #[test]
    fn test_millis_conversion() {
        assert_eq!(millis(1500.0), Duration::from_millis(1500));
        assert_eq!(millis(-1.0), Duration::ZERO);
        assert_eq!(millis(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_excludes_diagnostic_statements() {
        assert!(SLOW_QUERIES_SQL.contains("NOT LIKE '%EXPLAIN%'"));
        assert!(SLOW_QUERIES_SQL.contains("NOT LIKE '%INDEX%'"));
        assert!(SLOW_QUERIES_SQL.contains("NOT LIKE '%pg_stat_statements%'"));
        assert!(SLOW_QUERIES_SQL.contains("ORDER BY avg_time DESC"));
        assert!(SLOW_QUERIES_SQL.contains("LIMIT 5"));
    }

    #[tokio::test]
    async fn test_missing_database_is_skipped() {
        let result = collect_slow_queries(&[]).await;
        assert!(matches!(result, Err(SlowQueryError::NoDatabase)));

        let memory = Arc::new(MemorySink::new(10));
        let telemetry = Telemetry::new(Emitter::new().with_sink(memory.clone()));
        let monitor = SlowQueryMonitor::new(Vec::new(), telemetry, Duration::from_secs(60));

        assert_eq!(monitor.check_once().await, 0);
        assert!(memory.events().is_empty());
    }
}
