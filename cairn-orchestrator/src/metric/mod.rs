//! Metric Module
//!
//! Typed, severity-classified telemetry. Every fact the orchestrator reports
//! is one variant of [`Event`]; rendering turns it into a flat [`MetricEvent`]
//! which the [`Emitter`] hands to each registered sink.

pub mod emitter;
pub mod meters;
pub mod slow_query;

pub use emitter::{Emitter, LogSink, MemorySink, MetricSink, SinkError};
pub use meters::{MeterKind, Meters};
pub use slow_query::SlowQuery;

use cairn_core::domain::resource::{ResourceKind, ResourceState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Severity attached to every metric event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Ok => write!(f, "ok"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Severity for scheduling, build and collector durations
///
/// OK up to and including 1s, Warning up to and including 5s, Critical above.
pub fn duration_severity(duration: Duration) -> Severity {
    if duration > Duration::from_secs(5) {
        Severity::Critical
    } else if duration > Duration::from_secs(1) {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// Severity for HTTP response times (100ms / 1s boundaries)
pub fn http_severity(duration: Duration) -> Severity {
    if duration > Duration::from_secs(1) {
        Severity::Critical
    } else if duration > Duration::from_millis(100) {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// Duration in milliseconds as a float
pub fn ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Duration in seconds as a float
pub fn sec(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000_000.0
}

/// A rendered, immutable metric record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub severity: Severity,
    pub attributes: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Every kind of telemetry the orchestrator emits
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SchedulingFullDuration {
        pipeline: String,
        duration: Duration,
    },
    SchedulingLoadVersionsDuration {
        pipeline: String,
        duration: Duration,
    },
    SchedulingJobDuration {
        pipeline: String,
        job: String,
        duration: Duration,
    },
    WorkerContainers {
        worker: String,
        containers: u64,
    },
    WorkerVolumes {
        worker: String,
        volumes: u64,
    },
    /// Backlog found by a collector for one lifecycle state
    ToBeGarbageCollected {
        kind: ResourceKind,
        state: ResourceState,
        count: usize,
    },
    /// A collector tick lost the lease race
    CollectorJobDropped {
        kind: ResourceKind,
        worker: String,
    },
    CollectorSweepDuration {
        kind: ResourceKind,
        duration: Duration,
    },
    BuildStarted {
        pipeline: String,
        job: String,
        build_name: String,
        build_id: i64,
        team_name: String,
    },
    BuildFinished {
        pipeline: String,
        job: String,
        build_name: String,
        build_id: i64,
        build_status: String,
        duration: Duration,
        team_name: String,
    },
    SlowQuery(SlowQuery),
    HttpResponseTime {
        route: String,
        path: String,
        method: String,
        duration: Duration,
    },
    MeterDelta {
        meter: MeterKind,
        value: u64,
    },
}

fn attrs<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn collector_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Container => "container",
        ResourceKind::Volume => "volume",
    }
}

impl Event {
    /// Logging session the event is emitted under
    pub fn session(&self) -> String {
        match self {
            Event::SchedulingFullDuration { .. } => "full-scheduling-duration".to_string(),
            Event::SchedulingLoadVersionsDuration { .. } => "loading-versions-duration".to_string(),
            Event::SchedulingJobDuration { .. } => "job-scheduling-duration".to_string(),
            Event::WorkerContainers { .. } => "worker-containers".to_string(),
            Event::WorkerVolumes { .. } => "worker-volumes".to_string(),
            Event::ToBeGarbageCollected { kind, state, .. } => {
                format!("gc-found-{}-{}s-for-deletion", state, collector_label(*kind))
            }
            Event::CollectorJobDropped { kind, .. } => {
                format!("gc-{}-collector-dropped", collector_label(*kind))
            }
            Event::CollectorSweepDuration { kind, .. } => {
                format!("gc-{}-collector-duration", collector_label(*kind))
            }
            Event::BuildStarted { .. } => "build-started".to_string(),
            Event::BuildFinished { .. } => "build-finished".to_string(),
            Event::SlowQuery(_) => "slow-queries".to_string(),
            Event::HttpResponseTime { .. } => "http-response-time".to_string(),
            Event::MeterDelta { meter, .. } => format!("meter-{}", meter.name().replace(' ', "-")),
        }
    }

    /// Render the event into a flat metric record stamped with `at`
    pub fn render(&self, at: DateTime<Utc>) -> MetricEvent {
        let (name, value, severity, attributes) = match self {
            Event::SchedulingFullDuration { pipeline, duration } => (
                "scheduling: full duration (ms)".to_string(),
                ms(*duration),
                duration_severity(*duration),
                attrs([("pipeline", pipeline.clone())]),
            ),
            Event::SchedulingLoadVersionsDuration { pipeline, duration } => (
                "scheduling: loading versions duration (ms)".to_string(),
                ms(*duration),
                duration_severity(*duration),
                attrs([("pipeline", pipeline.clone())]),
            ),
            Event::SchedulingJobDuration {
                pipeline,
                job,
                duration,
            } => (
                "scheduling: job duration (ms)".to_string(),
                ms(*duration),
                duration_severity(*duration),
                attrs([("pipeline", pipeline.clone()), ("job", job.clone())]),
            ),
            Event::WorkerContainers { worker, containers } => (
                "worker containers".to_string(),
                *containers as f64,
                Severity::Ok,
                attrs([("worker", worker.clone())]),
            ),
            Event::WorkerVolumes { worker, volumes } => (
                "worker volumes".to_string(),
                *volumes as f64,
                Severity::Ok,
                attrs([("worker", worker.clone())]),
            ),
            Event::ToBeGarbageCollected { kind, state, count } => (
                format!(
                    "{} {}s to be garbage collected",
                    state,
                    collector_label(*kind)
                ),
                *count as f64,
                Severity::Ok,
                BTreeMap::new(),
            ),
            Event::CollectorJobDropped { kind, worker } => (
                format!("GC {} collector job dropped", collector_label(*kind)),
                1.0,
                Severity::Ok,
                attrs([("worker", worker.clone())]),
            ),
            Event::CollectorSweepDuration { kind, duration } => (
                format!("GC {} collector duration (ms)", collector_label(*kind)),
                ms(*duration),
                duration_severity(*duration),
                BTreeMap::new(),
            ),
            Event::BuildStarted {
                pipeline,
                job,
                build_name,
                build_id,
                team_name,
            } => (
                "build started".to_string(),
                *build_id as f64,
                Severity::Ok,
                attrs([
                    ("pipeline", pipeline.clone()),
                    ("job", job.clone()),
                    ("build_name", build_name.clone()),
                    ("build_id", build_id.to_string()),
                    ("team_name", team_name.clone()),
                ]),
            ),
            Event::BuildFinished {
                pipeline,
                job,
                build_name,
                build_id,
                build_status,
                duration,
                team_name,
            } => (
                "build finished".to_string(),
                ms(*duration),
                Severity::Ok,
                attrs([
                    ("pipeline", pipeline.clone()),
                    ("job", job.clone()),
                    ("build_name", build_name.clone()),
                    ("build_id", build_id.to_string()),
                    ("build_status", build_status.clone()),
                    ("team_name", team_name.clone()),
                ]),
            ),
            Event::SlowQuery(query) => (
                "slow queries".to_string(),
                ms(query.avg_time),
                Severity::Ok,
                attrs([
                    ("calls", query.calls.to_string()),
                    ("total_time_sec", sec(query.total_time).to_string()),
                    ("rows", query.rows.to_string()),
                    ("hit_percent", query.hit_percent.to_string()),
                    ("sql_statement", query.sql_statement.clone()),
                ]),
            ),
            Event::HttpResponseTime {
                route,
                path,
                method,
                duration,
            } => (
                "http response time".to_string(),
                ms(*duration),
                http_severity(*duration),
                attrs([
                    ("route", route.clone()),
                    ("path", path.clone()),
                    ("method", method.clone()),
                ]),
            ),
            Event::MeterDelta { meter, value } => (
                meter.name().to_string(),
                *value as f64,
                Severity::Ok,
                BTreeMap::new(),
            ),
        };

        MetricEvent {
            name,
            value,
            severity,
            attributes,
            timestamp: at,
        }
    }
}

/// Process-wide telemetry handles, built once at startup and passed down
#[derive(Clone)]
pub struct Telemetry {
    pub emitter: Arc<Emitter>,
    pub meters: Arc<Meters>,
}

impl Telemetry {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            emitter: Arc::new(emitter),
            meters: Arc::new(Meters::default()),
        }
    }

    pub fn emit(&self, event: Event) {
        self.emitter.emit(event);
    }
}
