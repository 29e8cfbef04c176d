//! Correlates lifecycle events into one timed line per completed statement.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value as Json;

use crate::config::LoggerConfig;
use crate::error::QueryLogError;
use crate::event::{QueryCompleted, QueryFailed, QueryId, QueryListener, QueryStarted};
use crate::render::{format_duration_label, render_statement};

/// A statement between its *started* and terminal event.
#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub sql: String,
    pub parameters: Vec<Json>,
    pub started_at: Instant,
}

/// Tracks in-flight statements and emits a line to the configured sink when one
/// completes.
///
/// Failed statements are dropped without output. The entry for an id is removed
/// on either terminal event, so an id that never terminates stays in the map for
/// the life of the tracer.
///
/// None of the handlers panic: a missing entry is skipped, and a panicking sink is
/// caught and reported through `tracing`.
#[derive(Debug)]
pub struct QueryTracer {
    config: LoggerConfig,
    pending: Mutex<HashMap<QueryId, PendingQuery>>,
}

impl QueryTracer {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Number of statements started but not yet terminated.
    pub fn in_flight(&self) -> usize {
        self.pending().len()
    }

    /// Start timing `id`. A second start for the same id replaces the first.
    pub fn record_start(&self, id: QueryId, sql: &str, parameters: &[Json]) {
        let query = PendingQuery {
            sql: sql.to_owned(),
            parameters: parameters.to_vec(),
            started_at: Instant::now(),
        };
        self.pending().insert(id, query);
    }

    /// Forget `id`. Unknown ids are ignored.
    pub fn discard(&self, id: QueryId) {
        self.pending().remove(&id);
    }

    /// Finish `id` and emit its line.
    pub fn finish(&self, id: QueryId) {
        let Some(query) = self.pending().remove(&id) else {
            tracing::debug!(query.id = %id, "Completion for untracked query, skipping");
            return;
        };

        let duration_ms = query.started_at.elapsed().as_secs_f64() * 1e3;
        let label = format_duration_label(duration_ms, self.config.precision);
        let statement = render_statement(&query.sql, &query.parameters, self.config.placeholder);

        if let Err(err) = self.dispatch(&label, &statement) {
            tracing::warn!(query.id = %id, error = %err, "Dropped query log line");
        }
    }

    fn dispatch(&self, label: &str, statement: &str) -> Result<(), QueryLogError> {
        let sink = &self.config.sink;
        panic::catch_unwind(AssertUnwindSafe(|| sink.log(label, statement))).map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            QueryLogError::SinkPanicked(message)
        })
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<QueryId, PendingQuery>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryListener for QueryTracer {
    fn on_started(&self, event: &QueryStarted<'_>) {
        self.record_start(event.id, event.sql, event.parameters);
    }

    fn on_failed(&self, event: &QueryFailed<'_>) {
        self.discard(event.id);
    }

    fn on_completed(&self, event: &QueryCompleted) {
        self.finish(event.id);
    }
}
