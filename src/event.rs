//! Statement lifecycle events and the seam between sources and listeners.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::LoggerConfig;
use crate::tracer::QueryTracer;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one statement from *started* until its terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(u64);

impl QueryId {
    /// Allocate an id that is unique within the process.
    pub fn next() -> Self {
        Self(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for QueryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fired before a statement runs.
#[derive(Debug, Clone, Copy)]
pub struct QueryStarted<'a> {
    pub id: QueryId,
    pub sql: &'a str,
    pub parameters: &'a [Json],
}

/// Fired when a statement returned an error.
#[derive(Debug, Clone, Copy)]
pub struct QueryFailed<'a> {
    pub id: QueryId,
    pub error: &'a str,
}

/// Fired when a statement returned successfully.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompleted {
    pub id: QueryId,
    pub rows_affected: Option<u64>,
}

/// Observer of statement lifecycle events.
///
/// Handlers run inline on the source's execution path. Implementations must
/// return quickly and must not panic.
pub trait QueryListener: Send + Sync {
    fn on_started(&self, event: &QueryStarted<'_>);

    fn on_failed(&self, event: &QueryFailed<'_>);

    fn on_completed(&self, event: &QueryCompleted);
}

/// Anything that executes statements and can report their lifecycle.
pub trait QueryEventSource {
    fn subscribe(&mut self, listener: Arc<dyn QueryListener>);
}

/// Attach a fresh [`QueryTracer`] to `source` and hand the source back.
///
/// Every call gets its own tracer, so several differently configured tracers can
/// observe the same source without sharing state.
///
/// ```rust,ignore
/// use sea_orm_query_logger::{attach, LoggerConfig, ObservedConnection};
///
/// let db = attach(ObservedConnection::from(db), LoggerConfig::default());
/// ```
pub fn attach<S>(mut source: S, config: LoggerConfig) -> S
where
    S: QueryEventSource,
{
    source.subscribe(Arc::new(QueryTracer::new(config)));
    source
}
