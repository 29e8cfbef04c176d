//! Observed database connection wrapper.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement,
    StreamTrait,
};
use serde_json::Value as Json;
use tracing::{Instrument, Span};

use crate::config::LoggerConfig;
use crate::event::{
    attach, QueryCompleted, QueryEventSource, QueryFailed, QueryId, QueryListener, QueryStarted,
};
use crate::render::{json_from_value, numbered_to_positional};

/// Placeholder written into *started* statement text for each bound value.
///
/// MySQL and SQLite statements already use it; Postgres `$N` markers are
/// rewritten to it. Tracers attached to an [`ObservedConnection`] should keep the
/// default placeholder.
pub const POSITIONAL_MARKER: char = '?';

/// A wrapper around SeaORM's `DatabaseConnection` that reports every statement
/// to its subscribed [`QueryListener`]s.
///
/// It implements `ConnectionTrait` and `StreamTrait`, so entity queries run
/// against it exactly as they would against the inner connection. Each statement
/// fires *started* before it runs, then *failed* or *completed* once it returns.
/// A statement whose future is dropped before it finishes (a timeout, a
/// `select!` branch that lost) fires *failed*.
///
/// Streams complete when they are exhausted, so the logged duration includes
/// fetching every row. An error partway through, or dropping the stream early,
/// fires *failed*.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sea_orm_query_logger::QueryLoggerExt;
///
/// let db = Database::connect("postgres://localhost/mydb").await?;
/// let db = db.with_query_logger();
///
/// // SQL (0.412 ms) SELECT "users"."id", ... WHERE "users"."id" = 1
/// let user = Users::find_by_id(1).one(&db).await?;
/// ```
pub struct ObservedConnection {
    inner: DatabaseConnection,
    listeners: Vec<Arc<dyn QueryListener>>,
}

impl ObservedConnection {
    /// Wrap a connection with no listeners attached.
    pub fn new(connection: DatabaseConnection) -> Self {
        Self {
            inner: connection,
            listeners: Vec::new(),
        }
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Fire *started* and return the guard that owes the terminal event.
    fn begin(&self, sql: &str, parameters: &[Json]) -> (InFlight<'_>, Span) {
        let id = QueryId::next();
        let event = QueryStarted {
            id,
            sql,
            parameters,
        };
        for listener in &self.listeners {
            listener.on_started(&event);
        }

        let span = tracing::debug_span!("db.query", query.id = id.get());
        let in_flight = InFlight {
            listeners: &self.listeners,
            id,
            armed: true,
        };
        (in_flight, span)
    }

    fn start_statement(&self, stmt: &Statement) -> (InFlight<'_>, Span) {
        let parameters: Vec<Json> = stmt
            .values
            .as_ref()
            .map(|values| values.0.iter().map(json_from_value).collect())
            .unwrap_or_default();

        match self.get_database_backend() {
            DbBackend::Postgres => {
                let (sql, parameters) =
                    numbered_to_positional(&stmt.sql, &parameters, POSITIONAL_MARKER);
                self.begin(&sql, &parameters)
            }
            DbBackend::MySql | DbBackend::Sqlite => self.begin(&stmt.sql, &parameters),
        }
    }
}

/// A started statement that still owes its listeners a terminal event.
///
/// Dropping it without settling fires *failed*.
struct InFlight<'a> {
    listeners: &'a [Arc<dyn QueryListener>],
    id: QueryId,
    armed: bool,
}

impl InFlight<'_> {
    fn succeed(mut self, rows_affected: Option<u64>) {
        self.armed = false;
        let event = QueryCompleted {
            id: self.id,
            rows_affected,
        };
        for listener in self.listeners {
            listener.on_completed(&event);
        }
    }

    fn fail(mut self, error: &str) {
        self.armed = false;
        self.emit_failed(error);
    }

    fn settle<T>(self, result: &Result<T, DbErr>, rows_affected: impl FnOnce(&T) -> Option<u64>) {
        match result {
            Ok(value) => self.succeed(rows_affected(value)),
            Err(e) => self.fail(&e.to_string()),
        }
    }

    fn emit_failed(&self, error: &str) {
        let event = QueryFailed { id: self.id, error };
        for listener in self.listeners {
            listener.on_failed(&event);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(query.id = %self.id, "Statement dropped before it finished");
            self.emit_failed("statement dropped before it finished");
        }
    }
}

/// Row stream returned by [`ObservedConnection`]; fires the terminal event once
/// the inner stream ends or errors.
pub struct ObservedStream<'a, S> {
    inner: Pin<Box<S>>,
    in_flight: Option<InFlight<'a>>,
    rows: u64,
}

impl<'a, S> ObservedStream<'a, S> {
    fn new(inner: S, in_flight: InFlight<'a>) -> Self {
        Self {
            inner: Box::pin(inner),
            in_flight: Some(in_flight),
            rows: 0,
        }
    }
}

impl<S> Stream for ObservedStream<'_, S>
where
    S: Stream<Item = Result<QueryResult, DbErr>>,
{
    type Item = Result<QueryResult, DbErr>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(this.inner.as_mut().poll_next(cx));

        match &item {
            Some(Ok(_)) => this.rows += 1,
            Some(Err(e)) => {
                if let Some(in_flight) = this.in_flight.take() {
                    in_flight.fail(&e.to_string());
                }
            }
            None => {
                if let Some(in_flight) = this.in_flight.take() {
                    in_flight.succeed(Some(this.rows));
                }
            }
        }

        Poll::Ready(item)
    }
}

impl fmt::Debug for ObservedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedConnection")
            .field("inner", &self.inner)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl QueryEventSource for ObservedConnection {
    fn subscribe(&mut self, listener: Arc<dyn QueryListener>) {
        self.listeners.push(listener);
    }
}

impl From<DatabaseConnection> for ObservedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::new(connection)
    }
}

impl AsRef<DatabaseConnection> for ObservedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

#[async_trait]
impl ConnectionTrait for ObservedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let (in_flight, span) = self.start_statement(&stmt);

        let result = self.inner.execute(stmt).instrument(span).await;

        in_flight.settle(&result, |r| Some(r.rows_affected()));
        result
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        // No bound values, so the text is logged as written.
        let (in_flight, span) = self.begin(sql, &[]);

        let result = self.inner.execute_unprepared(sql).instrument(span).await;

        in_flight.settle(&result, |r| Some(r.rows_affected()));
        result
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let (in_flight, span) = self.start_statement(&stmt);

        let result = self.inner.query_one(stmt).instrument(span).await;

        in_flight.settle(&result, |row| Some(u64::from(row.is_some())));
        result
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let (in_flight, span) = self.start_statement(&stmt);

        let result = self.inner.query_all(stmt).instrument(span).await;

        in_flight.settle(&result, |rows| Some(rows.len() as u64));
        result
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

#[async_trait]
impl StreamTrait for ObservedConnection {
    type Stream<'a> = ObservedStream<'a, <DatabaseConnection as StreamTrait>::Stream<'a>>;

    fn stream<'a>(
        &'a self,
        stmt: Statement,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Stream<'a>, DbErr>> + 'a + Send>> {
        let (in_flight, span) = self.start_statement(&stmt);

        Box::pin(async move {
            match self.inner.stream(stmt).instrument(span).await {
                Ok(stream) => Ok(ObservedStream::new(stream, in_flight)),
                Err(e) => {
                    in_flight.fail(&e.to_string());
                    Err(e)
                }
            }
        })
    }
}

/// Extension trait for attaching a query logger to a connection.
pub trait QueryLoggerExt {
    /// Wrap this connection and log its statements with the default configuration.
    fn with_query_logger(self) -> ObservedConnection;

    /// Wrap this connection and log its statements with `config`.
    fn with_query_logger_config(self, config: LoggerConfig) -> ObservedConnection;
}

impl QueryLoggerExt for DatabaseConnection {
    fn with_query_logger(self) -> ObservedConnection {
        self.with_query_logger_config(LoggerConfig::default())
    }

    fn with_query_logger_config(self, config: LoggerConfig) -> ObservedConnection {
        attach(ObservedConnection::new(self), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::QueryTracer;
    use futures::StreamExt;
    use sea_orm::{MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn recording_config() -> (LoggerConfig, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let config = LoggerConfig::default().with_sink_fn(move |label: &str, sql: &str| {
            captured.lock().unwrap().push(format!("{label} {sql}"));
        });
        (config, lines)
    }

    fn insert_statement() -> Statement {
        Statement::from_sql_and_values(
            DbBackend::MySql,
            "INSERT INTO users (name, age) VALUES (?, ?)",
            [
                Value::String(Some(Box::new("ann".to_string()))),
                Value::Int(Some(30)),
            ],
        )
    }

    #[tokio::test]
    async fn test_successful_execute_logs_rendered_statement() {
        let (config, lines) = recording_config();
        let db = MockDatabase::new(DbBackend::MySql)
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection()
            .with_query_logger_config(config);

        let result = db.execute(insert_statement()).await.unwrap();
        assert_eq!(result.rows_affected(), 1);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("SQL ("));
        assert!(lines[0].ends_with(" ms) INSERT INTO users (name, age) VALUES (\"ann\", 30)"));
    }

    #[tokio::test]
    async fn test_failed_execute_logs_nothing() {
        let (config, lines) = recording_config();
        // An empty mock has no results queued, so every statement errors.
        let db = MockDatabase::new(DbBackend::MySql)
            .into_connection()
            .with_query_logger_config(config);

        let result = db.execute(insert_statement()).await;
        assert!(result.is_err());
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unprepared_statement_is_logged_verbatim() {
        let (config, lines) = recording_config();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection()
            .with_query_logger_config(config);

        db.execute_unprepared("SELECT 1").await.unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" ms) SELECT 1"));
    }

    #[tokio::test]
    async fn test_every_attached_tracer_logs() {
        let (first, first_lines) = recording_config();
        let (second, second_lines) = recording_config();
        let inner = MockDatabase::new(DbBackend::MySql)
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection();

        let db = attach(attach(ObservedConnection::from(inner), first), second);
        assert_eq!(db.listener_count(), 2);

        db.execute(insert_statement()).await.unwrap();

        assert_eq!(first_lines.lock().unwrap().len(), 1);
        assert_eq!(second_lines.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrapper_delegates_backend() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .into_connection()
            .with_query_logger();

        assert_eq!(db.get_database_backend(), DbBackend::Postgres);
        assert!(db.is_mock_connection());
        assert_eq!(db.listener_count(), 1);
    }

    fn observed_with_tracer(
        inner: DatabaseConnection,
    ) -> (ObservedConnection, Arc<QueryTracer>, Arc<Mutex<Vec<String>>>) {
        let (config, lines) = recording_config();
        let tracer = Arc::new(QueryTracer::new(config));
        let mut db = ObservedConnection::from(inner);
        db.subscribe(tracer.clone());
        (db, tracer, lines)
    }

    #[tokio::test]
    async fn test_postgres_numbered_markers_are_inlined() {
        let (config, lines) = recording_config();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection()
            .with_query_logger_config(config);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "INSERT INTO users (name, age) VALUES ($1, $2)",
            [
                Value::String(Some(Box::new("ann".to_string()))),
                Value::Int(Some(30)),
            ],
        );
        db.execute(stmt).await.unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" ms) INSERT INTO users (name, age) VALUES (\"ann\", 30)"));
    }

    #[tokio::test]
    async fn test_postgres_repeated_marker_reuses_value() {
        let (config, lines) = recording_config();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection()
            .with_query_logger_config(config);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE users SET age = $2 WHERE name = $1 OR nick = $1",
            [
                Value::String(Some(Box::new("ann".to_string()))),
                Value::Int(Some(31)),
            ],
        );
        db.execute(stmt).await.unwrap();

        assert!(lines.lock().unwrap()[0]
            .ends_with(" ms) UPDATE users SET age = 31 WHERE name = \"ann\" OR nick = \"ann\""));
    }

    #[tokio::test]
    async fn test_unsettled_statement_fires_failed_on_drop() {
        let (db, tracer, lines) =
            observed_with_tracer(MockDatabase::new(DbBackend::MySql).into_connection());

        let (in_flight, _span) = db.start_statement(&insert_statement());
        assert_eq!(tracer.in_flight(), 1);
        drop(in_flight);

        assert_eq!(tracer.in_flight(), 0);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stream_future_leaves_nothing_in_flight() {
        let (db, tracer, lines) =
            observed_with_tracer(MockDatabase::new(DbBackend::MySql).into_connection());

        let pending = db.stream(insert_statement());
        assert_eq!(tracer.in_flight(), 1);
        drop(pending);

        assert_eq!(tracer.in_flight(), 0);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_completes_when_drained() {
        let inner = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![
                BTreeMap::from([("id", Value::Int(Some(1)))]),
                BTreeMap::from([("id", Value::Int(Some(2)))]),
            ]])
            .into_connection();
        let (db, tracer, lines) = observed_with_tracer(inner);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT id FROM users WHERE active = $1",
            [Value::Bool(Some(true))],
        );
        let mut stream = db.stream(stmt).await.unwrap();
        assert_eq!(tracer.in_flight(), 1);
        assert!(lines.lock().unwrap().is_empty());

        let mut rows = 0;
        while let Some(row) = stream.next().await {
            row.unwrap();
            rows += 1;
        }

        assert_eq!(rows, 2);
        assert_eq!(tracer.in_flight(), 0);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" ms) SELECT id FROM users WHERE active = true"));
    }
}
