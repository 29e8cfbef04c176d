//! # sea-orm-query-logger
//!
//! Timed, human-readable SQL logging for SeaORM database operations.
//!
//! Every statement that completes successfully produces one line containing its
//! duration and the SQL with bound parameters written inline, ready to paste into
//! a SQL client:
//!
//! ```text
//! SQL (0.412 ms) SELECT * FROM users WHERE name = "ann" AND age = 30
//! ```
//!
//! Failed statements produce no line. Logging never interferes with the statement
//! itself: a missing record, a value that will not serialize, or a panicking sink
//! all degrade to a skipped or partial line.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sea_orm_query_logger::QueryLoggerExt;
//!
//! let db = Database::connect("postgres://localhost/mydb").await?;
//! let db = db.with_query_logger();
//!
//! let users = Users::find().all(&db).await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use sea_orm_query_logger::{attach, LoggerConfig, ObservedConnection, StdoutSink};
//!
//! let config = LoggerConfig::default()
//!     .with_sink(StdoutSink)   // default: a `tracing` INFO event
//!     .with_precision(2);      // default: 3 decimal places
//!
//! let db = attach(ObservedConnection::from(db), config);
//! ```
//!
//! ## Other sources
//!
//! [`QueryTracer`] only depends on the [`QueryListener`] events, so any statement
//! executor that implements [`QueryEventSource`] can be logged with [`attach`].
//!
//! Substitution is a plain split on the placeholder character. A `?` inside a
//! quoted literal is replaced like any other. On Postgres the connection rewrites
//! sea-orm's `$N` markers to `?` first, so a literal `?` in Postgres SQL (the
//! jsonb operators, for instance) shifts the values that follow it.

mod config;
mod connection;
mod error;
mod event;
mod render;
mod sink;
mod tracer;

pub use config::LoggerConfig;
pub use connection::{ObservedConnection, ObservedStream, QueryLoggerExt, POSITIONAL_MARKER};
pub use error::QueryLogError;
pub use event::{
    attach, QueryCompleted, QueryEventSource, QueryFailed, QueryId, QueryListener, QueryStarted,
};
pub use render::{
    bind_parameter, format_duration_label, json_from_value, numbered_to_positional,
    render_parameter, render_statement,
};
pub use sink::{QuerySink, StdoutSink, TracingSink};
pub use tracer::{PendingQuery, QueryTracer};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{attach, LoggerConfig, ObservedConnection, QueryLoggerExt};
}
