//! Configuration for query logging.

use std::fmt;
use std::sync::Arc;

use crate::sink::{QuerySink, TracingSink};

/// Configuration options for a query tracer.
///
/// # Example
///
/// ```rust
/// use sea_orm_query_logger::{LoggerConfig, StdoutSink};
///
/// let config = LoggerConfig::default()
///     .with_sink(StdoutSink)
///     .with_precision(2);
/// ```
#[derive(Clone)]
pub struct LoggerConfig {
    /// Where rendered lines go.
    /// Default: [`TracingSink`]
    pub sink: Arc<dyn QuerySink>,

    /// Character marking a positional parameter in statement text.
    /// Default: `?`
    pub placeholder: char,

    /// Decimal places shown for the duration.
    /// Default: 3
    pub precision: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sink: Arc::new(TracingSink),
            placeholder: '?',
            precision: 3,
        }
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("sink", &"<dyn QuerySink>")
            .field("placeholder", &self.placeholder)
            .field("precision", &self.precision)
            .finish()
    }
}

impl LoggerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send rendered lines to `sink`.
    pub fn with_sink(mut self, sink: impl QuerySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Send rendered lines to a closure taking the label and the statement.
    pub fn with_sink_fn<F>(self, sink: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.with_sink(sink)
    }

    /// Use a different placeholder character.
    ///
    /// Only single-character markers are understood; numbered styles like `$1`
    /// are not rewritten.
    pub fn with_placeholder(mut self, placeholder: char) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Set how many decimal places of the millisecond duration are shown.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }
}
