//! Destinations for rendered query lines.

/// Receives one call per completed statement.
///
/// Arguments follow a `"{} {}"` layout: the duration label first, then the
/// statement with its parameters inlined.
///
/// Any `Fn(&str, &str)` closure is a sink:
///
/// ```rust
/// use sea_orm_query_logger::LoggerConfig;
///
/// let config = LoggerConfig::default()
///     .with_sink_fn(|label: &str, statement: &str| eprintln!("{label} {statement}"));
/// ```
pub trait QuerySink: Send + Sync {
    fn log(&self, label: &str, statement: &str);
}

impl<F> QuerySink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn log(&self, label: &str, statement: &str) {
        self(label, statement)
    }
}

/// Default sink. Emits an `INFO` event under the `sea_orm_query_logger` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl QuerySink for TracingSink {
    fn log(&self, label: &str, statement: &str) {
        tracing::info!(target: "sea_orm_query_logger", "{} {}", label, statement);
    }
}

/// Prints each line to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl QuerySink for StdoutSink {
    fn log(&self, label: &str, statement: &str) {
        println!("{label} {statement}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_sink_receives_label_then_statement() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = move |label: &str, statement: &str| {
            captured
                .lock()
                .unwrap()
                .push((label.to_string(), statement.to_string()));
        };

        sink.log("SQL (0.100 ms)", "SELECT 1");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("SQL (0.100 ms)".to_string(), "SELECT 1".to_string())]
        );
    }

    #[test]
    fn test_builtin_sinks_do_not_panic() {
        TracingSink.log("SQL (1.000 ms)", "SELECT 1");
        StdoutSink.log("SQL (1.000 ms)", "SELECT 1");
    }
}
