//! Rendering of statements and durations into a single readable line.

use std::fmt::Debug;

use sea_orm::Value;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::QueryLogError;

/// Substitute positional placeholders in `sql` with the JSON form of `parameters`.
///
/// The text is split on every occurrence of `placeholder`. Between part `i` and
/// part `i + 1` the `i`-th parameter is inserted, or nothing when there are fewer
/// parameters than placeholders. Surplus parameters are dropped.
///
/// A placeholder character inside a quoted literal is indistinguishable from a
/// real marker and gets substituted as well.
pub fn render_statement(sql: &str, parameters: &[Json], placeholder: char) -> String {
    let mut rendered = String::with_capacity(sql.len());

    for (index, part) in sql.split(placeholder).enumerate() {
        if index > 0 {
            if let Some(value) = parameters.get(index - 1) {
                rendered.push_str(&render_parameter(value));
            }
        }
        rendered.push_str(part);
    }

    rendered
}

/// JSON text for a single parameter; strings keep their quotes.
///
/// `Display` on a JSON value is its compact encoding and cannot fail. Values that
/// refuse to serialize are caught earlier, in [`bind_parameter`].
pub fn render_parameter(value: &Json) -> String {
    value.to_string()
}

/// Rewrite numbered `$N` markers into single-character positional ones.
///
/// Parameters are reordered, and repeated when a marker is reused, so the `i`-th
/// `marker` in the returned text pairs with the `i`-th returned parameter. A `$N`
/// with no matching parameter is removed, which renders as the empty string just
/// like a missing positional parameter. A `$` not followed by digits is kept.
pub fn numbered_to_positional(sql: &str, parameters: &[Json], marker: char) -> (String, Vec<Json>) {
    let mut text = String::with_capacity(sql.len());
    let mut ordered = Vec::with_capacity(parameters.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '$' {
            text.push(c);
            continue;
        }

        let mut end = start + 1;
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + 1;
            chars.next();
        }

        match sql[start + 1..end].parse::<usize>() {
            Ok(n) => {
                if let Some(value) = n.checked_sub(1).and_then(|i| parameters.get(i)) {
                    text.push(marker);
                    ordered.push(value.clone());
                }
            }
            Err(_) => text.push_str(&sql[start..end]),
        }
    }

    (text, ordered)
}

/// Convert any serializable value into a bound parameter.
///
/// Values serde_json refuses (maps keyed by non-strings, for instance) are kept
/// as their `Debug` string rather than failing the caller.
pub fn bind_parameter<T>(value: &T) -> Json
where
    T: Serialize + Debug + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => {
            let err = QueryLogError::from(e);
            tracing::warn!(error = %err, "Parameter is not representable as JSON");
            Json::String(format!("{value:?}"))
        }
    }
}

/// Map a sea-orm bound value onto JSON.
///
/// NULLs of every type become `null`, as do non-finite floats. Byte strings are
/// decoded lossily so they stay readable. Dates and times use ISO 8601, uuids
/// their hyphenated form, decimals a JSON number, and JSON columns pass through.
/// Types behind features this crate was built without fall back to `Debug`.
pub fn json_from_value(value: &Value) -> Json {
    match value {
        Value::Bool(v) => v.map_or(Json::Null, Json::Bool),
        Value::TinyInt(v) => v.map_or(Json::Null, Json::from),
        Value::SmallInt(v) => v.map_or(Json::Null, Json::from),
        Value::Int(v) => v.map_or(Json::Null, Json::from),
        Value::BigInt(v) => v.map_or(Json::Null, Json::from),
        Value::TinyUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::SmallUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::Unsigned(v) => v.map_or(Json::Null, Json::from),
        Value::BigUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::Float(v) => v.map_or(Json::Null, Json::from),
        Value::Double(v) => v.map_or(Json::Null, Json::from),
        Value::String(v) => v
            .as_deref()
            .map_or(Json::Null, |s| Json::String(s.clone())),
        Value::Char(v) => v.map_or(Json::Null, |c| Json::String(c.to_string())),
        Value::Bytes(v) => v.as_deref().map_or(Json::Null, |bytes| {
            Json::String(String::from_utf8_lossy(bytes).into_owned())
        }),
        #[cfg(feature = "with-json")]
        Value::Json(v) => v.as_deref().map_or(Json::Null, Clone::clone),
        #[cfg(feature = "with-chrono")]
        Value::ChronoDate(v) => v.as_deref().map_or(Json::Null, |d| Json::String(d.to_string())),
        #[cfg(feature = "with-chrono")]
        Value::ChronoTime(v) => v.as_deref().map_or(Json::Null, |t| Json::String(t.to_string())),
        #[cfg(feature = "with-chrono")]
        Value::ChronoDateTime(v) => v.as_deref().map_or(Json::Null, |dt| {
            Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        #[cfg(feature = "with-chrono")]
        Value::ChronoDateTimeUtc(v) => v
            .as_deref()
            .map_or(Json::Null, |dt| Json::String(dt.to_rfc3339())),
        #[cfg(feature = "with-chrono")]
        Value::ChronoDateTimeLocal(v) => v
            .as_deref()
            .map_or(Json::Null, |dt| Json::String(dt.to_rfc3339())),
        #[cfg(feature = "with-chrono")]
        Value::ChronoDateTimeWithTimeZone(v) => v
            .as_deref()
            .map_or(Json::Null, |dt| Json::String(dt.to_rfc3339())),
        #[cfg(feature = "with-uuid")]
        Value::Uuid(v) => v.as_deref().map_or(Json::Null, |u| Json::String(u.to_string())),
        #[cfg(feature = "with-rust_decimal")]
        Value::Decimal(v) => v.as_deref().map_or(Json::Null, |d| {
            let text = d.to_string();
            text.parse::<serde_json::Number>()
                .map_or(Json::String(text), Json::Number)
        }),
        // time, bigdecimal, arrays and other sea-orm extras
        #[allow(unreachable_patterns)]
        other => Json::String(format!("{other:?}")),
    }
}

/// Label carrying the rounded duration, e.g. `SQL (1.250 ms)`.
pub fn format_duration_label(duration_ms: f64, precision: usize) -> String {
    format!("SQL ({duration_ms:.precision$} ms)")
}
