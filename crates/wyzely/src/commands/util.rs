//! Shared helpers for command handlers.

use serde_json::Value;

use crate::cli::GlobalOpts;
use crate::output;

/// Parse a command-line value as JSON, falling back to a plain string.
///
/// `1` and `true` keep their types; `on` or `P3` stay strings.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// A JSON value as bare text: strings unquoted, everything else as JSON.
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether this invocation renders color.
pub fn color(global: &GlobalOpts) -> bool {
    output::should_color(&global.color)
}

/// `-` for missing values in detail views.
pub fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_values_keep_their_type() {
        assert_eq!(parse_value("1"), json!(1));
        assert_eq!(parse_value(" true "), json!(true));
        assert_eq!(parse_value("\"3\""), json!("3"));
        assert_eq!(parse_value("on"), json!("on"));
    }

    #[test]
    fn plain_strips_string_quotes() {
        assert_eq!(plain(&json!("1")), "1");
        assert_eq!(plain(&json!(2)), "2");
    }

    #[test]
    fn dash_for_none() {
        assert_eq!(or_dash(None::<u8>), "-");
        assert_eq!(or_dash(Some(-55)), "-55");
    }
}
