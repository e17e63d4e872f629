pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render a scalar for a single cell. Floats are trimmed to 6 dp.
pub fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => trim_float(f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) if arr.iter().all(|v| !v.is_object() && !v.is_array()) => arr
            .iter()
            .map(format_scalar)
            .collect::<Vec<_>>()
            .join(", "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn trim_float(f: f64) -> String {
    let s = format!("{:.6}", f);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// First array of objects in `map`, by key order.
pub fn rows_of<'a>(map: &'a serde_json::Map<String, Value>) -> Option<(&'a str, &'a [Value])> {
    map.iter().find_map(|(k, v)| match v {
        Value::Array(arr) if arr.first().map(Value::is_object).unwrap_or(false) => {
            Some((k.as_str(), arr.as_slice()))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_formatting() {
        assert_eq!(format_scalar(&json!(0.5294117647)), "0.529412");
        assert_eq!(format_scalar(&json!(2.0)), "2");
        assert_eq!(format_scalar(&json!(12)), "12");
        assert_eq!(format_scalar(&json!(null)), "");
        assert_eq!(format_scalar(&json!([0.25, 0.75])), "0.25, 0.75");
    }

    #[test]
    fn test_rows_of_finds_object_arrays() {
        let v = json!({"status": "converged", "weights": [0.5, 0.5], "allocations": [{"name": "A"}]});
        let (key, rows) = rows_of(v.as_object().unwrap()).unwrap();
        assert_eq!(key, "allocations");
        assert_eq!(rows.len(), 1);
    }
}
