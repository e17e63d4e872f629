use serde_json::Value;

use super::format_scalar;

/// Print just the headline number of the output.
///
/// Looks for well-known fields in priority order, descending into a nested
/// `performance` object, then falls back to the first field.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match headline(result_obj) {
        Some(line) => println!("{}", line),
        None => println!("{}", format_scalar(result_obj)),
    }
}

const PRIORITY_KEYS: [&str; 6] = [
    "sharpe_ratio",
    "risk_pct",
    "risk",
    "expected_return",
    "status",
    "observations",
];

fn headline(value: &Value) -> Option<String> {
    let map = value.as_object()?;

    for key in PRIORITY_KEYS {
        if let Some(val) = map.get(key) {
            if !val.is_null() {
                return Some(format_scalar(val));
            }
        }
    }
    if let Some(perf) = map.get("performance") {
        if let Some(line) = headline(perf) {
            return Some(line);
        }
    }

    map.iter()
        .next()
        .map(|(key, val)| format!("{}: {}", key, format_scalar(val)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headline_prefers_nested_sharpe() {
        let v = json!({"allocations": [], "performance": {"expected_return": 0.15, "risk": 0.18, "sharpe_ratio": 0.8333}});
        assert_eq!(headline(&v).unwrap(), "0.8333");
    }

    #[test]
    fn test_headline_falls_back_to_first_field() {
        let v = json!({"tickers": ["A"]});
        assert_eq!(headline(&v).unwrap(), "tickers: A");
    }
}
