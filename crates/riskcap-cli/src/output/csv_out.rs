use serde_json::Value;
use std::io;

use super::{format_scalar, rows_of};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout. A result holding records (frontier points,
/// cloud portfolios, evolution dates) is written as one row per record;
/// otherwise as field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match body {
        Value::Array(arr) => write_records(&mut wtr, arr),
        Value::Object(map) => match rows_of(map) {
            Some((_, rows)) => write_records(&mut wtr, rows),
            None => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), format_scalar(val).as_str()]);
                }
            }
        },
        _ => {
            let _ = wtr.write_record([&format_scalar(body)]);
        }
    }

    let _ = wtr.flush();
}

fn write_records(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_scalar(item)]);
        }
        return;
    };

    let headers: Vec<String> = flatten(first).into_iter().map(|(k, _)| k).collect();
    let _ = wtr.write_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = flatten(map).into_iter().map(|(_, v)| v).collect();
            let _ = wtr.write_record(&row);
        }
    }
}

/// One level of nesting is spread into `parent.child` columns.
fn flatten(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut cols = Vec::new();
    for (key, val) in map {
        match val {
            Value::Object(inner) => {
                for (k, v) in inner {
                    cols.push((format!("{}.{}", key, k), format_scalar(v)));
                }
            }
            _ => cols.push((key.clone(), format_scalar(val))),
        }
    }
    cols
}
