use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::format_scalar;

/// Print an envelope as tables: scalar fields first, then one table per
/// array of records (allocations, frontier points, report lines).
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => {
                print_object(result);
                print_footer(map);
            }
            Some(Value::Array(rows)) => {
                print_records(rows);
                print_footer(map);
            }
            _ => print_object(map),
        },
        Value::Array(arr) => print_records(arr),
        _ => println!("{}", format_scalar(value)),
    }
}

fn print_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut nested: Vec<(&str, &[Value])> = Vec::new();
    for (key, val) in map {
        match val {
            Value::Array(arr) if arr.first().map(Value::is_object).unwrap_or(false) => {
                nested.push((key.as_str(), arr.as_slice()));
            }
            Value::Object(inner) => {
                for (k, v) in inner {
                    builder.push_record([format!("{}.{}", key, k), cell(v)]);
                }
            }
            _ => builder.push_record([key.clone(), format_scalar(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for (key, rows) in nested {
        println!("\n{}:", key);
        print_records(rows);
    }
}

fn print_records(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        if rows.is_empty() {
            println!("(empty)");
        }
        for item in rows {
            println!("{}", format_scalar(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for item in rows {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(cell).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }
    println!("{}", Table::from(builder));
}

/// Nested objects inside a record cell are flattened to `k=v` pairs.
fn cell(value: &Value) -> String {
    match value {
        Value::Object(inner) => inner
            .iter()
            .map(|(k, v)| format!("{}={}", k, format_scalar(v)))
            .collect::<Vec<_>>()
            .join(" "),
        other => format_scalar(other),
    }
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}
