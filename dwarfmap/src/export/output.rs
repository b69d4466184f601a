//! Output tree navigation and the JSON writer.
//!
//! The document is a `serde_json::Value` whose object maps are
//! BTree-backed, so keys print in lexicographic order; line numbers are
//! zero-padded into the keys so that order is source order.

use serde_json::{Map, Value};
use std::io::{self, Write};

/// Descend to the object at `path`, creating objects along the way.
pub(crate) fn slot<'a>(root: &'a mut Value, path: &[String]) -> &'a mut Map<String, Value> {
    let mut current = root;
    for key in path {
        current = ensure_object(current)
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current)
}

pub(crate) fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Write the document with 4-space indentation. Arrays whose elements
/// are all numbers render on a single line; other arrays span lines.
pub fn write_pretty<W: Write>(value: &Value, out: &mut W) -> io::Result<()> {
    write_value(value, out, 0)
}

fn write_value<W: Write>(value: &Value, out: &mut W, indent: usize) -> io::Result<()> {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                return out.write_all(b"{}");
            }
            writeln!(out, "{{")?;
            let pad = " ".repeat(indent + 4);
            let mut first = true;
            for (key, entry) in map {
                if !first {
                    writeln!(out, ",")?;
                }
                first = false;
                write!(out, "{pad}{}: ", scalar_text(&Value::String(key.clone()))?)?;
                write_value(entry, out, indent + 4)?;
            }
            write!(out, "\n{}}}", " ".repeat(indent))
        }
        Value::Array(items) => {
            if items.iter().all(Value::is_number) {
                write!(out, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{}", scalar_text(item)?)?;
                }
                write!(out, "]")
            } else {
                writeln!(out, "[")?;
                let pad = " ".repeat(indent + 4);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(out, ",")?;
                    }
                    write!(out, "{pad}")?;
                    write_value(item, out, indent + 4)?;
                }
                write!(out, "\n{}]", " ".repeat(indent))
            }
        }
        scalar => {
            write!(out, "{}", scalar_text(scalar)?)
        }
    }
}

fn scalar_text(value: &Value) -> io::Result<String> {
    serde_json::to_string(value).map_err(io::Error::from)
}
