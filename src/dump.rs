//! Diagnostic rendering: a deterministic, indented dump of a struct
//! instance for logs and test failure output. Not a wire format; there is no
//! way back from the text to an instance.

use crate::value::{MapKey, StructValue, Value};
use std::fmt::{self, Write};

const HEX_PREVIEW_LIMIT: usize = 32;

/// Indented textual form of `value`: one line per field in declared id
/// order, `unset` for empty slots, maps and sets in key order.
pub fn render(value: &StructValue) -> String {
    let mut out = String::new();
    render_struct(value, 0, &mut out);
    out
}

fn pad(indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn render_struct(value: &StructValue, indent: usize, out: &mut String) {
    out.push_str(&value.schema().name);
    out.push_str(" {\n");
    for (f, slot) in value.fields() {
        pad(indent + 1, out);
        out.push_str(&f.name);
        out.push_str(": ");
        match slot {
            None => out.push_str("unset"),
            Some(v) => render_value(v, indent + 1, out),
        }
        out.push('\n');
    }
    pad(indent, out);
    out.push('}');
}

fn render_value(v: &Value, indent: usize, out: &mut String) {
    match v {
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Byte(x) => {
            let _ = write!(out, "{}", x);
        }
        Value::I16(x) => {
            let _ = write!(out, "{}", x);
        }
        Value::I32(x) => {
            let _ = write!(out, "{}", x);
        }
        Value::I64(x) => {
            let _ = write!(out, "{}", x);
        }
        Value::Double(x) => {
            let _ = write!(out, "{}", x);
        }
        Value::Text(s) => {
            let _ = write!(out, "{:?}", s);
        }
        Value::Bytes(b) => render_bytes(b, out),
        Value::Struct(s) => render_struct(s, indent, out),
        Value::Map(m) => {
            if m.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            for (k, item) in m {
                pad(indent + 1, out);
                render_key(k, out);
                out.push_str(": ");
                render_value(item, indent + 1, out);
                out.push('\n');
            }
            pad(indent, out);
            out.push('}');
        }
        Value::Set(s) => {
            out.push('{');
            for (i, k) in s.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_key(k, out);
            }
            out.push('}');
        }
        Value::List(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for item in items {
                pad(indent + 1, out);
                render_value(item, indent + 1, out);
                out.push('\n');
            }
            pad(indent, out);
            out.push(']');
        }
    }
}

fn render_key(k: &MapKey, out: &mut String) {
    match k {
        MapKey::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        MapKey::Byte(x) => {
            let _ = write!(out, "{}", x);
        }
        MapKey::I16(x) => {
            let _ = write!(out, "{}", x);
        }
        MapKey::I32(x) => {
            let _ = write!(out, "{}", x);
        }
        MapKey::I64(x) => {
            let _ = write!(out, "{}", x);
        }
        MapKey::Text(s) => {
            let _ = write!(out, "{:?}", s);
        }
        MapKey::Bytes(b) => render_bytes(b, out),
    }
}

fn render_bytes(b: &[u8], out: &mut String) {
    out.push_str("0x");
    for x in b.iter().take(HEX_PREVIEW_LIMIT) {
        let _ = write!(out, "{:02x}", x);
    }
    if b.len() > HEX_PREVIEW_LIMIT {
        let _ = write!(out, ".. ({} bytes)", b.len());
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}
