use redis::Value;
use std::fmt::Write;

/// Single-line rendering: control characters escaped, binary shown as hex.
pub fn format_bytes_inline(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "(empty)".to_string();
    }

    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(is_printable_char) => escape_inline(text),
        _ => hex_inline(bytes),
    }
}

/// Pretty-prints JSON; anything else comes back unchanged.
pub fn format_json_pretty(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

pub fn escape_inline(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Renders a command reply the way `redis-cli` does.
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    render_into(&mut out, value, 0);
    out
}

fn render_into(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Nil => out.push_str("(nil)"),
        Value::Int(n) => {
            write!(out, "(integer) {}", n).ok();
        }
        Value::Double(n) => {
            write!(out, "(double) {}", n).ok();
        }
        Value::Boolean(b) => {
            write!(out, "({})", b).ok();
        }
        Value::Okay => out.push_str("OK"),
        Value::SimpleString(s) => out.push_str(s),
        Value::BulkString(bytes) => {
            write!(out, "\"{}\"", format_bytes_inline(bytes)).ok();
        }
        Value::VerbatimString { text, .. } => {
            write!(out, "\"{}\"", escape_inline(text)).ok();
        }
        Value::Array(items) | Value::Set(items) => render_items(out, items, depth),
        Value::Map(pairs) => {
            if pairs.is_empty() {
                out.push_str("(empty hash)");
                return;
            }
            let flat: Vec<Value> = pairs
                .iter()
                .flat_map(|(k, v)| [k.clone(), v.clone()])
                .collect();
            render_items(out, &flat, depth);
        }
        other => {
            write!(out, "{:?}", other).ok();
        }
    }
}

fn render_items(out: &mut String, items: &[Value], depth: usize) {
    if items.is_empty() {
        out.push_str("(empty array)");
        return;
    }
    let indent = "   ".repeat(depth);
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
            out.push_str(&indent);
        }
        write!(out, "{}) ", idx + 1).ok();
        render_into(out, item, depth + 1);
    }
}

fn is_printable_char(ch: char) -> bool {
    if ch.is_control() {
        matches!(ch, '\n' | '\r' | '\t')
    } else {
        true
    }
}

fn hex_inline(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (idx, byte) in bytes.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        write!(out, "{:02X}", byte).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_escapes_control_characters() {
        assert_eq!(format_bytes_inline(b"a\nb\tc"), "a\\nb\\tc");
        assert_eq!(format_bytes_inline(&[0x00, 0xFF, 0x10]), "00 FF 10");
        assert_eq!(format_bytes_inline(b""), "(empty)");
    }

    #[test]
    fn json_is_pretty_printed() {
        assert_eq!(format_json_pretty(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(format_json_pretty("not-json"), "not-json");
    }

    #[test]
    fn replies_render_like_the_cli() {
        assert_eq!(render_value(&Value::Nil), "(nil)");
        assert_eq!(render_value(&Value::Int(3)), "(integer) 3");
        assert_eq!(render_value(&Value::Okay), "OK");
        assert_eq!(render_value(&Value::Array(vec![])), "(empty array)");
        let nested = Value::Array(vec![
            Value::BulkString(b"a".to_vec()),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        ]);
        assert_eq!(
            render_value(&nested),
            "1) \"a\"\n2) 1) (integer) 1\n   2) (integer) 2"
        );
    }
}
