//! JSON decoding helpers that keep enough context to debug upstream payloads.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Parse a response body, reporting the serde path and a snippet of the
/// offending line on failure.
pub fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let msg = msg.strip_suffix(&loc).unwrap_or(&msg);

        let mut out = String::new();
        if !path.is_empty() && path != "." {
            out.push_str(&format!("at path '{path}': "));
        }
        out.push_str(&format!(
            "{msg} (line {line} col {column})\n{}",
            snippet(body, line, column, 20)
        ));
        anyhow::anyhow!(out)
    })
}

/// Decode an already-parsed JSON value, naming the failing field path.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        if path.is_empty() || path == "." {
            anyhow::anyhow!("{}", err.inner())
        } else {
            anyhow::anyhow!("at path '{path}': {}", err.inner())
        }
    })
}

/// Show up to `context_len` characters on each side of the error column.
fn snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let chars: Vec<char> = target.chars().collect();
    let col = column.saturating_sub(1).min(chars.len());
    let start = col.saturating_sub(context_len);
    let end = (col + context_len).min(chars.len());

    let prefix = if start > 0 { "..." } else { "" };
    let suffix = if end < chars.len() { "..." } else { "" };
    let text: String = chars[start..end].iter().collect();
    let caret = " ".repeat(prefix.len() + (col - start)) + "^";

    format!("{prefix}{text}{suffix}\n{caret}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        #[allow(dead_code)]
        items: Vec<u32>,
    }

    #[test]
    fn parse_error_names_the_path() {
        let err = parse_json_with_context::<Envelope>(r#"{"items": [1, "two"]}"#)
            .expect_err("string in integer array must fail");
        let msg = err.to_string();
        assert!(msg.contains("items[1]"), "unexpected message: {msg}");
        assert!(msg.contains('^'), "snippet caret missing: {msg}");
    }

    #[test]
    fn value_error_names_the_path() {
        let value = serde_json::json!({ "items": [1, null] });
        let err = from_value_with_path::<Envelope>(value).expect_err("null is not a u32");
        assert!(err.to_string().contains("items[1]"));
    }

    #[test]
    fn snippet_truncates_long_lines() {
        let line = "x".repeat(100);
        let out = snippet(&line, 1, 50, 5);
        assert!(out.starts_with("..."));
        assert!(out.lines().next().is_some_and(|l| l.ends_with("...")));
    }
}
