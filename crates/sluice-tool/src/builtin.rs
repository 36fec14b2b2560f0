//! Built-in text and JSON tools.
//!
//! These cover the common chaining cases (case conversion, line handling,
//! JSON formatting) so a fresh install can build useful pipelines without any
//! external tool catalog.

use serde_json::Value;

use crate::descriptor::ToolDescriptor;
use crate::error::ToolError;
use crate::registry::InMemoryToolRegistry;

/// A registry populated with every built-in tool.
pub fn builtin_registry() -> InMemoryToolRegistry {
  InMemoryToolRegistry::new()
    .with(text_tool("text-uppercase", "Uppercase", |s, _| {
      Ok(s.to_uppercase())
    }))
    .with(text_tool("text-lowercase", "Lowercase", |s, _| {
      Ok(s.to_lowercase())
    }))
    .with(text_tool("text-reverse", "Reverse", |s, _| {
      Ok(s.chars().rev().collect())
    }))
    .with(text_tool("text-trim", "Trim whitespace", |s, _| {
      Ok(s.trim().to_string())
    }))
    .with(text_tool("text-replace", "Find and replace", replace))
    .with(text_tool("lines-sort", "Sort lines", |s, options| {
      let mut lines: Vec<&str> = s.lines().collect();
      lines.sort_unstable();
      if options.get("descending").and_then(Value::as_bool) == Some(true) {
        lines.reverse();
      }
      Ok(lines.join("\n"))
    }))
    .with(text_tool("lines-dedupe", "Remove duplicate lines", |s, _| {
      let mut seen = std::collections::HashSet::new();
      let lines: Vec<&str> = s.lines().filter(|line| seen.insert(*line)).collect();
      Ok(lines.join("\n"))
    }))
    .with(
      ToolDescriptor::new("json-format", "Format JSON")
        .with_input_types(["json", "text"])
        .with_output_types(["text"])
        .with_fn(|input, options| {
          let value = json_input(input)?;
          Ok(Value::String(pretty(&value, indent(options)?)?))
        }),
    )
    .with(
      ToolDescriptor::new("json-minify", "Minify JSON")
        .with_input_types(["json", "text"])
        .with_output_types(["text"])
        .with_fn(|input, _| {
          let value = json_input(input)?;
          Ok(Value::String(serde_json::to_string(&value)?))
        }),
    )
    .with(
      ToolDescriptor::new("json-parse", "Parse JSON")
        .with_input_types(["text"])
        .with_output_types(["json"])
        .with_fn(|input, _| json_input(input)),
    )
    .with(
      ToolDescriptor::new("text-stats", "Text statistics")
        .with_input_types(["text"])
        .with_output_types(["json"])
        .with_fn(|input, _| {
          let text = text_input(&input)?;
          Ok(serde_json::json!({
            "characters": text.chars().count(),
            "words": text.split_whitespace().count(),
            "lines": text.lines().count(),
          }))
        }),
    )
}

fn text_tool<F>(id: &str, name: &str, f: F) -> ToolDescriptor
where
  F: Fn(&str, &Value) -> Result<String, ToolError> + Send + Sync + 'static,
{
  ToolDescriptor::new(id, name)
    .with_input_types(["text"])
    .with_output_types(["text"])
    .with_fn(move |input, options| {
      let text = text_input(&input)?;
      f(text, options).map(Value::String)
    })
}

fn text_input(input: &Value) -> Result<&str, ToolError> {
  input
    .as_str()
    .ok_or_else(|| ToolError::InvalidInput(format!("expected text, got {}", type_name(input))))
}

/// Accept either an already-structured value or a string holding JSON.
fn json_input(input: Value) -> Result<Value, ToolError> {
  match input {
    Value::String(s) => Ok(serde_json::from_str(&s)?),
    other => Ok(other),
  }
}

/// Largest indent `json-format` accepts.
const MAX_INDENT: usize = 16;

fn indent(options: &Value) -> Result<usize, ToolError> {
  let Some(raw) = options.get("indent").filter(|v| !v.is_null()) else {
    return Ok(2);
  };
  raw
    .as_u64()
    .and_then(|n| usize::try_from(n).ok())
    .filter(|n| *n <= MAX_INDENT)
    .ok_or_else(|| {
      ToolError::InvalidOptions(format!(
        "option 'indent' must be an integer from 0 to {MAX_INDENT}, got {raw}"
      ))
    })
}

fn pretty(value: &Value, indent: usize) -> Result<String, ToolError> {
  use serde::Serialize;

  let indent = " ".repeat(indent);
  let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
  let mut buf = Vec::new();
  let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
  value.serialize(&mut serializer)?;
  String::from_utf8(buf).map_err(|e| ToolError::failed(e.to_string()))
}

fn replace(text: &str, options: &Value) -> Result<String, ToolError> {
  let from = options
    .get("from")
    .and_then(Value::as_str)
    .ok_or_else(|| ToolError::InvalidOptions("missing string option 'from'".to_string()))?;
  let to = options.get("to").and_then(Value::as_str).unwrap_or_default();
  if from.is_empty() {
    return Err(ToolError::InvalidOptions(
      "option 'from' must not be empty".to_string(),
    ));
  }
  Ok(text.replace(from, to))
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "text",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::ToolRegistry;
  use serde_json::json;

  async fn run(tool_id: &str, input: Value, options: Value) -> Result<Value, ToolError> {
    let registry = builtin_registry();
    let tool = registry.get(tool_id).unwrap();
    tool.process.as_ref().unwrap().process(input, &options).await
  }

  #[test]
  fn test_all_builtins_are_pipeline_eligible() {
    let registry = builtin_registry();
    assert!(!registry.is_empty());
    assert_eq!(registry.pipeline_tools().len(), registry.len());
  }

  #[tokio::test]
  async fn test_text_tools() {
    assert_eq!(
      run("text-uppercase", json!("ab"), json!({})).await.unwrap(),
      json!("AB")
    );
    assert_eq!(
      run("text-reverse", json!("AB"), json!({})).await.unwrap(),
      json!("BA")
    );
    assert_eq!(
      run("lines-dedupe", json!("a\nb\na"), json!({})).await.unwrap(),
      json!("a\nb")
    );
    assert_eq!(
      run("lines-sort", json!("b\nc\na"), json!({"descending": true}))
        .await
        .unwrap(),
      json!("c\nb\na")
    );
  }

  #[tokio::test]
  async fn test_text_tool_rejects_non_text() {
    let err = run("text-uppercase", json!(42), json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidInput(_)));
    assert_eq!(err.to_string(), "invalid input: expected text, got number");
  }

  #[tokio::test]
  async fn test_replace_requires_from() {
    let err = run("text-replace", json!("abc"), json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidOptions(_)));

    let output = run("text-replace", json!("a-b-c"), json!({"from": "-", "to": "+"}))
      .await
      .unwrap();
    assert_eq!(output, json!("a+b+c"));
  }

  #[tokio::test]
  async fn test_json_tools() {
    let minified = run("json-minify", json!("{ \"a\" : [1, 2] }"), json!({}))
      .await
      .unwrap();
    assert_eq!(minified, json!("{\"a\":[1,2]}"));

    let formatted = run("json-format", json!({"a": 1}), json!({"indent": 4}))
      .await
      .unwrap();
    assert_eq!(formatted, json!("{\n    \"a\": 1\n}"));

    let parsed = run("json-parse", json!("[1,2]"), json!({})).await.unwrap();
    assert_eq!(parsed, json!([1, 2]));

    assert!(matches!(
      run("json-parse", json!("{nope"), json!({})).await,
      Err(ToolError::Json(_))
    ));
  }

  #[tokio::test]
  async fn test_json_format_bounds_indent() {
    for indent in [json!(u64::MAX), json!(MAX_INDENT + 1), json!(-1), json!("4"), json!(2.5)] {
      let err = run("json-format", json!({"a": 1}), json!({"indent": indent.clone()}))
        .await
        .unwrap_err();
      assert!(matches!(err, ToolError::InvalidOptions(_)), "{indent}");
    }

    let widest = run("json-format", json!([1]), json!({"indent": MAX_INDENT}))
      .await
      .unwrap();
    assert_eq!(widest, json!(format!("[\n{}1\n]", " ".repeat(MAX_INDENT))));

    let default = run("json-format", json!([1]), json!({"indent": null}))
      .await
      .unwrap();
    assert_eq!(default, json!("[\n  1\n]"));
  }

  #[tokio::test]
  async fn test_text_stats() {
    let stats = run("text-stats", json!("one two\nthree"), json!({}))
      .await
      .unwrap();
    assert_eq!(stats, json!({"characters": 13, "words": 3, "lines": 2}));
  }
}
