//! Result output for the `dqm` binary.
//!
//! Results are always pretty-printed JSON, written to stdout or to the file
//! given with `--output`.

use anyhow::Context;
use serde_json::Value as JsonValue;
use std::path::Path;

/// Renders a result document.
///
/// # Errors
/// Returns error if the value cannot be serialized.
pub fn render(value: &JsonValue) -> anyhow::Result<String> {
    let mut text = serde_json::to_string_pretty(value).context("rendering JSON output")?;
    text.push('\n');
    Ok(text)
}

/// Writes a result document to `path`, or to stdout when `path` is `None`.
///
/// # Errors
/// Returns error if the file cannot be written.
pub async fn emit(value: &JsonValue, path: Option<&Path>) -> anyhow::Result<()> {
    let text = render(value)?;
    match path {
        Some(path) => {
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Result written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_is_pretty_with_trailing_newline() {
        let text = render(&json!({"score": 70.0})).unwrap();
        assert_eq!(text, "{\n  \"score\": 70.0\n}\n");
    }

    #[tokio::test]
    async fn test_emit_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        emit(&json!([1, 2]), Some(&path)).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: JsonValue = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_emit_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        assert!(emit(&json!(null), Some(&path)).await.is_err());
    }
}
