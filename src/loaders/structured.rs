//! JSON, JSON Lines and Jupyter notebooks.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::encoding::decode_text;
use super::{source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(i64),
    Iterate,
}

/// A jq-style path selector.
///
/// Supports the identity `.`, key paths `.a.b`, iteration `.[]` / `.a[]`
/// and indexing `.[0]` / `.a[-1]`, in any combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JqSelector {
    steps: Vec<Step>,
}

impl JqSelector {
    /// Parse a selector expression.
    pub fn parse(schema: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidOption(format!("jq_schema {:?}: {}", schema, reason));

        let expr = schema.trim();
        let mut rest = expr.strip_prefix('.').ok_or_else(|| invalid("must start with '.'"))?;
        let mut steps = Vec::new();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let inner = after[..close].trim();
                if inner.is_empty() {
                    steps.push(Step::Iterate);
                } else {
                    let index = inner.parse::<i64>().map_err(|_| invalid("bad index"))?;
                    steps.push(Step::Index(index));
                }
                rest = &after[close + 1..];
            } else if let Some(after) = rest.strip_prefix('.') {
                if after.is_empty() || after.starts_with('.') {
                    return Err(invalid("empty key"));
                }
                rest = after;
            } else {
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let key = &rest[..end];
                if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                    return Err(invalid("unsupported syntax"));
                }
                steps.push(Step::Key(key.to_string()));
                rest = &rest[end..];
            }
        }

        Ok(Self { steps })
    }

    /// Apply the selector, returning every selected value in order.
    pub fn select(&self, root: &Value) -> Result<Vec<Value>> {
        let mut values = vec![root.clone()];

        for step in &self.steps {
            let mut next = Vec::new();
            for value in values {
                match (step, value) {
                    (Step::Key(key), Value::Object(mut map)) => {
                        next.push(map.remove(key).unwrap_or(Value::Null));
                    }
                    (Step::Key(_), Value::Null) => next.push(Value::Null),
                    (Step::Index(i), Value::Array(items)) => {
                        let len = items.len() as i64;
                        let idx = if *i < 0 { len + i } else { *i };
                        next.push(
                            usize::try_from(idx)
                                .ok()
                                .and_then(|idx| items.get(idx).cloned())
                                .unwrap_or(Value::Null),
                        );
                    }
                    (Step::Index(_), Value::Null) => next.push(Value::Null),
                    (Step::Iterate, Value::Array(items)) => next.extend(items),
                    (Step::Iterate, Value::Object(map)) => next.extend(map.into_iter().map(|(_, v)| v)),
                    (step, value) => {
                        return Err(Error::Parse(format!(
                            "cannot apply {:?} to {}",
                            step,
                            type_name(&value)
                        )));
                    }
                }
            }
            values = next;
        }

        Ok(values)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Document content for a selected value.
fn value_text(value: &Value, text_content: bool, path: &Path) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ if text_content => Err(Error::parse(
            path.display(),
            format!("expected a string value, got {}", type_name(value)),
        )),
        Value::Null => Ok(String::new()),
        Value::Object(map) if map.is_empty() => Ok(String::new()),
        Value::Array(items) if items.is_empty() => Ok(String::new()),
        other => Ok(serde_json::to_string(other)?),
    }
}

struct JsonSettings {
    path: PathBuf,
    selector: JqSelector,
    text_content: bool,
    encoding: Option<String>,
}

impl JsonSettings {
    fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            selector: JqSelector::parse(options.jq_schema.as_deref().unwrap_or("."))?,
            text_content: options.text_content.unwrap_or(true),
            encoding: options.encoding.clone(),
        })
    }

    fn read(&self) -> Result<String> {
        let bytes = std::fs::read(&self.path)?;
        decode_text(&bytes, self.encoding.as_deref(), false, &self.path)
    }

    fn documents(&self, root: &Value, seq_num: &mut usize) -> Result<Vec<RawDocument>> {
        let source = source_of(&self.path);
        self.selector
            .select(root)?
            .iter()
            .map(|value| {
                *seq_num += 1;
                Ok(RawDocument::new(value_text(value, self.text_content, &self.path)?, source.clone())
                    .with_meta("seq_num", *seq_num))
            })
            .collect()
    }
}

/// Loads values selected from a JSON document, one document per value.
pub struct JSONLoader {
    settings: JsonSettings,
}

impl JSONLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            settings: JsonSettings::new(path, options)?,
        })
    }
}

impl Loader for JSONLoader {
    fn name(&self) -> &'static str {
        "JSONLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let text = self.settings.read()?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let root: Value = serde_json::from_str(&text)?;
        self.settings.documents(&root, &mut 0)
    }
}

/// Loads values selected from each line of a JSON Lines file.
pub struct JSONLinesLoader {
    settings: JsonSettings,
}

impl JSONLinesLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            settings: JsonSettings::new(path, options)?,
        })
    }
}

impl Loader for JSONLinesLoader {
    fn name(&self) -> &'static str {
        "JSONLinesLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let text = self.settings.read()?;
        let mut seq_num = 0;
        let mut docs = Vec::new();

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let root: Value = serde_json::from_str(line)?;
            docs.extend(self.settings.documents(&root, &mut seq_num)?);
        }

        Ok(docs)
    }
}

/// Loads a Jupyter notebook as one document.
///
/// Each cell becomes `'<type>' cell: '<source>'`; code cell outputs are
/// appended when `include_outputs` is set, truncated to
/// `max_output_length` characters.
pub struct NotebookLoader {
    path: PathBuf,
    include_outputs: bool,
    max_output_length: usize,
}

impl NotebookLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            include_outputs: options.include_outputs.unwrap_or(false),
            max_output_length: options.max_output_length.unwrap_or(10),
        })
    }

    fn joined(value: Option<&Value>) -> String {
        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
            _ => String::new(),
        }
    }

    fn cell_text(&self, cell: &Value) -> String {
        let cell_type = cell.get("cell_type").and_then(Value::as_str).unwrap_or("unknown");
        let source = Self::joined(cell.get("source"));
        let head = format!("'{}' cell: '{}'\n", cell_type, source);

        let outputs = cell.get("outputs").and_then(Value::as_array);
        let first = match outputs.and_then(|o| o.first()) {
            Some(first) if self.include_outputs && cell_type == "code" => first,
            _ => return format!("{}\n", head),
        };

        if let Some(ename) = first.get("ename").and_then(Value::as_str) {
            let evalue = first.get("evalue").and_then(Value::as_str).unwrap_or_default();
            let traceback = Self::joined(first.get("traceback"));
            return format!(
                "{}, gives error '{}', with description '{}'\nand traceback '{}'\n\n",
                head, ename, evalue, traceback
            );
        }

        let text = first
            .get("text")
            .or_else(|| first.get("data").and_then(|d| d.get("text/plain")));
        let output: String = Self::joined(text).chars().take(self.max_output_length).collect();
        if output.is_empty() {
            format!("{}\n", head)
        } else {
            format!("{} with output: '{}'\n\n", head, output)
        }
    }
}

impl Loader for NotebookLoader {
    fn name(&self) -> &'static str {
        "NotebookLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let notebook: Value = serde_json::from_slice(&std::fs::read(&self.path)?)?;
        let cells = notebook
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::parse(self.path.display(), "notebook has no cells"))?;

        let content: String = cells.iter().map(|cell| self.cell_text(cell)).collect();
        Ok(vec![RawDocument::new(content, source_of(&self.path))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(JqSelector::parse(".").unwrap().steps, vec![]);
        assert_eq!(
            JqSelector::parse(".a.b[]").unwrap().steps,
            vec![Step::Key("a".into()), Step::Key("b".into()), Step::Iterate]
        );
        assert_eq!(JqSelector::parse(".[2]").unwrap().steps, vec![Step::Index(2)]);
        assert!(JqSelector::parse("a").is_err());
        assert!(JqSelector::parse(".a[").is_err());
        assert!(JqSelector::parse(".a | .b").is_err());
    }

    #[test]
    fn test_selector_application() {
        let data = json!({"items": [{"t": "x"}, {"t": "y"}], "n": null});
        let values = JqSelector::parse(".items[].t").unwrap().select(&data).unwrap();
        assert_eq!(values, vec![json!("x"), json!("y")]);

        let values = JqSelector::parse(".items[-1]").unwrap().select(&data).unwrap();
        assert_eq!(values, vec![json!({"t": "y"})]);

        let values = JqSelector::parse(".missing.deeper").unwrap().select(&data).unwrap();
        assert_eq!(values, vec![Value::Null]);

        assert!(JqSelector::parse(".items.t").unwrap().select(&data).is_err());
    }

    #[test]
    fn test_json_identity_selects_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", r#"{"b": 1}"#);
        let options = LoaderOptions {
            jq_schema: Some(".".into()),
            text_content: Some(false),
            ..Default::default()
        };

        let docs = JSONLoader::new(&path, &options).unwrap().load().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, r#"{"b":1}"#);
        assert_eq!(docs[0].metadata["seq_num"], "1");
    }

    #[test]
    fn test_json_text_content_requires_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", r#"[{"b": 1}]"#);
        let options = LoaderOptions {
            jq_schema: Some(".[]".into()),
            text_content: Some(true),
            ..Default::default()
        };
        let err = JSONLoader::new(&path, &options).unwrap().load().unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_jsonl_seq_num_spans_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.jsonl", "{\"q\": \"one\"}\n\n{\"q\": \"two\"}\n");
        let options = LoaderOptions {
            jq_schema: Some(".q".into()),
            ..Default::default()
        };

        let docs = JSONLinesLoader::new(&path, &options).unwrap().load().unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(docs[1].metadata["seq_num"], "2");
    }

    #[test]
    fn test_invalid_schema_fails_construction() {
        let options = LoaderOptions {
            jq_schema: Some("items".into()),
            ..Default::default()
        };
        assert!(matches!(
            JSONLoader::new(Path::new("a.json"), &options),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn test_notebook_cells() {
        let dir = tempfile::tempdir().unwrap();
        let notebook = json!({
            "cells": [
                {"cell_type": "markdown", "source": ["# Title\n", "Intro"]},
                {"cell_type": "code", "source": "print(1)", "outputs": [{"text": ["1\n"]}]}
            ]
        });
        let path = write(&dir, "n.ipynb", &notebook.to_string());

        let docs = NotebookLoader::new(&path, &LoaderOptions::default())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(
            docs[0].content,
            "'markdown' cell: '# Title\nIntro'\n\n'code' cell: 'print(1)'\n\n"
        );

        let options = LoaderOptions {
            include_outputs: Some(true),
            ..Default::default()
        };
        let docs = NotebookLoader::new(&path, &options).unwrap().load().unwrap();
        assert!(docs[0].content.ends_with("'code' cell: 'print(1)'\n with output: '1\n'\n\n"));
    }
}
