//! Parsing of model output into importable questions

use crate::errors::IngestionError;
use mockview_common::db::models::{DEFAULT_CATEGORY, DEFAULT_IMPORTED_TITLE};
use mockview_common::db::ImportedQuestion;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawQuestion {
    category: Option<String>,
    content: Option<String>,
    analysis: Option<String>,
    reference_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPaper {
    paper_title: Option<String>,
    #[serde(default)]
    questions: Vec<Value>,
}

/// Paper extracted from a document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPaper {
    pub title: String,
    pub questions: Vec<ImportedQuestion>,
}

/// Remove a surrounding markdown code fence (```json or ```)
pub fn strip_code_fences(response: &str) -> &str {
    let mut cleaned = response.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

fn parse_json(response: &str) -> Result<Value, IngestionError> {
    serde_json::from_str(strip_code_fences(response))
        .map_err(|e| IngestionError::MalformedResponse(e.to_string()))
}

/// Keep entries with content; missing categories fall back to the default
fn collect_questions(values: Vec<Value>) -> Vec<ImportedQuestion> {
    values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawQuestion>(v).ok())
        .filter_map(|raw| {
            let content = raw.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())?;
            Some(ImportedQuestion {
                category: raw
                    .category
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                content,
                analysis: raw.analysis,
                reference_answer: raw.reference_answer,
            })
        })
        .collect()
}

/// Parse a single-question import. A lone object is treated as a one-item list.
pub fn parse_single_questions(response: &str) -> Result<Vec<ImportedQuestion>, IngestionError> {
    let values = match parse_json(response)? {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(IngestionError::MalformedResponse(format!(
                "expected a list of questions, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(collect_questions(values))
}

/// Parse a paper import: `{paper_title?, questions: [...]}`
pub fn parse_paper(response: &str) -> Result<ParsedPaper, IngestionError> {
    let raw: RawPaper = serde_json::from_value(parse_json(response)?)
        .map_err(|e| IngestionError::MalformedResponse(e.to_string()))?;

    Ok(ParsedPaper {
        title: raw
            .paper_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_IMPORTED_TITLE.to_string()),
        questions: collect_questions(raw.questions),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  [2] "), "[2]");
    }

    #[test]
    fn test_single_questions_skip_empty_content() {
        let response = r#"```json
[
  {"category": "综合分析", "content": "谈谈你对网红经济的看法", "analysis": "辩证分析"},
  {"category": "组织协调", "content": ""},
  {"content": "领导安排你组织一次调研"}
]
```"#;
        let questions = parse_single_questions(response).unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].category, "综合分析");
        assert_eq!(questions[0].analysis.as_deref(), Some("辩证分析"));
        assert_eq!(questions[1].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let questions = parse_single_questions(r#"{"content": "独题"}"#).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "独题");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            parse_single_questions("抱歉，我无法解析该文档"),
            Err(IngestionError::MalformedResponse(_))
        ));
        assert!(parse_single_questions("42").is_err());
        assert!(parse_paper("[]").is_err());
    }

    #[test]
    fn test_paper_defaults_title() {
        let paper = parse_paper(r#"{"questions": [{"content": "第一题"}, {"content": "第二题"}]}"#).unwrap();
        assert_eq!(paper.title, DEFAULT_IMPORTED_TITLE);
        assert_eq!(paper.questions.len(), 2);

        let paper = parse_paper(r#"{"paper_title": "2024 省考模拟", "questions": []}"#).unwrap();
        assert_eq!(paper.title, "2024 省考模拟");
        assert!(paper.questions.is_empty());
    }
}
