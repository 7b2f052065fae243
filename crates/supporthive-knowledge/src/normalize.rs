//! Flattening of raw uploaded content into plain text suitable for embedding.
//!
//! Every function here is pure and infallible: when structured parsing fails
//! the raw input goes through the cleaning pass unchanged.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Punctuation kept by the cleaning pass, in addition to word characters and whitespace.
const ALLOWED_PUNCTUATION: &str = ".,!?;:-()[]{}";

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid script/style pattern")
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Text,
    Markdown,
    Json,
    Csv,
    Html,
}

impl ContentFormat {
    pub const SUPPORTED_EXTENSIONS: &'static [&'static str] =
        &["txt", "md", "json", "csv", "html", "htm"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Convert raw content of the given format into cleaned, flat text.
pub fn normalize(raw: &str, format: ContentFormat) -> String {
    let flattened = match format {
        ContentFormat::Text | ContentFormat::Markdown => raw.to_string(),
        ContentFormat::Json => json_to_text(raw).unwrap_or_else(|| raw.to_string()),
        ContentFormat::Csv => csv_to_text(raw).unwrap_or_else(|| raw.to_string()),
        ContentFormat::Html => html_to_text(raw),
    };
    clean_text(&flattened)
}

/// Parse and flatten JSON. `None` when the input is not valid JSON.
pub fn json_to_text(raw: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => Some(flatten_json(&value)),
        Err(error) => {
            tracing::debug!(%error, "content is not valid json, keeping raw text");
            None
        }
    }
}

/// Render a JSON value as indented `key: value` / `Item N: value` lines.
pub fn flatten_json(value: &serde_json::Value) -> String {
    let mut lines = Vec::new();
    write_json_lines(value, 0, &mut lines);
    lines.join("\n")
}

fn write_json_lines(value: &serde_json::Value, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                write_json_entry(&indent, key, child, depth, lines);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                write_json_entry(&indent, &format!("Item {}", i + 1), child, depth, lines);
            }
        }
        scalar => lines.push(format!("{indent}{}", scalar_text(scalar))),
    }
}

fn write_json_entry(
    indent: &str,
    label: &str,
    child: &serde_json::Value,
    depth: usize,
    lines: &mut Vec<String>,
) {
    if child.is_object() || child.is_array() {
        lines.push(format!("{indent}{label}:"));
        write_json_lines(child, depth + 1, lines);
    } else {
        lines.push(format!("{indent}{label}: {}", scalar_text(child)));
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render CSV rows as `Row N: f1, f2, ...`.
///
/// `N` is the line on which the row starts in the original input, so blank
/// lines are skipped but still counted. `None` when the reader fails.
pub fn csv_to_text(raw: &str) -> Option<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut lines = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                tracing::debug!(%error, "content is not valid csv, keeping raw text");
                return None;
            }
        };
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let row = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(index as u64 + 1);
        let fields: Vec<&str> = record.iter().collect();
        lines.push(format!("Row {row}: {}", fields.join(", ")));
    }
    Some(lines.join("\n"))
}

/// Strip markup from an HTML document and collapse whitespace.
pub fn html_to_text(raw: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(raw, " ");
    let without_tags = HTML_TAG.replace_all(&without_code, " ");
    let decoded = decode_basic_entities(&without_tags);
    WHITESPACE_RUN.replace_all(&decoded, " ").trim().to_string()
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Final cleaning pass shared by every format. Idempotent.
pub fn clean_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let filtered: String = unified.chars().filter(|c| is_allowed(*c)).collect();

    filtered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c)
}
