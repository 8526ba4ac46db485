//! Import/export codecs.
//!
//! Every format decodes to a flat, ordered list of name/value pairs.
//! Nested JSON and YAML documents are flattened by joining key paths with
//! `_`; array elements use their index as the path segment.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::CodecError;

/// Extensions accepted for file import.
pub const IMPORT_EXTENSIONS: [&str; 7] =
    ["env", "json", "yaml", "yml", "properties", "conf", "config"];

/// A text format keys can be read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `KEY=VALUE` lines (`.env`, `.properties`, `.conf`, `.config`).
    Env,
    Json,
    Yaml,
}

impl Format {
    /// Pick the decoder for an uploaded file by its extension.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedFormat`] if the extension is not in
    /// [`IMPORT_EXTENSIONS`].
    pub fn for_filename(filename: &str) -> Result<Self, CodecError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "env" | "properties" | "conf" | "config" => Ok(Self::Env),
            _ => Err(CodecError::UnsupportedFormat {
                format: if extension.is_empty() {
                    filename.to_owned()
                } else {
                    format!(".{extension}")
                },
                expected: IMPORT_EXTENSIONS.map(|e| format!(".{e}")).join(" "),
            }),
        }
    }

    /// File extension used on export.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// MIME type used on export.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Env => "text/plain; charset=utf-8",
            Self::Json => "application/json",
            Self::Yaml => "application/x-yaml",
        }
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" | ".env" => Ok(Self::Env),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(CodecError::UnsupportedFormat {
                format: s.to_owned(),
                expected: "env json yaml".to_owned(),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Decode `text` into name/value pairs, in document order.
///
/// # Errors
///
/// Returns [`CodecError::Json`] or [`CodecError::Yaml`] for malformed
/// structured input and [`CodecError::NotAnObject`] if its top level is not
/// a mapping. Malformed `.env` lines are skipped, never an error.
pub fn decode(format: Format, text: &str) -> Result<Vec<(String, String)>, CodecError> {
    match format {
        Format::Env => Ok(parse_env(text)),
        Format::Json => flatten_document(serde_json::from_str(text)?),
        Format::Yaml => {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            flatten_document(serde_yaml::from_str(text)?)
        }
    }
}

/// Encode name/value pairs as `format` text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] or [`CodecError::Yaml`] if serialization fails.
pub fn encode(format: Format, pairs: &[(String, String)]) -> Result<String, CodecError> {
    match format {
        Format::Env => Ok(pairs
            .iter()
            .map(|(name, value)| format!("{name}={}\n", quote_env_value(value)))
            .collect()),
        Format::Json => {
            let mut text = serde_json::to_string_pretty(&as_object(pairs))?;
            text.push('\n');
            Ok(text)
        }
        Format::Yaml => Ok(serde_yaml::to_string(&as_object(pairs))?),
    }
}

fn as_object(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect()
}

// ── .env ─────────────────────────────────────────────────────────────

/// Parse `[export] KEY (=|:) VALUE [# comment]` lines.
///
/// Blank lines and lines starting with `#` or `;` are skipped. Lines that
/// do not parse are logged by line number and skipped.
pub fn parse_env(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        match parse_env_line(trimmed) {
            Some(entry) => entries.push(entry),
            None => tracing::warn!(line = index + 1, "skipping unparseable line"),
        }
    }

    entries
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line
        .strip_prefix("export ")
        .or_else(|| line.strip_prefix("export\t"))
        .unwrap_or(line);

    let split = line.find(['=', ':'])?;
    let (key, rest) = line.split_at(split);
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let raw = rest[1..].trim();
    Some((key.to_owned(), env_value(raw)))
}

fn env_value(raw: &str) -> String {
    if let Some(body) = raw.strip_prefix('"') {
        if let Some(value) = unescape_double_quoted(body) {
            return value;
        }
    } else if let Some(body) = raw.strip_prefix('\'') {
        if let Some(end) = body.find('\'') {
            return body[..end].to_owned();
        }
    }
    strip_inline_comment(raw).to_owned()
}

/// Read a double-quoted value up to its closing quote. `None` if unterminated.
fn unescape_double_quoted(body: &str) -> Option<String> {
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                other => value.push(other),
            },
            other => value.push(other),
        }
    }
    None
}

fn strip_inline_comment(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return raw[..i].trim_end();
        }
    }
    raw
}

fn quote_env_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\'));
    if !needs_quotes {
        return value.to_owned();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

// ── JSON / YAML ──────────────────────────────────────────────────────

fn flatten_document(document: Value) -> Result<Vec<(String, String)>, CodecError> {
    let Value::Object(map) = document else {
        return Err(CodecError::NotAnObject);
    };
    let mut pairs = Vec::new();
    for (key, value) in map {
        flatten_into(&mut pairs, key, value);
    }
    Ok(pairs)
}

fn flatten_into(pairs: &mut Vec<(String, String)>, path: String, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(pairs, format!("{path}_{key}"), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.into_iter().enumerate() {
                flatten_into(pairs, format!("{path}_{index}"), child);
            }
        }
        Value::Null => pairs.push((path, String::new())),
        Value::String(s) => pairs.push((path, s)),
        scalar => pairs.push((path, scalar.to_string())),
    }
}
