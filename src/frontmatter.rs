//! Front-matter extractor – splits the metadata block at the top of a
//! Markdown document from its body.
//!
//! Two fence styles are recognised:
//! - `---` … `---` (or `...`): YAML
//! - `+++` … `+++`: TOML
//!
//! Every value is flattened to a string by [`flatten_value`] and every key is
//! lowercased, so the result can be merged straight into the template
//! substitution context.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Normalised document metadata: lowercase keys, string values.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fence {
    Yaml,
    Toml,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(Fence::Yaml),
            "+++" => Some(Fence::Toml),
            _ => None,
        }
    }

    fn closes(self, line: &str) -> bool {
        let line = line.trim_end();
        match self {
            Fence::Yaml => line == "---" || line == "...",
            Fence::Toml => line == "+++",
        }
    }
}

/// Split `raw` into `(metadata, body)`.
///
/// Without a front-matter block the metadata is empty and the body is the
/// whole input, unchanged. An opened but unterminated block is
/// [`Error::MalformedFrontMatter`].
pub fn extract(raw: &str) -> Result<(Metadata, &str)> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let Some(first_end) = text.find('\n') else {
        // A lone fence line with nothing after it is still unterminated.
        if Fence::open(text).is_some() {
            return Err(unterminated());
        }
        return Ok((Metadata::new(), raw));
    };
    let Some(fence) = Fence::open(&text[..first_end]) else {
        return Ok((Metadata::new(), raw));
    };

    let block_start = first_end + 1;
    let mut pos = block_start;
    while pos <= text.len() {
        let line_end = text[pos..].find('\n').map(|i| pos + i);
        let line = &text[pos..line_end.unwrap_or(text.len())];
        if fence.closes(line) {
            let block = &text[block_start..pos];
            let body = match line_end {
                Some(end) => &text[end + 1..],
                None => "",
            };
            let metadata = match fence {
                Fence::Yaml => parse_yaml(block)?,
                Fence::Toml => parse_toml(block)?,
            };
            return Ok((metadata, body));
        }
        match line_end {
            Some(end) => pos = end + 1,
            None => break,
        }
    }
    Err(unterminated())
}

fn unterminated() -> Error {
    Error::MalformedFrontMatter {
        reason: "front matter block is opened but never closed".to_string(),
    }
}

fn parse_yaml(block: &str) -> Result<Metadata> {
    if block.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(block).map_err(|e| Error::MalformedFrontMatter {
            reason: e.to_string(),
        })?;
    match value {
        serde_yaml::Value::Null => Ok(Metadata::new()),
        serde_yaml::Value::Mapping(map) => Ok(map
            .iter()
            .map(|(k, v)| (flatten_value(k).to_lowercase(), flatten_value(v)))
            .collect()),
        other => Err(Error::MalformedFrontMatter {
            reason: format!("expected key/value pairs, found {}", yaml_kind(&other)),
        }),
    }
}

fn parse_toml(block: &str) -> Result<Metadata> {
    let table: toml::Table = block.parse().map_err(|e: toml::de::Error| {
        Error::MalformedFrontMatter {
            reason: e.to_string(),
        }
    })?;
    Ok(table
        .iter()
        .map(|(k, v)| (k.to_lowercase(), flatten_value(&toml_to_yaml(v))))
        .collect())
}

fn toml_to_yaml(value: &toml::Value) -> serde_yaml::Value {
    match value {
        toml::Value::String(s) => serde_yaml::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_yaml::Value::Number((*i).into()),
        toml::Value::Float(f) => serde_yaml::Value::Number((*f).into()),
        toml::Value::Boolean(b) => serde_yaml::Value::Bool(*b),
        toml::Value::Datetime(d) => serde_yaml::Value::String(d.to_string()),
        toml::Value::Array(items) => {
            serde_yaml::Value::Sequence(items.iter().map(toml_to_yaml).collect())
        }
        toml::Value::Table(table) => serde_yaml::Value::Mapping(
            table
                .iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), toml_to_yaml(v)))
                .collect(),
        ),
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// Flatten a front-matter value into the single string the substitution
/// context stores.
///
/// Scalars keep their display form, null becomes empty, lists are
/// space-joined and nested mappings become space-joined `key=value` pairs.
pub fn flatten_value(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(flatten_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        serde_yaml::Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", flatten_value(k), flatten_value(v)))
            .collect::<Vec<_>>()
            .join(" "),
        serde_yaml::Value::Tagged(tagged) => flatten_value(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_yaml_block() {
        let doc = "---\nTitle: Report\nauthor: \"A. N.\"\ndate: 2024-01-01\n---\n# Body\n";
        let (meta, body) = extract(doc).unwrap();
        assert_eq!(meta.get("title").unwrap(), "Report");
        assert_eq!(meta.get("author").unwrap(), "A. N.");
        assert_eq!(meta.get("date").unwrap(), "2024-01-01");
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn no_block_returns_input_unchanged() {
        let doc = "# Just markdown\n\n---\n\nwith a rule";
        let (meta, body) = extract(doc).unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, doc);
    }

    #[test]
    fn unterminated_block_is_malformed() {
        let err = extract("---\ntitle: Oops\n\n# Body never fenced\n").unwrap_err();
        assert!(matches!(err, Error::MalformedFrontMatter { .. }));
        assert!(extract("---").is_err());
        assert!(extract("---\n").is_err());
    }

    #[test]
    fn lists_are_space_joined() {
        let doc = "---\ntags: [rust, pdf]\nnested:\n  - a\n  - [b, c]\n---\n";
        let (meta, body) = extract(doc).unwrap();
        assert_eq!(meta.get("tags").unwrap(), "rust pdf");
        assert_eq!(meta.get("nested").unwrap(), "a b c");
        assert_eq!(body, "");
    }

    #[test]
    fn scalars_are_stringified() {
        let doc = "---\nversion: 3\ndraft: false\nempty:\n---\nx";
        let (meta, _) = extract(doc).unwrap();
        assert_eq!(meta.get("version").unwrap(), "3");
        assert_eq!(meta.get("draft").unwrap(), "false");
        assert_eq!(meta.get("empty").unwrap(), "");
    }

    #[test]
    fn crlf_and_dots_terminator() {
        let doc = "---\r\ntitle: Win\r\n...\r\nbody\r\n";
        let (meta, body) = extract(doc).unwrap();
        assert_eq!(meta.get("title").unwrap(), "Win");
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn empty_block_gives_empty_metadata() {
        let (meta, body) = extract("---\n---\ntext").unwrap();
        assert!(meta.is_empty());
        assert_eq!(body, "text");
    }

    #[test]
    fn non_mapping_block_is_malformed() {
        let err = extract("---\n- a\n- b\n---\n").unwrap_err();
        assert!(err.to_string().contains("a list"));
    }

    #[test]
    fn toml_fence_is_supported() {
        let doc = "+++\nTitle = \"Plan\"\nTags = [\"x\", \"y\"]\n+++\nBody";
        let (meta, body) = extract(doc).unwrap();
        assert_eq!(meta.get("title").unwrap(), "Plan");
        assert_eq!(meta.get("tags").unwrap(), "x y");
        assert_eq!(body, "Body");
    }

    #[test]
    fn bom_is_ignored() {
        let (meta, body) = extract("\u{feff}---\nrole: Reviewer\n---\nhi").unwrap();
        assert_eq!(meta.get("role").unwrap(), "Reviewer");
        assert_eq!(body, "hi");
    }
}
