//! Source row intake.
//!
//! The relational catalog itself is an external collaborator; the builder
//! consumes its JSON-lines export, one row object per line. Field coercion
//! is deliberately tolerant — upstream stores status flags variously as
//! ints, numeric strings, or booleans — but a row without an integer `id`
//! is unusable and gets skipped with a warning.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use zmhsearch_core::types::flag_bits;
use zmhsearch_core::{ZmhError, ZmhResult};

/// A tag reference on a source row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagRef {
    /// Stable external tag id.
    pub tag_id: u16,
    /// Display name.
    pub tag_name: String,
}

/// One cleaned catalog row, ready for indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    /// External publication id.
    pub id: i32,
    /// Title.
    pub title: String,
    /// Cover URL (may be empty).
    pub cover: String,
    /// Author names.
    pub authors: Vec<String>,
    /// Alternate titles.
    pub aliases: Vec<String>,
    /// Tag references.
    pub tags: Vec<TagRef>,
    /// Packed status byte (hidden, chapter-hidden, need-login, locked).
    pub flags: u8,
}

/// Wire shape of one dump row before coercion.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    authors: Vec<Value>,
    #[serde(default)]
    aliases: Vec<Value>,
    #[serde(default)]
    types: Vec<Value>,
    #[serde(default)]
    hidden: Value,
    #[serde(default, rename = "isHideChapter")]
    is_hide_chapter: Value,
    #[serde(default, rename = "is_need_login")]
    is_need_login: Value,
    #[serde(default, rename = "is_lock")]
    is_lock: Value,
}

/// Coerce an upstream flag field to a bit: any value that reads as a
/// nonzero integer counts as set.
fn coerce_flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|i| i != 0) || n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => s.trim().parse::<i64>().is_ok_and(|i| i != 0),
        _ => false,
    }
}

fn coerce_id(v: &Value) -> Option<i32> {
    v.as_i64().and_then(|i| i32::try_from(i).ok())
}

fn string_items(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn named_items(values: &[Value], key: &str) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.get(key))
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn tag_items(values: &[Value]) -> Vec<TagRef> {
    values
        .iter()
        .filter_map(|v| {
            let tag_id = v.get("tag_id")?.as_i64()?;
            let tag_id = u16::try_from(tag_id).ok()?;
            let tag_name = v
                .get("tag_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(TagRef {
                tag_id,
                tag_name: if tag_name.is_empty() {
                    tag_id.to_string()
                } else {
                    tag_name.to_owned()
                },
            })
        })
        .collect()
}

impl RawRow {
    /// `None` when the row has no usable integer id.
    fn into_row(self) -> Option<SourceRow> {
        let id = coerce_id(&self.id)?;
        let mut flags = 0u8;
        if coerce_flag(&self.hidden) {
            flags |= flag_bits::HIDDEN;
        }
        if coerce_flag(&self.is_hide_chapter) {
            flags |= flag_bits::HIDE_CHAPTER;
        }
        if coerce_flag(&self.is_need_login) {
            flags |= flag_bits::NEED_LOGIN;
        }
        if coerce_flag(&self.is_lock) {
            flags |= flag_bits::LOCKED;
        }
        Some(SourceRow {
            id,
            title: self.title.unwrap_or_default(),
            cover: self.cover.unwrap_or_default(),
            authors: named_items(&self.authors, "tag_name"),
            aliases: string_items(&self.aliases),
            tags: tag_items(&self.types),
            flags,
        })
    }
}

/// Read a JSON-lines dump into cleaned rows.
///
/// Malformed JSON on any line is a hard error (the dump is machine
/// generated; a broken line means a broken export). Rows without an
/// integer id are skipped with a warning.
pub fn read_dump(path: &Path) -> ZmhResult<Vec<SourceRow>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ZmhError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ZmhError::Io(e)
        }
    })?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRow = serde_json::from_str(&line).map_err(|e| ZmhError::SourceSchema {
            line: idx + 1,
            detail: e.to_string(),
        })?;
        match raw.into_row() {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "dump rows without integer id skipped");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coerce_flag_accepts_upstream_variants() {
        assert!(coerce_flag(&serde_json::json!(1)));
        assert!(coerce_flag(&serde_json::json!(2)));
        assert!(coerce_flag(&serde_json::json!("1")));
        assert!(coerce_flag(&serde_json::json!(true)));
        assert!(!coerce_flag(&serde_json::json!(0)));
        assert!(!coerce_flag(&serde_json::json!("0")));
        assert!(!coerce_flag(&serde_json::json!("yes")));
        assert!(!coerce_flag(&serde_json::json!(null)));
        assert!(!coerce_flag(&serde_json::json!([1])));
    }

    #[test]
    fn raw_row_coercion_packs_flags() {
        let raw: RawRow = serde_json::from_str(
            r#"{"id": 5, "title": "t", "hidden": "1", "isHideChapter": 0,
                "is_need_login": 1, "is_lock": true}"#,
        )
        .unwrap();
        let row = raw.into_row().unwrap();
        assert_eq!(row.id, 5);
        assert_eq!(
            row.flags,
            flag_bits::HIDDEN | flag_bits::NEED_LOGIN | flag_bits::LOCKED
        );
    }

    #[test]
    fn row_without_id_is_rejected() {
        let raw: RawRow = serde_json::from_str(r#"{"title": "no id"}"#).unwrap();
        assert!(raw.into_row().is_none());
        let raw: RawRow = serde_json::from_str(r#"{"id": "seven"}"#).unwrap();
        assert!(raw.into_row().is_none());
    }

    #[test]
    fn nested_names_and_tags_are_extracted() {
        let raw: RawRow = serde_json::from_str(
            r#"{"id": 1,
                "authors": [{"tag_name": "谷川流"}, {"tag_name": ""}, {"other": 1}],
                "aliases": ["憂鬱", "", 42],
                "types": [{"tag_id": 3, "tag_name": "冒险"}, {"tag_id": "x"}, {"tag_id": 9}]}"#,
        )
        .unwrap();
        let row = raw.into_row().unwrap();
        assert_eq!(row.authors, vec!["谷川流"]);
        assert_eq!(row.aliases, vec!["憂鬱"]);
        assert_eq!(row.tags.len(), 2);
        assert_eq!(row.tags[0].tag_id, 3);
        assert_eq!(row.tags[0].tag_name, "冒险");
        // Missing name falls back to the id.
        assert_eq!(row.tags[1].tag_name, "9");
    }

    #[test]
    fn read_dump_skips_blank_lines_and_idless_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 2, "title": "b"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"title": "no id"}}"#).unwrap();
        writeln!(file, r#"{{"id": 1, "title": "a"}}"#).unwrap();
        let rows = read_dump(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 2);
        assert_eq!(rows[1].id, 1);
    }

    #[test]
    fn read_dump_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 1}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_dump(file.path()).unwrap_err();
        assert!(matches!(err, ZmhError::SourceSchema { line: 2, .. }));
    }

    #[test]
    fn read_dump_missing_file() {
        let err = read_dump(Path::new("/nonexistent/dump.jsonl")).unwrap_err();
        assert!(matches!(err, ZmhError::SourceNotFound { .. }));
    }
}
