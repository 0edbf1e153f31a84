//! Public record shape and the conversion from stored documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{Field, FieldPaths};
use crate::query::lookup;
use crate::store::VideoId;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// A video as exposed by the API. `sourceUrl` is derived from the stored
/// video key and is absent when the key is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub external_id: Option<Value>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub view_count: Option<i64>,
    pub source_url: Option<String>,
    pub transcript_text: Option<String>,
}

impl VideoRecord {
    /// Reads every public field out of `doc` through the field-path table.
    pub fn from_document(id: VideoId, doc: &Value, paths: &FieldPaths) -> Self {
        let get = |field: Field| lookup(doc, paths.path(field)).filter(|value| !value.is_null());

        Self {
            id: id.to_string(),
            external_id: get(Field::ExternalId).cloned(),
            title: get(Field::Title).map(flatten_text),
            description: get(Field::Description).map(flatten_text),
            published_at: get(Field::PublishedAt).map(flatten_text),
            view_count: get(Field::ViewCount).and_then(as_count),
            source_url: get(Field::SourceUrl)
                .map(flatten_text)
                .and_then(|key| source_url(&key)),
            transcript_text: get(Field::TranscriptText).map(flatten_text),
        }
    }
}

/// Renders a stored value as text. Arrays are joined with single spaces,
/// null becomes the empty string, other scalars use their JSON text.
pub fn flatten_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Case-insensitive literal substring test with full Unicode case folding.
/// `needle` must already be lowercased.
pub fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

// The upstream statistics payload stores counts as strings.
fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Watch URL for a stored video key, or `None` for an empty key.
pub fn source_url(video_key: &str) -> Option<String> {
    let key = video_key.trim();
    if key.is_empty() {
        None
    } else {
        Some(format!("{WATCH_URL_PREFIX}{key}"))
    }
}

/// Recovers the video key a client meant when writing `sourceUrl`.
///
/// Accepts `...watch?v=<key>&...`, `youtu.be/<key>` and bare keys.
pub fn video_key_from_url(url: &str) -> String {
    let url = url.trim();

    if let Some((_, query)) = url.split_once('?') {
        let from_query = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == "v")
            .map(|(_, value)| value.split('#').next().unwrap_or_default());
        if let Some(key) = from_query.filter(|key| !key.is_empty()) {
            return key.to_owned();
        }
    }

    if let Some((_, rest)) = url.split_once("youtu.be/") {
        let key = rest.split(['?', '#', '/']).next().unwrap_or_default();
        if !key.is_empty() {
            return key.to_owned();
        }
    }

    url.to_owned()
}
