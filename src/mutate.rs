//! Create, update and delete.
//!
//! Payload keys outside [`ALLOWED_FIELDS`](crate::fields::ALLOWED_FIELDS) are
//! dropped without error. Values are written at the physical path of the
//! active layout.

use serde_json::{Map, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::fields::{Field, FieldPaths};
use crate::query::set_path;
use crate::record::{VideoRecord, video_key_from_url};
use crate::store::{DocumentStore, VideoId};

/// Parses a path identifier, reporting it as malformed on failure.
pub fn parse_id(raw: &str) -> CatalogResult<VideoId> {
    raw.parse()
        .map_err(|_| CatalogError::InvalidIdentifier(raw.to_owned()))
}

/// Keeps only recognised fields, in payload order.
pub fn allowed_fields(payload: &Map<String, Value>) -> Vec<(Field, Value)> {
    payload
        .iter()
        .filter_map(|(key, value)| Field::from_name(key).map(|field| (field, value.clone())))
        .collect()
}

fn has_title(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(title)) if !title.trim().is_empty())
}

/// Converts accepted fields into `(storage path, value)` writes.
fn to_writes(paths: &FieldPaths, fields: Vec<(Field, Value)>) -> Vec<(&'static str, Value)> {
    fields
        .into_iter()
        .map(|(field, value)| {
            let value = match (field, value) {
                (Field::SourceUrl, Value::String(url)) => Value::String(video_key_from_url(&url)),
                (_, value) => value,
            };
            (paths.path(field), value)
        })
        .collect()
}

pub fn create<S: DocumentStore>(
    store: &S,
    paths: &FieldPaths,
    payload: &Map<String, Value>,
) -> CatalogResult<VideoRecord> {
    let fields = allowed_fields(payload);
    let title = fields
        .iter()
        .find(|(field, _)| *field == Field::Title)
        .map(|(_, value)| value);
    if !has_title(title) {
        return Err(CatalogError::MissingTitle);
    }

    let mut doc = Value::Object(Map::new());
    for (path, value) in to_writes(paths, fields) {
        set_path(&mut doc, path, value);
    }

    let id = store.insert(&doc)?;
    let stored = store.get(id)?.ok_or(CatalogError::NotFound)?;
    tracing::info!(%id, "video created");
    Ok(VideoRecord::from_document(stored.id, &stored.doc, paths))
}

/// Applies a partial update. Fields not named in the payload keep their
/// stored values.
pub fn update<S: DocumentStore>(
    store: &S,
    paths: &FieldPaths,
    raw_id: &str,
    payload: &Map<String, Value>,
) -> CatalogResult<VideoRecord> {
    let id = parse_id(raw_id)?;
    let fields = allowed_fields(payload);
    if fields.is_empty() {
        return Err(CatalogError::NoValidFields);
    }
    if let Some((_, title)) = fields.iter().find(|(field, _)| *field == Field::Title) {
        if !has_title(Some(title)) {
            return Err(CatalogError::MissingTitle);
        }
    }

    let writes = to_writes(paths, fields);
    if store.update_fields(id, &writes)? == 0 {
        return Err(CatalogError::NotFound);
    }

    let stored = store.get(id)?.ok_or(CatalogError::NotFound)?;
    tracing::info!(%id, fields = writes.len(), "video updated");
    Ok(VideoRecord::from_document(stored.id, &stored.doc, paths))
}

pub fn delete<S: DocumentStore>(store: &S, raw_id: &str) -> CatalogResult<()> {
    let id = parse_id(raw_id)?;
    if store.delete(id)? == 0 {
        return Err(CatalogError::NotFound);
    }
    tracing::info!(%id, "video deleted");
    Ok(())
}
