//! Filter compiler.
//!
//! Turns the optional listing parameters into a [`Filter`] tree plus a
//! [`Projection`]. The tree is store-agnostic; `store` renders it to SQL.
//! Every compiled filter is an `And` whose first member is the mandatory
//! title constraint, so no listing can return an untitled record.

use serde_json::{Map, Value};

use crate::fields::{self, ALLOWED_FIELDS, Field, FieldPaths, SearchFallback};
use crate::store::VideoId;

/// A predicate over stored documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    /// The value at `path` exists, is a string, and is not blank after
    /// trimming.
    NonBlankString { path: &'static str },
    /// Case-insensitive substring test. `needle` is literal text: store
    /// backends must escape any pattern syntax it contains.
    ContainsText { path: &'static str, needle: String },
    /// Full-text index match across the whole document. Any whitespace
    /// separated term may match.
    TextSearch { keyword: String },
    /// Identifier strictly greater than the cursor.
    IdAfter(VideoId),
}

impl Filter {
    /// Appends a constraint, flattening into an existing `And`.
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut members) => {
                members.push(other);
                Filter::And(members)
            }
            single => Filter::And(vec![single, other]),
        }
    }
}

/// Optional inputs accepted by the listing operation.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub transcript_text: Option<String>,
    pub search: Option<String>,
    pub search_field: Option<String>,
}

/// Output of [`FilterCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub filter: Filter,
    pub projection: Projection,
    /// Field paths the query was compiled against.
    pub paths: FieldPaths,
    /// Each supplied filter on its own, for the per-filter count breakdown.
    pub parts: FilterParts,
}

/// The individual optional constraints, kept separately from the combined
/// filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParts {
    pub title: Option<Filter>,
    pub description: Option<Filter>,
    pub transcript_text: Option<Filter>,
    pub search: Option<Filter>,
}

/// Builds filters against one field-path table with one fallback policy.
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    paths: FieldPaths,
    fallback: SearchFallback,
}

impl FilterCompiler {
    pub fn new(paths: FieldPaths, fallback: SearchFallback) -> Self {
        Self { paths, fallback }
    }

    pub fn paths(&self) -> &FieldPaths {
        &self.paths
    }

    /// The constraint every listing carries.
    pub fn title_present(&self) -> Filter {
        Filter::NonBlankString {
            path: self.paths.path(Field::Title),
        }
    }

    pub fn compile(&self, params: &ListParams) -> CompiledQuery {
        let parts = FilterParts {
            title: non_blank(&params.title).map(|needle| self.contains(Field::Title, needle)),
            description: non_blank(&params.description)
                .map(|needle| self.contains(Field::Description, needle)),
            transcript_text: non_blank(&params.transcript_text)
                .map(|needle| self.contains(Field::TranscriptText, needle)),
            search: non_blank(&params.search)
                .and_then(|keyword| self.search(keyword, params.search_field.as_deref())),
        };

        let mut members = vec![self.title_present()];
        members.extend(
            [&parts.search, &parts.title, &parts.description, &parts.transcript_text]
                .into_iter()
                .flatten()
                .cloned(),
        );

        CompiledQuery {
            filter: Filter::And(members),
            projection: Projection::public_fields(&self.paths),
            paths: self.paths.clone(),
            parts,
        }
    }

    fn contains(&self, field: Field, needle: &str) -> Filter {
        Filter::ContainsText {
            path: self.paths.path(field),
            needle: needle.to_owned(),
        }
    }

    fn search(&self, keyword: &str, search_field: Option<&str>) -> Option<Filter> {
        let any_field = || Filter::TextSearch {
            keyword: keyword.to_owned(),
        };

        let requested = search_field
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("any"));

        match requested {
            None => Some(any_field()),
            Some(name) => match Field::from_name(name) {
                Some(field) => Some(self.contains(field, keyword)),
                None => {
                    tracing::debug!(
                        search_field = name,
                        policy = ?self.fallback,
                        "search_field not allowed"
                    );
                    match self.fallback {
                        SearchFallback::Skip => None,
                        SearchFallback::AnyField => Some(any_field()),
                    }
                }
            },
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Storage paths to keep when returning documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    paths: Vec<&'static str>,
}

impl Projection {
    pub fn public_fields(paths: &FieldPaths) -> Self {
        Self {
            paths: ALLOWED_FIELDS.iter().map(|field| paths.path(*field)).collect(),
        }
    }

    /// Copies only the projected paths out of `doc`, preserving nesting.
    pub fn apply(&self, doc: &Value) -> Value {
        let mut out = Value::Object(Map::new());
        for path in &self.paths {
            if let Some(value) = lookup(doc, path) {
                set_path(&mut out, path, value.clone());
            }
        }
        out
    }
}

/// Resolves a dotted path inside a JSON document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    fields::segments(path).try_fold(doc, |value, segment| value.get(segment))
}

/// Writes `value` at a dotted path, creating intermediate objects. A
/// non-object found on the way is replaced.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = fields::segments(path).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        current = ensure_object(current)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.to_string(), value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("replaced with an object above"),
    }
}
