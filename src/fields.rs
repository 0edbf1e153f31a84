//! Logical field names and where they physically live inside a stored
//! document.
//!
//! Deployments disagree on document shape: older collections keep the
//! snippet fields under `details.snippet`, newer ones store them flat. Every
//! query, projection and write goes through a [`FieldPaths`] table so the same
//! logic serves either layout.

use std::{fmt, str::FromStr};

use anyhow::{Result, bail};

/// Field names clients may filter on, search in, or write.
pub const ALLOWED_FIELDS: [Field; 7] = [
    Field::ExternalId,
    Field::Title,
    Field::Description,
    Field::PublishedAt,
    Field::ViewCount,
    Field::SourceUrl,
    Field::TranscriptText,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ExternalId,
    Title,
    Description,
    PublishedAt,
    ViewCount,
    SourceUrl,
    TranscriptText,
}

impl Field {
    /// Key used in request payloads and query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::ExternalId => "Id",
            Field::Title => "title",
            Field::Description => "description",
            Field::PublishedAt => "publishedAt",
            Field::ViewCount => "viewCount",
            Field::SourceUrl => "sourceUrl",
            Field::TranscriptText => "transcriptText",
        }
    }

    /// Looks up an allowed field by its wire name. Matching is exact, the
    /// same way payload keys are matched.
    pub fn from_name(name: &str) -> Option<Field> {
        ALLOWED_FIELDS
            .iter()
            .copied()
            .find(|field| field.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldLayout {
    Flat,
    #[default]
    Nested,
}

impl FromStr for FieldLayout {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(FieldLayout::Flat),
            "nested" => Ok(FieldLayout::Nested),
            other => bail!("unknown field layout {other:?} (expected \"flat\" or \"nested\")"),
        }
    }
}

/// What to do with `search` when `search_field` names something outside
/// [`ALLOWED_FIELDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFallback {
    /// Drop the search condition entirely.
    #[default]
    Skip,
    /// Run the keyword as a whole-document full-text search.
    AnyField,
}

impl FromStr for SearchFallback {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(SearchFallback::Skip),
            "any" | "any_field" => Ok(SearchFallback::AnyField),
            other => bail!("unknown search fallback {other:?} (expected \"skip\" or \"any\")"),
        }
    }
}

/// Translation table from logical field to dotted storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPaths {
    external_id: &'static str,
    title: &'static str,
    description: &'static str,
    published_at: &'static str,
    view_count: &'static str,
    video_key: &'static str,
    transcript_text: &'static str,
}

impl FieldPaths {
    pub fn flat() -> Self {
        Self {
            external_id: "Id",
            title: "title",
            description: "description",
            published_at: "publishedAt",
            view_count: "viewCount",
            video_key: "youtubeId",
            transcript_text: "transcriptText",
        }
    }

    pub fn nested() -> Self {
        Self {
            external_id: "sqlId",
            title: "details.snippet.title",
            description: "details.snippet.description",
            published_at: "details.snippet.publishedAt",
            view_count: "details.statistics.viewCount",
            video_key: "youtubeId",
            transcript_text: "transcriptText",
        }
    }

    pub fn for_layout(layout: FieldLayout) -> Self {
        match layout {
            FieldLayout::Flat => Self::flat(),
            FieldLayout::Nested => Self::nested(),
        }
    }

    /// Storage path for a logical field. `sourceUrl` resolves to the stored
    /// video key it is derived from.
    pub fn path(&self, field: Field) -> &'static str {
        match field {
            Field::ExternalId => self.external_id,
            Field::Title => self.title,
            Field::Description => self.description,
            Field::PublishedAt => self.published_at,
            Field::ViewCount => self.view_count,
            Field::SourceUrl => self.video_key,
            Field::TranscriptText => self.transcript_text,
        }
    }

    /// Paths of the fields fed into the full-text index.
    pub fn text_paths(&self) -> [&'static str; 3] {
        [self.title, self.description, self.transcript_text]
    }
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self::for_layout(FieldLayout::default())
    }
}

/// Splits a dotted path into its segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_only_accepts_allowed_keys() {
        assert_eq!(Field::from_name("title"), Some(Field::Title));
        assert_eq!(Field::from_name("Id"), Some(Field::ExternalId));
        assert_eq!(Field::from_name("id"), None);
        assert_eq!(Field::from_name("unknownField"), None);
    }

    #[test]
    fn layouts_differ_only_in_paths() {
        let flat = FieldPaths::flat();
        let nested = FieldPaths::nested();
        assert_eq!(flat.path(Field::Title), "title");
        assert_eq!(nested.path(Field::Title), "details.snippet.title");
        assert_eq!(nested.path(Field::ViewCount), "details.statistics.viewCount");
        assert_eq!(flat.path(Field::SourceUrl), nested.path(Field::SourceUrl));
    }

    #[test]
    fn parses_layout_and_fallback() {
        assert_eq!("FLAT".parse::<FieldLayout>().unwrap(), FieldLayout::Flat);
        assert_eq!(" any ".parse::<SearchFallback>().unwrap(), SearchFallback::AnyField);
        assert!("deep".parse::<FieldLayout>().is_err());
    }
}
