//! Per-field keyword match counts.
//!
//! Candidates come from the full-text index; each candidate is then tested
//! field by field with a case-insensitive literal substring match. The index
//! tokenizes, the substring test does not, so a candidate may match no field
//! at all and `totalDocs` can be lower than the candidate count.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};
use crate::fields::{Field, FieldPaths};
use crate::query::lookup;
use crate::record::{contains_folded, flatten_text};
use crate::store::DocumentStore;

pub const MAX_KEYWORD_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMatchCounts {
    pub title_docs: u64,
    pub desc_docs: u64,
    pub trans_docs: u64,
    /// Records matching at least one field. Not the sum of the others.
    pub total_docs: u64,
}

impl FieldMatchCounts {
    /// Adds one candidate document. `needle` must already be lowercased.
    pub fn tally(&mut self, doc: &Value, paths: &FieldPaths, needle: &str) {
        let title = field_contains(doc, paths.path(Field::Title), needle);
        let desc = field_contains(doc, paths.path(Field::Description), needle);
        let trans = field_contains(doc, paths.path(Field::TranscriptText), needle);

        self.title_docs += u64::from(title);
        self.desc_docs += u64::from(desc);
        self.trans_docs += u64::from(trans);
        self.total_docs += u64::from(title || desc || trans);
    }
}

pub fn check_keyword(keyword: &str) -> CatalogResult<()> {
    let chars = keyword.chars().count();
    if (1..=MAX_KEYWORD_CHARS).contains(&chars) {
        Ok(())
    } else {
        Err(CatalogError::validation(format!(
            "search keyword must be 1 to {MAX_KEYWORD_CHARS} characters, got {chars}"
        )))
    }
}

/// Counts how many full-text candidates for `keyword` contain it in their
/// title, description and transcript. No candidates yields all zeros.
pub fn count_field_matches<S: DocumentStore>(
    store: &S,
    keyword: &str,
) -> CatalogResult<FieldMatchCounts> {
    check_keyword(keyword)?;
    store
        .text_search_count(keyword)
        .map_err(CatalogError::AggregationFailure)
}

// Missing fields count as empty text.
fn field_contains(doc: &Value, path: &str, needle: &str) -> bool {
    lookup(doc, path)
        .map(flatten_text)
        .is_some_and(|text| contains_folded(&text, needle))
}
