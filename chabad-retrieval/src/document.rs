//! Data types for chunks, their metadata, and search results.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker that opens a discourse heading ("dibbur hamaschil").
const DISCOURSE_MARKER: &str = "ד״ה";

static DISCOURSE_IN_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ד״ה\s*([^/]+)").expect("valid discourse regex"));

/// The identity of a [`Chunk`] within the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    /// Path of the book file, relative to its collection root.
    pub source_file: String,
    /// Identifier of the chunk inside that file.
    pub chunk_id: String,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_file, self.chunk_id)
    }
}

/// Free-form chunk metadata with typed accessors for the fields the corpus
/// is known to carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkMetadata(BTreeMap<String, String>);

impl ChunkMetadata {
    /// Section fields, in the order they are consulted.
    pub const SECTION_FIELDS: [&'static str; 4] = ["seif", "perek", "farbrengen", "sicha"];

    /// Discourse-title fields, in the order they are consulted.
    pub const DISCOURSE_FIELDS: [&'static str; 3] =
        ["dibbur_hamaschil", "maamar", "discourse_title"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Return the value for `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// The section label: first non-empty of `seif`, `perek`, `farbrengen`, `sicha`.
    pub fn section_label(&self) -> Option<&str> {
        self.first_of(&Self::SECTION_FIELDS)
    }

    /// The chunk title recorded in metadata, if any.
    pub fn chunk_title(&self) -> Option<&str> {
        self.get("chunk_title")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn first_of(&self, fields: &[&str]) -> Option<&str> {
        fields.iter().find_map(|field| self.get(field))
    }
}

impl FromIterator<(String, String)> for ChunkMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The smallest retrievable unit of corpus text.
///
/// Chunks are created once when the corpus is loaded and never mutated
/// afterwards. Relevance scores live on [`SearchResult`], not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Path of the book file, relative to its collection root.
    pub source_file: String,
    /// Identifier of the chunk inside its book.
    pub chunk_id: String,
    /// Section heading of the chunk.
    pub title: String,
    /// Body text with markup removed.
    pub text: String,
    /// Resolved author of the book.
    pub author: String,
    /// Name of the book (work) the chunk belongs to.
    pub work: String,
    /// Per-chunk metadata from the source document.
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// The deduplication key of this chunk.
    pub fn key(&self) -> ChunkKey {
        ChunkKey { source_file: self.source_file.clone(), chunk_id: self.chunk_id.clone() }
    }

    /// The discourse title (`ד״ה ...`) of the chunk.
    ///
    /// Metadata fields win; otherwise the heading is parsed out of the chunk
    /// title when it contains the discourse marker.
    pub fn discourse_title(&self) -> Option<String> {
        if let Some(title) = self.metadata.first_of(&ChunkMetadata::DISCOURSE_FIELDS) {
            return Some(title.to_string());
        }

        let title = self.metadata.chunk_title().unwrap_or(&self.title);
        if !title.contains(DISCOURSE_MARKER) {
            return None;
        }
        DISCOURSE_IN_TITLE
            .captures(title)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|heading| !heading.is_empty())
            .map(|heading| format!("{DISCOURSE_MARKER} {heading}"))
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The relevance score for this query (higher is more relevant).
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }

    pub fn key(&self) -> ChunkKey {
        self.chunk.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(title: &str, metadata: &[(&str, &str)]) -> Chunk {
        Chunk {
            source_file: "tanya.json".into(),
            chunk_id: "1".into(),
            title: title.into(),
            text: "text".into(),
            author: "אדמו״ר הזקן".into(),
            work: "תניא".into(),
            metadata: metadata.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn section_label_takes_first_non_empty_field() {
        let chunk = chunk_with("", &[("seif", " "), ("perek", "ג"), ("sicha", "א")]);
        assert_eq!(chunk.metadata.section_label(), Some("ג"));

        let chunk = chunk_with("", &[("farbrengen", "שבת בראשית")]);
        assert_eq!(chunk.metadata.section_label(), Some("שבת בראשית"));

        assert_eq!(chunk_with("", &[]).metadata.section_label(), None);
    }

    #[test]
    fn discourse_title_prefers_metadata() {
        let chunk = chunk_with("ד״ה באתי לגני", &[("maamar", "ד״ה ואתה תצוה")]);
        assert_eq!(chunk.discourse_title().as_deref(), Some("ד״ה ואתה תצוה"));
    }

    #[test]
    fn discourse_title_parsed_from_title() {
        let chunk = chunk_with("תש״י / ד״ה באתי לגני / פרק א", &[]);
        assert_eq!(chunk.discourse_title().as_deref(), Some("ד״ה באתי לגני"));

        assert_eq!(chunk_with("פרק א", &[]).discourse_title(), None);
    }

    #[test]
    fn key_display_joins_file_and_id() {
        let chunk = chunk_with("", &[]);
        assert_eq!(chunk.key().to_string(), "tanya.json#1");
    }
}
