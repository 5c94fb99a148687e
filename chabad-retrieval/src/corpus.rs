//! The in-memory corpus and the document sources it is loaded from.
//!
//! A [`Corpus`] is built once at startup from one or more
//! [`DocumentSource`]s and is read-only afterwards. Loading is all or
//! nothing: a source that cannot be read or parsed aborts the load.
//!
//! # Example
//!
//! ```rust,ignore
//! use chabad_retrieval::{Corpus, DocumentSource, JsonCollection};
//!
//! let sources: Vec<Box<dyn DocumentSource>> = vec![
//!     Box::new(JsonCollection::new("maamarim", "/data/maamarim")),
//!     Box::new(JsonCollection::new("sichos", "/data/sichos")),
//! ];
//! let corpus = Corpus::load(&sources)?;
//! println!("{} chunks", corpus.len());
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::document::{Chunk, ChunkKey, ChunkMetadata};
use crate::error::{RetrievalError, Result};

/// Author used when neither the path nor the book metadata names one.
pub const UNKNOWN_AUTHOR: &str = "לא ידוע";

/// Collection directory names that identify the author, checked in order.
const AUTHOR_BY_PATH: [(&[&str], &str); 5] = [
    (&["alter rebbe", "admur hazaken"], "אדמו״ר הזקן"),
    (&["mitteler rebbe"], "אדמו״ר האמצעי"),
    (&["tzemach tzedek"], "הצמח צדק"),
    (&["rebbe rayatz"], "אדמו״ר הריי״צ"),
    (&["the rebbe"], "הרבי"),
];

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A provider of corpus chunks.
///
/// Implementations adapt a concrete storage format to the [`Chunk`] shape.
pub trait DocumentSource: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Read every chunk this source provides.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CorpusUnavailable`] if the source cannot be
    /// read or parsed.
    fn load(&self) -> Result<Vec<Chunk>>;
}

/// A collection of JSON book files: a directory walked recursively, or a
/// single file.
///
/// Chunk `source_file` values are `"{collection name}/{path relative to the
/// root}"`, so two collections never produce the same identity for different
/// files.
#[derive(Debug, Clone)]
pub struct JsonCollection {
    name: String,
    root: PathBuf,
}

impl JsonCollection {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unavailable(&self, message: impl Into<String>) -> RetrievalError {
        RetrievalError::CorpusUnavailable { source_name: self.name.clone(), message: message.into() }
    }

    fn discover_files(&self) -> Result<Vec<PathBuf>> {
        if self.root.is_file() {
            return Ok(vec![self.root.clone()]);
        }
        if !self.root.is_dir() {
            return Err(self.unavailable(format!("'{}' does not exist", self.root.display())));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| self.unavailable(format!("failed to walk: {e}")))?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn relative_name(&self, path: &Path) -> String {
        let relative = if self.root.is_file() {
            path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf())
        } else {
            path.strip_prefix(&self.root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
        };
        format!("{}/{}", self.name, relative.to_string_lossy().replace('\\', "/"))
    }

    fn load_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let content = fs::read_to_string(path).map_err(|e| {
            error!(collection = %self.name, path = %path.display(), error = %e, "failed to read book file");
            self.unavailable(format!("failed to read '{}': {e}", path.display()))
        })?;
        let book: BookFile = serde_json::from_str(&content).map_err(|e| {
            error!(collection = %self.name, path = %path.display(), error = %e, "failed to parse book file");
            self.unavailable(format!("failed to parse '{}': {e}", path.display()))
        })?;

        let source_file = self.relative_name(path);
        let work = book.work_name(path);
        let author = book.author(path);

        let chunks: Vec<Chunk> = book
            .chunks
            .into_iter()
            .enumerate()
            .map(|(position, raw)| raw.into_chunk(position, &source_file, &author, &work))
            .collect();

        debug!(source_file, chunk_count = chunks.len(), "loaded book file");
        Ok(chunks)
    }
}

impl DocumentSource for JsonCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for path in self.discover_files()? {
            chunks.extend(self.load_file(&path)?);
        }
        Ok(chunks)
    }
}

/// A source backed by chunks already in memory.
#[derive(Debug, Clone)]
pub struct VecSource {
    name: String,
    chunks: Vec<Chunk>,
}

impl VecSource {
    pub fn new(name: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self { name: name.into(), chunks }
    }
}

impl DocumentSource for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Chunk>> {
        Ok(self.chunks.clone())
    }
}

// ── Book file format ───────────────────────────────────────────────

#[derive(Deserialize)]
struct BookFile {
    #[serde(default)]
    book_name_he: Option<String>,
    #[serde(default)]
    book_name_en: Option<String>,
    #[serde(default)]
    book_metadata: BookMetadata,
    #[serde(default)]
    chunks: Vec<RawChunk>,
}

#[derive(Deserialize, Default)]
struct BookMetadata {
    #[serde(default)]
    author_he: Option<String>,
    #[serde(default)]
    author_en: Option<String>,
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(default)]
    chunk_id: Value,
    #[serde(default)]
    text: String,
    #[serde(default)]
    chunk_title: Option<String>,
    #[serde(default)]
    chunk_metadata: serde_json::Map<String, Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BookFile {
    fn work_name(&self, path: &Path) -> String {
        non_empty(&self.book_name_he)
            .or_else(|| non_empty(&self.book_name_en))
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            })
    }

    fn author(&self, path: &Path) -> String {
        let lowered = path.to_string_lossy().to_lowercase();
        let by_path = AUTHOR_BY_PATH
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
            .map(|(_, author)| *author);

        by_path
            .or_else(|| non_empty(&self.book_metadata.author_he))
            .or_else(|| non_empty(&self.book_metadata.author_en))
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string()
    }
}

impl RawChunk {
    fn into_chunk(self, position: usize, source_file: &str, author: &str, work: &str) -> Chunk {
        let chunk_id = match self.chunk_id {
            Value::Null => position.to_string(),
            Value::String(s) => s,
            other => other.to_string(),
        };

        let metadata: ChunkMetadata = self
            .chunk_metadata
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect();

        let title = self
            .chunk_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| metadata.chunk_title().map(str::to_string))
            .unwrap_or_default();

        Chunk {
            source_file: source_file.to_string(),
            chunk_id,
            title,
            text: clean_markup(&self.text),
            author: author.to_string(),
            work: work.to_string(),
            metadata,
        }
    }
}

/// Remove HTML tags and collapse runs of whitespace.
pub fn clean_markup(text: &str) -> String {
    let without_tags = HTML_TAG.replace_all(text, "");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

/// SHA-256 over the ordered chunk contents, as lowercase hex.
///
/// Any change to a chunk's identity, text or descriptive fields, or to the
/// chunk order, changes the fingerprint.
pub fn fingerprint_chunks(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        for field in [&chunk.source_file, &chunk.chunk_id, &chunk.title, &chunk.text, &chunk.author, &chunk.work]
        {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        for (key, value) in chunk.metadata.iter() {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

// ── Corpus ─────────────────────────────────────────────────────────

/// Every chunk across all loaded collections, in load order.
///
/// Alongside each chunk the corpus keeps a case-folded copy of its text so
/// keyword matching does not fold the corpus on every query.
#[derive(Debug, Clone)]
pub struct Corpus {
    chunks: Vec<Chunk>,
    folded: Vec<String>,
    positions: HashMap<ChunkKey, usize>,
    fingerprint: String,
}

impl Corpus {
    /// Load every source in order into a single corpus.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CorpusUnavailable`] if any source fails and
    /// [`RetrievalError::DuplicateChunk`] if two chunks share an identity.
    pub fn load(sources: &[Box<dyn DocumentSource>]) -> Result<Self> {
        let mut chunks = Vec::new();
        for source in sources {
            let loaded = source.load()?;
            info!(source = source.name(), chunk_count = loaded.len(), "loaded document source");
            chunks.extend(loaded);
        }
        let corpus = Self::from_chunks(chunks)?;
        info!(
            chunk_count = corpus.len(),
            fingerprint = %corpus.fingerprint(),
            "corpus ready"
        );
        Ok(corpus)
    }

    /// Build a corpus from chunks already in memory.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::DuplicateChunk`] on the first repeated
    /// `(source_file, chunk_id)`.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            if positions.insert(chunk.key(), position).is_some() {
                error!(source_file = %chunk.source_file, chunk_id = %chunk.chunk_id, "duplicate chunk");
                return Err(RetrievalError::DuplicateChunk {
                    source_file: chunk.source_file.clone(),
                    chunk_id: chunk.chunk_id.clone(),
                });
            }
        }

        let folded = chunks.iter().map(|c| c.text.to_lowercase()).collect();
        let fingerprint = fingerprint_chunks(&chunks);
        Ok(Self { chunks, folded, positions, fingerprint })
    }

    /// All chunks in load order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Chunks paired with their case-folded text.
    pub(crate) fn iter_folded(&self) -> impl Iterator<Item = (&Chunk, &str)> {
        self.chunks.iter().zip(self.folded.iter().map(String::as_str))
    }

    /// Case-folded text of the chunk at `position`.
    pub(crate) fn folded_text(&self, position: usize) -> Option<&str> {
        self.folded.get(position).map(String::as_str)
    }

    pub fn position(&self, key: &ChunkKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&Chunk> {
        self.position(key).map(|p| &self.chunks[p])
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Identity of this corpus version, see [`fingerprint_chunks`].
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"{
        "book_name_he": "ליקוטי תורה",
        "book_name_en": "Likkutei Torah",
        "book_metadata": { "author_he": "", "author_en": "Rabbi Schneur Zalman" },
        "chunks": [
            { "chunk_id": 1, "text": "<p>ענין   השבת</p>\n<b>שבת שלום</b>",
              "chunk_metadata": { "chunk_title": "פרשת בהר", "seif": 3, "note": null } },
            { "chunk_id": "2", "text": "ענין התשובה", "chunk_title": "ד״ה שובה ישראל" }
        ]
    }"#;

    #[test]
    fn cleans_markup() {
        assert_eq!(clean_markup("<p>a  <i>b</i>\n\nc </p>"), "a b c");
    }

    #[test]
    fn loads_json_collection() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested/lt.json"), BOOK).unwrap();
        fs::write(temp.path().join("readme.txt"), "ignored").unwrap();

        let chunks = JsonCollection::new("maamarim", temp.path()).load().unwrap();
        assert_eq!(chunks.len(), 2);

        let first = &chunks[0];
        assert_eq!(first.source_file, "maamarim/nested/lt.json");
        assert_eq!(first.chunk_id, "1");
        assert_eq!(first.text, "ענין השבת שבת שלום");
        assert_eq!(first.title, "פרשת בהר");
        assert_eq!(first.work, "ליקוטי תורה");
        assert_eq!(first.author, "Rabbi Schneur Zalman");
        assert_eq!(first.metadata.section_label(), Some("3"));
        assert_eq!(first.metadata.get("note"), None);

        assert_eq!(chunks[1].chunk_id, "2");
        assert_eq!(chunks[1].title, "ד״ה שובה ישראל");
    }

    #[test]
    fn author_resolved_from_collection_path() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("Alter Rebbe");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("lt.json"), BOOK).unwrap();

        let chunks = JsonCollection::new("books", temp.path()).load().unwrap();
        assert_eq!(chunks[0].author, "אדמו״ר הזקן");
    }

    #[test]
    fn missing_root_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let err = JsonCollection::new("gone", temp.path().join("nope")).load().unwrap_err();
        assert!(matches!(err, RetrievalError::CorpusUnavailable { .. }));
    }

    #[test]
    fn malformed_file_fails_whole_load() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.json"), BOOK).unwrap();
        fs::write(temp.path().join("b.json"), "{ not json").unwrap();

        let sources: Vec<Box<dyn DocumentSource>> =
            vec![Box::new(JsonCollection::new("books", temp.path()))];
        let err = Corpus::load(&sources).unwrap_err();
        assert!(matches!(err, RetrievalError::CorpusUnavailable { .. }));
    }

    #[test]
    fn single_file_collection_uses_file_name() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lt.json");
        fs::write(&path, BOOK).unwrap();

        let chunks = JsonCollection::new("single", &path).load().unwrap();
        assert_eq!(chunks[0].source_file, "single/lt.json");
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("lt.json"), BOOK).unwrap();
        let chunks = JsonCollection::new("books", temp.path()).load().unwrap();

        let original = fingerprint_chunks(&chunks);
        assert_eq!(original, fingerprint_chunks(&chunks));

        let mut reversed = chunks.clone();
        reversed.reverse();
        assert_ne!(original, fingerprint_chunks(&reversed));

        let mut edited = chunks.clone();
        edited[0].text.push('!');
        assert_ne!(original, fingerprint_chunks(&edited));
    }
}
