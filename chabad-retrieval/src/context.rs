//! Presentation helpers for retrieved chunks.

use std::fmt::Write;

use crate::document::SearchResult;

/// A term occurrence with the text around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub before: String,
    pub matched: String,
    pub after: String,
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Locate the first case-insensitive occurrence of `term` in `text` and
/// return it with up to `radius` characters on each side, trimmed.
///
/// Works on characters, never splitting a multi-byte letter.
pub fn match_context(text: &str, term: &str, radius: usize) -> Option<MatchContext> {
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() {
        return None;
    }
    let haystack: Vec<char> = text.chars().collect();
    if haystack.len() < needle.len() {
        return None;
    }

    let start = (0..=haystack.len() - needle.len()).find(|&i| {
        haystack[i..i + needle.len()].iter().zip(&needle).all(|(&a, &b)| chars_match(a, b))
    })?;
    let end = start + needle.len();

    let collect = |range: std::ops::Range<usize>| -> String {
        haystack[range].iter().collect::<String>().trim().to_string()
    };

    Some(MatchContext {
        before: collect(start.saturating_sub(radius)..start),
        matched: haystack[start..end].iter().collect(),
        after: collect(end..(end + radius).min(haystack.len())),
    })
}

/// Render results as numbered blocks for a downstream summarizer.
///
/// Each block lists author, work, discourse title and chunk title, then the
/// text cut to `max_chars` characters (with `...` when cut).
pub fn render_for_summary(results: &[SearchResult], max_chars: usize) -> String {
    let mut blocks = Vec::with_capacity(results.len());

    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        let mut text: String = chunk.text.chars().take(max_chars).collect();
        if chunk.text.chars().count() > max_chars {
            text.push_str("...");
        }

        let mut block = String::new();
        let _ = writeln!(block, "**Result {}:**", i + 1);
        let _ = writeln!(block, "- **Author**: {}", chunk.author);
        let _ = writeln!(block, "- **Work**: {}", chunk.work);
        let _ = writeln!(
            block,
            "- **Discourse Title**: {}",
            chunk.discourse_title().unwrap_or_default()
        );
        let _ = writeln!(block, "- **Chunk Title**: {}", chunk.title);
        let _ = writeln!(block, "- **Text**: {text}");
        block.push_str("\n---\n");
        blocks.push(block);
    }

    blocks.join("\n")
}
