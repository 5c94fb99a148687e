//! Query term extraction.
//!
//! [`extract_terms`] turns a free-text query into an ordered list of
//! candidate search terms: the whole normalized query first, then shorter
//! phrases, then single words. Keyword search walks the list in order and
//! stops once it has enough hits, so the order is significant.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Punctuation removed from the end of the query and from token edges.
const TERMINAL_PUNCTUATION: [char; 4] = ['?', '!', '.', ','];

/// Longest phrase window tried after the full query.
const MAX_WINDOW: usize = 4;

/// Shortest phrase window.
const MIN_WINDOW: usize = 2;

/// Single words shorter than this are not searched on their own.
const MIN_WORD_CHARS: usize = 3;

/// Transliterations and English words mapped to the Hebrew used in the corpus.
static TRANSLATIONS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        // Transliterations
        ("shabbos", "שבת"),
        ("shabbat", "שבת"),
        ("shabbes", "שבת"),
        ("teshuvah", "תשובה"),
        ("teshuva", "תשובה"),
        ("malchus", "מלכות"),
        ("malchut", "מלכות"),
        ("emunah", "אמונה"),
        ("bitachon", "בטחון"),
        ("tzimtzum", "צמצום"),
        ("bittul", "ביטול"),
        ("chassidus", "חסידות"),
        ("chasidus", "חסידות"),
        ("tanya", "תניא"),
        ("mitzvah", "מצוה"),
        ("mitzvos", "מצות"),
        ("torah", "תורה"),
        ("moshiach", "משיח"),
        ("mashiach", "משיח"),
        ("geulah", "גאולה"),
        ("galus", "גלות"),
        ("tefillah", "תפילה"),
        ("davening", "תפילה"),
        ("simcha", "שמחה"),
        ("avodah", "עבודה"),
        ("sefiros", "ספירות"),
        ("neshamah", "נשמה"),
        ("neshama", "נשמה"),
        ("ahavah", "אהבה"),
        ("yirah", "יראה"),
        ("hisbonenus", "התבוננות"),
        ("elokus", "אלקות"),
        ("yechidus", "יחידות"),
        ("kabbalah", "קבלה"),
        ("mesirus", "מסירות"),
        ("nefesh", "נפש"),
        ("ohr", "אור"),
        ("ein", "אין"),
        ("sof", "סוף"),
        ("pesach", "פסח"),
        ("sukkos", "סוכות"),
        ("chanukah", "חנוכה"),
        ("purim", "פורים"),
        ("rebbe", "רבי"),
        ("farbrengen", "התוועדות"),
        ("maamar", "מאמר"),
        ("sicha", "שיחה"),
        // English
        ("sabbath", "שבת"),
        ("repentance", "תשובה"),
        ("kingship", "מלכות"),
        ("faith", "אמונה"),
        ("trust", "בטחון"),
        ("contraction", "צמצום"),
        ("nullification", "ביטול"),
        ("commandment", "מצוה"),
        ("messiah", "משיח"),
        ("redemption", "גאולה"),
        ("exile", "גלות"),
        ("prayer", "תפילה"),
        ("joy", "שמחה"),
        ("service", "עבודה"),
        ("soul", "נשמה"),
        ("love", "אהבה"),
        ("awe", "יראה"),
        ("fear", "יראה"),
        ("contemplation", "התבוננות"),
        ("divinity", "אלקות"),
        ("godliness", "אלקות"),
        ("humility", "ענוה"),
        ("light", "אור"),
    ])
});

/// Function words in Hebrew and English that are never searched for.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // Hebrew
        "של", "את", "על", "אל", "עם", "מן", "גם", "כי", "אם", "או", "לא", "זה", "זו", "זאת",
        "הוא", "היא", "הם", "הן", "יש", "אין", "כל", "אשר", "מה", "מהו", "מהי", "מי", "איך",
        "למה", "מדוע", "כמו", "בין", "רק", "עוד", "אבל", "כן", "שם", "פה", "לי", "לו", "לה",
        "ב", "ל", "ה", "ו", "ש", "מ", "כ",
        // English
        "a", "an", "the", "of", "in", "on", "at", "to", "for", "from", "by", "with", "about",
        "and", "or", "but", "is", "are", "was", "were", "be", "been", "it", "its", "this",
        "that", "these", "those", "what", "which", "who", "whom", "how", "why", "when", "where",
        "do", "does", "did", "me", "my", "i", "you", "your", "tell", "explain", "say", "says",
        "mean", "means", "meaning", "according", "please",
    ])
});

/// Look up the Hebrew form of a transliterated or English word.
pub fn translate(word: &str) -> Option<&'static str> {
    TRANSLATIONS.get(word.to_lowercase().as_str()).copied()
}

/// Whether `word` is a stop word, ignoring case.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

/// Normalize a query into search tokens: punctuation stripped, translated,
/// stop words removed.
pub fn normalize_tokens(query: &str) -> Vec<String> {
    query
        .trim()
        .trim_end_matches(TERMINAL_PUNCTUATION)
        .split_whitespace()
        .map(|token| token.trim_matches(TERMINAL_PUNCTUATION))
        .filter(|token| !token.is_empty())
        .map(|token| translate(token).map(str::to_string).unwrap_or_else(|| token.to_string()))
        .filter(|token| !is_stop_word(token))
        .collect()
}

/// Extract candidate search terms from a query, most specific first.
///
/// The list holds, without duplicates: the whole normalized query, every
/// phrase of four, three and then two consecutive tokens, and every token
/// of at least three characters. A query that yields nothing falls back to
/// `[query]`, so the result is never empty.
pub fn extract_terms(query: &str) -> Vec<String> {
    let tokens = normalize_tokens(query);

    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    let mut push = |term: String| {
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    };

    if !tokens.is_empty() {
        push(tokens.join(" "));
    }

    for size in (MIN_WINDOW..=MAX_WINDOW.min(tokens.len())).rev() {
        for window in tokens.windows(size) {
            push(window.join(" "));
        }
    }

    for token in &tokens {
        if token.chars().count() >= MIN_WORD_CHARS {
            push(token.clone());
        }
    }

    if terms.is_empty() {
        terms.push(query.to_string());
    }
    terms
}
