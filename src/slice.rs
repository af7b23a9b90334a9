//! Heuristic section slicer.
//!
//! Splits free-form résumé or job-description text into titled sections
//! without any learned model. The result is a [`SectionMap`]: an ordered
//! `title → body` map whose iteration order is document order.
//!
//! # Algorithm
//!
//! 1. Line endings are normalized to `\n`.
//! 2. Each line is classified. A line is a *strong* header if it ends with
//!    `:` or contains a whole-word hit from [`SECTION_VOCABULARY`]. It is a
//!    *weak* header if it is at most 60 characters, has 1–6 words, and is
//!    either mostly uppercase letters or mostly Title-Case words.
//! 3. With headers present, text before the first header becomes a leading
//!    chunk and every header opens a chunk that runs to the next header.
//!    Without headers, blank-line paragraphs are grouped greedily up to
//!    `max_section_chars`.
//! 4. Chunks still over budget are regrouped on paragraph boundaries; a
//!    single paragraph over budget is cut on whitespace near the limit.
//! 5. Chunks under `min_section_chars` are folded into the chunk before
//!    them. A chunk opening with a strong header is kept only when the
//!    chunk before it is itself under `min_section_chars`.
//! 6. Titles come from the first line (trailing colon removed, long titles
//!    truncated) and repeats are suffixed `" (2)"`, `" (3)"`, ...
//!
//! The slicer is pure: the same input always yields the same map.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Section names that mark a line as a header wherever they appear as a whole word.
pub const SECTION_VOCABULARY: &[&str] = &[
    "professional summary",
    "work experience",
    "technical skills",
    "summary",
    "experience",
    "education",
    "skills",
    "projects",
    "certifications",
    "achievements",
    "publications",
    "languages",
    "contact",
    "objective",
    "profile",
    "interests",
    "hobbies",
];

/// Longest line (in characters) that the case heuristics consider a header.
const MAX_HEADER_CHARS: usize = 60;
/// Longest generated title; longer first lines are cut and suffixed with `...`.
const MAX_TITLE_CHARS: usize = 60;

/// Size limits for [`slice_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOptions {
    pub max_section_chars: usize,
    pub min_section_chars: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            max_section_chars: 2000,
            min_section_chars: 60,
        }
    }
}

/// Ordered map of section title to section body.
///
/// Titles are unique; iteration follows document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<(String, String)>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, body)| body.as_str())
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn bodies(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, b)| b.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, b)| (t.as_str(), b.as_str()))
    }

    /// Append a section. Callers guarantee `title` is not already present.
    fn push(&mut self, title: String, body: String) {
        debug_assert!(!self.contains_title(&title));
        self.entries.push((title, body));
    }
}

impl Serialize for SectionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (title, body) in &self.entries {
            map.serialize_entry(title, body)?;
        }
        map.end()
    }
}

/// Slice `text` with the default limits (2000 / 60 characters).
pub fn slice(text: &str) -> SectionMap {
    slice_with(text, &SliceOptions::default())
}

/// Slice `text` into titled sections.
pub fn slice_with(text: &str, opts: &SliceOptions) -> SectionMap {
    let max = opts.max_section_chars.max(1);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let kinds: Vec<HeaderKind> = lines.iter().map(|l| classify_line(l)).collect();

    let chunks = if kinds.iter().any(|k| *k != HeaderKind::None) {
        header_chunks(&lines, &kinds)
    } else {
        group_paragraphs(&split_paragraphs(&normalized), max)
            .into_iter()
            .map(|text| Chunk {
                text,
                anchored: false,
                joiner: "\n\n",
            })
            .collect()
    };

    let mut bounded = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if char_len(&chunk.text) <= max {
            bounded.push(chunk);
            continue;
        }
        let pieces = group_paragraphs(&split_paragraphs(&chunk.text), max);
        for (i, text) in pieces.into_iter().enumerate() {
            if i == 0 {
                bounded.push(Chunk { text, ..chunk });
            } else {
                bounded.push(Chunk {
                    text,
                    anchored: false,
                    joiner: "\n\n",
                });
            }
        }
    }

    let mut merged: Vec<Chunk> = Vec::with_capacity(bounded.len());
    for chunk in bounded {
        let min = opts.min_section_chars;
        if char_len(&chunk.text) < min {
            if let Some(prev) = merged.last_mut() {
                // a strong header only stands alone next to another small section
                if !chunk.anchored || char_len(&prev.text) >= min {
                    prev.text =
                        clean_section(&format!("{}{}{}", prev.text, chunk.joiner, chunk.text));
                    continue;
                }
            }
        }
        merged.push(chunk);
    }

    let mut out = SectionMap::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (idx, chunk) in merged.into_iter().enumerate() {
        if chunk.text.trim().is_empty() {
            continue;
        }
        let title = derive_title(&chunk.text, idx + 1);
        let key = unique_title(&title, &mut seen, &out);
        out.push(key, chunk.text);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    None,
    /// Case heuristics only.
    Weak,
    /// Trailing colon or vocabulary hit.
    Strong,
}

/// A chunk in flight. `joiner` is the separator that preceded it in the
/// source, used when it gets folded into its predecessor.
#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    anchored: bool,
    joiner: &'static str,
}

fn vocabulary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = SECTION_VOCABULARY
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("vocabulary regex is valid")
    })
}

fn paragraph_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph regex is valid"))
}

fn blank_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank-run regex is valid"))
}

fn space_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("space-run regex is valid"))
}

fn classify_line(line: &str) -> HeaderKind {
    let s = line.trim();
    if s.is_empty() {
        return HeaderKind::None;
    }
    if s.ends_with(':') || vocabulary_regex().is_match(s) {
        return HeaderKind::Strong;
    }
    if char_len(s) > MAX_HEADER_CHARS {
        return HeaderKind::None;
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    if !(1..=6).contains(&words.len()) {
        return HeaderKind::None;
    }

    let letters: Vec<char> = s.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let upper = letters.iter().filter(|c| c.is_ascii_uppercase()).count();
    if !letters.is_empty() && upper * 2 > letters.len() {
        return HeaderKind::Weak;
    }

    let title_words = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    // strictly more than 60% of words
    if title_words * 10 > words.len() * 6 {
        return HeaderKind::Weak;
    }
    HeaderKind::None
}

fn header_chunks(lines: &[&str], kinds: &[HeaderKind]) -> Vec<Chunk> {
    let starts: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k != HeaderKind::None)
        .map(|(i, _)| i)
        .collect();

    let mut chunks = Vec::with_capacity(starts.len() + 1);
    let mut gap = "\n";

    let first = starts[0];
    if first > 0 {
        let leading = &lines[..first];
        let text = leading.join("\n");
        if !text.trim().is_empty() {
            chunks.push(Chunk {
                text: clean_section(&text),
                anchored: false,
                joiner: gap,
            });
        }
        gap = trailing_gap(leading);
    }

    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(lines.len());
        let span = &lines[start..end];
        chunks.push(Chunk {
            text: clean_section(&span.join("\n")),
            anchored: kinds[start] == HeaderKind::Strong,
            joiner: gap,
        });
        gap = trailing_gap(span);
    }
    chunks
}

fn trailing_gap(span: &[&str]) -> &'static str {
    match span.last() {
        Some(last) if span.len() > 1 && last.trim().is_empty() => "\n\n",
        _ => "\n",
    }
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    paragraph_break_regex()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Greedily pack paragraphs into groups of at most `max` characters.
///
/// Group length is the sum of paragraph lengths; separators are not counted.
fn group_paragraphs(paragraphs: &[&str], max: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for &para in paragraphs {
        let plen = char_len(para);
        if plen > max {
            if !current.is_empty() {
                groups.push(clean_section(&current.join("\n\n")));
                current.clear();
                current_len = 0;
            }
            groups.extend(hard_split(para, max).into_iter().map(|p| clean_section(&p)));
            continue;
        }
        if !current.is_empty() && current_len + plen > max {
            groups.push(clean_section(&current.join("\n\n")));
            current.clear();
            current_len = 0;
        }
        current.push(para);
        current_len += plen;
    }
    if !current.is_empty() {
        groups.push(clean_section(&current.join("\n\n")));
    }
    groups
}

/// Cut a paragraph with no natural boundaries into pieces of at most `max`
/// characters, preferring to break at the last newline or space.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max) {
            Some((byte_idx, _)) => byte_idx,
            None => {
                pieces.push(remaining.trim().to_string());
                break;
            }
        };
        let split_at = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .filter(|pos| *pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn clean_section(s: &str) -> String {
    let s = s.trim();
    let s = blank_run_regex().replace_all(s, "\n\n");
    space_run_regex().replace_all(&s, " ").into_owned()
}

fn derive_title(body: &str, position: usize) -> String {
    let first = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let title = first.strip_suffix(':').unwrap_or(first).trim();
    if title.is_empty() {
        return format!("Section {}", position);
    }
    if char_len(title) > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        return format!("{}...", cut.trim_end());
    }
    title.to_string()
}

fn unique_title(title: &str, seen: &mut HashMap<String, usize>, out: &SectionMap) -> String {
    let count = seen.entry(title.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 && !out.contains_title(title) {
        return title.to_string();
    }
    loop {
        if *count == 1 {
            *count = 2;
        }
        let candidate = format!("{} ({})", title, count);
        if !out.contains_title(&candidate) {
            return candidate;
        }
        *count += 1;
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
