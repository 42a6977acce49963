//! Recursive character splitting.
//!
//! Text is split on the first separator that occurs in it; pieces still too
//! large are split again with the remaining separators, and small pieces are
//! packed back together up to the size budget.

use regex::Regex;

use super::{SizeBudget, TextSplitter};
use crate::error::SplitterError;
use crate::types::TextChunk;

lazy_static::lazy_static! {
    static ref NEWLINE_RUNS: Regex = Regex::new(r"\n{2,}").unwrap();
}

/// A boundary to split text on.
#[derive(Debug, Clone)]
pub enum Separator {
    /// Split on an exact string; the empty string splits into characters
    Literal(String),
    /// Split on every match of a pattern
    Pattern(Regex),
}

impl Separator {
    pub fn literal(s: &str) -> Self {
        Separator::Literal(s.to_string())
    }

    pub fn pattern(pattern: &str) -> Result<Self, SplitterError> {
        Ok(Separator::Pattern(Regex::new(pattern)?))
    }

    fn is_empty(&self) -> bool {
        matches!(self, Separator::Literal(s) if s.is_empty())
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Separator::Literal(s) => text.contains(s.as_str()),
            Separator::Pattern(re) => re.is_match(text),
        }
    }

    /// Byte ranges of every non-empty match, in order.
    fn matches(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Separator::Literal(s) => text
                .match_indices(s.as_str())
                .map(|(i, m)| (i, i + m.len()))
                .collect(),
            Separator::Pattern(re) => re
                .find_iter(text)
                .map(|m| (m.start(), m.end()))
                .filter(|(start, end)| end > start)
                .collect(),
        }
    }
}

/// Which neighbour keeps a separator after splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorPlacement {
    /// The separator starts the following piece
    Start,
    /// The separator ends the preceding piece
    End,
}

/// Recursive character text splitter.
pub struct RecursiveCharacterTextSplitter {
    name: &'static str,
    separators: Vec<Separator>,
    placement: SeparatorPlacement,
    collapse_newlines: bool,
    budget: SizeBudget,
}

impl RecursiveCharacterTextSplitter {
    /// Create a splitter with the default separators (paragraphs, lines,
    /// words, characters).
    pub fn new(budget: SizeBudget) -> Self {
        Self {
            name: "RecursiveCharacterTextSplitter",
            separators: ["\n\n", "\n", " ", ""].iter().map(|s| Separator::literal(s)).collect(),
            placement: SeparatorPlacement::Start,
            collapse_newlines: false,
            budget,
        }
    }

    /// Create a splitter tuned for markdown, preferring header and fence
    /// boundaries.
    pub fn for_markdown(budget: SizeBudget) -> Self {
        Self {
            name: "MarkdownTextSplitter",
            separators: [
                "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n", "\n\n",
                "\n", " ", "",
            ]
            .iter()
            .map(|s| Separator::literal(s))
            .collect(),
            placement: SeparatorPlacement::Start,
            collapse_newlines: false,
            budget,
        }
    }

    /// Create a splitter for Chinese text.
    ///
    /// Sentence punctuation (full-width and ASCII) stays at the end of the
    /// sentence it closes, and blank-line runs inside chunks collapse to a
    /// single newline.
    pub fn chinese(budget: SizeBudget) -> Result<Self, SplitterError> {
        let separators = vec![
            Separator::literal("\n\n"),
            Separator::literal("\n"),
            Separator::pattern("。|！|？")?,
            Separator::pattern(r"\.\s|\!\s|\?\s")?,
            Separator::pattern(r"；|;\s")?,
            Separator::pattern(r"，|,\s")?,
        ];
        Ok(Self {
            name: "ChineseRecursiveTextSplitter",
            separators,
            placement: SeparatorPlacement::End,
            collapse_newlines: true,
            budget,
        })
    }

    /// Create a splitter with custom separators.
    pub fn with_separators(mut self, separators: Vec<Separator>) -> Self {
        self.separators = separators;
        self
    }

    fn split_on(&self, text: &str, separator: &Separator) -> Vec<String> {
        if separator.is_empty() {
            return text.chars().map(String::from).collect();
        }

        let mut pieces = Vec::new();
        let mut last = 0;
        for (start, end) in separator.matches(text) {
            let cut = match self.placement {
                SeparatorPlacement::Start => start,
                SeparatorPlacement::End => end,
            };
            pieces.push(&text[last..cut]);
            last = cut;
        }
        pieces.push(&text[last..]);

        pieces
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let mut chunks = Vec::new();

        // Pick the first separator present in the text; the rest are used on
        // pieces that are still too large.
        let mut separator = separators.last();
        let mut remaining: &[Separator] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = Some(candidate);
                break;
            }
            if candidate.is_match(text) {
                separator = Some(candidate);
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits = match separator {
            Some(separator) => self.split_on(text, separator),
            None => vec![text.to_string()],
        };

        let mut small = Vec::new();
        for split in splits {
            if self.budget.measure(split.trim()) < self.budget.chunk_size() {
                small.push(split);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.budget.merge_splits(&small, ""));
                small.clear();
            }

            if remaining.is_empty() {
                chunks.push(split);
            } else {
                chunks.extend(self.split_recursive(&split, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.budget.merge_splits(&small, ""));
        }

        chunks
    }
}

impl TextSplitter for RecursiveCharacterTextSplitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn split_text(&self, text: &str) -> Vec<TextChunk> {
        self.split_recursive(text, &self.separators)
            .into_iter()
            .filter_map(|chunk| {
                if self.collapse_newlines {
                    let collapsed = NEWLINE_RUNS.replace_all(chunk.trim(), "\n").into_owned();
                    (!collapsed.is_empty()).then_some(collapsed)
                } else {
                    Some(chunk)
                }
            })
            .map(TextChunk::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitters::{CharCounter, TiktokenCounter, TokenCounter};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn budget(size: usize, overlap: usize) -> SizeBudget {
        SizeBudget::new(size, overlap, Arc::new(CharCounter)).unwrap()
    }

    fn contents(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(100, 10));
        let chunks = splitter.split_text("Hello world.");
        assert_eq!(contents(&chunks), vec!["Hello world."]);
    }

    #[test]
    fn test_paragraphs_are_split_first() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(20, 0));
        let text = "First paragraph.\n\nSecond paragraph.";
        let chunks = splitter.split_text(text);
        assert_eq!(contents(&chunks), vec!["First paragraph.", "Second paragraph."]);
    }

    #[test]
    fn test_words_with_overlap() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(10, 5));
        let chunks = splitter.split_text("aaaa bbbb cccc dddd");
        assert_eq!(contents(&chunks), vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(30, 10));
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 30, "{:?}", chunk.content);
            assert!(!chunk.content.is_empty());
        }
    }

    #[test]
    fn test_token_chunks_never_exceed_size() {
        let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::new().unwrap());
        let text = (0..300)
            .map(|i| format!("Sentence number {} talks about knowledge bases and chunking.", i))
            .collect::<Vec<_>>()
            .join(" ");

        for (size, overlap) in [(1000, 200), (200, 40), (50, 10)] {
            let budget = SizeBudget::new(size, overlap, Arc::clone(&counter)).unwrap();
            let chunks = RecursiveCharacterTextSplitter::new(budget).split_text(&text);
            assert!(chunks.len() > 1);
            for chunk in &chunks {
                let tokens = counter.count_tokens(&chunk.content);
                assert!(tokens <= size, "{} tokens with chunk_size {}", tokens, size);
            }
            for pair in chunks.windows(2).filter(|_| overlap >= 40) {
                let head: String = pair[1].content.chars().take(20).collect();
                assert!(pair[0].content.contains(&head), "no overlap at chunk_size {}", size);
            }
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(4, 0));
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(contents(&chunks), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(10, 0));
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_markdown_prefers_headers() {
        let splitter = RecursiveCharacterTextSplitter::for_markdown(budget(30, 0));
        let text = "# One\nalpha beta gamma\n# Two\ndelta epsilon";
        let chunks = splitter.split_text(text);
        assert_eq!(splitter.name(), "MarkdownTextSplitter");
        assert_eq!(contents(&chunks), vec!["# One\nalpha beta gamma", "# Two\ndelta epsilon"]);
    }

    #[test]
    fn test_chinese_keeps_punctuation_with_sentence() {
        let splitter = RecursiveCharacterTextSplitter::chinese(budget(8, 0)).unwrap();
        let chunks = splitter.split_text("今天天气很好。我们去公园吧！好的。");
        assert_eq!(splitter.name(), "ChineseRecursiveTextSplitter");
        assert_eq!(contents(&chunks), vec!["今天天气很好。", "我们去公园吧！", "好的。"]);
    }

    #[test]
    fn test_chinese_collapses_blank_lines() {
        let splitter = RecursiveCharacterTextSplitter::chinese(budget(100, 0)).unwrap();
        let chunks = splitter.split_text("第一段\n\n\n第二段");
        assert_eq!(contents(&chunks), vec!["第一段\n第二段"]);
    }

    #[test]
    fn test_custom_pattern_separator() {
        let splitter = RecursiveCharacterTextSplitter::new(budget(5, 0))
            .with_separators(vec![Separator::pattern(r"\d").unwrap(), Separator::literal("")]);
        let chunks = splitter.split_text("abc1def2ghi");
        assert_eq!(contents(&chunks), vec!["abc", "1def", "2ghi"]);
    }
}
