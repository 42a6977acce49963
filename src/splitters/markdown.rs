//! Markdown header splitting.

use super::TextSplitter;
use crate::types::{HeaderRule, Metadata, TextChunk};

/// Splits markdown into one chunk per header section.
///
/// Each chunk carries the titles of its enclosing headers under the
/// configured keys (`head1`, `head2`, ...). Header lines themselves are
/// dropped from the content, and lines inside fenced code blocks are never
/// treated as headers. Chunk size and overlap do not apply.
pub struct MarkdownHeaderTextSplitter {
    headers: Vec<HeaderRule>,
}

struct ActiveHeader {
    level: usize,
    key: String,
    title: String,
}

struct Section {
    content: String,
    metadata: Metadata,
}

impl MarkdownHeaderTextSplitter {
    pub fn new(headers: &[HeaderRule]) -> Self {
        let mut headers = headers.to_vec();
        // Longest marker first, so "##" is not mistaken for "#"
        headers.sort_by(|a, b| b.marker.len().cmp(&a.marker.len()));
        Self { headers }
    }

    fn match_header<'a>(&self, line: &'a str) -> Option<(&HeaderRule, &'a str)> {
        self.headers.iter().find_map(|rule| {
            let rest = line.strip_prefix(rule.marker.as_str())?;
            if rest.is_empty() || rest.starts_with(' ') {
                Some((rule, rest.trim()))
            } else {
                None
            }
        })
    }

    fn split_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut stack: Vec<ActiveHeader> = Vec::new();
        let mut current_lines: Vec<String> = Vec::new();
        let mut current_meta: Metadata = Metadata::new();
        let mut in_code_block = false;
        let mut fence = "";

        let flush = |lines: &mut Vec<String>, metadata: &Metadata, out: &mut Vec<Section>| {
            if !lines.is_empty() {
                out.push(Section {
                    content: lines.join("\n"),
                    metadata: metadata.clone(),
                });
                lines.clear();
            }
        };

        for raw in text.lines() {
            let line: String = raw
                .trim()
                .chars()
                .filter(|c| *c == ' ' || !(c.is_control() || c.is_whitespace()))
                .collect();

            if !in_code_block {
                for marker in ["```", "~~~"] {
                    if line.starts_with(marker) && line.matches(marker).count() == 1 {
                        in_code_block = true;
                        fence = marker;
                        break;
                    }
                }
            } else if line.starts_with(fence) {
                in_code_block = false;
                fence = "";
            }

            if in_code_block {
                current_lines.push(line);
                continue;
            }

            if let Some((rule, title)) = self.match_header(&line) {
                let level = rule.marker.chars().filter(|c| *c == '#').count();

                // Content seen so far belongs to the headers before this one
                flush(&mut current_lines, &current_meta, &mut sections);

                while stack.last().map_or(false, |top| top.level >= level) {
                    stack.pop();
                }
                stack.push(ActiveHeader {
                    level,
                    key: rule.key.clone(),
                    title: title.to_string(),
                });
                current_meta = stack
                    .iter()
                    .map(|h| (h.key.clone(), h.title.clone()))
                    .collect();
                continue;
            }

            if line.is_empty() {
                flush(&mut current_lines, &current_meta, &mut sections);
            } else {
                current_lines.push(line);
            }
        }

        flush(&mut current_lines, &current_meta, &mut sections);
        sections
    }
}

impl TextSplitter for MarkdownHeaderTextSplitter {
    fn name(&self) -> &'static str {
        "MarkdownHeaderTextSplitter"
    }

    fn split_text(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks: Vec<TextChunk> = Vec::new();

        // Neighbouring sections under the same headers form one chunk
        for section in self.split_sections(text) {
            match chunks.last_mut() {
                Some(last) if last.metadata == section.metadata => {
                    last.content.push_str("  \n");
                    last.content.push_str(&section.content);
                }
                _ => chunks.push(TextChunk::new(section.content).with_metadata(section.metadata)),
            }
        }

        chunks
    }

    fn is_structural(&self) -> bool {
        true
    }
}
