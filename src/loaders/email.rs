//! E-mail messages (`.eml`) and Outlook items (`.msg`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;

use super::markup::html_text;
use super::{extension_of, source_of, Loader, LoaderOptions};
use crate::error::Result;
use crate::types::RawDocument;

lazy_static::lazy_static! {
    static ref ENCODED_WORD: Regex = Regex::new(r"=\?([^?]+)\?([bBqQ])\?([^?]*)\?=").unwrap();
    static ref ENCODED_WORD_GAP: Regex = Regex::new(r"\?=\s+=\?").unwrap();
}

const MIN_RUN: usize = 4;

/// A parsed RFC 822 message part.
#[derive(Debug, Default)]
pub(crate) struct MessagePart {
    headers: Vec<(String, String)>,
    body: String,
}

impl MessagePart {
    /// Parse headers and raw body from message text.
    pub(crate) fn parse(raw: &str) -> Self {
        let raw = raw.replace("\r\n", "\n");
        let (head, body) = match raw.find("\n\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 2..]),
            None => (raw.as_str(), ""),
        };

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded continuation of the previous header
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Self {
            headers,
            body: body.to_string(),
        }
    }

    /// Header value by case-insensitive name, with encoded words decoded.
    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| decode_encoded_words(v))
    }

    fn content_type(&self) -> (String, Vec<(String, String)>) {
        let raw = self
            .header("content-type")
            .unwrap_or_else(|| "text/plain".to_string());
        let mut parts = raw.split(';');
        let media_type = parts.next().unwrap_or("text/plain").trim().to_lowercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().trim_matches('"').to_string()))
            .collect();
        (media_type, params)
    }

    /// Body with transfer encoding and charset undone.
    fn decoded_body(&self) -> String {
        let (_, params) = self.content_type();
        let charset = params
            .iter()
            .find(|(k, _)| k == "charset")
            .map(|(_, v)| v.as_str());

        let transfer = self
            .header("content-transfer-encoding")
            .unwrap_or_default()
            .to_lowercase();

        let bytes = match transfer.as_str() {
            "base64" => {
                let compact: String = self.body.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact.as_bytes())
                    .unwrap_or_else(|_| self.body.as_bytes().to_vec())
            }
            "quoted-printable" => decode_quoted_printable(&self.body),
            _ => self.body.as_bytes().to_vec(),
        };

        decode_charset(&bytes, charset)
    }

    /// Readable text of the message: plain-text parts preferred, HTML parts
    /// reduced to their visible text otherwise.
    pub(crate) fn text(&self) -> String {
        let mut plain = Vec::new();
        let mut html = Vec::new();
        self.collect_text(&mut plain, &mut html);

        let parts = if plain.is_empty() { html } else { plain };
        parts.join("\n\n").trim().to_string()
    }

    fn collect_text(&self, plain: &mut Vec<String>, html: &mut Vec<String>) {
        let (media_type, params) = self.content_type();

        if media_type.starts_with("multipart/") {
            let Some(boundary) = params.iter().find(|(k, _)| k == "boundary").map(|(_, v)| v) else {
                return;
            };
            for part in split_multipart(&self.body, boundary) {
                MessagePart::parse(&part).collect_text(plain, html);
            }
        } else if media_type == "text/plain" {
            plain.push(self.decoded_body().trim().to_string());
        } else if media_type == "text/html" {
            html.push(html_text(&self.decoded_body()).0);
        }
    }
}

fn split_multipart(body: &str, boundary: &str) -> Vec<String> {
    let delimiter = format!("--{}", boundary);
    let terminator = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in body.lines() {
        let trimmed = line.trim_end();
        if trimmed == terminator {
            break;
        }
        if trimmed == delimiter {
            if let Some(lines) = current.take() {
                parts.push(lines.join("\n"));
            }
            current = Some(Vec::new());
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current {
        parts.push(lines.join("\n"));
    }

    parts
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|c| Encoding::for_label(c.as_bytes()))
        .unwrap_or(UTF_8);
    encoding.decode(bytes).0.into_owned()
}

fn decode_quoted_printable(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft line break
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            let hex = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            );
            if let (Some(high), Some(low)) = hex {
                out.push((high * 16 + low) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

/// Decode RFC 2047 encoded words (`=?utf-8?B?...?=`) in a header value.
fn decode_encoded_words(value: &str) -> String {
    let value = ENCODED_WORD_GAP.replace_all(value, "?==?");
    ENCODED_WORD
        .replace_all(&value, |caps: &regex::Captures<'_>| {
            let charset = &caps[1];
            let payload = &caps[3];
            let bytes = if caps[2].eq_ignore_ascii_case("b") {
                match STANDARD.decode(payload) {
                    Ok(bytes) => bytes,
                    Err(_) => return caps[0].to_string(),
                }
            } else {
                decode_quoted_printable(&payload.replace('_', " "))
            };
            decode_charset(&bytes, Some(charset))
        })
        .into_owned()
}

fn is_text_char(c: char) -> bool {
    matches!(c,
        ' '..='~' | '\n' | '\r' | '\t'
        | '\u{00A0}'..='\u{024F}'
        | '\u{2000}'..='\u{206F}'
        | '\u{3000}'..='\u{30FF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{FF01}'..='\u{FF5E}')
}

fn push_run(current: &mut String, runs: &mut Vec<String>) {
    let trimmed = current.trim();
    if trimmed.chars().count() >= MIN_RUN {
        runs.push(trimmed.to_string());
    }
    current.clear();
}

/// Printable string runs of a binary Outlook item.
///
/// Property streams hold text as UTF-16LE (or 8-bit for old items); runs
/// shorter than four characters are noise and dropped.
pub(crate) fn msg_text(bytes: &[u8]) -> String {
    let mut runs = Vec::new();
    let mut current = String::new();

    for pair in bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        match char::from_u32(unit as u32).filter(|c| is_text_char(*c)) {
            Some(c) => current.push(c),
            None => push_run(&mut current, &mut runs),
        }
    }
    push_run(&mut current, &mut runs);

    if runs.is_empty() {
        for &b in bytes {
            if (b' '..=b'~').contains(&b) || b == b'\n' || b == b'\t' {
                current.push(b as char);
            } else {
                push_run(&mut current, &mut runs);
            }
        }
        push_run(&mut current, &mut runs);
    }

    let mut seen = HashSet::new();
    runs.retain(|run| seen.insert(run.clone()));
    runs.join("\n")
}

/// Loads an e-mail as one document with its headers in metadata.
pub struct UnstructuredEmailLoader {
    path: PathBuf,
}

impl UnstructuredEmailLoader {
    pub fn new(path: &Path, _options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Loader for UnstructuredEmailLoader {
    fn name(&self) -> &'static str {
        "UnstructuredEmailLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let source = source_of(&self.path);

        if extension_of(&self.path) == "msg" {
            return Ok(vec![RawDocument::new(msg_text(&bytes), source)]);
        }

        let message = MessagePart::parse(&String::from_utf8_lossy(&bytes));
        let mut doc = RawDocument::new(message.text(), source);
        for key in ["subject", "from", "to", "date"] {
            if let Some(value) = message.header(key) {
                doc = doc.with_meta(key, value);
            }
        }
        Ok(vec![doc])
    }
}
