//! Character encoding detection and decoding.

use std::path::Path;

use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS, UTF_8, WINDOWS_1252};

use crate::error::{Error, Result};

/// Legacy encodings tried when the input is not UTF-8, in tie-break order.
fn candidates() -> [&'static Encoding; 5] {
    [GBK, BIG5, SHIFT_JIS, EUC_KR, WINDOWS_1252]
}

const COMMON_SIMPLIFIED: &str = "的一是不了人我在有他这为之大来以个中上们到说国和地也子时道出而要于就下得可你年生自会那后能对着事其里所去行过家十用发天如然作方成者多日都三小军二无同么经法当起与好看学进种将还分此心前面又定见只主没公从";

const COMMON_TRADITIONAL: &str = "的一是不了人我在有他這為之大來以個中上們到說國和地也子時道出而要於就下得可你年生自會那後能對著事其裡所去行過家十用發天如然作方成者多日都三小軍二無同麼經法當起與好看學進種將還分此心前面又定見只主沒公從";

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}')
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c, '\u{3000}'..='\u{303F}' | '\u{FF01}'..='\u{FF5E}')
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{30FF}')
}

fn is_halfwidth_kana(c: char) -> bool {
    matches!(c, '\u{FF61}'..='\u{FF9F}')
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}')
}

/// Whether `c` lives in the original double-byte rows of `encoding` rather
/// than in a later extension area, where real text rarely goes.
fn in_core_rows(encoding: &'static Encoding, c: char) -> bool {
    let mut buf = [0u8; 4];
    let (bytes, _, unmappable) = encoding.encode(c.encode_utf8(&mut buf));
    if unmappable || bytes.len() != 2 {
        return false;
    }
    if encoding == BIG5 {
        (0xA1..=0xF9).contains(&bytes[0])
    } else {
        bytes[0] >= 0xA1 && bytes[1] >= 0xA1
    }
}

/// Score how plausible `text` is as output of `encoding`, in roughly `-2..=1`
/// per non-ASCII character, averaged.
fn script_score(encoding: &'static Encoding, text: &str) -> f64 {
    let chars: Vec<char> = text.chars().collect();
    let mut non_ascii = 0usize;
    let mut score = 0.0f64;

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii() {
            continue;
        }
        non_ascii += 1;

        score += if encoding == GBK || encoding == BIG5 {
            let common = if encoding == GBK {
                COMMON_SIMPLIFIED
            } else {
                COMMON_TRADITIONAL
            };
            if common.contains(c) {
                1.0
            } else if !in_core_rows(encoding, c) {
                -1.0
            } else if is_cjk_ideograph(c) || is_cjk_punctuation(c) {
                0.5
            } else {
                0.0
            }
        } else if encoding == SHIFT_JIS {
            if is_kana(c) {
                1.0
            } else if is_cjk_ideograph(c) || is_cjk_punctuation(c) {
                0.5
            } else if is_halfwidth_kana(c) {
                -1.0
            } else {
                0.0
            }
        } else if encoding == EUC_KR {
            // Modern Korean text carries very little Hanja
            if is_hangul(c) && in_core_rows(encoding, c) {
                1.0
            } else if is_hangul(c) {
                -1.0
            } else if is_cjk_ideograph(c) {
                -2.0
            } else {
                0.0
            }
        } else {
            // Single-byte Latin text has isolated accented letters
            let prev_ascii = i == 0 || chars[i - 1].is_ascii();
            let next_ascii = i + 1 == chars.len() || chars[i + 1].is_ascii();
            if c.is_alphabetic() && prev_ascii && next_ascii {
                1.0
            } else {
                0.0
            }
        };
    }

    if non_ascii == 0 {
        0.0
    } else {
        score / non_ascii as f64
    }
}

/// Guess the encoding of a byte buffer.
///
/// A byte order mark wins outright, then valid UTF-8. Otherwise each legacy
/// candidate that decodes without errors is scored on how well its output
/// fits the candidate's script. Returns `None` when the input is empty or no
/// candidate is plausible.
pub fn detect_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.is_empty() {
        return None;
    }

    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Some(encoding);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return Some(UTF_8);
    }

    let mut best: Option<(&'static Encoding, f64)> = None;
    for candidate in candidates() {
        let Some(text) = candidate.decode_without_bom_handling_and_without_replacement(bytes) else {
            continue;
        };
        let score = script_score(candidate, &text);
        tracing::trace!(encoding = candidate.name(), score, "Encoding candidate");

        if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    best.map(|(encoding, _)| encoding)
}

/// Look up an encoding by its WHATWG label (`utf-8`, `gbk`, `latin1`, ...).
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::InvalidOption(format!("unknown encoding: {}", label)))
}

/// Decode bytes strictly with the given encoding, dropping a matching BOM.
pub fn decode_with(bytes: &[u8], encoding: &'static Encoding, path: &Path) -> Result<String> {
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(Error::parse(
            path.display(),
            format!("content is not valid {}", encoding.name()),
        ));
    }
    Ok(text.into_owned())
}

/// Decode a text file.
///
/// An explicit encoding label is used as given. Without one the bytes must
/// be UTF-8, unless `autodetect` allows falling back to [`detect_encoding`].
pub fn decode_text(
    bytes: &[u8],
    encoding: Option<&str>,
    autodetect: bool,
    path: &Path,
) -> Result<String> {
    if let Some(label) = encoding.filter(|l| !l.trim().is_empty()) {
        return decode_with(bytes, encoding_for_label(label)?, path);
    }

    let without_bom = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(without_bom) {
        return Ok(text.to_string());
    }

    if autodetect {
        if let Some(detected) = detect_encoding(bytes) {
            tracing::debug!(path = %path.display(), encoding = detected.name(), "Detected encoding");
            return decode_with(bytes, detected, path);
        }
    }

    Err(Error::parse(path.display(), "content is not valid UTF-8"))
}
