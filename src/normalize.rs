//! Mojibake repair for text fields
//!
//! Upstream text is sometimes encoded as UTF-8 but decoded by an
//! intermediate system as a single-byte Latin-family encoding, leaving
//! sequences like `JosÃ©` where `José` was meant. This module repairs such
//! fields column by column, idempotently: already-correct text passes
//! through untouched.
//!
//! Repair strategy, in priority order:
//! 1. a reversible byte-level round trip — re-encode the string as Latin-1
//!    and decode the bytes as UTF-8;
//! 2. when the round trip does not apply, a fixed table of known
//!    mis-decoded sequences (Latin-1 and CP1252 flavoured).

use std::borrow::Cow;

use crate::types::Page;

/// Characters that signal a UTF-8 string mis-decoded as Latin-1/CP1252.
const DIAGNOSTIC_CHARS: &[char] = &['Ã', 'Â', 'â', 'Å'];

/// Known mis-decoded sequences and their intended characters.
///
/// The first group covers Latin-1 payload bytes (accented lowercase and the
/// printable upper range); the second covers sequences whose payload byte
/// falls in the CP1252 0x80–0x9F glyph block. Unprintable payload bytes are
/// written as escapes.
const FIX_TABLE: &[(&str, &str)] = &[
    // Lowercase accented Latin letters
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã­", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã±", "ñ"),
    ("Ã§", "ç"),
    ("Ã£", "ã"),
    ("Ãµ", "õ"),
    ("Ãª", "ê"),
    ("Ã®", "î"),
    ("Ã´", "ô"),
    ("Ã»", "û"),
    ("Ã¤", "ä"),
    ("Ã«", "ë"),
    ("Ã¯", "ï"),
    ("Ã¶", "ö"),
    ("Ã¼", "ü"),
    ("Ã¿", "ÿ"),
    ("Ã¦", "æ"),
    // Uppercase accented Latin letters
    ("Ã\u{81}", "Á"),
    ("Ã‰", "É"),
    ("Ã\u{8d}", "Í"),
    ("Ã“", "Ó"),
    ("Ãš", "Ú"),
    ("Ã‘", "Ñ"),
    ("Ã‡", "Ç"),
    ("Ã€", "À"),
    ("Ãˆ", "È"),
    ("ÃŒ", "Ì"),
    ("Ã’", "Ò"),
    ("Ã™", "Ù"),
    // Inverted punctuation and ordinal signs
    ("Â¡", "¡"),
    ("Â¿", "¿"),
    ("Âº", "º"),
    ("Âª", "ª"),
    // Three-byte UTF-8 payloads decoded through the CP1252 glyph block
    ("â‚¬", "€"),
    ("â€š", "‚"),
    ("â€ž", "„"),
    ("â€¦", "…"),
    ("â€¡", "‡"),
    ("â€°", "‰"),
    ("â€¹", "‹"),
    ("â€º", "›"),
    ("â€˜", "‘"),
    ("â€™", "’"),
    ("â€œ", "“"),
    ("â€\u{9d}", "”"),
    ("â€¢", "•"),
    ("â€“", "–"),
    ("â€”", "—"),
    ("â„¢", "™"),
    // Latin Extended-A through the same block
    ("Å“", "œ"),
    ("Å’", "Œ"),
    ("Å¡", "š"),
    ("Å¾", "ž"),
    ("Å¸", "Ÿ"),
];

/// Repair a single text value.
///
/// Returns the input untouched (borrowed) when no diagnostic character is
/// present or no repair applies — unknown sequences fail open.
#[must_use]
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    if !looks_misdecoded(text) {
        return Cow::Borrowed(text);
    }

    if let Some(fixed) = round_trip(text) {
        return Cow::Owned(fixed);
    }

    let mut fixed = text.to_string();
    for (wrong, right) in FIX_TABLE {
        if fixed.contains(wrong) {
            fixed = fixed.replace(wrong, right);
        }
    }

    if fixed == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(fixed)
    }
}

/// Repair every text field of every record in the page, in place.
///
/// Only top-level string values are touched; numbers, booleans, null, and
/// nested structures are preserved exactly, as is field presence. Returns
/// the number of fields that were rewritten.
pub fn normalize_page(page: &mut Page) -> usize {
    let mut repaired = 0;
    for record in &mut page.records {
        for value in record.values_mut() {
            if let serde_json::Value::String(text) = value {
                if let Cow::Owned(fixed) = normalize_text(text) {
                    *text = fixed;
                    repaired += 1;
                }
            }
        }
    }
    repaired
}

fn looks_misdecoded(text: &str) -> bool {
    text.chars().any(|c| DIAGNOSTIC_CHARS.contains(&c))
}

/// Re-encode as Latin-1 and decode the bytes as UTF-8.
///
/// Applies only when every char fits a single Latin-1 byte and the
/// resulting byte sequence is valid UTF-8; any other input is left to the
/// fix table.
fn round_trip(text: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        if code > 0xFF {
            return None;
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes).ok()
}
