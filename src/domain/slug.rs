//! Default url segments for content that does not carry an explicit one.
//!
//! ASCII slugification comes from the `slug` crate; Chinese names are
//! transliterated through `pinyin` first so “基线对齐” becomes `ji-xian-dui-qi`.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;

/// Derive a url segment from a node name.
///
/// Returns `None` when the name is blank or slugifies to nothing.
pub fn url_segment_for(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }

    let candidate = slugify(transliterate_to_ascii(name));
    (!candidate.is_empty()).then_some(candidate)
}

/// Pick the stored segment when present and non-blank, else derive one from the name.
pub fn resolve_url_segment(stored: Option<&str>, name: &str) -> Option<String> {
    match stored.map(str::trim) {
        Some(segment) if !segment.is_empty() => Some(segment.to_ascii_lowercase()),
        _ => url_segment_for(name),
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // slugify decides what to drop
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
