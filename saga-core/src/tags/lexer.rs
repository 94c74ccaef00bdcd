//! Hand-written scanner for the tag grammar.
//!
//! ```text
//! tag        := '[' NAME ':' body ']'
//! NAME       := [A-Z_]+
//! body       := one or more characters other than ']'
//! attribute  := WORD ws* '=' ws* '"' [^"]* '"'      (searched for inside body)
//! WORD       := [A-Za-z0-9_]+
//! ```
//!
//! Every span that has the shape of a tag is a tag, whether or not the
//! reducer knows its name. Attribute text that does not match the
//! attribute form is skipped without error.

use super::Attributes;
use std::ops::Range;

/// One tag found in narrator text.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attributes: Attributes,
    /// Byte range of the whole `[...]` span in the scanned text.
    pub span: Range<usize>,
}

/// Find every tag in `text`, left to right, without overlap.
pub fn scan(text: &str) -> Vec<Tag> {
    tag_spans(text)
        .into_iter()
        .map(|(span, name, body)| Tag {
            name: text[name].to_string(),
            attributes: parse_attributes(&text[body]),
            span,
        })
        .collect()
}

/// The text the player reads: all tag spans removed, surrounding whitespace
/// trimmed, and runs of three or more line breaks collapsed to one blank line.
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, _, _) in tag_spans(text) {
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);

    collapse_line_breaks(out.trim())
}

/// (whole span, name range, body range) for each tag.
fn tag_spans(text: &str) -> Vec<(Range<usize>, Range<usize>, Range<usize>)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('[') {
        let open = pos + offset;
        match match_tag(bytes, open) {
            Some(found) => {
                pos = found.0.end;
                spans.push(found);
            }
            None => pos = open + 1,
        }
    }

    spans
}

/// All grammar terminals are ASCII, so byte positions found here are always
/// valid char boundaries.
fn match_tag(bytes: &[u8], open: usize) -> Option<(Range<usize>, Range<usize>, Range<usize>)> {
    let name_start = open + 1;
    let mut i = name_start;
    while i < bytes.len() && (bytes[i].is_ascii_uppercase() || bytes[i] == b'_') {
        i += 1;
    }
    if i == name_start || bytes.get(i) != Some(&b':') {
        return None;
    }
    let name_end = i;

    let body_start = name_end + 1;
    let close = body_start + bytes[body_start..].iter().position(|&b| b == b']')?;
    if close == body_start {
        return None;
    }

    Some((open..close + 1, name_start..name_end, body_start..close))
}

fn parse_attributes(body: &str) -> Attributes {
    let bytes = body.as_bytes();
    let mut attrs = Attributes::new();
    let mut i = 0;

    while i < bytes.len() {
        if !is_word_byte(bytes[i]) {
            i += 1;
            continue;
        }

        let key_start = i;
        while i < bytes.len() && is_word_byte(bytes[i]) {
            i += 1;
        }
        let key_end = i;

        if let Some((value, next)) = match_quoted_value(bytes, key_end) {
            attrs.insert_raw(&body[key_start..key_end], &body[value]);
            i = next;
        }
    }

    attrs
}

/// Match `ws* '=' ws* '"' [^"]* '"'` starting at `pos`.
fn match_quoted_value(bytes: &[u8], mut pos: usize) -> Option<(Range<usize>, usize)> {
    pos = skip_whitespace(bytes, pos);
    if bytes.get(pos) != Some(&b'=') {
        return None;
    }
    pos = skip_whitespace(bytes, pos + 1);
    if bytes.get(pos) != Some(&b'"') {
        return None;
    }
    let value_start = pos + 1;
    let value_end = value_start + bytes[value_start..].iter().position(|&b| b == b'"')?;
    Some((value_start..value_end, value_end + 1))
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn collapse_line_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let (breaks, consumed) = leading_line_breaks(rest);
        if breaks == 0 {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
            continue;
        }

        if breaks >= 3 {
            out.push_str("\n\n");
        } else {
            out.push_str(&rest[..consumed]);
        }
        rest = &rest[consumed..];
    }

    out
}

/// Count consecutive line breaks (`\r\n`, `\n` or `\r`) at the start.
fn leading_line_breaks(text: &str) -> (usize, usize) {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut pos = 0;
    loop {
        if bytes[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else if matches!(bytes.get(pos), Some(b'\n') | Some(b'\r')) {
            pos += 1;
        } else {
            return (count, pos);
        }
        count += 1;
    }
}
