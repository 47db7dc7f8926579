//! Context escaping helpers
//!
//! Pure string transforms consumed by the printer (and by insert-time
//! validation for contexts that forbid a raw sequence outright):
//! - text content: `&` `<` `>`
//! - attribute values, double- or single-quote delimited
//! - comments (no `--`), CDATA (no `]]>`), processing instructions (no `?>`)
//!
//! Built-in entities: &lt; &gt; &amp; &quot; &apos; plus numeric forms.

use std::borrow::Cow;

use memchr::{memchr, memchr2, memchr3, memmem};

use crate::error::EscapeError;

/// Escape text content for element bodies.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    // Fast path: nothing to escape
    if memchr3(b'&', b'<', b'>', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Escape an attribute value delimited by double quotes.
pub fn escape_attr_double(input: &str) -> Cow<'_, str> {
    if memchr3(b'&', b'<', b'"', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Escape an attribute value delimited by single quotes.
pub fn escape_attr_single(input: &str) -> Cow<'_, str> {
    if memchr3(b'&', b'<', b'\'', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Comments carry no entity escaping; `--` can never appear raw.
pub fn escape_comment(input: &str) -> Result<&str, EscapeError> {
    if memmem::find(input.as_bytes(), b"--").is_some() {
        Err(EscapeError::CommentDashes)
    } else {
        Ok(input)
    }
}

/// CDATA carries no entity escaping; `]]>` would terminate the section.
pub fn escape_cdata(input: &str) -> Result<&str, EscapeError> {
    if memmem::find(input.as_bytes(), b"]]>").is_some() {
        Err(EscapeError::CDataTerminator)
    } else {
        Ok(input)
    }
}

/// Processing instructions carry no entity escaping; `?>` would terminate.
pub fn escape_pi(input: &str) -> Result<&str, EscapeError> {
    if memmem::find(input.as_bytes(), b"?>").is_some() {
        Err(EscapeError::PiTerminator)
    } else {
        Ok(input)
    }
}

/// Decode entity references back to raw text.
///
/// Unknown or malformed entities are kept verbatim rather than rejected;
/// strict entity validation belongs to the textual parser.
pub fn unescape(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        // Entity runs to the next ';' with no intervening '&'
        let end = memchr2(b';', b'&', &rest.as_bytes()[1..]).map(|i| i + 1);
        match end {
            Some(semi) if rest.as_bytes()[semi] == b';' => {
                if let Some(decoded) = decode_entity(&rest[1..semi]) {
                    out.push(decoded);
                    rest = &rest[semi + 1..];
                    continue;
                }
                out.push('&');
                rest = &rest[1..];
            }
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = entity.strip_prefix('#')?;
            let cp = if let Some(hex) = num.strip_prefix(['x', 'X']) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                num.parse::<u32>().ok()?
            };
            char::from_u32(cp)
        }
    }
}
