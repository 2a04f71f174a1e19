//! Character encoding repairs.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::clean::replace_all_literal;

/// Windows-1252 control characters, Latin-1 invisibles and UTF-8 text
/// decoded as Windows-1252.
const ENCODING_REPAIRS: &[(&str, &str)] = &[
    ("\u{92}", "'"),
    ("\u{93}", "\""),
    ("\u{94}", "\""),
    ("\u{96}", "\u{2013}"),
    ("\u{97}", "\u{2014}"),
    ("\u{a0}", " "),
    ("\u{ad}", ""),
    ("\u{e2}\u{20ac}\u{2122}", "'"),
    ("\u{e2}\u{20ac}\u{153}", "\""),
    ("\u{e2}\u{20ac}\u{9d}", "\""),
    ("\u{e2}\u{20ac}\u{201d}", "\u{2014}"),
    ("\u{e2}\u{20ac}\u{201c}", "\u{2013}"),
    ("\u{c3}\u{a9}", "\u{e9}"),
    ("\u{c3}\u{a8}", "\u{e8}"),
    ("\u{c3}\u{a2}", "\u{e2}"),
    ("\u{c3}\u{b4}", "\u{f4}"),
    ("\u{c3}\u{ae}", "\u{ee}"),
    ("\u{c3}\u{bb}", "\u{fb}"),
    ("\u{c3}\u{a7}", "\u{e7}"),
];

static UNICODE_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap());

/// Repair mojibake and stray Windows-1252 characters.
pub fn normalize_to_utf8(text: &str) -> String {
    replace_all_literal(text, ENCODING_REPAIRS)
}

/// Unicode canonical composition (NFC).
pub fn normalize_unicode(text: &str) -> String {
    text.nfc().collect()
}

pub fn strip_null_bytes(text: &str) -> String {
    text.replace('\0', "")
}

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Turn literal backslash-u escapes (four hex digits) into the characters
/// they name.
pub fn fix_unicode_escapes(text: &str) -> String {
    UNICODE_ESCAPE
        .replace_all(text, |caps: &Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
