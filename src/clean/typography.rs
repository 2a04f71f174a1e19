//! Ligatures, quotes, dashes and exotic spaces.

use std::sync::LazyLock;

use regex::Regex;

use crate::clean::replace_all_literal;

const LIGATURES: &[(&str, &str)] = &[
    ("\u{fb00}", "ff"),
    ("\u{fb01}", "fi"),
    ("\u{fb02}", "fl"),
    ("\u{fb03}", "ffi"),
    ("\u{fb04}", "ffl"),
    ("\u{fb05}", "st"),
    ("\u{fb06}", "st"),
    ("\u{a732}", "AA"),
    ("\u{a733}", "aa"),
    ("\u{c6}", "AE"),
    ("\u{e6}", "ae"),
    ("\u{152}", "OE"),
    ("\u{153}", "oe"),
    ("\u{a74f}", "oo"),
    ("\u{1e9e}", "SS"),
    ("\u{df}", "ss"),
];

const DASHES: &[(&str, &str)] = &[
    ("\u{2010}", "-"),
    ("\u{2011}", "-"),
    ("\u{2012}", "\u{2013}"),
    ("\u{2015}", "\u{2014}"),
];

const SPACES: &[char] = &[
    '\u{a0}', '\u{2002}', '\u{2003}', '\u{2004}', '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}',
    '\u{2009}', '\u{200a}', '\u{200b}', '\u{202f}', '\u{205f}', '\u{3000}',
];

static DOUBLE_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{201c}\u{201d}\u{201e}\u{201f}\u{ab}\u{bb}]").unwrap());
static SINGLE_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{2018}\u{2019}\u{201a}\u{201b}]").unwrap());
static TRIPLE_HYPHEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"---+").unwrap());
static ANY_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{2013}\u{2014}\u{2010}\u{2011}\u{2012}\u{2015}]").unwrap());
static DOT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{3,}").unwrap());

/// Expand typographic ligatures to their letters.
pub fn fix_ligatures(text: &str) -> String {
    replace_all_literal(text, LIGATURES)
}

/// Curly and angle quotes to straight ASCII quotes.
pub fn normalize_quotes(text: &str) -> String {
    let text = DOUBLE_QUOTES.replace_all(text, "\"");
    SINGLE_QUOTES.replace_all(&text, "'").into_owned()
}

/// `---` to em dash, `--` to en dash, stray Unicode dashes to standard forms.
pub fn normalize_dashes(text: &str) -> String {
    let text = TRIPLE_HYPHEN.replace_all(text, "\u{2014}");
    let text = text.replace("--", "\u{2013}");
    replace_all_literal(&text, DASHES)
}

/// Every dash to an ASCII hyphen.
pub fn normalize_dashes_to_ascii(text: &str) -> String {
    ANY_DASH.replace_all(text, "-").into_owned()
}

/// Runs of three or more periods to exactly three.
pub fn normalize_ellipsis(text: &str) -> String {
    DOT_RUN.replace_all(text, "...").into_owned()
}

/// Unicode spaces (and zero-width space) to a plain space.
pub fn normalize_spaces(text: &str) -> String {
    text.replace(SPACES, " ")
}
