//! Corrections for common OCR misreads in historical typefaces.
//!
//! The word lists are deliberately narrow: each entry is a misreading that
//! has no legitimate English spelling.

use std::sync::LazyLock;

use regex::Regex;

use crate::clean::replace_all_patterns;

fn word_rules(pairs: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    pairs
        .iter()
        .map(|(wrong, right)| (Regex::new(&format!(r"\b{wrong}\b")).unwrap(), *right))
        .collect()
}

static COMMON_ERRORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    word_rules(&[
        ("tbe", "the"),
        ("Tbe", "The"),
        ("wbich", "which"),
        ("Wbich", "Which"),
        ("tbat", "that"),
        ("Tbat", "That"),
        ("tbis", "this"),
        ("Tbis", "This"),
        ("witb", "with"),
        ("Witb", "With"),
        ("frorn", "from"),
        ("bave", "have"),
    ])
});

static RN_AS_M: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    word_rules(&[
        ("govemment", "government"),
        ("Govemment", "Government"),
        ("cornrnon", "common"),
        ("modem", "modern"),
        ("Modem", "Modern"),
        ("sumrner", "summer"),
        ("Surnrner", "Summer"),
    ])
});

static BROKEN_FF: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    word_rules(&[
        ("ditferent", "different"),
        ("Ditferent", "Different"),
        ("etfect", "effect"),
        ("Etfect", "Effect"),
        ("otfer", "offer"),
        ("Otfer", "Offer"),
        ("sutfer", "suffer"),
        ("Sutfer", "Suffer"),
    ])
});

static PUNCTUATION_CLUSTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,;:]{3,}").unwrap());
static LONE_SYMBOL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[^\w\s]\s*$").unwrap());

/// Frequent letter-level misreads (`tbe`, `wbich`, `frorn`, ...).
pub fn fix_common_errors(text: &str) -> String {
    replace_all_patterns(text, &COMMON_ERRORS)
}

/// `rn` read as `m` (and the reverse) in a few known words.
pub fn fix_rn_to_m(text: &str) -> String {
    replace_all_patterns(text, &RN_AS_M)
}

/// Long s (`ſ`) to `s`.
pub fn fix_long_s(text: &str) -> String {
    text.replace('\u{17f}', "s")
}

/// `1` between two letters becomes `l`; `0` between two lowercase letters
/// becomes `o`. Neighbours are judged on the input, not on earlier fixes.
pub fn fix_digit_letter_confusion(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let fixed = match (c, prev, next) {
            ('1', Some(p), Some(n)) if p.is_ascii_alphabetic() && n.is_ascii_alphabetic() => 'l',
            ('0', Some(p), Some(n)) if p.is_ascii_lowercase() && n.is_ascii_lowercase() => 'o',
            _ => c,
        };
        out.push(fixed);
    }
    out
}

/// Drop punctuation clusters and lines holding a single symbol, and shorten
/// runs of five or more identical characters to two.
pub fn remove_ocr_artifacts(text: &str) -> String {
    let text = PUNCTUATION_CLUSTER.replace_all(text, "");
    let text = LONE_SYMBOL_LINE.replace_all(&text, "");
    collapse_repeats(&text, 5, 2)
}

fn collapse_repeats(text: &str, min_run: usize, keep: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        let emit = if c != '\n' && run >= min_run { keep } else { run };
        out.extend(std::iter::repeat_n(c, emit));
    }
    out
}

/// Broken `ff` read as `tf` in a few known words.
pub fn fix_ff_ligature(text: &str) -> String {
    replace_all_patterns(text, &BROKEN_FF)
}
