//! The two built-in books of the `principia` collection.

use std::num::NonZeroUsize;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::clean::processor::BookProcessor;
use crate::clean::{Transform, encoding, ocr, typography, whitespace};

pub(super) const COLLECTION: &str = "principia";

pub(super) const FEDERALIST_BARCODE: &str = "32044072043805";
pub(super) const PSYCHOLOGY_BARCODE: &str = "32044010149714";

/// Encoding, typography, OCR and whitespace passes shared by both books.
fn standard_transforms(long_s: bool) -> Vec<Transform> {
    let mut transforms = vec![
        Transform::new("normalize_to_utf8", encoding::normalize_to_utf8),
        Transform::new("normalize_line_endings", encoding::normalize_line_endings),
        Transform::new("fix_ligatures", typography::fix_ligatures),
        Transform::new("normalize_quotes", typography::normalize_quotes),
        Transform::new("normalize_dashes", typography::normalize_dashes),
        Transform::new("normalize_spaces", typography::normalize_spaces),
        Transform::new("fix_common_errors", ocr::fix_common_errors),
    ];
    if long_s {
        transforms.push(Transform::new("fix_long_s", ocr::fix_long_s));
    }
    transforms.extend([
        Transform::new("fix_digit_letter_confusion", ocr::fix_digit_letter_confusion),
        Transform::new("remove_ocr_artifacts", ocr::remove_ocr_artifacts),
        Transform::new("dehyphenate", whitespace::dehyphenate),
        Transform::new("normalize_whitespace", whitespace::normalize_whitespace),
        whitespace::collapse_blank_lines_to(NonZeroUsize::MIN.saturating_add(1)),
        Transform::new("trim", whitespace::trim),
    ]);
    transforms
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| re(r"\n{3,}"));
static MID_PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| re(r"([a-z,;:])\n([a-z])"));
static QUOTED_BREAK: LazyLock<Regex> = LazyLock::new(|| re(r#"([a-z]['")])\n([a-z])"#));

/// Join OCR line breaks that fall inside a sentence.
fn reflow(text: &str) -> String {
    let text = MID_PARAGRAPH_BREAK.replace_all(text, "${1} ${2}");
    QUOTED_BREAK.replace_all(&text, "${1} ${2}").into_owned()
}

// ── The Federalist ──────────────────────────────────────────────────────

pub(super) fn federalist() -> BookProcessor {
    BookProcessor::new(
        FEDERALIST_BARCODE,
        "The Federalist: a collection of essays in favor of the new Constitution",
    )
    .author("Hamilton, Madison, Jay")
    .date("1864")
    .collection(COLLECTION)
    .notes(
        "1864 reprint of the 1788 essays. Running headers \"The Federalist.\" in several \
         positional forms; long s in places; editor's introduction paged with letters and \
         roman numerals.",
    )
    .transforms(standard_transforms(true))
    .post_process(federalist_post_process)
}

const FEDERALIST_HEADER: &str = r"(The\s+F[oe]{0,2}deralist|Introduction|Contents|Advertisement)\.";

static FED_FRONT: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^INTRODUCTION\.\s*$"));
static FED_END: LazyLock<Regex> = LazyLock::new(|| re(r"END OF VOL\.\s*I\.\s*\n"));
static OE_BEFORE_CAPITAL: LazyLock<Regex> = LazyLock::new(|| re(r"\x{152}([A-Z])"));
static THOMAS: LazyLock<Regex> = LazyLock::new(|| re(r"THOm-?\n?AS\b"));
static FOREIGN_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"[\x{370}-\x{3ff}\x{400}-\x{4ff}\x{600}-\x{6ff}\x{e00}-\x{e7f}",
        r"\x{f00}-\x{fff}\x{4e00}-\x{9fff}\x{ac00}-\x{d7af}\x{3130}-\x{318f}]",
    ))
});
static SPLIT_DROP_CAP: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\n([A-Z])[\x{2070}\x{b9}\x{b2}\x{b3}\x{2074}-\x{2079}]+\n([A-Z]{2,})")
});
static SUPERSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| re(r"[\x{2070}\x{b9}\x{b2}\x{b3}\x{2074}-\x{2079}]"));
static BULLETS: LazyLock<Regex> = LazyLock::new(|| re(r"[\x{2022}\x{26ab}\x{25bc}\x{bf}]"));
static ELLIPSIS_CHARS: LazyLock<Regex> = LazyLock::new(|| re(r"\x{2026}+"));
static DOT_LEADERS: LazyLock<Regex> = LazyLock::new(|| re(r"\.{4,}"));

static FED_HEADERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let h = FEDERALIST_HEADER;
    vec![
        // page number line, then header line
        re(&format!(r"\n[+*]?\d{{1,4}}\n{h}\n")),
        // header line, then page number line
        re(&format!(r"\n{h}\n\d{{1,4}}\n")),
    ]
});
static FED_HEADER_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let h = FEDERALIST_HEADER;
    vec![
        re(&format!(r"(?m)^\s*\d+\s+{h}\s*$")),
        re(&format!(r"(?m)^\s*{h}\s+\d+\s*$")),
        re(r"(?m)^\s*THE\s+FEDERALIST\.?\s*$"),
        // Title case only; the all-caps INTRODUCTION. heading stays.
        re(r"(?m)^\s*(Introduction|Contents|Advertisement)\.\s*$"),
    ]
});
static VOL_MARKER: LazyLock<Regex> = LazyLock::new(|| re(r"VOL\.\s*I\.\s*\n"));
static FED_PAGE_IDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?m)^\s*\d{1,4}\s*$"),
        re(r"(?m)^\s*[a-h]\s*$"),
        re(r"(?m)^\s*(?:[ivxlc]{2,6}|[IVXLC]{2,6})\s*$"),
    ]
});
static PAGE_BREAK_HYPHEN: LazyLock<Regex> = LazyLock::new(|| re(r"(\w)-\n\n([a-z])"));
static SPACED_HYPHEN: LazyLock<Regex> = LazyLock::new(|| re(r"(\w)- +\n([a-z])"));
static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| re(r"([a-z]\.)\n([a-z])"));

fn federalist_post_process(text: &str) -> String {
    let mut text = text.to_string();

    if let Some(start) = FED_FRONT.find(&text).map(|m| m.start()) {
        text.replace_range(..start, "");
    }
    if let Some(end) = FED_END.find(&text).map(|m| m.end()) {
        text.truncate(end);
    }

    let mut text = text.replace("J\u{e1}y", "Jay");
    text = OE_BEFORE_CAPITAL.replace_all(&text, "OE${1}").into_owned();
    text = text
        .replace('\u{152}', "Oe")
        .replace('\u{153}', "oe")
        .replace(['\u{275d}', '\u{275e}'], "\"");

    // Greek and Cyrillic homoglyphs of Latin capitals.
    text = text
        .replace("\u{3a4}\u{39f}", "TO")
        .replace("\u{3a4}\u{3bf}", "To")
        .replace('\u{410}', "A")
        .replace('\u{43c}', "m")
        .replace("RomULUS", "ROMULUS");
    text = THOMAS.replace_all(&text, "THOMAS").into_owned();
    text = FOREIGN_SCRIPT.replace_all(&text, "").into_owned();
    text = text.replace('\u{1ecb}', "i");

    text = SPLIT_DROP_CAP.replace_all(&text, "\n${1}${2}").into_owned();
    text = SUPERSCRIPT.replace_all(&text, "").into_owned();
    text = BULLETS.replace_all(&text, "").into_owned();
    text = text.replace('\u{2758}', "|").replace('\u{b7}', ".");
    text = ELLIPSIS_CHARS.replace_all(&text, "...").into_owned();
    text = DOT_LEADERS.replace_all(&text, "...").into_owned();

    for header in FED_HEADERS.iter() {
        text = header.replace_all(&text, "\n").into_owned();
    }
    for header in FED_HEADER_LINES.iter() {
        text = header.replace_all(&text, "").into_owned();
    }

    text = strip_vol_markers(&text);
    for page_id in FED_PAGE_IDS.iter() {
        text = page_id.replace_all(&text, "").into_owned();
    }
    text = EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned();

    text = PAGE_BREAK_HYPHEN.replace_all(&text, "${1}${2}").into_owned();
    text = SPACED_HYPHEN.replace_all(&text, "${1}${2}").into_owned();

    let text = MID_PARAGRAPH_BREAK.replace_all(&text, "${1} ${2}");
    let text = SENTENCE_BREAK.replace_all(&text, "${1} ${2}");
    QUOTED_BREAK.replace_all(&text, "${1} ${2}").into_owned()
}

/// Mid-text `VOL. I.` markers, keeping the closing `END OF VOL. I.`.
fn strip_vol_markers(text: &str) -> String {
    VOL_MARKER
        .replace_all(text, |caps: &Captures<'_>| {
            let start = caps.get(0).map_or(0, |m| m.start());
            if text[..start].ends_with("END OF ") {
                caps[0].to_string()
            } else {
                "\n".to_string()
            }
        })
        .into_owned()
}

// ── The Principles of Psychology ────────────────────────────────────────

pub(super) fn principles_psychology() -> BookProcessor {
    BookProcessor::new(PSYCHOLOGY_BARCODE, "The Principles of Psychology")
        .author("James, William")
        .date("1890")
        .collection(COLLECTION)
        .notes(
            "Two volumes, about 400K tokens. Running headers alternate between the chapter \
             title and PRINCIPLES OF PSYCHOLOGY; footnotes use superscript numbers; some Greek \
             passages are left untransliterated.",
        )
        .transforms(standard_transforms(false))
        .post_process(psychology_post_process)
}

const PSYCHOLOGY_FRONT_MARKER: &str = "PSYCHOLOGY.\nCHAPTER XVII.";

static PSY_END: LazyLock<Regex> = LazyLock::new(|| re(r"THE END\.\s*\n"));
static PSY_HEADERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"\n\d{1,4}\nPSYCHOLOG\s?Y\.\n"),
        re(r"\n\d{1,4}\n([A-Z][A-Z ]{2,50}\.)\n"),
        re(r"\n([A-Z][A-Z -]{2,50}\.)\n\d{1,4}\n"),
    ]
});
static PSY_HEADER_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?m)^[ \t]*\d+[ \t]+(PRINCIPLES OF PSYCHOLOGY|[A-Z][A-Z ]+)[ \t]*$"),
        re(r"(?m)^([A-Z][A-Z -]+\.?)[ \t]+\d+\s*$"),
    ]
});

fn psychology_post_process(text: &str) -> String {
    let mut text = text.to_string();

    // Body opens at "CHAPTER XVII." right after the volume's running title.
    if let Some(pos) = text.find(PSYCHOLOGY_FRONT_MARKER).filter(|&p| p > 0) {
        text.replace_range(..pos + "PSYCHOLOGY.\n".len(), "");
    }
    if let Some(end) = PSY_END.find(&text).map(|m| m.end()) {
        text.truncate(end);
    }

    for header in PSY_HEADERS.iter() {
        text = header.replace_all(&text, "\n").into_owned();
    }
    for header in PSY_HEADER_LINES.iter() {
        text = header.replace_all(&text, "").into_owned();
    }
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    reflow(&text)
}
