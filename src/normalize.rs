// 🔑 Artist Identity Normalizer
//
// The normalized name is the only join key between the cost ledger and the
// revenue sources, so every name read anywhere goes through normalize().

use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_normalization::UnicodeNormalization;

/// Aggregate-row markers, compared case-insensitively against normalized keys
const RESERVED_MARKERS: &[&str] = &[
    "total",
    "grand total",
    "subtotal",
    "합계",
    "총계",
    "총합계",
    "소계",
];

/// Canonicalize a raw artist name into a join key.
///
/// NFKC, strip control-category characters, collapse separator runs to a
/// single space, trim. Repeated until stable so that the result is a fixed
/// point: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut current = clean(raw);
    // Stripping a format character can leave a fresh composable pair behind
    for _ in 0..8 {
        let next = clean(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.nfkc() {
        if is_control(ch) {
            continue;
        }
        if is_separator(ch) {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

fn is_control(ch: char) -> bool {
    matches!(
        get_general_category(ch),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
    )
}

fn is_separator(ch: char) -> bool {
    matches!(
        get_general_category(ch),
        GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

/// True for "total"/"grand total"/"합계"-style aggregate labels
pub fn is_reserved_marker(key: &str) -> bool {
    let lowered = key.trim().to_lowercase();
    RESERVED_MARKERS.iter().any(|m| *m == lowered)
}

/// Keys made only of digits and numeric punctuation (row numbers, totals
/// pasted into the artist column)
pub fn is_numeric_key(key: &str) -> bool {
    let mut has_digit = false;
    for ch in key.chars() {
        if ch.is_ascii_digit() {
            has_digit = true;
        } else if !matches!(ch, ',' | '.' | '-' | '+' | ' ') {
            return false;
        }
    }
    has_digit
}

/// Summary rows never carry revenue or cost for a real artist
pub fn is_summary_key(key: &str) -> bool {
    key.is_empty() || is_reserved_marker(key)
}
