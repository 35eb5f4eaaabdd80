//! Text canonicalization that defeats Unicode evasion of pattern matching.
//!
//! Applied, in order, to every string that reaches a regex pattern set
//! (thought, action name, serialized params) on both the server and the
//! embedded SDK: strip a fixed set of zero-width/bidi-override code
//! points, NFKC-normalize, then substitute a closed table of
//! Cyrillic/Greek/small-caps homoglyphs to their ASCII look-alikes.
//!
//! The set of stripped code points and the homoglyph table are closed by
//! policy (see `spec.md` §4.1, §9): extending either is a breaking change
//! that requires a policy version bump, not a drive-by addition here.

use std::borrow::Cow;

use unicode_normalization::UnicodeNormalization;

/// Zero-width and RTL/LTR override code points stripped verbatim.
/// Exact list, no substitutions, no additions.
const STRIPPED_CODEPOINTS: [char; 6] = [
    '\u{200B}', // ZERO WIDTH SPACE
    '\u{200C}', // ZERO WIDTH NON-JOINER
    '\u{200D}', // ZERO WIDTH JOINER
    '\u{FEFF}', // ZERO WIDTH NO-BREAK SPACE (BOM)
    '\u{202D}', // LEFT-TO-RIGHT OVERRIDE
    '\u{202E}', // RIGHT-TO-LEFT OVERRIDE
];

/// Closed homoglyph table, sorted by source character for binary search.
/// Cyrillic а/е/о/р/с/х, Greek α/ο, small-caps ᴀ/ᴇ → ASCII.
const HOMOGLYPHS: &[(char, char)] = &[
    ('\u{03B1}', 'a'), // GREEK SMALL LETTER ALPHA
    ('\u{03BF}', 'o'), // GREEK SMALL LETTER OMICRON
    ('\u{0430}', 'a'), // CYRILLIC SMALL LETTER A
    ('\u{0435}', 'e'), // CYRILLIC SMALL LETTER IE
    ('\u{043E}', 'o'), // CYRILLIC SMALL LETTER O
    ('\u{0440}', 'p'), // CYRILLIC SMALL LETTER ER
    ('\u{0441}', 'c'), // CYRILLIC SMALL LETTER ES
    ('\u{0445}', 'x'), // CYRILLIC SMALL LETTER HA
    ('\u{1D00}', 'a'), // LATIN LETTER SMALL CAPITAL A
    ('\u{1D07}', 'e'), // LATIN LETTER SMALL CAPITAL E
];

fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| STRIPPED_CODEPOINTS.contains(&c)) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !STRIPPED_CODEPOINTS.contains(c)).collect())
}

fn normalize_nfkc(s: &str) -> Cow<'_, str> {
    if unicode_normalization::is_nfkc_quick(s.chars()) == unicode_normalization::IsNormalized::Yes
    {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.nfkc().collect())
}

fn substitute_homoglyphs(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| HOMOGLYPHS.binary_search_by_key(&c, |&(from, _)| from).is_ok()) {
        return Cow::Borrowed(s);
    }
    let out: String = s
        .chars()
        .map(|c| {
            HOMOGLYPHS
                .binary_search_by_key(&c, |&(from, _)| from)
                .map(|i| HOMOGLYPHS[i].1)
                .unwrap_or(c)
        })
        .collect();
    Cow::Owned(out)
}

/// Run the full normalization pipeline: strip control chars, NFKC, then
/// homoglyph substitution. Idempotent — running it twice is a no-op on
/// the second pass.
pub fn normalize(s: &str) -> Cow<'_, str> {
    let stripped = strip_control_chars(s);
    let nfkc = match normalize_nfkc(&stripped) {
        Cow::Borrowed(_) => stripped,
        Cow::Owned(o) => Cow::Owned(o),
    };
    match substitute_homoglyphs(&nfkc) {
        Cow::Borrowed(_) => nfkc,
        Cow::Owned(o) => Cow::Owned(o),
    }
}
