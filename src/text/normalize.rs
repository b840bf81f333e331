//! Markup stripping and punctuation normalization
//!
//! Game text arrives with speech-markup tags and typographic punctuation
//! that synthesizers either read aloud or choke on. Tags are removed first
//! so punctuation inside a removed tag can never leak into the output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a single markup token such as `<break time="1s"/>` or `</emphasis>`
///
/// A tag name must follow the bracket directly, so `<3` or `a < b > c` in
/// ordinary chat is left alone.
static MARKUP_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("markup pattern is valid"));

/// Typographic characters and their canonical replacements
const PUNCTUATION: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // left single quote
    ('\u{2019}', "'"),   // right single quote / apostrophe
    ('\u{201A}', "'"),   // low single quote
    ('\u{201B}', "'"),   // reversed single quote
    ('\u{2032}', "'"),   // prime
    ('\u{201C}', "\""),  // left double quote
    ('\u{201D}', "\""),  // right double quote
    ('\u{201E}', "\""),  // low double quote
    ('\u{201F}', "\""),  // reversed double quote
    ('\u{2033}', "\""),  // double prime
    ('\u{2026}', "..."), // ellipsis
    ('\u{00AD}', ""),    // soft hyphen
    ('\u{2010}', "-"),   // hyphen
    ('\u{2011}', "-"),   // non-breaking hyphen
    ('\u{2012}', "-"),   // figure dash
    ('\u{2013}', "-"),   // en dash
    ('\u{2212}', "-"),   // minus sign
    ('\u{2014}', " - "), // em dash
    ('\u{2015}', " - "), // horizontal bar
    ('\u{2500}', " - "), // box drawing horizontal, used as a dash in game text
    ('\u{00A0}', " "),   // no-break space
];

/// Remove every markup token from `text`
///
/// Repeats until nothing matches, so nested input like `<<a>b>` cannot
/// reassemble into a new tag.
pub fn strip_markup(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let stripped = MARKUP_TOKEN.replace_all(&current, "");
        if stripped.len() == current.len() {
            return current;
        }
        current = stripped.into_owned();
    }
}

/// Map typographic punctuation onto straight quotes, ASCII ellipsis and hyphens
pub fn normalize_punctuation(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match PUNCTUATION.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => result.push_str(to),
            None => result.push(ch),
        }
    }
    result
}

/// Full cleanup pass: strip markup, then normalize punctuation
pub fn normalize_text(text: &str) -> String {
    normalize_punctuation(&strip_markup(text))
}
