//! Human name normalization.
//!
//! Roster names arrive in every shape imaginable ("DOE, john jr.", "Mary-Jane
//! O'Neil III"). [`normalize`] reduces them to a canonical `"First Last"`
//! string, [`format_hyphen_name`] collapses hyphenated parts before username
//! generation, and [`disambiguate`] makes repeated names unique.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;

/// Returned by [`normalize`] when no usable token survives.
pub const INVALID_NAME: &str = "Invalid Name";

/// Suffixes and particles that never count as a name part.
const STOPWORDS: &[&str] = &["jr", "sr", "i", "ii", "iii", "iv", "v", "vi", "the", "of"];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z-]*$").expect("static pattern is valid"))
}

/// Normalize a raw name into `"<first> <last>"`.
///
/// With `keep_full = false` only the first surviving token is kept as the
/// first name; with `keep_full = true` every token except the last is.
/// A single surviving token is used for both halves.
pub fn normalize(raw: &str, keep_full: bool) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|&c| c == '-' || !(c.is_ascii_punctuation() || c.is_numeric()))
        .collect();

    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| {
            t.chars().count() > 1
                && token_pattern().is_match(t)
                && !STOPWORDS.contains(&t.as_str())
        })
        .map(|t| title_case(&t))
        .collect();

    let Some(last) = tokens.last() else {
        return INVALID_NAME.to_string();
    };

    let first = if keep_full && tokens.len() > 1 {
        tokens[..tokens.len() - 1].join(" ")
    } else {
        tokens[0].clone()
    };

    format!("{first} {last}")
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Reduce a hyphenated name to two plain tokens.
///
/// Names without a hyphen are returned unchanged. Otherwise only the first
/// and last whitespace-separated tokens are kept: the first kept token
/// contributes its leading segment, the last its trailing segment.
pub fn format_hyphen_name(name: &str) -> String {
    if !name.contains('-') {
        return name.to_string();
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    let last_idx = parts.len().saturating_sub(1);
    let mut kept: Vec<&str> = Vec::with_capacity(2);

    for (i, part) in parts.iter().enumerate() {
        if i != 0 && i != last_idx {
            continue;
        }
        if part.contains('-') {
            let segment = if kept.is_empty() {
                part.split('-').next()
            } else {
                part.rsplit('-').next()
            };
            kept.push(segment.unwrap_or(part));
        } else {
            kept.push(part);
        }
    }

    kept.join(" ")
}

/// Append an occurrence counter to repeated names.
///
/// The first occurrence is left alone; the k-th repeat gets `k` appended
/// directly (`"John Doe"`, `"John Doe1"`, `"John Doe2"`).
pub fn disambiguate<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let count = seen.entry(name).and_modify(|c| *c += 1).or_insert(0);
            if *count == 0 {
                name.to_string()
            } else {
                format!("{name}{count}")
            }
        })
        .collect()
}
