//! Username generation.
//!
//! The username style is a closed set of three enums (style, case,
//! separator) resolved once into a [`UsernameFormatter`]. Domains come from
//! the [`OpcoMap`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::NormalizedPerson;
use crate::names::{disambiguate, format_hyphen_name, title_case};

/// Domain used when an [`OpcoMap`] has lost its `default` entry.
pub const MISSING_DEFAULT_DOMAIN: &str = "MISSING_DEFAULT.com";

/// Key of the mandatory fallback entry of an [`OpcoMap`].
pub const DEFAULT_OPCO_KEY: &str = "default";

// ---------------------------------------------------------------------------
// Format settings
// ---------------------------------------------------------------------------

/// Letter case applied to the local part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCase {
    #[default]
    Title,
    Lower,
    Upper,
}

/// Which parts of the name make it into the local part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameStyle {
    /// `John.Doe`
    #[default]
    #[serde(rename = "first-last", alias = "first last")]
    FirstLast,
    /// `J.Doe`
    #[serde(rename = "f-last", alias = "f last")]
    FLast,
    /// `John.D`
    #[serde(rename = "first-l", alias = "first l")]
    FirstL,
}

/// Character placed between the two name parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    #[default]
    Period,
    #[serde(alias = "no space")]
    None,
}

impl Separator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Period => ".",
            Self::None => "",
        }
    }
}

/// Username formatting configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSettings {
    #[serde(default)]
    pub case: NameCase,
    #[serde(default)]
    pub style: NameStyle,
    #[serde(default)]
    pub separator: Separator,
}

// ---------------------------------------------------------------------------
// Formatter
// ---------------------------------------------------------------------------

/// Turns a two-token name into a username local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsernameFormatter {
    style: NameStyle,
    case: NameCase,
    separator: Separator,
}

impl UsernameFormatter {
    pub fn resolve(style: NameStyle, case: NameCase, separator: Separator) -> Self {
        Self {
            style,
            case,
            separator,
        }
    }

    pub fn from_settings(settings: &FormatSettings) -> Self {
        Self::resolve(settings.style, settings.case, settings.separator)
    }

    /// Format `"First Last"` into the local part. Extra middle tokens are
    /// ignored; a single token is used on its own.
    ///
    /// Case applies to the joined string, so title case without a separator
    /// capitalizes only the first letter (`Johndoe`).
    pub fn format(&self, name: &str) -> String {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        let (first, last) = match tokens.as_slice() {
            [] => return String::new(),
            [only] => return self.apply_case(only),
            [first, .., last] => (*first, *last),
        };

        let (first, last) = match self.style {
            NameStyle::FirstLast => (first.to_string(), last.to_string()),
            NameStyle::FLast => (initial(first), last.to_string()),
            NameStyle::FirstL => (first.to_string(), initial(last)),
        };

        self.apply_case(&format!("{first}{}{last}", self.separator.as_str()))
    }

    fn apply_case(&self, part: &str) -> String {
        match self.case {
            NameCase::Title => title_case(part),
            NameCase::Lower => part.to_lowercase(),
            NameCase::Upper => part.to_uppercase(),
        }
    }
}

/// First character plus any trailing digits, so a disambiguation suffix
/// (`Doe2` -> `D2`) survives the reduction.
fn initial(token: &str) -> String {
    let mut chars = token.chars();
    let Some(head) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();
    let digits_start = rest
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    format!("{head}{}", &rest[digits_start..])
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

/// Affiliation (operating company) to email domain mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpcoMap {
    entries: HashMap<String, String>,
}

impl OpcoMap {
    /// A map holding only the fallback domain.
    pub fn with_default(domain: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(DEFAULT_OPCO_KEY.to_string(), domain.into());
        Self { entries }
    }

    /// Insert or replace an entry; keys are stored lower-case.
    pub fn insert(&mut self, key: &str, domain: impl Into<String>) {
        self.entries.insert(key.to_lowercase(), domain.into());
    }

    pub fn has_default(&self) -> bool {
        self.entries.contains_key(DEFAULT_OPCO_KEY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, domain)` pairs sorted by key.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    /// Domain for `affiliation`, falling back to the `default` entry.
    pub fn resolve(&self, affiliation: &str) -> &str {
        self.entries
            .get(&affiliation.to_lowercase())
            .or_else(|| self.entries.get(DEFAULT_OPCO_KEY))
            .map(String::as_str)
            .unwrap_or(MISSING_DEFAULT_DOMAIN)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OpcoMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for OpcoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}", pairs.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generate one username per person, in order.
///
/// Names are disambiguated before formatting so that repeated people get
/// distinct local parts (`John.Doe`, `John.Doe1`).
pub fn generate_usernames(
    people: &[NormalizedPerson],
    opco_map: &OpcoMap,
    settings: &FormatSettings,
) -> Vec<String> {
    info!(count = people.len(), "generating usernames");
    let formatter = UsernameFormatter::from_settings(settings);

    let names: Vec<String> = people.iter().map(NormalizedPerson::short_name).collect();
    let unique = disambiguate(&names);

    let usernames: Vec<String> = unique
        .iter()
        .zip(people)
        .map(|(name, person)| {
            let local = formatter.format(&format_hyphen_name(name.trim()));
            format!("{local}@{}", opco_map.resolve(&person.affiliation))
        })
        .collect();

    debug!(?usernames, "usernames generated");
    usernames
}
