use serde::{Deserialize, Serialize};
use std::fmt;

/// Country a survey item was generated for.
///
/// Datasets spell countries inconsistently (`united_states`, `United States`,
/// `kenya`); comparisons go through [`Country::matches`] which ignores case,
/// separators and extra whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(String);

/// Countries covered by the study, with the spellings that identify them in prompts.
const STUDIED: &[(&str, &[&str])] = &[
    ("China", &["China"]),
    ("Korea", &["South Korea", "Korea"]),
    ("India", &["India"]),
    ("Kenya", &["Kenya"]),
    ("Nigeria", &["Nigeria"]),
    ("United States", &["United States"]),
];

impl Country {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comparison key: lowercase words separated by single spaces.
    #[must_use]
    pub fn key(&self) -> String {
        normalize(&self.0)
    }

    /// Human-readable form: `united_states` becomes `United States`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.key()
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn matches(&self, other: &Country) -> bool {
        !self.is_empty() && self.key() == other.key()
    }

    /// Detect which studied country a prompt is about.
    #[must_use]
    pub fn from_prompt(prompt: &str) -> Option<Self> {
        STUDIED
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| prompt.contains(n)))
            .map(|(name, _)| Country::new(name))
    }
}

fn normalize(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl PartialEq for Country {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Country {}

impl std::hash::Hash for Country {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Country {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Country {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_match_after_normalization() {
        let a = Country::new("united_states");
        let b = Country::new("United  States");
        let c = Country::new("united-states");
        assert!(a.matches(&b));
        assert!(b.matches(&c));
        assert_eq!(a, c);
        assert_eq!(a.display_name(), "United States");
    }

    #[test]
    fn empty_country_matches_nothing() {
        assert!(!Country::new("").matches(&Country::new("")));
    }

    #[test]
    fn prompt_detection_prefers_south_korea() {
        assert_eq!(
            Country::from_prompt("A festival in South Korea at dusk"),
            Some(Country::new("Korea"))
        );
        assert_eq!(
            Country::from_prompt("Street food in Nigeria"),
            Some(Country::new("nigeria"))
        );
        assert_eq!(Country::from_prompt("A generic kitchen"), None);
    }
}
