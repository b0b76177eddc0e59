// 🏷️ Affiliation - which sub-label (and therefore which revenue sources) an
// artist settles under. Parsed once at the ledger boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed vocabulary of affiliations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    SourceA,
    SourceB,
}

impl Affiliation {
    pub const ALL: [Affiliation; 2] = [Affiliation::SourceA, Affiliation::SourceB];

    /// Canonical tag as written in the ledger
    pub fn tag(&self) -> &'static str {
        match self {
            Affiliation::SourceA => "SOURCE_A",
            Affiliation::SourceB => "SOURCE_B",
        }
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Delimiters that separate multiple affiliations in one ledger cell
pub const AFFILIATION_DELIMITERS: [char; 3] = [',', '&', '/'];

/// Maps ledger tokens to affiliations (case-insensitive)
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliationVocabulary {
    aliases: BTreeMap<Affiliation, Vec<String>>,
}

impl AffiliationVocabulary {
    pub fn new(aliases: BTreeMap<Affiliation, Vec<String>>) -> Self {
        AffiliationVocabulary { aliases }
    }

    pub fn resolve(&self, token: &str) -> Option<Affiliation> {
        let token = token.trim();
        Affiliation::ALL.into_iter().find(|aff| {
            aff.tag().eq_ignore_ascii_case(token)
                || self
                    .aliases
                    .get(aff)
                    .map(|list| list.iter().any(|a| a.trim().to_lowercase() == token.to_lowercase()))
                    .unwrap_or(false)
        })
    }

    /// Split a raw ledger cell into an AffiliationSet
    pub fn parse(&self, raw: &str) -> AffiliationSet {
        let tokens: Vec<String> = raw
            .split(|c| AFFILIATION_DELIMITERS.contains(&c))
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect();

        let mut recognized = Vec::new();
        let mut unrecognized = Vec::new();
        for token in &tokens {
            match self.resolve(token) {
                Some(aff) if !recognized.contains(&aff) => recognized.push(aff),
                Some(_) => {}
                None => unrecognized.push(token.clone()),
            }
        }
        recognized.sort();

        AffiliationSet {
            raw: raw.to_string(),
            token_count: tokens.len(),
            recognized,
            unrecognized,
        }
    }
}

impl Default for AffiliationVocabulary {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert(Affiliation::SourceA, vec!["A".to_string()]);
        aliases.insert(Affiliation::SourceB, vec!["B".to_string()]);
        AffiliationVocabulary { aliases }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliationSet {
    pub raw: String,
    pub token_count: usize,
    pub recognized: Vec<Affiliation>,
    pub unrecognized: Vec<String>,
}

impl AffiliationSet {
    /// More than one token: excluded from automatic deduction
    pub fn is_ambiguous(&self) -> bool {
        self.token_count > 1
    }

    /// The affiliation to settle under, when there is exactly one recognized one
    pub fn single(&self) -> Option<Affiliation> {
        if self.is_ambiguous() {
            return None;
        }
        self.recognized.first().copied()
    }

    pub fn contains(&self, affiliation: Affiliation) -> bool {
        self.recognized.contains(&affiliation)
    }

    pub fn is_empty(&self) -> bool {
        self.token_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_affiliation() {
        let vocab = AffiliationVocabulary::default();
        let set = vocab.parse(" SOURCE_A ");
        assert!(!set.is_ambiguous());
        assert_eq!(set.single(), Some(Affiliation::SourceA));
        assert!(set.unrecognized.is_empty());
    }

    #[test]
    fn test_alias_case_insensitive() {
        let vocab = AffiliationVocabulary::default();
        assert_eq!(vocab.resolve("b"), Some(Affiliation::SourceB));
        assert_eq!(vocab.resolve("source_b"), Some(Affiliation::SourceB));
    }

    #[test]
    fn test_ambiguous_on_every_delimiter() {
        let vocab = AffiliationVocabulary::default();
        for raw in ["A,B", "A & B", "A/B", "A, B / A"] {
            let set = vocab.parse(raw);
            assert!(set.is_ambiguous(), "{} should be ambiguous", raw);
            assert_eq!(set.single(), None);
        }
    }

    #[test]
    fn test_unrecognized_token() {
        let vocab = AffiliationVocabulary::default();
        let set = vocab.parse("INDIE");
        assert!(!set.is_ambiguous());
        assert_eq!(set.single(), None);
        assert_eq!(set.unrecognized, vec!["INDIE".to_string()]);
    }

    #[test]
    fn test_empty_cell() {
        let vocab = AffiliationVocabulary::default();
        let set = vocab.parse("  ");
        assert!(set.is_empty());
        assert_eq!(set.single(), None);
    }
}
