//! Special-token classification.
//!
//! Numbers, punctuation runs and HTML entities are collapsed into abstract
//! class names so all surface-identical tokens share emission statistics.
//! The pattern list is ordered; the first full match wins.

use regex::Regex;

pub const CARD: &str = "@CARD";
pub const CARDPUNCT: &str = "@CARDPUNCT";
pub const CARDSEPS: &str = "@CARDSEPS";
pub const CARDSUFFIX: &str = "@CARDSUFFIX";
pub const HTMLENTITY: &str = "@HTMLENTITY";
pub const PUNCT: &str = "@PUNCT";

#[derive(Debug)]
pub struct SpecTokenMatcher {
    patterns: Vec<(&'static str, Regex)>,
}

impl SpecTokenMatcher {
    pub fn new() -> Self {
        let table: [(&'static str, &'static str); 6] = [
            (CARD, r"^[0-9]+$"),
            (CARDPUNCT, r"^[0-9]+\.$"),
            (CARDSEPS, r"^[0-9.,:\-]+[0-9]+$"),
            (CARDSUFFIX, r"^[0-9]+[a-zA-Z]{1,3}$"),
            (HTMLENTITY, r"^&[^;]+;?$"),
            (
                PUNCT,
                r##"^[!"#$%&()*+,\-./:;<=>?@\[\\\]^_`{|}~«»…·→—•']+$"##,
            ),
        ];
        let patterns = table
            .into_iter()
            .map(|(name, pat)| {
                (
                    name,
                    Regex::new(pat).expect("special-token patterns are valid"),
                )
            })
            .collect();
        Self { patterns }
    }

    /// Class name of `token`, or `None` when no pattern matches it whole.
    pub fn match_token(&self, token: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(token))
            .map(|&(name, _)| name)
    }
}

impl Default for SpecTokenMatcher {
    fn default() -> Self {
        Self::new()
    }
}
