//! Inline user-supplied analyses.
//!
//! A token may carry its own analyses in bracket syntax:
//! `word{{lemma1[tag1]$$0.7||lemma2[tag2]$$0.3}}`. The probabilities are
//! optional; when any is present they are linear probabilities that must
//! sum to 1. Parsed analyses become per-position `OneWordLexicalModel`s
//! that live only for the duration of one sentence and override the
//! trained lexicon inside the decoder.

use ahash::AHashMap;

use crate::config::{InputSeparators, UNKNOWN_VALUE};
use crate::corpus::Token;
use crate::error::{Error, Result};
use crate::mapper::TagMapper;
use crate::vocab::{TagId, TagVocabulary};

/// Lexical model of a single annotated word.
#[derive(Debug, Clone)]
pub struct OneWordLexicalModel {
    probs: AHashMap<TagId, f64>,
    word: String,
    anals: Vec<Token>,
    pub use_probabilities: bool,
    pub context_mapper: Option<TagMapper>,
}

impl OneWordLexicalModel {
    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn word_tags(&self) -> Vec<TagId> {
        self.probs.keys().copied().collect()
    }

    pub fn word_anals(&self) -> &[Token] {
        &self.anals
    }

    /// Emission log-probability: the stored value when the word form
    /// matches and the last context tag is one of the annotated tags,
    /// `unk_value` otherwise.
    pub fn log_prob(&self, context: &[TagId], word_form: &str, unk_value: f64) -> f64 {
        let mapped;
        let context: &[TagId] = match &self.context_mapper {
            Some(m) => {
                mapped = m.map_context(context);
                &mapped
            }
            None => context,
        };
        let Some(&tag) = context.last() else {
            return unk_value;
        };
        if word_form == self.word {
            if let Some(&p) = self.probs.get(&tag) {
                return p;
            }
        }
        unk_value
    }
}

/// Parser for the bracketed pre-analysis syntax.
#[derive(Debug, Clone)]
pub struct AnalysisQueue {
    seps: InputSeparators,
    tag_close: String,
    prob_sep: String,
}

impl AnalysisQueue {
    pub fn new(seps: InputSeparators) -> Self {
        Self {
            seps,
            tag_close: "]".to_string(),
            prob_sep: "$$".to_string(),
        }
    }

    /// True when the token carries an analysis bracket after a non-empty
    /// word part.
    pub fn is_preanalysed(&self, token: &str) -> bool {
        token.find(&self.seps.open).map_or(false, |p| p > 0)
            && token.rfind(&self.seps.close).map_or(false, |p| p > 0)
    }

    /// The bare word in front of the bracket.
    pub fn clean<'a>(&self, token: &'a str) -> &'a str {
        match token.find(&self.seps.open) {
            Some(p) => &token[..p],
            None => token,
        }
    }

    pub fn parse(&self, token: &str, vocab: &mut TagVocabulary) -> Result<OneWordLexicalModel> {
        let open = token
            .find(&self.seps.open)
            .ok_or_else(|| Error::Parsing(token.to_string()))?;
        let close = token
            .rfind(&self.seps.close)
            .filter(|&c| c > open)
            .ok_or_else(|| Error::Parsing(token.to_string()))?;
        let word = &token[..open];
        let inner = &token[open + self.seps.open.len()..close];

        let mut probs = AHashMap::new();
        let mut anals = Vec::new();
        let mut prob_sum = 0.0;
        let mut use_probabilities = false;

        for anal in inner.split(&self.seps.alt) {
            let (anal, log_prob) = match anal.find(&self.prob_sep) {
                Some(at) => {
                    use_probabilities = true;
                    let raw = &anal[at + self.prob_sep.len()..];
                    let p: f64 = raw
                        .parse()
                        .map_err(|_| Error::Parsing(token.to_string()))?;
                    prob_sum += p;
                    let lp = if p > 0.0 { p.ln() } else { UNKNOWN_VALUE };
                    (&anal[..at], lp)
                }
                None => (anal, 0.0),
            };
            let tag_open = anal
                .find(&self.seps.tag_open)
                .ok_or_else(|| Error::Parsing(token.to_string()))?;
            let tag_close = anal
                .rfind(&self.tag_close)
                .filter(|&c| c > tag_open)
                .ok_or_else(|| Error::Parsing(token.to_string()))?;
            let lemma = &anal[..tag_open];
            let tag_str = &anal[tag_open + self.seps.tag_open.len()..tag_close];
            if tag_str.is_empty() {
                return Err(Error::Parsing(token.to_string()));
            }
            let tag = vocab.add(tag_str);
            probs.insert(tag, log_prob);
            anals.push(Token::new(word, lemma, tag_str));
        }

        if use_probabilities && (prob_sum - 1.0).abs() > 1e-6 {
            return Err(Error::UserProbSumNotOne {
                token: token.to_string(),
                sum: prob_sum,
            });
        }

        Ok(OneWordLexicalModel {
            probs,
            word: word.to_string(),
            anals,
            use_probabilities,
            context_mapper: None,
        })
    }
}

impl Default for AnalysisQueue {
    fn default() -> Self {
        Self::new(InputSeparators::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_and_cleans_annotated_tokens() {
        let q = AnalysisQueue::default();
        assert!(q.is_preanalysed("flux{{fluxus[N]}}"));
        assert!(!q.is_preanalysed("flux"));
        assert!(!q.is_preanalysed("{{fluxus[N]}}"));
        assert_eq!(q.clean("flux{{fluxus[N]}}"), "flux");
        assert_eq!(q.clean("flux"), "flux");
    }

    #[test]
    fn parses_analyses_with_probabilities() {
        let q = AnalysisQueue::default();
        let mut vocab = TagVocabulary::with_sentence_markers();
        let m = q
            .parse("flux{{fluxus[N]$$0.7||fluere[V]$$0.3}}", &mut vocab)
            .unwrap();
        assert!(m.use_probabilities);
        assert_eq!(m.word(), "flux");
        assert_eq!(m.word_anals().len(), 2);
        let n = vocab.id("N").unwrap();
        let v = vocab.id("V").unwrap();
        let mut tags = m.word_tags();
        tags.sort_unstable();
        let mut expected = vec![n, v];
        expected.sort_unstable();
        assert_eq!(tags, expected);
        assert!((m.log_prob(&[n], "flux", -99.0) - 0.7f64.ln()).abs() < 1e-9);
        assert!((m.log_prob(&[v], "flux", -99.0) - 0.3f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn parses_analyses_without_probabilities() {
        let q = AnalysisQueue::default();
        let mut vocab = TagVocabulary::with_sentence_markers();
        let m = q.parse("alma{{alma[N]||almos[ADJ]}}", &mut vocab).unwrap();
        assert!(!m.use_probabilities);
        let n = vocab.id("N").unwrap();
        // No probability clause: stored log-prob is log(1).
        assert_eq!(m.log_prob(&[n], "alma", -99.0), 0.0);
    }

    #[test]
    fn probability_sum_must_be_one() {
        let q = AnalysisQueue::default();
        let mut vocab = TagVocabulary::with_sentence_markers();
        let err = q
            .parse("flux{{fluxus[N]$$0.7||fluere[V]$$0.2}}", &mut vocab)
            .unwrap_err();
        assert!(matches!(err, Error::UserProbSumNotOne { .. }));
    }

    #[test]
    fn malformed_bracket_is_a_parse_error() {
        let q = AnalysisQueue::default();
        let mut vocab = TagVocabulary::with_sentence_markers();
        assert!(matches!(
            q.parse("flux{{fluxusN$$0.7}}", &mut vocab),
            Err(Error::Parsing(_))
        ));
        assert!(matches!(
            q.parse("flux{{fluxus[]$$1.0}}", &mut vocab),
            Err(Error::Parsing(_))
        ));
    }

    #[test]
    fn unknown_context_or_word_falls_back() {
        let q = AnalysisQueue::default();
        let mut vocab = TagVocabulary::with_sentence_markers();
        let m = q.parse("flux{{fluxus[N]}}", &mut vocab).unwrap();
        let other = vocab.add("X");
        assert_eq!(m.log_prob(&[other], "flux", -99.0), -99.0);
        let n = vocab.id("N").unwrap();
        assert_eq!(m.log_prob(&[n], "другой", -99.0), -99.0);
    }
}
