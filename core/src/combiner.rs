//! Log-linear combination of the two lemma evidence sources.
//!
//! A candidate lemma is scored by the lemma unigram model and by the
//! lemma-suffix guesser; the two log-scores are mixed with a pair of
//! weights learned from the training corpus. For every training type the
//! pass measures how far each model places the true lemma below its own
//! best guess and rewards the model with the smaller gap.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::config::UNKNOWN_VALUE;
use crate::corpus::Token;
use crate::lemma::{batch_convert, LemmaTransform, LemmaUnigramModel};
use crate::suffix::{SuffixGuesser, SuffixTable};
use crate::vocab::TagVocabulary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiCombiner {
    lambda_unigram: f64,
    lambda_suffix: f64,
}

impl Default for BiCombiner {
    fn default() -> Self {
        Self {
            lambda_unigram: 0.5,
            lambda_suffix: 0.5,
        }
    }
}

impl BiCombiner {
    pub fn lambdas(&self) -> (f64, f64) {
        (self.lambda_unigram, self.lambda_suffix)
    }

    /// Learn the weight pair from the unique training types
    /// `(word, lemma, tag) -> count`.
    pub fn learn(
        types: &AHashMap<Token, u32>,
        lemma_suffixes: &SuffixTable<LemmaTransform>,
        theta: f64,
        unigrams: &LemmaUnigramModel,
        vocab: &TagVocabulary,
    ) -> Self {
        let mut lambda_u = 1.0;
        let mut lambda_s = 1.0;
        for (token, &count) in types {
            let transform_probs = lemma_suffixes.log_probabilities(&token.word, theta);
            let suffix_probs = batch_convert(&transform_probs, &token.word, vocab);
            if suffix_probs.is_empty() {
                continue;
            }
            let uni_max = suffix_probs
                .keys()
                .map(|t| unigrams.log_prob(&t.lemma))
                .fold(f64::NEG_INFINITY, f64::max);
            let suffix_max = suffix_probs
                .values()
                .map(|&(_, p)| p)
                .fold(f64::NEG_INFINITY, f64::max);

            let act_uni = unigrams.log_prob(&token.lemma);
            let act_suffix = suffix_probs
                .get(token)
                .map(|&(_, p)| p)
                .unwrap_or(UNKNOWN_VALUE);

            let uni_gap = act_uni - uni_max;
            let suffix_gap = act_suffix - suffix_max;
            if uni_gap > suffix_gap {
                lambda_u += (uni_gap - suffix_gap) * count as f64;
            } else if suffix_gap > uni_gap {
                lambda_s += (suffix_gap - uni_gap) * count as f64;
            }
        }
        let sum = lambda_u + lambda_s;
        Self {
            lambda_unigram: lambda_u / sum,
            lambda_suffix: lambda_s / sum,
        }
    }

    /// Combined score of one candidate. When `weight_override` is set it
    /// replaces the learned suffix weight (`(1 - w, w)`).
    pub fn combine(
        &self,
        token: &Token,
        transform: &LemmaTransform,
        unigrams: &LemmaUnigramModel,
        lemma_guesser: &SuffixGuesser<LemmaTransform>,
        weight_override: Option<f64>,
    ) -> f64 {
        let uni_score = unigrams.log_prob(&token.lemma);
        let suffix_score = lemma_guesser.element_log_probability(&token.word, transform);
        let (lambda_u, lambda_s) = match weight_override {
            Some(w) => (1.0 - w, w),
            None => (self.lambda_unigram, self.lambda_suffix),
        };
        uni_score * lambda_u + suffix_score * lambda_s
    }
}
