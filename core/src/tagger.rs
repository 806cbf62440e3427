//! Line-oriented tagging and lemma selection.
//!
//! One input line is one pre-tokenized sentence; one output line carries
//! the tagged result, with TAB-separated alternatives when more than one
//! tag sequence is requested. After decoding, every token gets a lemma by
//! fusing the morphology candidates, the lemma-suffix guesser and the
//! lemma unigram model through the learned combiner weights.

use std::io::{self, BufRead, Write};
use std::path::Path;

use ahash::AHashSet;
use tracing::warn;

use crate::analysis::{AnalysisQueue, OneWordLexicalModel};
use crate::config::STEM_FILTER_FILE;
use crate::corpus::{sentence_to_string, Sentence, Token};
use crate::decoder::BeamedViterbi;
use crate::error::Result;
use crate::lemma::{batch_convert, LemmaTransform};
use crate::model::CompiledModel;
use crate::morph::MorphAnalyzer;
use crate::vocab::TagId;

/// Legacy stem whitelist: when a `morphtag_stems.txt` file is present,
/// candidate lemmas are filtered against it (keeping the full candidate
/// set whenever the intersection would be empty).
#[derive(Debug, Default)]
pub struct StemFilter {
    stems: AHashSet<String>,
}

impl StemFilter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            stems: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn from_working_dir() -> Option<Self> {
        if Path::new(STEM_FILTER_FILE).is_file() {
            Self::from_path(STEM_FILTER_FILE).ok()
        } else {
            None
        }
    }

    pub fn filter(&self, candidates: Vec<Token>) -> Vec<Token> {
        if self.stems.is_empty() {
            return candidates;
        }
        let kept: Vec<Token> = candidates
            .iter()
            .filter(|t| self.stems.contains(&t.lemma))
            .cloned()
            .collect();
        if kept.is_empty() {
            candidates
        } else {
            kept
        }
    }
}

pub struct MorphTagger<'a> {
    model: &'a CompiledModel,
    analyzer: &'a dyn MorphAnalyzer,
    decoder: BeamedViterbi<'a>,
    queue: AnalysisQueue,
    stemming: bool,
    field_sep: String,
    stem_filter: Option<StemFilter>,
}

impl<'a> MorphTagger<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: &'a CompiledModel,
        analyzer: &'a dyn MorphAnalyzer,
        log_theta: f64,
        suf_theta: f64,
        max_guessed: usize,
        beam_size: Option<usize>,
        stemming: bool,
        field_sep: &str,
        queue: AnalysisQueue,
    ) -> Self {
        Self {
            model,
            analyzer,
            decoder: BeamedViterbi::new(
                model, analyzer, log_theta, suf_theta, max_guessed, beam_size,
            ),
            queue,
            stemming,
            field_sep: field_sep.to_string(),
            stem_filter: StemFilter::from_working_dir(),
        }
    }

    pub fn set_stem_filter(&mut self, filter: Option<StemFilter>) {
        self.stem_filter = filter;
    }

    /// Tag every line of `reader`, writing one output line per input line.
    pub fn tag_stream<R: BufRead, W: Write>(
        &self,
        reader: R,
        writer: &mut W,
        max_results: usize,
    ) -> io::Result<()> {
        for line in reader.lines() {
            let line = crate::utils::normalize(&line?);
            let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            writeln!(writer, "{}", self.tag_line(&tokens, max_results))?;
        }
        writer.flush()
    }

    /// Render the tagged alternatives of one sentence as an output line.
    pub fn tag_line(&self, tokens: &[String], max_results: usize) -> String {
        if tokens.is_empty() {
            return String::new();
        }
        let show_scores = max_results > 1;
        self.tag_sentence(tokens, max_results)
            .iter()
            .map(|(sentence, weight)| {
                let mut rendered =
                    sentence_to_string(sentence, &self.field_sep, !self.stemming);
                if show_scores {
                    rendered.push_str(&format!("$${}$$", weight));
                }
                rendered
            })
            .collect::<Vec<String>>()
            .join("\t")
    }

    /// Decode one sentence into up to `max_results` tagged readings,
    /// ordered by descending log-weight.
    pub fn tag_sentence(&self, raw_tokens: &[String], max_results: usize) -> Vec<(Sentence, f64)> {
        let mut user_anals: Vec<Option<OneWordLexicalModel>> =
            Vec::with_capacity(raw_tokens.len());
        let mut words: Vec<String> = Vec::with_capacity(raw_tokens.len());
        for raw in raw_tokens {
            if self.queue.is_preanalysed(raw) {
                let parsed = {
                    let mut vocab = self.model.vocab.borrow_mut();
                    self.queue.parse(raw, &mut vocab)
                };
                words.push(self.queue.clean(raw).to_string());
                match parsed {
                    Ok(m) => user_anals.push(Some(m)),
                    Err(e) => {
                        warn!("{} - ignoring inline analysis", e);
                        user_anals.push(None);
                    }
                }
            } else {
                words.push(raw.clone());
                user_anals.push(None);
            }
        }

        self.decoder
            .decode(&words, max_results, &user_anals)
            .into_iter()
            .map(|(tag_ids, weight)| {
                let sentence: Sentence = tag_ids
                    .iter()
                    .enumerate()
                    .map(|(idx, &tag)| {
                        if self.stemming {
                            self.find_best_lemma(&words[idx], tag, idx, &user_anals)
                        } else {
                            let vocab = self.model.vocab.borrow();
                            let tag_str = vocab.tag(tag).unwrap_or_default();
                            Token::new(&words[idx], &words[idx], tag_str)
                        }
                    })
                    .collect();
                (sentence, weight)
            })
            .collect()
    }

    fn simplify(&self, token: &Token) -> Token {
        match &self.model.lemma_mapper {
            Some(mapper) => Token::new(&token.word, &mapper.map(&token.lemma), &token.tag),
            None => token.clone(),
        }
    }

    /// Pick the lemma of one decoded token.
    fn find_best_lemma(
        &self,
        word: &str,
        tag: TagId,
        position: usize,
        user_anals: &[Option<OneWordLexicalModel>],
    ) -> Token {
        let vocab = self.model.vocab.borrow();
        let tag_str = vocab.tag(tag).unwrap_or_default().to_string();

        let transform_probs = self.model.lemma_guesser.tag_log_probabilities(word);
        let lemma_suffix_probs = batch_convert(&transform_probs, word, &vocab);
        drop(vocab);

        let mut guessed = false;
        let mut stems: Vec<Token> = match user_anals.get(position).and_then(Option::as_ref) {
            Some(user) => user.word_anals().iter().map(|t| self.simplify(t)).collect(),
            None => self.analyzer.analyze(word),
        };
        if stems.is_empty() {
            guessed = true;
            stems = lemma_suffix_probs.keys().cloned().collect();
        }

        let mut candidates: Vec<Token> =
            stems.into_iter().filter(|t| t.tag == tag_str).collect();
        if let Some(filter) = &self.stem_filter {
            candidates = filter.filter(candidates);
        }

        let mut result = if candidates.is_empty() {
            Token::new(word, word, &tag_str)
        } else if candidates.len() == 1 && word == word.to_lowercase() {
            candidates.remove(0)
        } else {
            let mut best: Option<(Token, f64)> = None;
            for candidate in candidates {
                let transform = lemma_suffix_probs
                    .get(&candidate)
                    .map(|(t, _)| t.clone())
                    .unwrap_or_else(|| LemmaTransform::new(word, &candidate.lemma, tag));
                let mut scored = vec![candidate.clone()];
                if guessed {
                    let lowered =
                        Token::new(&candidate.word, &candidate.lemma.to_lowercase(), &candidate.tag);
                    if lowered != candidate {
                        scored.push(lowered);
                    }
                }
                for token in scored {
                    let score = self.model.combiner.combine(
                        &token,
                        &transform,
                        &self.model.lemma_unigrams,
                        &self.model.lemma_guesser,
                        self.model.suffix_model_weight,
                    );
                    match &best {
                        Some((_, best_score)) if *best_score >= score => {}
                        _ => best = Some((token, score)),
                    }
                }
            }
            match best {
                Some((token, _)) => token,
                None => Token::new(word, word, &tag_str),
            }
        };

        if guessed && !self.model.guessed_lemma_marker.is_empty() {
            result.lemma = format!("{}{}", self.model.guessed_lemma_marker, result.lemma);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::corpus::CorpusReader;
    use crate::model::Model;
    use crate::morph::NullAnalyzer;

    fn compiled_with(corpus: &str, conf: &Configuration) -> CompiledModel {
        let reader = CorpusReader::new("#", "\n");
        let (doc, _) = reader.read(corpus);
        let mut model = Model::new(2, 2, 10, 10);
        model.train(&doc, conf.lemma_mapper().as_ref());
        model.compile(conf)
    }

    fn tagger<'a>(model: &'a CompiledModel, stemming: bool) -> MorphTagger<'a> {
        let mut t = MorphTagger::new(
            model,
            &NullAnalyzer,
            1000f64.ln(),
            10f64.ln(),
            10,
            None,
            stemming,
            "#",
            AnalysisQueue::default(),
        );
        // Tests must not depend on files in the working directory.
        t.set_stem_filter(None);
        t
    }

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn train_then_tag_roundtrip() {
        let conf = Configuration::default();
        let model = compiled_with(
            "A#a#X B#b#Y C#c#Z\n\
             A#a#X D#d#W\n\
             B#b#Y C#c#Z\n",
            &conf,
        );
        let t = tagger(&model, true);
        assert_eq!(t.tag_line(&toks("A B C"), 1), "A#a#X B#b#Y C#c#Z");
    }

    #[test]
    fn unknown_word_lemma_comes_from_suffix_model() {
        let conf = Configuration::default();
        let model = compiled_with(
            "houses#house#N cases#case#N runs#run#V\n\
             houses#house#N\n",
            &conf,
        );
        let t = tagger(&model, true);
        let results = t.tag_sentence(&toks("bases"), 1);
        let token = &results[0].0[0];
        assert_eq!(token.tag, "N");
        assert_eq!(token.lemma, "base");
    }

    #[test]
    fn guessed_marker_prefixes_guessed_lemmas() {
        let conf = Configuration::from_xml_str(
            "<config><guessed_marker>?</guessed_marker></config>",
        )
        .unwrap();
        let model = compiled_with("houses#house#N cases#case#N\nhouses#house#N\n", &conf);
        let t = tagger(&model, true);
        let results = t.tag_sentence(&toks("bases"), 1);
        let token = &results[0].0[0];
        assert!(token.lemma.starts_with('?'), "lemma: {}", token.lemma);
    }

    #[test]
    fn pos_only_mode_skips_lemmatization() {
        let conf = Configuration::default();
        let model = compiled_with("A#a#X B#b#Y\nA#a#X\n", &conf);
        let t = tagger(&model, false);
        assert_eq!(t.tag_line(&toks("A B"), 1), "A#X B#Y");
    }

    #[test]
    fn empty_line_stays_empty() {
        let conf = Configuration::default();
        let model = compiled_with("A#a#X\n", &conf);
        let t = tagger(&model, true);
        assert_eq!(t.tag_line(&[], 1), "");
    }

    #[test]
    fn top_two_results_are_tab_separated_with_scores() {
        let conf = Configuration::default();
        let model = compiled_with(
            "a#a#X b#b#Y\n\
             a#a#Y b#b#X\n\
             a#a#X b#b#X\n",
            &conf,
        );
        let t = tagger(&model, true);
        let line = t.tag_line(&toks("a b"), 2);
        let parts: Vec<&str> = line.split('\t').collect();
        assert!(parts.len() >= 2, "line: {}", line);
        for part in &parts {
            assert!(part.contains("$$"), "part: {}", part);
        }
        // Scores descend.
        let score = |p: &str| -> f64 {
            let inner = p.split("$$").nth(1).unwrap();
            inner.parse().unwrap()
        };
        assert!(score(parts[0]) >= score(parts[1]));
    }

    #[test]
    fn user_analysis_decides_lemma_and_tag() {
        let conf = Configuration::default();
        let model = compiled_with(
            "dog#dog#N runs#run#V\n\
             cat#cat#N runs#run#V\n\
             flux#fluere#V\n",
            &conf,
        );
        let t = tagger(&model, true);
        let results = t.tag_sentence(&toks("flux{{fluxus[N]$$0.7||fluere[V]$$0.3}}"), 1);
        let token = &results[0].0[0];
        assert_eq!(token.tag, "N");
        assert_eq!(token.lemma, "fluxus");
        assert_eq!(token.word, "flux");
    }

    #[test]
    fn stem_filter_restricts_candidates() {
        let mut filter = StemFilter::default();
        filter.stems.insert("house".to_string());
        let candidates = vec![
            Token::new("houses", "house", "N"),
            Token::new("houses", "houses", "N"),
        ];
        let kept = filter.filter(candidates.clone());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].lemma, "house");
        // Empty intersection keeps everything.
        let other = vec![Token::new("xs", "x", "N")];
        assert_eq!(filter.filter(other.clone()), other);
    }

    #[test]
    fn tag_stream_writes_one_line_per_input_line() {
        let conf = Configuration::default();
        let model = compiled_with("A#a#X B#b#Y\nA#a#X\n", &conf);
        let t = tagger(&model, true);
        let input = "A B\n\nA\n";
        let mut out = Vec::new();
        t.tag_stream(input.as_bytes(), &mut out, 1).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "A#a#X B#b#Y");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "A#a#X");
    }
}
