//! Analysed-corpus parsing and token formatting.
//!
//! The training corpus is UTF-8 text: tokens separated by the token
//! separator (default space), sentences by the line separator, paragraphs
//! by a doubled line separator. Each token is `word<sep>lemma<sep>tag`
//! with a configurable field separator; underscores in the lemma field
//! stand for spaces. A malformed token aborts its sentence with a warning
//! and training continues with the next one.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// A stemmed, tagged token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    pub lemma: String,
    pub tag: String,
}

impl Token {
    pub fn new(word: &str, lemma: &str, tag: &str) -> Self {
        Self {
            word: word.to_string(),
            lemma: lemma.to_string(),
            tag: tag.to_string(),
        }
    }

    /// `word<sep>lemma<sep>tag` rendering used on the output side.
    pub fn format(&self, sep: &str) -> String {
        format!("{}{}{}{}{}", self.word, sep, self.lemma, sep, self.tag)
    }

    /// `word<sep>tag` rendering for tag-only output.
    pub fn format_tag_only(&self, sep: &str) -> String {
        format!("{}{}{}", self.word, sep, self.tag)
    }
}

pub type Sentence = Vec<Token>;
pub type Paragraph = Vec<Sentence>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub paragraphs: Vec<Paragraph>,
}

impl Document {
    pub fn sentences(&self) -> impl Iterator<Item = &Sentence> {
        self.paragraphs.iter().flatten()
    }

    pub fn sentence_count(&self) -> usize {
        self.paragraphs.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct CorpusReader {
    field_sep: String,
    token_sep: String,
    sentence_sep: String,
    para_sep: String,
}

impl CorpusReader {
    pub fn new(field_sep: &str, sentence_sep: &str) -> Self {
        Self::with_separators(field_sep, " ", sentence_sep)
    }

    pub fn with_separators(field_sep: &str, token_sep: &str, sentence_sep: &str) -> Self {
        Self {
            field_sep: field_sep.to_string(),
            token_sep: token_sep.to_string(),
            sentence_sep: sentence_sep.to_string(),
            para_sep: format!("{}{}", sentence_sep, sentence_sep),
        }
    }

    /// Parse a whole corpus. Returns the document together with the number
    /// of sentences skipped because of malformed tokens.
    pub fn read(&self, text: &str) -> (Document, u64) {
        let text = crate::utils::normalize(text);
        let mut text = text.as_str();
        // Strip trailing separators so the final split parts are not empty.
        for sep in [&self.para_sep, &self.sentence_sep, &self.token_sep] {
            if let Some(stripped) = text.strip_suffix(sep.as_str()) {
                text = stripped;
            }
        }

        let mut skipped: u64 = 0;
        let mut doc = Document::default();
        for para_text in text.split(&self.para_sep) {
            let mut paragraph = Paragraph::new();
            for sent_text in para_text.split(&self.sentence_sep) {
                if sent_text.is_empty() {
                    continue;
                }
                match self.parse_sentence(sent_text) {
                    Ok(sentence) => {
                        if !sentence.is_empty() {
                            paragraph.push(sentence);
                        }
                    }
                    Err(e) => {
                        warn!("{} - skipping sentence", e);
                        skipped += 1;
                    }
                }
            }
            if !paragraph.is_empty() {
                doc.paragraphs.push(paragraph);
            }
        }
        (doc, skipped)
    }

    fn parse_sentence(&self, text: &str) -> Result<Sentence> {
        let mut sentence = Sentence::new();
        for raw in text.split(&self.token_sep) {
            if raw.is_empty() {
                continue;
            }
            sentence.push(self.parse_token(raw)?);
        }
        Ok(sentence)
    }

    fn parse_token(&self, raw: &str) -> Result<Token> {
        let fields: Vec<&str> = raw.split(&self.field_sep).collect();
        if fields.len() != 3 || fields[0].is_empty() || fields[2].is_empty() {
            return Err(Error::Parsing(raw.to_string()));
        }
        let lemma = fields[1].replace('_', " ");
        Ok(Token::new(fields[0], &lemma, fields[2]))
    }
}

/// Join a sentence back into output text.
pub fn sentence_to_string(sentence: &[Token], field_sep: &str, tag_only: bool) -> String {
    sentence
        .iter()
        .map(|t| {
            if tag_only {
                t.format_tag_only(field_sep)
            } else {
                t.format(field_sep)
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
