//! External morphological analyzer interface.
//!
//! The decoder only needs two queries: the tag candidates of a word and
//! its full `(lemma, tag)` analyses. The null analyzer answers with
//! nothing, which degrades the tagger to pure suffix guessing; the table
//! analyzer serves a pre-computed TSV table (`word TAB anal1 TAB anal2..`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;

use crate::corpus::Token;
use crate::error::Result;

pub trait MorphAnalyzer {
    /// Tag strings the analyzer admits for `word`.
    fn tags(&self, word: &str) -> Vec<String>;

    /// Full `(lemma, tag)` analyses of `word`, when the analyzer knows
    /// lemmas at all.
    fn analyze(&self, word: &str) -> Vec<Token>;
}

/// Analyzer that knows nothing.
#[derive(Debug, Default)]
pub struct NullAnalyzer;

impl MorphAnalyzer for NullAnalyzer {
    fn tags(&self, _word: &str) -> Vec<String> {
        Vec::new()
    }

    fn analyze(&self, _word: &str) -> Vec<Token> {
        Vec::new()
    }
}

/// Morphological table loaded from a TSV file.
#[derive(Debug, Default)]
pub struct TableAnalyzer {
    table: AHashMap<String, Vec<String>>,
}

impl TableAnalyzer {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table: AHashMap<String, Vec<String>> = AHashMap::new();
        for line in reader.lines() {
            let line = line?;
            let mut cells = line.split('\t');
            let Some(word) = cells.next() else {
                continue;
            };
            if word.is_empty() {
                continue;
            }
            let anals: Vec<String> = cells
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            table.insert(word.to_string(), anals);
        }
        Ok(Self { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl MorphAnalyzer for TableAnalyzer {
    fn tags(&self, word: &str) -> Vec<String> {
        self.table.get(word).cloned().unwrap_or_default()
    }

    fn analyze(&self, _word: &str) -> Vec<Token> {
        // The table format carries tags only.
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_serves_tags() {
        let data = "alma\tNOUN\tVERB\nfa\tNOUN\n";
        let analyzer = TableAnalyzer::from_reader(data.as_bytes()).unwrap();
        assert_eq!(analyzer.tags("alma"), vec!["NOUN", "VERB"]);
        assert_eq!(analyzer.tags("fa"), vec!["NOUN"]);
        assert!(analyzer.tags("nincs").is_empty());
        assert!(analyzer.analyze("alma").is_empty());
    }

    #[test]
    fn null_analyzer_is_silent() {
        let a = NullAnalyzer;
        assert!(a.tags("anything").is_empty());
        assert!(a.analyze("anything").is_empty());
    }
}
